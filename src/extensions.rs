//! Application extension points: deciders, aggregators, and controllers.
//!
//! Iterative applications plug small trait objects into their graph:
//!
//! - an [`Aggregator`] accumulates values reported by node programs during an
//!   iteration (e.g. "did any vertex rank still change?") and hands the
//!   folded value to the decider;
//! - a [`Decider`] inspects the aggregators after every iteration and either
//!   requests another round or declares the application finished. A decider
//!   that requests another round typically rotates this iteration's outputs
//!   onto the next iteration's input paths - [`FileRotation`] does exactly
//!   that;
//! - a [`Controller`] is a named coordination endpoint node programs can
//!   reach through the orchestrator mid-iteration.
//!
//! All three are injected per application through
//! [`ApplicationGraph`](crate::graph::ApplicationGraph) and exposed to
//! remote callers by the orchestrator. An application without a decider
//! always finishes after a single iteration.
//!
//! # Examples
//!
//! A decider that runs a fixed number of rounds and feeds outputs back:
//!
//! ```rust
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use tideflow::extensions::{AggregatorMap, Decider, FileRotation, IterationDecision};
//!
//! struct FixedRounds {
//!     remaining: AtomicU32,
//!     rotation: FileRotation,
//! }
//!
//! impl Decider for FixedRounds {
//!     fn decide(&self, _aggregators: &AggregatorMap) -> IterationDecision {
//!         if self.remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
//!             self.rotation.rotate().expect("rotate outputs");
//!             IterationDecision::RunAgain
//!         } else {
//!             IterationDecision::Finished
//!         }
//!     }
//! }
//! ```

use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Aggregators registered by an application, keyed by variable name.
pub type AggregatorMap = FxHashMap<String, Arc<dyn Aggregator>>;

/// Controllers registered by an application, keyed by name.
pub type ControllerMap = FxHashMap<String, Arc<dyn Controller>>;

/// Outcome of a [`Decider`] consultation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterationDecision {
    /// Prepare and run another iteration.
    RunAgain,
    /// The application is complete.
    Finished,
}

/// Decides whether an application needs another iteration.
///
/// Called once per finished iteration with the application's aggregators.
/// Side effects (rotating inputs, resetting aggregate state) belong here -
/// the scheduler re-reads declared inputs on the next `prepare_iteration`.
pub trait Decider: Send + Sync {
    fn decide(&self, aggregators: &AggregatorMap) -> IterationDecision;
}

/// Accumulates values reported by node programs during an iteration.
///
/// Implementations use interior mutability; `update` may be called
/// concurrently from many nodes on many workers.
pub trait Aggregator: Send + Sync {
    /// Fold one reported value into the aggregate.
    fn update(&self, value: serde_json::Value);

    /// Read the current aggregate. Implementations may reset internal state
    /// here so each iteration starts fresh, mirroring read-and-rearm
    /// aggregators in fixed-point computations.
    fn aggregate(&self) -> serde_json::Value;
}

/// A named coordination endpoint reachable through the orchestrator.
pub trait Controller: Send + Sync {
    /// Handle one request from the named origin node, returning a reply.
    fn handle(&self, origin: &str, request: serde_json::Value) -> serde_json::Value;
}

/// Moves declared outputs onto input paths between iterations.
///
/// Each pair is `(from, to)`; all moves are attempted and the first I/O
/// failure is returned.
#[derive(Clone, Debug, Default)]
pub struct FileRotation {
    moves: Vec<(PathBuf, PathBuf)>,
}

impl FileRotation {
    #[must_use]
    pub fn new(moves: Vec<(PathBuf, PathBuf)>) -> Self {
        Self { moves }
    }

    /// Add one `(from, to)` pair.
    #[must_use]
    pub fn with_move(mut self, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        self.moves.push((from.into(), to.into()));
        self
    }

    /// Perform all registered moves.
    pub fn rotate(&self) -> std::io::Result<()> {
        for (from, to) in &self.moves {
            std::fs::rename(from, to)?;
            tracing::debug!(from = %from.display(), to = %to.display(), "rotated iteration file");
        }
        Ok(())
    }
}
