//! Node programs and their wired channel declarations.
//!
//! A [`NodeProgram`] is the sequential computation body executed inside one
//! node - a mapper, a reducer, a vertex program. The engine treats it as a
//! black box behind one async method; all its communication goes through
//! the [`NodeIo`] contract.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::channels::{ChannelError, NodeIo};
use crate::types::CommunicationMode;

/// Stable name of a node inside one application graph.
///
/// Names are assigned at insertion time (`node-0`, `node-1`, …) and double
/// as channel names: an edge `a -> b` gives `a` an output channel named
/// after `b` and gives `b` an input channel named after `a`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) String);

impl NodeId {
    /// The node name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The computation body of one node.
///
/// Programs are stateless from the engine's point of view: the worker
/// runtime calls `run` exactly once per iteration with freshly wired
/// channels and joins on its completion. A program signals failure by
/// returning an error; whether that taints the NodeGroup summary is
/// decided by the worker's [`IoFailurePolicy`](crate::config::IoFailurePolicy).
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use tideflow::channels::NodeIo;
/// use tideflow::graph::{NodeProgram, ProgramError};
///
/// /// Copies every arriving record to every output.
/// struct Repeater;
///
/// #[async_trait]
/// impl NodeProgram for Repeater {
///     async fn run(&self, io: &mut NodeIo) -> Result<(), ProgramError> {
///         while let Some(record) = io.read_arbitrary().await? {
///             io.write_all(&record).await?;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait NodeProgram: Send + Sync {
    async fn run(&self, io: &mut NodeIo) -> Result<(), ProgramError>;
}

/// Errors returned by node programs.
#[derive(Debug, Error, Diagnostic)]
pub enum ProgramError {
    /// A channel operation failed.
    #[error(transparent)]
    #[diagnostic(code(tideflow::program::channel))]
    Channel(#[from] ChannelError),

    /// A record payload did not have the shape the program expected.
    #[error("malformed record: {0}")]
    #[diagnostic(code(tideflow::program::record))]
    MalformedRecord(#[from] serde_json::Error),

    /// Program-specific failure.
    #[error("{0}")]
    #[diagnostic(code(tideflow::program::failed))]
    Failed(String),
}

impl ProgramError {
    /// Shorthand for a program-specific failure message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Transport and location of one named channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Transport of the edge behind this channel.
    pub mode: CommunicationMode,
    /// Backing path for file channels; `None` for the other transports.
    pub path: Option<PathBuf>,
}

impl ChannelSpec {
    pub(crate) fn wired(mode: CommunicationMode) -> Self {
        Self { mode, path: None }
    }

    pub(crate) fn file(path: PathBuf) -> Self {
        Self {
            mode: CommunicationMode::File,
            path: Some(path),
        }
    }
}

/// A finalized node: its program plus the channels the graph wired for it.
#[derive(Clone)]
pub struct NodeSpec {
    pub name: String,
    pub program: Arc<dyn NodeProgram>,
    /// Input channels keyed by producer name (or `input-N` for sources).
    pub inputs: FxHashMap<String, ChannelSpec>,
    /// Output channels keyed by consumer name (or `output-N` for sinks).
    pub outputs: FxHashMap<String, ChannelSpec>,
}

impl NodeSpec {
    /// Whether any input channel is a file channel.
    #[must_use]
    pub fn consumes_files(&self) -> bool {
        self.inputs.values().any(|channel| channel.mode.is_file())
    }
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// A directed, typed connection between two nodes. Immutable once the
/// graph is finalized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
    pub mode: CommunicationMode,
}
