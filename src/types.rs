//! Core types for the Tideflow dataflow engine.
//!
//! This module defines the fundamental identifiers used throughout the
//! engine: the transport kind carried by a graph edge, worker identities,
//! and the serial numbers the scheduler stamps onto dispatched NodeGroups.
//!
//! # Key Types
//!
//! - [`CommunicationMode`]: the transport of an edge (in-process, socket, file)
//! - [`WorkerId`]: stable identity of a registered worker
//! - [`SerialNumber`]: per-iteration identity of a dispatched NodeGroup
//!
//! # Examples
//!
//! ```rust
//! use tideflow::types::{CommunicationMode, WorkerId};
//!
//! let mode = CommunicationMode::Socket;
//! assert!(!mode.is_file());
//!
//! let id = WorkerId::fresh();
//! println!("registered {id}");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport carried by a graph edge.
///
/// The communication mode decides how two connected nodes exchange records
/// *and* how the partitioner clusters them: in-process reachability defines
/// NodeGroups, socket reachability defines Stages, and file edges express
/// cross-wave ordering (see [`crate::partition`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommunicationMode {
    /// Shared in-memory queue between nodes scheduled on the same worker.
    ///
    /// Both endpoints of an in-process edge always land in the same
    /// NodeGroup, so the queue never crosses a process boundary.
    InProcess,

    /// TCP-style channel between nodes that run concurrently on
    /// (potentially) different workers.
    ///
    /// Both endpoints land in the same Stage and are released in the same
    /// scheduling wave.
    Socket,

    /// File handoff: the producer's NodeGroup must finish before the
    /// consumer's Stage may start.
    File,
}

impl CommunicationMode {
    /// Returns `true` for [`InProcess`](Self::InProcess) edges.
    #[must_use]
    pub fn is_in_process(&self) -> bool {
        matches!(self, Self::InProcess)
    }

    /// Returns `true` for [`Socket`](Self::Socket) edges.
    #[must_use]
    pub fn is_socket(&self) -> bool {
        matches!(self, Self::Socket)
    }

    /// Returns `true` for [`File`](Self::File) edges.
    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File)
    }
}

impl fmt::Display for CommunicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProcess => write!(f, "in-process"),
            Self::Socket => write!(f, "socket"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Stable identity of a registered worker.
///
/// Workers mint their own id at construction time; the orchestrator's
/// registry and the scheduler's affinity bookkeeping key on it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    /// Mint a fresh worker id.
    #[must_use]
    pub fn fresh() -> Self {
        Self(format!("worker-{}", uuid::Uuid::new_v4()))
    }

    /// Wrap an explicit id (useful for tests and fixed deployments).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serial number assigned to a NodeGroup for one iteration.
///
/// Serial numbers are unique across an application's lifetime: every
/// iteration stamps fresh numbers, so a stale termination report from a
/// previous iteration can never alias a currently running group.
pub type SerialNumber = u64;

/// Index of a NodeGroup within a partitioned application.
pub type GroupId = usize;

/// Index of a Stage within a partitioned application.
pub type StageId = usize;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn communication_mode_predicates() {
        assert!(CommunicationMode::InProcess.is_in_process());
        assert!(CommunicationMode::Socket.is_socket());
        assert!(CommunicationMode::File.is_file());
        assert!(!CommunicationMode::File.is_socket());
    }

    #[test]
    fn worker_ids_are_unique() {
        assert_ne!(WorkerId::fresh(), WorkerId::fresh());
        assert_eq!(WorkerId::new("w1"), WorkerId::new("w1"));
    }
}
