//! Application graph model: nodes, typed edges, and per-application
//! metadata.
//!
//! [`ApplicationGraph`] is the mutable builder clients use to describe an
//! application; [`ApplicationSpec`] is the immutable result of
//! `finalize()` that the orchestrator schedules. The model itself has no
//! behavior beyond storage and lookup - clustering lives in
//! [`crate::partition`] and execution in [`crate::worker`].

mod node;
mod spec;

pub use node::{ChannelSpec, EdgeSpec, NodeId, NodeProgram, NodeSpec, ProgramError};
pub use spec::{ApplicationGraph, ApplicationSpec, GraphError};
