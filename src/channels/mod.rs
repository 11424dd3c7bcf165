//! Multi-transport record channel fabric.
//!
//! Nodes exchange [`Record`](crate::record::Record)s over three transports:
//!
//! - **memory** - a shared fan-in [`RecordMultiplexer`] per consuming node;
//!   producers in the same NodeGroup write straight into it;
//! - **socket** - the same one-multiplexer-per-node pattern over TCP: the
//!   worker opens one [`SocketServer`] per node with socket inputs and
//!   publishes its address through the orchestrator, producers connect with
//!   a [`SocketRecordWriter`];
//! - **file** - one [`FileRecordReader`]/[`FileRecordWriter`] per edge,
//!   opened directly against the declared path, no multiplexing.
//!
//! A running node never touches transports directly. It gets a [`NodeIo`]
//! wired by the worker runtime and uses the five-operation contract:
//! `read_one`, `read_arbitrary`, `write_one`, `write_arbitrary`, `write_all`.
//! `read_arbitrary` merges all of a node's inputs through a
//! [`ReaderShuffler`]: one relay task per origin feeding a fresh
//! multiplexer, with EOF signaled only once every origin has closed.
//!
//! Fan-in across origins carries **no** ordering guarantee; a named read
//! preserves the single producer's order.

mod file;
mod io;
mod multiplexer;
mod ports;
mod shuffler;
pub mod socket;

pub use file::{FileRecordReader, FileRecordWriter};
pub use io::NodeIo;
pub use multiplexer::RecordMultiplexer;
pub use ports::{InputPort, OutputPort};
pub use shuffler::{ReaderShuffler, WriterShuffler};
pub use socket::{SocketRecordWriter, SocketServer};

use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by channel operations.
#[derive(Debug, Error, Diagnostic)]
pub enum ChannelError {
    /// Underlying transport failure.
    #[error("channel I/O error: {0}")]
    #[diagnostic(code(tideflow::channels::io))]
    Io(#[from] std::io::Error),

    /// Record framing failure on a socket or file channel.
    #[error(transparent)]
    #[diagnostic(code(tideflow::channels::frame))]
    Frame(#[from] crate::record::FrameError),

    /// The multiplexer queue was torn down while a peer still used it.
    #[error("multiplexer for channel {channel} disconnected")]
    #[diagnostic(code(tideflow::channels::disconnected))]
    Disconnected { channel: String },

    /// A named channel was not declared for this node.
    #[error("no channel named {name} wired for node {node}")]
    #[diagnostic(
        code(tideflow::channels::unknown_channel),
        help("Channel names come from the graph edges; check the producing/consuming node names.")
    )]
    UnknownChannel { node: String, name: String },

    /// `write_arbitrary` on a node with no output channels.
    #[error("node {node} has no output channels")]
    #[diagnostic(code(tideflow::channels::no_outputs))]
    NoOutputs { node: String },
}
