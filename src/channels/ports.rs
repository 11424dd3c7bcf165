//! Per-channel endpoints handed to a wired node.
//!
//! A port pairs one named channel of a node with its transport. Ports are
//! cheaply cloneable so the reader shuffler's relay tasks can share them
//! with named reads.

use std::sync::Arc;
use tokio::sync::Mutex;

use super::{
    ChannelError, FileRecordReader, FileRecordWriter, RecordMultiplexer, SocketRecordWriter,
};
use crate::record::Record;

/// Read side of one named input channel.
#[derive(Clone)]
pub enum InputPort {
    /// In-process input: reads records attributed to `origin` out of the
    /// node's shared memory multiplexer.
    Memory {
        mux: Arc<RecordMultiplexer>,
        origin: String,
    },
    /// Socket input: same shape as memory, the multiplexer is fed by the
    /// node's socket server.
    Socket {
        mux: Arc<RecordMultiplexer>,
        origin: String,
    },
    /// File input: exclusive reader over the declared path.
    File {
        reader: Arc<Mutex<FileRecordReader>>,
    },
}

impl InputPort {
    /// Read the next record on this channel; `None` on end of stream.
    pub async fn read(&self) -> Result<Option<Record>, ChannelError> {
        match self {
            Self::Memory { mux, origin } | Self::Socket { mux, origin } => {
                Ok(mux.read_from(origin).await)
            }
            Self::File { reader } => reader.lock().await.read().await,
        }
    }
}

/// Write side of one named output channel.
#[derive(Clone)]
pub enum OutputPort {
    /// In-process output: writes into the *consuming* node's multiplexer,
    /// attributed to this node's name.
    Memory {
        mux: Arc<RecordMultiplexer>,
        origin: String,
    },
    /// Socket output: a connected writer to the consumer's server.
    Socket {
        writer: Arc<Mutex<SocketRecordWriter>>,
    },
    /// File output: exclusive writer over the declared path.
    File {
        writer: Arc<Mutex<FileRecordWriter>>,
    },
}

impl OutputPort {
    /// Write one record to this channel.
    pub async fn write(&self, record: &Record) -> Result<(), ChannelError> {
        match self {
            Self::Memory { mux, origin } => mux.write(origin, record.clone()).await,
            Self::Socket { writer } => writer.lock().await.write(record).await,
            Self::File { writer } => writer.lock().await.write(record).await,
        }
    }

    /// Close this channel so the consumer observes per-origin EOF.
    pub async fn close(&self) -> Result<(), ChannelError> {
        match self {
            Self::Memory { mux, origin } => {
                mux.close(origin);
                Ok(())
            }
            Self::Socket { writer } => writer.lock().await.close().await,
            Self::File { writer } => writer.lock().await.close().await,
        }
    }
}
