//! Fan-in and fan-out shufflers over a node's named channels.
//!
//! [`ReaderShuffler`] backs `read_arbitrary`: one relay task per input
//! channel pulls from that channel and pushes `(origin, record)` into a
//! dedicated multiplexer, deregistering its origin on EOF. The shuffler
//! therefore inherits the multiplexer's EOF rule - no end-of-stream until
//! every input channel has closed.
//!
//! [`WriterShuffler`] backs `write_arbitrary` with a uniformly random
//! output pick.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{ChannelError, InputPort, OutputPort, RecordMultiplexer};
use crate::record::Record;

/// Merges all of a node's inputs into one arbitrary-read stream.
pub struct ReaderShuffler {
    mux: Arc<RecordMultiplexer>,
    relays: Vec<JoinHandle<()>>,
}

impl ReaderShuffler {
    /// Spawn one relay per `(channel name, port)` pair.
    #[must_use]
    pub fn new(
        inputs: Vec<(String, InputPort)>,
        capacity: usize,
        poll: Duration,
    ) -> Self {
        let mux = Arc::new(RecordMultiplexer::new(
            inputs.iter().map(|(name, _)| name.clone()),
            capacity,
            poll,
        ));

        let relays = inputs
            .into_iter()
            .map(|(origin, port)| {
                let mux = mux.clone();
                tokio::spawn(async move {
                    loop {
                        match port.read().await {
                            Ok(Some(record)) => {
                                if mux.write(&origin, record).await.is_err() {
                                    break;
                                }
                            }
                            Ok(None) => break,
                            Err(error) => {
                                tracing::warn!(origin, %error, "relay read failed");
                                break;
                            }
                        }
                    }
                    mux.close(&origin);
                })
            })
            .collect();

        Self { mux, relays }
    }

    /// Read from whichever input next has data; `None` once every input
    /// has closed.
    pub async fn read_arbitrary(&self) -> Option<Record> {
        self.mux.read_any().await.map(|(_, record)| record)
    }
}

impl Drop for ReaderShuffler {
    fn drop(&mut self) {
        for relay in &self.relays {
            relay.abort();
        }
    }
}

/// Distributes records across a node's outputs.
pub struct WriterShuffler {
    node: String,
    outputs: Vec<OutputPort>,
}

impl WriterShuffler {
    #[must_use]
    pub fn new(node: impl Into<String>, outputs: Vec<OutputPort>) -> Self {
        Self {
            node: node.into(),
            outputs,
        }
    }

    /// Write to one uniformly random output channel.
    pub async fn write_arbitrary(&self, record: &Record) -> Result<(), ChannelError> {
        if self.outputs.is_empty() {
            return Err(ChannelError::NoOutputs {
                node: self.node.clone(),
            });
        }
        let index = rand::rng().random_range(0..self.outputs.len());
        self.outputs[index].write(record).await
    }
}
