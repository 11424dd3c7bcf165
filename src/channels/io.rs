//! The channel contract a running node program sees.
//!
//! [`NodeIo`] is wired once per node at dispatch time by the worker runtime
//! and exposes the five operations of the fabric: `read_one`,
//! `read_arbitrary`, `write_one`, `write_arbitrary`, `write_all`. The
//! shufflers behind the arbitrary operations are created lazily, so nodes
//! that only do named reads never pay for relay tasks.

use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{ChannelError, InputPort, OutputPort, ReaderShuffler, WriterShuffler};
use crate::record::Record;

/// Channel endpoints and runtime context for one running node.
pub struct NodeIo {
    node: String,
    inputs: FxHashMap<String, InputPort>,
    outputs: FxHashMap<String, OutputPort>,
    reader_shuffler: Option<ReaderShuffler>,
    writer_shuffler: Option<WriterShuffler>,
    terminate: Arc<AtomicBool>,
    shuffler_capacity: usize,
    shuffler_poll: Duration,
}

impl NodeIo {
    pub(crate) fn new(
        node: impl Into<String>,
        inputs: FxHashMap<String, InputPort>,
        outputs: FxHashMap<String, OutputPort>,
        terminate: Arc<AtomicBool>,
        shuffler_capacity: usize,
        shuffler_poll: Duration,
    ) -> Self {
        Self {
            node: node.into(),
            inputs,
            outputs,
            reader_shuffler: None,
            writer_shuffler: None,
            terminate,
            shuffler_capacity,
            shuffler_poll,
        }
    }

    /// Name of the node this IO context belongs to.
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Names of the wired input channels.
    pub fn input_channels(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    /// Names of the wired output channels.
    pub fn output_channels(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    /// Read the next record from the named input channel, preserving that
    /// producer's order. `Ok(None)` once the producer closed.
    pub async fn read_one(&self, channel: &str) -> Result<Option<Record>, ChannelError> {
        let port = self.inputs.get(channel).ok_or_else(|| ChannelError::UnknownChannel {
            node: self.node.clone(),
            name: channel.to_owned(),
        })?;
        port.read().await
    }

    /// Read from whichever input next has data. `Ok(None)` only after every
    /// input channel has closed.
    pub async fn read_arbitrary(&mut self) -> Result<Option<Record>, ChannelError> {
        if self.reader_shuffler.is_none() {
            let inputs = self
                .inputs
                .iter()
                .map(|(name, port)| (name.clone(), port.clone()))
                .collect();
            self.reader_shuffler = Some(ReaderShuffler::new(
                inputs,
                self.shuffler_capacity,
                self.shuffler_poll,
            ));
        }
        match &self.reader_shuffler {
            Some(shuffler) => Ok(shuffler.read_arbitrary().await),
            None => Ok(None),
        }
    }

    /// Write one record to the named output channel.
    pub async fn write_one(&self, record: &Record, channel: &str) -> Result<(), ChannelError> {
        let port = self.outputs.get(channel).ok_or_else(|| ChannelError::UnknownChannel {
            node: self.node.clone(),
            name: channel.to_owned(),
        })?;
        port.write(record).await
    }

    /// Write one record to a uniformly random output channel.
    pub async fn write_arbitrary(&mut self, record: &Record) -> Result<(), ChannelError> {
        if self.writer_shuffler.is_none() {
            let outputs = self.outputs.values().cloned().collect();
            self.writer_shuffler = Some(WriterShuffler::new(self.node.clone(), outputs));
        }
        match &self.writer_shuffler {
            Some(shuffler) => shuffler.write_arbitrary(record).await,
            None => Err(ChannelError::NoOutputs {
                node: self.node.clone(),
            }),
        }
    }

    /// Write one record to every output channel. All channels are
    /// attempted; the first failure is returned after the sweep.
    pub async fn write_all(&self, record: &Record) -> Result<(), ChannelError> {
        let mut first_failure = None;
        for (name, port) in &self.outputs {
            if let Err(error) = port.write(record).await {
                tracing::warn!(node = self.node, channel = name, %error, "write_all failed on channel");
                first_failure.get_or_insert(error);
            }
        }
        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Whether the application asked running nodes to wind down. The engine
    /// never sets this itself; long read loops should poll it.
    #[must_use]
    pub fn should_terminate(&self) -> bool {
        self.terminate.load(Ordering::Relaxed)
    }

    /// Close every output channel so downstream consumers observe EOF.
    /// Called by the runtime after the program returns; programs may also
    /// call it early.
    pub async fn close_outputs(&self) {
        for (name, port) in &self.outputs {
            if let Err(error) = port.close().await {
                tracing::warn!(node = self.node, channel = name, %error, "error closing output channel");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::RecordMultiplexer;

    fn empty_io() -> NodeIo {
        NodeIo::new(
            "n",
            FxHashMap::default(),
            FxHashMap::default(),
            Arc::new(AtomicBool::new(false)),
            8,
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn unknown_channels_are_reported() {
        let io = empty_io();
        assert!(matches!(
            io.read_one("ghost").await,
            Err(ChannelError::UnknownChannel { .. })
        ));
        assert!(matches!(
            io.write_one(&Record::text("x"), "ghost").await,
            Err(ChannelError::UnknownChannel { .. })
        ));
    }

    #[tokio::test]
    async fn read_arbitrary_on_no_inputs_is_immediate_eof() {
        let mut io = empty_io();
        assert!(io.read_arbitrary().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_all_reaches_every_output() {
        let left = Arc::new(RecordMultiplexer::new(["n"], 4, Duration::from_millis(10)));
        let right = Arc::new(RecordMultiplexer::new(["n"], 4, Duration::from_millis(10)));
        let mut outputs = FxHashMap::default();
        outputs.insert(
            "left".to_string(),
            OutputPort::Memory {
                mux: left.clone(),
                origin: "n".into(),
            },
        );
        outputs.insert(
            "right".to_string(),
            OutputPort::Memory {
                mux: right.clone(),
                origin: "n".into(),
            },
        );

        let io = NodeIo::new(
            "n",
            FxHashMap::default(),
            outputs,
            Arc::new(AtomicBool::new(false)),
            8,
            Duration::from_millis(10),
        );
        io.write_all(&Record::text("fanout")).await.unwrap();

        assert!(left.read_any().await.is_some());
        assert!(right.read_any().await.is_some());
    }
}
