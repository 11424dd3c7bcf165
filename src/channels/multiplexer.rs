//! Bounded fan-in multiplexer with origin-liveness tracking.
//!
//! The multiplexer is the one piece of shared mutable state inside a
//! worker's channel fabric: a bounded queue of `(origin, record)` pairs
//! plus the set of origins that have not yet closed. Producers block when
//! the queue is full, which is what throttles fast upstream nodes.
//!
//! End-of-stream is *not* "the queue is empty": a late-arriving record must
//! never be mistaken for stream end. Reads poll the queue with a short
//! timeout and only report EOF once the queue is drained **and** every
//! origin has been observed to close.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::time::Duration;

use super::ChannelError;
use crate::record::Record;

/// Fan-in queue merging several named producers into one read stream.
pub struct RecordMultiplexer {
    queue_tx: flume::Sender<(String, Record)>,
    queue_rx: flume::Receiver<(String, Record)>,
    /// Origins that have not closed yet. Guarded separately from the queue;
    /// the EOF check reads both.
    origins: Mutex<Vec<String>>,
    /// Records popped while looking for a specific origin, parked per
    /// origin until someone asks for them.
    stash: Mutex<FxHashMap<String, VecDeque<Record>>>,
    poll: Duration,
}

impl RecordMultiplexer {
    /// Create a multiplexer expecting the given origins.
    pub fn new<I, S>(origins: I, capacity: usize, poll: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (queue_tx, queue_rx) = flume::bounded(capacity);
        Self {
            queue_tx,
            queue_rx,
            origins: Mutex::new(origins.into_iter().map(Into::into).collect()),
            stash: Mutex::new(FxHashMap::default()),
            poll,
        }
    }

    /// Push one record from `origin`, blocking while the queue is full.
    pub async fn write(&self, origin: &str, record: Record) -> Result<(), ChannelError> {
        self.queue_tx
            .send_async((origin.to_owned(), record))
            .await
            .map_err(|_| ChannelError::Disconnected {
                channel: origin.to_owned(),
            })
    }

    /// Mark `origin` as closed. Further records from it are not expected.
    pub fn close(&self, origin: &str) {
        let mut origins = self.origins.lock();
        match origins.iter().position(|live| live == origin) {
            Some(index) => {
                origins.swap_remove(index);
            }
            None => {
                tracing::warn!(origin, "closing an origin the multiplexer does not know");
            }
        }
    }

    /// Whether any origin is still live.
    #[must_use]
    pub fn has_live_origins(&self) -> bool {
        !self.origins.lock().is_empty()
    }

    /// Read the next record from any origin.
    ///
    /// Returns `None` only when every origin has closed and no buffered
    /// record remains anywhere.
    pub async fn read_any(&self) -> Option<(String, Record)> {
        loop {
            if let Some(pair) = self.pop_any_stashed() {
                return Some(pair);
            }
            match tokio::time::timeout(self.poll, self.queue_rx.recv_async()).await {
                Ok(Ok(pair)) => return Some(pair),
                Ok(Err(_)) => return None,
                Err(_elapsed) => {
                    if !self.has_live_origins()
                        && self.queue_rx.is_empty()
                        && self.stash_is_empty()
                    {
                        return None;
                    }
                }
            }
        }
    }

    /// Read the next record written by `origin`, preserving that producer's
    /// order. Records from other origins encountered along the way are
    /// parked for their own readers.
    pub async fn read_from(&self, origin: &str) -> Option<Record> {
        loop {
            if let Some(record) = self.pop_stashed(origin) {
                return Some(record);
            }
            match tokio::time::timeout(self.poll, self.queue_rx.recv_async()).await {
                Ok(Ok((from, record))) => {
                    if from == origin {
                        return Some(record);
                    }
                    self.stash.lock().entry(from).or_default().push_back(record);
                }
                Ok(Err(_)) => return None,
                Err(_elapsed) => {
                    let live = self.origins.lock().iter().any(|o| o == origin);
                    if !live && self.queue_rx.is_empty() && self.stashed_for(origin) == 0 {
                        return None;
                    }
                }
            }
        }
    }

    fn pop_stashed(&self, origin: &str) -> Option<Record> {
        self.stash.lock().get_mut(origin)?.pop_front()
    }

    fn pop_any_stashed(&self) -> Option<(String, Record)> {
        let mut stash = self.stash.lock();
        for (origin, parked) in stash.iter_mut() {
            if let Some(record) = parked.pop_front() {
                return Some((origin.clone(), record));
            }
        }
        None
    }

    fn stashed_for(&self, origin: &str) -> usize {
        self.stash.lock().get(origin).map_or(0, VecDeque::len)
    }

    fn stash_is_empty(&self) -> bool {
        self.stash.lock().values().all(VecDeque::is_empty)
    }
}
