//! Node programs shared by the integration suites.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

use tideflow::channels::NodeIo;
use tideflow::graph::{NodeProgram, ProgramError};
use tideflow::record::Record;

/// Forwards every arriving record to every output, preserving arrival
/// order.
pub struct Forward;

#[async_trait]
impl NodeProgram for Forward {
    async fn run(&self, io: &mut NodeIo) -> Result<(), ProgramError> {
        while let Some(record) = io.read_arbitrary().await? {
            io.write_all(&record).await?;
        }
        Ok(())
    }
}

/// Emits a fixed list of records to every output, ignoring inputs.
pub struct Emit {
    pub records: Vec<Record>,
}

impl Emit {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl NodeProgram for Emit {
    async fn run(&self, io: &mut NodeIo) -> Result<(), ProgramError> {
        for record in &self.records {
            io.write_all(record).await?;
        }
        Ok(())
    }
}

/// Forwards like [`Forward`] but counts how many times it ran - one run
/// per iteration it was dispatched in.
pub struct CountingForward {
    pub runs: Arc<AtomicUsize>,
}

impl CountingForward {
    pub fn new(runs: Arc<AtomicUsize>) -> Self {
        Self { runs }
    }
}

#[async_trait]
impl NodeProgram for CountingForward {
    async fn run(&self, io: &mut NodeIo) -> Result<(), ProgramError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        while let Some(record) = io.read_arbitrary().await? {
            io.write_all(&record).await?;
        }
        Ok(())
    }
}

/// Drains its inputs, then parks until released. Used to keep an
/// application in the running state while a test pokes at the
/// orchestrator.
pub struct ParkUntilReleased {
    pub release: Arc<Notify>,
}

impl ParkUntilReleased {
    pub fn new(release: Arc<Notify>) -> Self {
        Self { release }
    }
}

#[async_trait]
impl NodeProgram for ParkUntilReleased {
    async fn run(&self, io: &mut NodeIo) -> Result<(), ProgramError> {
        while let Some(record) = io.read_arbitrary().await? {
            io.write_all(&record).await?;
        }
        self.release.notified().await;
        Ok(())
    }
}

/// Always returns a program failure after draining inputs.
pub struct AlwaysFails;

#[async_trait]
impl NodeProgram for AlwaysFails {
    async fn run(&self, io: &mut NodeIo) -> Result<(), ProgramError> {
        while io.read_arbitrary().await?.is_some() {}
        Err(ProgramError::failed("intentional test failure"))
    }
}
