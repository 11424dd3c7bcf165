//! Harness helpers: record files, completion polling, worker doubles.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tideflow::extensions::{Aggregator, Controller};
use tideflow::graph::ApplicationSpec;
use tideflow::orchestrator::{
    NodeGroupAssignment, Orchestrator, OrchestratorApi, RpcError, WorkerApi,
};
use tideflow::record::Record;
use tideflow::types::{SerialNumber, WorkerId};
use tideflow::worker::ResultSummary;

/// Write a record file the engine's file channels can read.
pub async fn write_records_file(path: impl AsRef<Path>, records: &[Record]) {
    let mut writer = tideflow::channels::FileRecordWriter::create(path)
        .await
        .expect("create record file");
    for record in records {
        writer.write(record).await.expect("write record");
    }
    writer.close().await.expect("close record file");
}

/// Read a record file back.
pub async fn read_records_file(path: impl AsRef<Path>) -> Vec<Record> {
    let mut reader = tideflow::channels::FileRecordReader::open(path)
        .await
        .expect("open record file");
    let mut records = Vec::new();
    while let Some(record) = reader.read().await.expect("read record") {
        records.push(record);
    }
    records
}

/// Poll until the application leaves the running set, panicking after a
/// generous deadline.
pub async fn wait_for_completion(orchestrator: &Arc<Orchestrator>, application: &str) {
    let deadline = Duration::from_secs(10);
    let started = std::time::Instant::now();
    while orchestrator.is_running(application) {
        assert!(
            started.elapsed() < deadline,
            "application {application} did not finish within {deadline:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A worker that is alive but declines every assignment.
pub struct DecliningWorker {
    id: WorkerId,
    pub offers: AtomicUsize,
}

impl DecliningWorker {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: WorkerId::new(id),
            offers: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl WorkerApi for DecliningWorker {
    async fn id(&self) -> Result<WorkerId, RpcError> {
        Ok(self.id.clone())
    }

    async fn add_node_group(&self, _assignment: NodeGroupAssignment) -> Result<bool, RpcError> {
        self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }

    async fn node_groups(&self) -> Result<Vec<SerialNumber>, RpcError> {
        Ok(Vec::new())
    }
}

/// A worker that errors on every call, as an unreachable peer would.
pub struct UnreachableWorker {
    id: WorkerId,
}

impl UnreachableWorker {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: WorkerId::new(id),
        })
    }
}

#[async_trait]
impl WorkerApi for UnreachableWorker {
    async fn id(&self) -> Result<WorkerId, RpcError> {
        Ok(self.id.clone())
    }

    async fn add_node_group(&self, _assignment: NodeGroupAssignment) -> Result<bool, RpcError> {
        Err(RpcError::Unreachable("test worker is down".into()))
    }

    async fn node_groups(&self) -> Result<Vec<SerialNumber>, RpcError> {
        Err(RpcError::Unreachable("test worker is down".into()))
    }
}

/// An orchestrator double for driving a [`tideflow::worker::Worker`]
/// directly, without the scheduling machinery.
pub struct StubOrchestrator {
    pub terminations: AtomicUsize,
}

impl StubOrchestrator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            terminations: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl OrchestratorApi for StubOrchestrator {
    async fn register_worker(&self, _worker: Arc<dyn WorkerApi>) -> Result<bool, RpcError> {
        Ok(true)
    }

    async fn register_application(&self, _spec: ApplicationSpec) -> Result<bool, RpcError> {
        Ok(true)
    }

    async fn register_socket_address(
        &self,
        _application: &str,
        _node: &str,
        _address: SocketAddr,
    ) -> Result<bool, RpcError> {
        Ok(true)
    }

    async fn obtain_socket_address(
        &self,
        application: &str,
        _node: &str,
    ) -> Result<SocketAddr, RpcError> {
        Err(RpcError::Remote(format!(
            "stub orchestrator has no addresses for {application}"
        )))
    }

    async fn obtain_aggregator(
        &self,
        application: &str,
        name: &str,
    ) -> Result<Arc<dyn Aggregator>, RpcError> {
        Err(RpcError::Remote(format!(
            "stub orchestrator has no aggregator {name} for {application}"
        )))
    }

    async fn obtain_controller(
        &self,
        application: &str,
        name: &str,
    ) -> Result<Arc<dyn Controller>, RpcError> {
        Err(RpcError::Remote(format!(
            "stub orchestrator has no controller {name} for {application}"
        )))
    }

    async fn handle_termination(&self, _summary: ResultSummary) -> Result<bool, RpcError> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}
