//! The worker service: receives NodeGroups, wires their channels, runs
//! each node as an independent task, and reports one summary per group.
//!
//! A [`Worker`] is an explicit service object constructed around an
//! orchestrator handle. It offers a slot budget
//! ([`EngineConfig::worker_slots`]); an incoming NodeGroup occupies one
//! slot per member node and is declined - not queued - when it does not
//! fit. Execution itself is fully asynchronous: `add_node_group` returns
//! as soon as the group is admitted.

mod execution;
mod summary;

pub use summary::{NodeMeasurements, ResultSummary, SummaryOutcome};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::orchestrator::{NodeGroupAssignment, OrchestratorApi, RpcError, WorkerApi};
use crate::types::{SerialNumber, WorkerId};
use execution::ExecutionHandler;

/// One member of the worker pool.
pub struct Worker {
    id: WorkerId,
    orchestrator: Arc<dyn OrchestratorApi>,
    config: EngineConfig,
    /// Slot cost of every group currently executing here, by serial.
    running: Arc<Mutex<FxHashMap<SerialNumber, usize>>>,
}

impl Worker {
    /// Construct a worker against the given orchestrator.
    #[must_use]
    pub fn new(orchestrator: Arc<dyn OrchestratorApi>, config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            id: WorkerId::fresh(),
            orchestrator,
            config,
            running: Arc::new(Mutex::new(FxHashMap::default())),
        })
    }

    /// Construct a worker with an explicit id (tests, fixed deployments).
    #[must_use]
    pub fn with_id(
        id: WorkerId,
        orchestrator: Arc<dyn OrchestratorApi>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            orchestrator,
            config,
            running: Arc::new(Mutex::new(FxHashMap::default())),
        })
    }

    /// Register this worker with its orchestrator's pool.
    pub async fn register(self: &Arc<Self>) -> Result<bool, RpcError> {
        self.orchestrator
            .register_worker(self.clone() as Arc<dyn WorkerApi>)
            .await
    }

    /// This worker's identity.
    #[must_use]
    pub fn worker_id(&self) -> &WorkerId {
        &self.id
    }

    fn free_slots(&self, running: &FxHashMap<SerialNumber, usize>) -> usize {
        let used: usize = running.values().sum();
        self.config.worker_slots.saturating_sub(used)
    }
}

#[async_trait]
impl WorkerApi for Worker {
    async fn id(&self) -> Result<WorkerId, RpcError> {
        Ok(self.id.clone())
    }

    async fn add_node_group(&self, assignment: NodeGroupAssignment) -> Result<bool, RpcError> {
        let size = assignment.members.len();
        let serial_number = assignment.serial_number;

        {
            let mut running = self.running.lock();
            if size > self.free_slots(&running) {
                tracing::info!(
                    worker = %self.id,
                    serial_number,
                    size,
                    "declining NodeGroup, insufficient free slots"
                );
                return Ok(false);
            }
            running.insert(serial_number, size);
        }

        let handler = ExecutionHandler::new(
            self.id.clone(),
            self.orchestrator.clone(),
            self.config.clone(),
            assignment,
        );
        let running = self.running.clone();
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            let summary = handler.execute().await;
            // Slots must be free before the report goes out; the next wave
            // may target this worker.
            running.lock().remove(&summary.serial_number);
            match orchestrator.handle_termination(summary).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(
                        serial_number,
                        "orchestrator did not accept the termination report"
                    );
                }
                Err(error) => {
                    tracing::error!(serial_number, %error, "unable to report termination");
                }
            }
        });

        Ok(true)
    }

    async fn node_groups(&self) -> Result<Vec<SerialNumber>, RpcError> {
        Ok(self.running.lock().keys().copied().collect())
    }
}
