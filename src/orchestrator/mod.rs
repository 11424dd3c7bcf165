//! The orchestrator service: application registry, worker pool, and the
//! iteration loop driver.
//!
//! [`Orchestrator`] is an explicit, constructed service object holding all
//! coordination state - registered workers, per-application packages,
//! published socket addresses. There is no global instance; everything that
//! needs it receives an `Arc`.
//!
//! Concurrency model (one application = one logical actor): every mutation
//! of one application's scheduling state happens behind that application's
//! async mutex, so termination reports arriving from many workers are
//! serialized per application while distinct applications progress fully in
//! parallel. The worker registry and the socket-address maps are short
//! non-await critical sections behind plain mutexes.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tideflow::config::EngineConfig;
//! use tideflow::orchestrator::{Orchestrator, OrchestratorApi};
//! use tideflow::worker::Worker;
//! # use tideflow::graph::ApplicationGraph;
//! # async fn example(spec: tideflow::graph::ApplicationSpec) -> Result<(), Box<dyn std::error::Error>> {
//!
//! let config = EngineConfig::default();
//! let orchestrator = Orchestrator::new(config.clone());
//!
//! let worker = Worker::new(orchestrator.clone(), config);
//! worker.register().await?;
//!
//! // Submission schedules the first wave before returning.
//! let accepted = orchestrator.register_application(spec).await?;
//! assert!(accepted);
//! # Ok(())
//! # }
//! ```

mod api;
mod scheduler;

pub use api::{NodeGroupAssignment, OrchestratorApi, RpcError, WorkerApi};
pub use scheduler::{JobScheduler, SchedulerError};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::extensions::{Aggregator, Controller};
use crate::graph::ApplicationSpec;
use crate::types::WorkerId;
use crate::worker::{ResultSummary, SummaryOutcome};

/// The worker pool shared between the orchestrator and every scheduler.
pub(crate) struct WorkerRegistry {
    workers: Mutex<Vec<(WorkerId, Arc<dyn WorkerApi>)>>,
}

impl WorkerRegistry {
    fn new() -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
        }
    }

    fn register(&self, id: WorkerId, worker: Arc<dyn WorkerApi>) {
        let mut workers = self.workers.lock();
        if let Some(slot) = workers.iter_mut().find(|(known, _)| *known == id) {
            slot.1 = worker;
        } else {
            workers.push((id, worker));
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn WorkerApi>> {
        self.workers
            .lock()
            .iter()
            .map(|(_, worker)| worker.clone())
            .collect()
    }
}

/// Everything the orchestrator holds for one running application.
struct ApplicationPackage {
    spec: Arc<ApplicationSpec>,
    scheduler: tokio::sync::Mutex<JobScheduler>,
    /// Socket server addresses published by workers, keyed by node name.
    socket_addresses: Mutex<FxHashMap<String, SocketAddr>>,
    summaries: Mutex<Vec<ResultSummary>>,
    started_at: Instant,
}

/// Central coordination service for workers and applications.
pub struct Orchestrator {
    config: EngineConfig,
    workers: Arc<WorkerRegistry>,
    applications: Mutex<FxHashMap<String, Arc<ApplicationPackage>>>,
}

impl Orchestrator {
    /// Construct an orchestrator with the given tunables.
    #[must_use]
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            workers: Arc::new(WorkerRegistry::new()),
            applications: Mutex::new(FxHashMap::default()),
        })
    }

    /// Whether the named application is still running.
    #[must_use]
    pub fn is_running(&self, application: &str) -> bool {
        self.applications.lock().contains_key(application)
    }

    /// Result summaries retained for a running application so far.
    #[must_use]
    pub fn summaries(&self, application: &str) -> Vec<ResultSummary> {
        self.applications
            .lock()
            .get(application)
            .map(|package| package.summaries.lock().clone())
            .unwrap_or_default()
    }

    fn package(&self, application: &str) -> Option<Arc<ApplicationPackage>> {
        self.applications.lock().get(application).cloned()
    }

    /// Drop the application's bookkeeping and log its report.
    fn finish_application(&self, application: &str) -> bool {
        let Some(package) = self.applications.lock().remove(application) else {
            tracing::warn!(application, "finishing an application that is not registered");
            return false;
        };

        let running_time = package.started_at.elapsed();
        let summaries = package.summaries.lock();
        tracing::info!(
            application,
            running_time_ms = running_time.as_millis() as u64,
            node_groups = summaries.len(),
            "application report"
        );
        for summary in summaries.iter() {
            for (node, measurements) in &summary.node_measurements {
                tracing::info!(
                    application,
                    serial_number = summary.serial_number,
                    node,
                    real_time_ms = measurements.real_time_ms,
                    "node measurements"
                );
            }
        }
        true
    }
}

#[async_trait]
impl OrchestratorApi for Orchestrator {
    async fn register_worker(&self, worker: Arc<dyn WorkerApi>) -> Result<bool, RpcError> {
        match worker.id().await {
            Ok(id) => {
                tracing::info!(%id, "registered worker");
                self.workers.register(id, worker);
                Ok(true)
            }
            Err(error) => {
                tracing::warn!(%error, "unable to obtain id for registering worker");
                Ok(false)
            }
        }
    }

    async fn register_application(&self, spec: ApplicationSpec) -> Result<bool, RpcError> {
        let application = spec.name().to_owned();
        let spec = Arc::new(spec);

        {
            let mut applications = self.applications.lock();
            if applications.contains_key(&application) {
                tracing::warn!(application, "application is already running");
                return Ok(false);
            }
            let package = Arc::new(ApplicationPackage {
                spec: spec.clone(),
                scheduler: tokio::sync::Mutex::new(JobScheduler::new(
                    spec.clone(),
                    self.workers.clone(),
                )),
                socket_addresses: Mutex::new(FxHashMap::default()),
                summaries: Mutex::new(Vec::new()),
                started_at: Instant::now(),
            });
            applications.insert(application.clone(), package);
        }

        // Setup and the first wave run under the application's critical
        // section; any failure tears the registration down again.
        let Some(package) = self.package(&application) else {
            return Ok(false);
        };
        let mut scheduler = package.scheduler.lock().await;

        let setup = async {
            scheduler.prepare_application()?;
            scheduler.prepare_iteration()?;
            scheduler.schedule().await
        };
        let outcome = setup.await;
        match outcome {
            Ok(true) => Ok(true),
            Ok(false) => {
                tracing::warn!(application, "no free stage in the initial wave");
                drop(scheduler);
                self.finish_application(&application);
                Ok(false)
            }
            Err(error) => {
                tracing::warn!(application, %error, "application setup failed");
                drop(scheduler);
                self.finish_application(&application);
                Ok(false)
            }
        }
    }

    async fn register_socket_address(
        &self,
        application: &str,
        node: &str,
        address: SocketAddr,
    ) -> Result<bool, RpcError> {
        let Some(package) = self.package(application) else {
            tracing::warn!(application, node, "socket address for unknown application");
            return Ok(false);
        };
        package
            .socket_addresses
            .lock()
            .insert(node.to_owned(), address);
        Ok(true)
    }

    async fn obtain_socket_address(
        &self,
        application: &str,
        node: &str,
    ) -> Result<SocketAddr, RpcError> {
        // Producer and consumer workers start asynchronously within a
        // wave; poll until the producer side publishes.
        loop {
            let Some(package) = self.package(application) else {
                return Err(RpcError::Remote(format!(
                    "application {application} is not running"
                )));
            };
            if let Some(address) = package.socket_addresses.lock().get(node).copied() {
                return Ok(address);
            }
            tokio::time::sleep(self.config.address_poll).await;
        }
    }

    async fn obtain_aggregator(
        &self,
        application: &str,
        name: &str,
    ) -> Result<Arc<dyn Aggregator>, RpcError> {
        let package = self.package(application).ok_or_else(|| {
            RpcError::Remote(format!("application {application} is not running"))
        })?;
        package.spec.aggregator(name).ok_or_else(|| {
            RpcError::Remote(format!("no aggregator {name} in application {application}"))
        })
    }

    async fn obtain_controller(
        &self,
        application: &str,
        name: &str,
    ) -> Result<Arc<dyn Controller>, RpcError> {
        let package = self.package(application).ok_or_else(|| {
            RpcError::Remote(format!("application {application} is not running"))
        })?;
        package.spec.controller(name).ok_or_else(|| {
            RpcError::Remote(format!("no controller {name} in application {application}"))
        })
    }

    async fn handle_termination(&self, summary: ResultSummary) -> Result<bool, RpcError> {
        let application = summary.application.clone();
        let Some(package) = self.package(&application) else {
            tracing::warn!(
                application,
                serial_number = summary.serial_number,
                "termination report for unknown application"
            );
            return Ok(false);
        };

        let mut scheduler = package.scheduler.lock().await;

        if summary.outcome == SummaryOutcome::Failure {
            tracing::warn!(
                application,
                serial_number = summary.serial_number,
                "NodeGroup failed on its worker, aborting application"
            );
            scheduler.handle_termination(summary.serial_number);
            drop(scheduler);
            self.finish_application(&application);
            return Ok(false);
        }

        if !scheduler.handle_termination(summary.serial_number) {
            tracing::warn!(
                application,
                serial_number = summary.serial_number,
                "stale or duplicate termination report"
            );
            return Ok(false);
        }
        package.summaries.lock().push(summary);

        let advance = async {
            if scheduler.finished_iteration() {
                scheduler.terminate_iteration()?;

                if scheduler.finished_application() {
                    scheduler.terminate_application();
                    return Ok::<bool, SchedulerError>(true);
                }

                tracing::info!(application, "decider requested another iteration");
                package.socket_addresses.lock().clear();
                scheduler.prepare_iteration()?;
                scheduler.schedule().await?;
            } else {
                scheduler.schedule().await?;
            }
            Ok(false)
        };

        let outcome = advance.await;
        match outcome {
            Ok(true) => {
                drop(scheduler);
                self.finish_application(&application);
                Ok(true)
            }
            Ok(false) => Ok(true),
            Err(error) => {
                tracing::warn!(application, %error, "unable to advance application, aborting");
                drop(scheduler);
                self.finish_application(&application);
                Ok(false)
            }
        }
    }
}
