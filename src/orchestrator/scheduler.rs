//! Per-application scheduling state machine.
//!
//! One [`JobScheduler`] exists per running application. Its lifecycle:
//!
//! ```text
//! prepare_application            (once: partition + validate)
//!   └─ prepare_iteration         (inputs exist? register dependencies,
//!      │                          stamp fresh serials)
//!      └─ schedule ⇄ handle_termination
//!         └─ finished_iteration? → terminate_iteration (outputs exist?)
//!            └─ finished_application? → done
//!                                     : prepare_iteration again
//! ```
//!
//! All methods are called under the owning application's critical section -
//! the orchestrator serializes every mutation of one application's state
//! behind a single async mutex, so the scheduler itself holds no locks.
//!
//! Dispatch policy: a NodeGroup is offered to its previous worker first
//! (sticky affinity keeps re-wiring cheap), then to a randomly shuffled
//! scan of the registered pool. A worker error means "unreachable, try the
//! next"; a `false` reply means "declining, try the next". If nobody
//! accepts, the whole application is beyond saving and
//! [`SchedulerError::InsufficientWorkers`] aborts it.

use rand::seq::SliceRandom;
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

use super::WorkerRegistry;
use super::api::{NodeGroupAssignment, WorkerApi};
use crate::deps::DependencyManager;
use crate::graph::ApplicationSpec;
use crate::partition::{Partition, ValidationError, partition, validate};
use crate::types::{GroupId, SerialNumber, StageId};

use miette::Diagnostic;
use thiserror::Error;

/// Failures that abort an application.
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    /// The graph failed cycle or temporal validation.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    /// A declared input file is missing at iteration start.
    #[error("missing input files: {missing:?}")]
    #[diagnostic(
        code(tideflow::scheduler::inexistent_input),
        help("Every declared source file must exist before an iteration starts.")
    )]
    InexistentInput { missing: Vec<PathBuf> },

    /// A declared output file is missing at iteration end.
    #[error("missing output files: {missing:?}")]
    #[diagnostic(code(tideflow::scheduler::inexistent_output))]
    InexistentOutput { missing: Vec<PathBuf> },

    /// No registered worker accepted a ready NodeGroup.
    #[error("no worker accepted NodeGroup #{serial_number}")]
    #[diagnostic(
        code(tideflow::scheduler::insufficient_workers),
        help("Register more workers or raise their slot budgets.")
    )]
    InsufficientWorkers { serial_number: SerialNumber },
}

/// Scheduling state machine for one application.
pub struct JobScheduler {
    spec: Arc<ApplicationSpec>,
    workers: Arc<WorkerRegistry>,
    partition: Option<Partition>,
    deps: DependencyManager<GroupId, StageId>,
    /// Serial stamped on each group for the current iteration.
    group_serials: Vec<SerialNumber>,
    /// Sticky affinity: the worker that last accepted each group.
    group_affinity: Vec<Option<Arc<dyn WorkerApi>>>,
    /// Groups dispatched and not yet reported, by serial.
    running: FxHashMap<SerialNumber, GroupId>,
    serial_counter: SerialNumber,
}

impl JobScheduler {
    pub(crate) fn new(spec: Arc<ApplicationSpec>, workers: Arc<WorkerRegistry>) -> Self {
        Self {
            spec,
            workers,
            partition: None,
            deps: DependencyManager::new(),
            group_serials: Vec::new(),
            group_affinity: Vec::new(),
            running: FxHashMap::default(),
            serial_counter: 1,
        }
    }

    /// Partition and validate the graph. Runs once per application, not
    /// per iteration.
    #[instrument(skip(self), fields(application = %self.spec.name()))]
    pub fn prepare_application(&mut self) -> Result<(), SchedulerError> {
        let started = std::time::Instant::now();
        let parts = partition(&self.spec);
        validate(&self.spec, &parts)?;
        tracing::info!(
            groups = parts.groups().len(),
            stages = parts.stages().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "partitioned application graph"
        );

        self.group_serials = vec![0; parts.groups().len()];
        self.group_affinity = vec![None; parts.groups().len()];
        self.partition = Some(parts);
        Ok(())
    }

    /// Register this iteration's dependencies and stamp fresh serials.
    #[instrument(skip(self), fields(application = %self.spec.name()))]
    pub fn prepare_iteration(&mut self) -> Result<(), SchedulerError> {
        let missing: Vec<PathBuf> = self
            .spec
            .input_paths()
            .iter()
            .filter(|path| !path.exists())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(SchedulerError::InexistentInput { missing });
        }

        let Some(parts) = self.partition.as_ref() else {
            return Ok(());
        };

        // Fresh bookkeeping every round; released stages must be eligible
        // again next iteration.
        self.deps = DependencyManager::new();

        for node in self.spec.initial_nodes() {
            if let Some(stage) = parts.stage_of_node(node) {
                self.deps.insert_dependency(None, stage);
            }
        }

        for edge in self.spec.edges() {
            if !edge.mode.is_file() {
                continue;
            }
            let (Some(producer), Some(dependent)) = (
                parts.group_of(&edge.source),
                parts.stage_of_node(&edge.target),
            ) else {
                continue;
            };
            self.deps.insert_dependency(Some(producer), dependent);
        }

        for serial in &mut self.group_serials {
            *serial = self.serial_counter;
            self.serial_counter += 1;
        }

        Ok(())
    }

    /// Dispatch every NodeGroup of every currently free stage.
    ///
    /// Returns `false` when no stage was free.
    #[instrument(skip(self), fields(application = %self.spec.name()))]
    pub async fn schedule(&mut self) -> Result<bool, SchedulerError> {
        if !self.deps.has_unlocked_dependents() {
            return Ok(false);
        }

        let free_stages = self.deps.obtain_free_dependents();
        for stage in free_stages {
            tracing::info!(stage, "releasing stage");
            let groups = match self.partition.as_ref() {
                Some(parts) => parts.stages()[stage].groups.clone(),
                None => continue,
            };
            for group in groups {
                self.schedule_node_group(group).await?;
            }
        }

        Ok(true)
    }

    async fn schedule_node_group(&mut self, group: GroupId) -> Result<(), SchedulerError> {
        let serial_number = self.group_serials[group];
        let assignment = self.assignment_for(group, serial_number);

        // Try the previous worker first.
        if let Some(previous) = self.group_affinity[group].clone() {
            match previous.add_node_group(assignment.clone()).await {
                Ok(true) => {
                    self.running.insert(serial_number, group);
                    return Ok(());
                }
                Ok(false) => {
                    tracing::info!(serial_number, "previous worker declined, scanning pool");
                }
                Err(error) => {
                    tracing::warn!(serial_number, %error, "previous worker unreachable, scanning pool");
                }
            }
        }

        let mut candidates = self.workers.snapshot();
        candidates.shuffle(&mut rand::rng());

        for worker in candidates {
            match worker.add_node_group(assignment.clone()).await {
                Ok(true) => {
                    self.group_affinity[group] = Some(worker);
                    self.running.insert(serial_number, group);
                    return Ok(());
                }
                Ok(false) => {
                    tracing::info!(serial_number, "worker declined, trying next");
                }
                Err(error) => {
                    tracing::warn!(serial_number, %error, "worker unreachable, trying next");
                }
            }
        }

        Err(SchedulerError::InsufficientWorkers { serial_number })
    }

    /// Record a termination report. Returns `true` if this is the first
    /// report for the serial; duplicates and unknowns are ignored.
    pub fn handle_termination(&mut self, serial_number: SerialNumber) -> bool {
        match self.running.remove(&serial_number) {
            Some(group) => {
                self.deps.remove_dependency(&group);
                true
            }
            None => false,
        }
    }

    /// Whether every group of this iteration has run and reported.
    #[must_use]
    pub fn finished_iteration(&self) -> bool {
        !self.deps.has_locked_dependents()
            && !self.deps.has_unlocked_dependents()
            && self.running.is_empty()
    }

    /// Verify declared outputs exist now that the iteration drained.
    pub fn terminate_iteration(&self) -> Result<(), SchedulerError> {
        let missing: Vec<PathBuf> = self
            .spec
            .output_paths()
            .iter()
            .filter(|path| !path.exists())
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SchedulerError::InexistentOutput { missing })
        }
    }

    /// Consult the decider. Without one, a single iteration finishes the
    /// application.
    #[must_use]
    pub fn finished_application(&self) -> bool {
        match self.spec.decider() {
            Some(decider) => {
                use crate::extensions::IterationDecision;
                decider.decide(self.spec.aggregators()) == IterationDecision::Finished
            }
            None => true,
        }
    }

    /// Tear down application-level scheduling state.
    pub fn terminate_application(&mut self) {
        tracing::info!(application = %self.spec.name(), "application finished");
    }

    fn assignment_for(&self, group: GroupId, serial_number: SerialNumber) -> NodeGroupAssignment {
        let members = self
            .partition
            .as_ref()
            .map(|parts| parts.groups()[group].members.clone())
            .unwrap_or_default();
        NodeGroupAssignment {
            application: self.spec.name().to_owned(),
            serial_number,
            spec: self.spec.clone(),
            members,
        }
    }
}
