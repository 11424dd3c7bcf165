//! NodeGroup execution: channel wiring, per-node tasks, join barrier.
//!
//! Wiring happens once per assignment, in four passes mirroring the
//! channel fabric's one-multiplexer-per-node rule:
//!
//! 1. every member with in-process inputs gets one shared memory
//!    multiplexer; in-process outputs of its group-mates write straight
//!    into it;
//! 2. every member with socket inputs gets one multiplexer fed by a
//!    [`SocketServer`], whose bound address is registered with the
//!    orchestrator under `(application, node)`;
//! 3. socket outputs resolve their consumer's address through the
//!    orchestrator (polling - the consumer's worker may not have wired
//!    yet) and connect;
//! 4. file channels open one reader/writer per edge.
//!
//! Each member node then runs as one independently scheduled task. The
//! group is complete only when every member task has returned; the join
//! barrier folds per-node timings into one [`ResultSummary`].

use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use super::summary::{NodeMeasurements, ResultSummary, SummaryOutcome};
use crate::channels::{
    ChannelError, FileRecordReader, FileRecordWriter, InputPort, NodeIo, OutputPort,
    RecordMultiplexer, SocketRecordWriter, SocketServer,
};
use crate::config::{EngineConfig, IoFailurePolicy};
use crate::orchestrator::{NodeGroupAssignment, OrchestratorApi, RpcError};
use crate::types::WorkerId;

use miette::Diagnostic;
use thiserror::Error;

/// Failures while wiring a NodeGroup's channels.
#[derive(Debug, Error, Diagnostic)]
pub(crate) enum WiringError {
    #[error(transparent)]
    #[diagnostic(code(tideflow::worker::wiring_channel))]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    #[diagnostic(code(tideflow::worker::wiring_rpc))]
    Rpc(#[from] RpcError),

    /// The assignment names a node the spec does not contain.
    #[error("assignment references unknown node {name}")]
    #[diagnostic(code(tideflow::worker::unknown_node))]
    UnknownNode { name: String },

    /// A file channel was declared without a backing path.
    #[error("file channel {channel} of node {node} has no backing path")]
    #[diagnostic(code(tideflow::worker::missing_path))]
    MissingPath { node: String, channel: String },

    /// The orchestrator no longer tracks the owning application.
    #[error("application {application} is not registered with the orchestrator")]
    #[diagnostic(code(tideflow::worker::application_missing))]
    ApplicationMissing { application: String },
}

/// Runs one assigned NodeGroup to completion and reports the summary.
pub(crate) struct ExecutionHandler {
    worker: WorkerId,
    orchestrator: Arc<dyn OrchestratorApi>,
    config: EngineConfig,
    assignment: NodeGroupAssignment,
}

struct WiredNode {
    name: String,
    io: NodeIo,
}

struct WiredGroup {
    nodes: Vec<WiredNode>,
    servers: Vec<SocketServer>,
}

impl ExecutionHandler {
    pub(crate) fn new(
        worker: WorkerId,
        orchestrator: Arc<dyn OrchestratorApi>,
        config: EngineConfig,
        assignment: NodeGroupAssignment,
    ) -> Self {
        Self {
            worker,
            orchestrator,
            config,
            assignment,
        }
    }

    /// Wire and execute. Never panics back into the worker; all failure
    /// paths produce a FAILURE summary instead. Reporting to the
    /// orchestrator is the caller's job, after it released the slots.
    pub(crate) async fn execute(self) -> ResultSummary {
        let application = self.assignment.application.clone();
        let serial_number = self.assignment.serial_number;

        tracing::info!(
            worker = %self.worker,
            application,
            serial_number,
            members = self.assignment.members.len(),
            "executing NodeGroup"
        );

        let started = Instant::now();
        let wired = match self.wire_channels().await {
            Ok(wired) => wired,
            Err(error) => {
                tracing::error!(application, serial_number, %error, "error wiring NodeGroup channels");
                return ResultSummary::failure(application, serial_number);
            }
        };

        self.perform_execution(wired, started, &application, serial_number)
            .await
    }

    async fn wire_channels(&self) -> Result<WiredGroup, WiringError> {
        let spec = &self.assignment.spec;
        let application = &self.assignment.application;
        let capacity = self.config.multiplexer_capacity;
        let poll = self.config.multiplexer_poll;

        let mut members = Vec::with_capacity(self.assignment.members.len());
        for name in &self.assignment.members {
            members.push(spec.node(name).ok_or_else(|| WiringError::UnknownNode {
                name: name.clone(),
            })?);
        }

        // Pass 1: one shared memory multiplexer per member with in-process
        // inputs, keyed by consumer name so producer wiring can find it.
        let mut memory_muxes: FxHashMap<String, Arc<RecordMultiplexer>> = FxHashMap::default();
        for node in &members {
            let origins: Vec<&String> = node
                .inputs
                .iter()
                .filter(|(_, channel)| channel.mode.is_in_process())
                .map(|(origin, _)| origin)
                .collect();
            if !origins.is_empty() {
                memory_muxes.insert(
                    node.name.clone(),
                    Arc::new(RecordMultiplexer::new(
                        origins.into_iter().cloned(),
                        capacity,
                        poll,
                    )),
                );
            }
        }

        // Pass 2: socket servers. Every server must be registered before
        // any output starts resolving addresses.
        let mut socket_muxes: FxHashMap<String, Arc<RecordMultiplexer>> = FxHashMap::default();
        let mut servers = Vec::new();
        for node in &members {
            let origins: Vec<&String> = node
                .inputs
                .iter()
                .filter(|(_, channel)| channel.mode.is_socket())
                .map(|(origin, _)| origin)
                .collect();
            if origins.is_empty() {
                continue;
            }
            let mux = Arc::new(RecordMultiplexer::new(
                origins.into_iter().cloned(),
                capacity,
                poll,
            ));
            let server = SocketServer::spawn(mux.clone()).await?;
            let registered = self
                .orchestrator
                .register_socket_address(application, &node.name, server.address())
                .await?;
            if !registered {
                return Err(WiringError::ApplicationMissing {
                    application: application.clone(),
                });
            }
            socket_muxes.insert(node.name.clone(), mux);
            servers.push(server);
        }

        // Passes 3 and 4: per-node ports.
        let mut nodes = Vec::with_capacity(members.len());
        for node in &members {
            let mut inputs = FxHashMap::default();
            for (origin, channel) in &node.inputs {
                let port = match channel.mode {
                    crate::types::CommunicationMode::InProcess => {
                        let mux = memory_muxes.get(&node.name).ok_or_else(|| {
                            WiringError::UnknownNode {
                                name: node.name.clone(),
                            }
                        })?;
                        InputPort::Memory {
                            mux: mux.clone(),
                            origin: origin.clone(),
                        }
                    }
                    crate::types::CommunicationMode::Socket => {
                        let mux = socket_muxes.get(&node.name).ok_or_else(|| {
                            WiringError::UnknownNode {
                                name: node.name.clone(),
                            }
                        })?;
                        InputPort::Socket {
                            mux: mux.clone(),
                            origin: origin.clone(),
                        }
                    }
                    crate::types::CommunicationMode::File => {
                        let path = channel.path.as_ref().ok_or_else(|| {
                            WiringError::MissingPath {
                                node: node.name.clone(),
                                channel: origin.clone(),
                            }
                        })?;
                        InputPort::File {
                            reader: Arc::new(Mutex::new(FileRecordReader::open(path).await?)),
                        }
                    }
                };
                inputs.insert(origin.clone(), port);
            }

            let mut outputs = FxHashMap::default();
            for (target, channel) in &node.outputs {
                let port = match channel.mode {
                    crate::types::CommunicationMode::InProcess => {
                        // The consumer is a group-mate by construction of
                        // the partitioning.
                        let mux = memory_muxes.get(target).ok_or_else(|| {
                            WiringError::UnknownNode {
                                name: target.clone(),
                            }
                        })?;
                        OutputPort::Memory {
                            mux: mux.clone(),
                            origin: node.name.clone(),
                        }
                    }
                    crate::types::CommunicationMode::Socket => {
                        let address = self
                            .orchestrator
                            .obtain_socket_address(application, target)
                            .await?;
                        let writer =
                            SocketRecordWriter::connect(address, node.name.clone()).await?;
                        OutputPort::Socket {
                            writer: Arc::new(Mutex::new(writer)),
                        }
                    }
                    crate::types::CommunicationMode::File => {
                        let path = channel.path.as_ref().ok_or_else(|| {
                            WiringError::MissingPath {
                                node: node.name.clone(),
                                channel: target.clone(),
                            }
                        })?;
                        OutputPort::File {
                            writer: Arc::new(Mutex::new(FileRecordWriter::create(path).await?)),
                        }
                    }
                };
                outputs.insert(target.clone(), port);
            }

            nodes.push(WiredNode {
                name: node.name.clone(),
                io: NodeIo::new(
                    node.name.clone(),
                    inputs,
                    outputs,
                    spec.terminate_flag(),
                    capacity,
                    poll,
                ),
            });
        }

        Ok(WiredGroup { nodes, servers })
    }

    async fn perform_execution(
        &self,
        wired: WiredGroup,
        started: Instant,
        application: &str,
        serial_number: crate::types::SerialNumber,
    ) -> ResultSummary {
        let spec = &self.assignment.spec;
        let mut tasks = Vec::with_capacity(wired.nodes.len());

        for wired_node in wired.nodes {
            let WiredNode { name, mut io } = wired_node;
            let Some(node) = spec.node(&name) else {
                continue;
            };
            let program = node.program.clone();
            tasks.push(tokio::spawn(async move {
                tracing::debug!(node = name, "node task started");
                let node_started = Instant::now();
                let result = program.run(&mut io).await;
                io.close_outputs().await;
                let measurements = NodeMeasurements {
                    real_time_ms: node_started.elapsed().as_millis() as u64,
                };
                (name, result, measurements)
            }));
        }

        let mut outcome = SummaryOutcome::Success;
        let mut node_measurements = FxHashMap::default();
        for joined in futures_util::future::join_all(tasks).await {
            match joined {
                Ok((name, result, measurements)) => {
                    if let Err(error) = result {
                        match self.config.io_failure_policy {
                            IoFailurePolicy::Lenient => {
                                tracing::warn!(node = name, %error, "node program failed (policy: lenient)");
                            }
                            IoFailurePolicy::Escalate => {
                                tracing::error!(node = name, %error, "node program failed (policy: escalate)");
                                outcome = SummaryOutcome::Failure;
                            }
                        }
                    }
                    node_measurements.insert(name, measurements);
                }
                Err(join_error) => {
                    tracing::error!(%join_error, "node task panicked or was cancelled");
                    outcome = SummaryOutcome::Failure;
                }
            }
        }

        for server in &wired.servers {
            server.shutdown();
        }

        ResultSummary {
            application: application.to_owned(),
            serial_number,
            outcome,
            group_time_ms: started.elapsed().as_millis() as u64,
            finished_at: chrono::Utc::now(),
            node_measurements,
        }
    }
}
