//! Service boundary between orchestrator, workers, and clients.
//!
//! These traits are the engine's RPC surface. The in-process
//! implementations ([`Orchestrator`](super::Orchestrator) and
//! [`Worker`](crate::worker::Worker)) are what the engine and the tests
//! consume; wire transport, security, and discovery are collaborator
//! concerns layered on top of the same contracts.
//!
//! Failure semantics matter to the scheduler's retry loop: an `Err` from a
//! worker means "unreachable, try the next candidate", while
//! `Ok(false)` from `add_node_group` means "alive but declining".

use async_trait::async_trait;
use miette::Diagnostic;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::extensions::{Aggregator, Controller};
use crate::graph::ApplicationSpec;
use crate::types::{SerialNumber, WorkerId};
use crate::worker::ResultSummary;

/// Transport-level failure talking to a peer service.
#[derive(Debug, Error, Diagnostic)]
pub enum RpcError {
    /// The peer could not be reached at all.
    #[error("peer unreachable: {0}")]
    #[diagnostic(code(tideflow::rpc::unreachable))]
    Unreachable(String),

    /// The peer answered with a failure.
    #[error("remote failure: {0}")]
    #[diagnostic(code(tideflow::rpc::remote))]
    Remote(String),
}

/// One NodeGroup handed to a worker for execution.
///
/// The assignment carries the full application spec by reference; workers
/// resolve member nodes and their channel declarations from it.
#[derive(Clone)]
pub struct NodeGroupAssignment {
    /// Owning application.
    pub application: String,
    /// Serial number for this iteration's dispatch.
    pub serial_number: SerialNumber,
    /// The finalized application the members belong to.
    pub spec: Arc<ApplicationSpec>,
    /// Names of the member nodes.
    pub members: Vec<String>,
}

impl std::fmt::Debug for NodeGroupAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeGroupAssignment")
            .field("application", &self.application)
            .field("serial_number", &self.serial_number)
            .field("members", &self.members)
            .finish()
    }
}

/// Surface a worker exposes to the orchestrator.
#[async_trait]
pub trait WorkerApi: Send + Sync {
    /// Stable worker identity.
    async fn id(&self) -> Result<WorkerId, RpcError>;

    /// Offer a NodeGroup. `Ok(false)` declines (insufficient capacity);
    /// `Ok(true)` accepts and starts execution asynchronously.
    async fn add_node_group(&self, assignment: NodeGroupAssignment) -> Result<bool, RpcError>;

    /// Serial numbers of the groups currently executing here.
    async fn node_groups(&self) -> Result<Vec<SerialNumber>, RpcError>;
}

/// Surface the orchestrator exposes to workers and clients.
#[async_trait]
pub trait OrchestratorApi: Send + Sync {
    /// Register a worker with the pool. Returns `false` if the worker's id
    /// could not be obtained.
    async fn register_worker(&self, worker: Arc<dyn WorkerApi>) -> Result<bool, RpcError>;

    /// Submit an application. Returns `false` when an application with the
    /// same name is still running or setup failed.
    async fn register_application(&self, spec: ApplicationSpec) -> Result<bool, RpcError>;

    /// Publish the bound address of a node's socket server.
    async fn register_socket_address(
        &self,
        application: &str,
        node: &str,
        address: SocketAddr,
    ) -> Result<bool, RpcError>;

    /// Resolve a node's socket server address, polling until the producer
    /// side publishes it.
    async fn obtain_socket_address(
        &self,
        application: &str,
        node: &str,
    ) -> Result<SocketAddr, RpcError>;

    /// Look up a named aggregator of a running application.
    async fn obtain_aggregator(
        &self,
        application: &str,
        name: &str,
    ) -> Result<Arc<dyn Aggregator>, RpcError>;

    /// Look up a named controller of a running application.
    async fn obtain_controller(
        &self,
        application: &str,
        name: &str,
    ) -> Result<Arc<dyn Controller>, RpcError>;

    /// Report a finished NodeGroup. Returns `false` for stale or unknown
    /// reports.
    async fn handle_termination(&self, summary: ResultSummary) -> Result<bool, RpcError>;
}
