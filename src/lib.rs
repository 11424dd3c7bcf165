//! # Tideflow: Graph-Partitioned Dataflow Execution
//!
//! Tideflow is a distributed dataflow engine: clients describe an
//! application as a directed graph of computation nodes and typed edges,
//! a central orchestrator partitions the graph and schedules waves of work
//! onto a pool of workers, and a decider hook drives iterative
//! (fixed-point) applications to completion.
//!
//! ## Core Concepts
//!
//! - **Nodes**: sequential computation bodies behind the
//!   [`NodeProgram`](graph::NodeProgram) trait
//! - **Edges**: typed connections - in-process, socket, or file
//!   ([`CommunicationMode`](types::CommunicationMode))
//! - **NodeGroups**: nodes mutually reachable over in-process edges;
//!   scheduled as one atomic unit onto a single worker
//! - **Stages**: NodeGroups mutually reachable over socket edges;
//!   released together in one wave
//! - **Dependency Manager**: producer→dependent readiness tracking that
//!   gates wave release on file handoffs
//! - **Channel Fabric**: the multi-transport record channels nodes use to
//!   exchange data without the scheduler's involvement
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use tideflow::channels::NodeIo;
//! use tideflow::config::EngineConfig;
//! use tideflow::graph::{ApplicationGraph, NodeProgram, ProgramError};
//! use tideflow::orchestrator::{Orchestrator, OrchestratorApi};
//! use tideflow::types::CommunicationMode;
//! use tideflow::worker::Worker;
//!
//! /// Forwards every input record to every output.
//! struct Forward;
//!
//! #[async_trait]
//! impl NodeProgram for Forward {
//!     async fn run(&self, io: &mut NodeIo) -> Result<(), ProgramError> {
//!         while let Some(record) = io.read_arbitrary().await? {
//!             io.write_all(&record).await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let orchestrator = Orchestrator::new(config.clone());
//!
//! // A pool of two workers.
//! Worker::new(orchestrator.clone(), config.clone()).register().await?;
//! Worker::new(orchestrator.clone(), config.clone()).register().await?;
//!
//! // reader --socket--> writer, file in, file out.
//! let mut graph = ApplicationGraph::new("copy", "/data");
//! let reader = graph.insert_node(Forward);
//! let writer = graph.insert_node(Forward);
//! graph.insert_edge(&reader, &writer, CommunicationMode::Socket)?;
//! graph.add_source(&reader, "in.dat")?;
//! graph.add_sink(&writer, "out.dat")?;
//!
//! let accepted = orchestrator.register_application(graph.finalize()?).await?;
//! assert!(accepted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`graph`] - application graph model and finalization
//! - [`partition`] - NodeGroup/Stage clustering and validation
//! - [`deps`] - generic producer/dependent readiness tracking
//! - [`orchestrator`] - the coordination service and per-application
//!   scheduler
//! - [`channels`] - the multi-transport record channel fabric
//! - [`worker`] - the execution runtime
//! - [`extensions`] - deciders, aggregators, and controllers
//! - [`record`] - the record wire unit and framing
//! - [`config`] - engine tunables
//! - [`telemetry`] - tracing setup helpers

pub mod channels;
pub mod config;
pub mod deps;
pub mod extensions;
pub mod graph;
pub mod orchestrator;
pub mod partition;
pub mod record;
pub mod telemetry;
pub mod types;
pub mod worker;
