//! Application graph construction and finalization.
//!
//! Clients describe an application as a directed graph of node programs and
//! typed edges, then `finalize()` it into an immutable
//! [`ApplicationSpec`] ready for submission:
//!
//! ```rust
//! use tideflow::graph::ApplicationGraph;
//! use tideflow::types::CommunicationMode;
//! # use async_trait::async_trait;
//! # use tideflow::channels::NodeIo;
//! # use tideflow::graph::{NodeProgram, ProgramError};
//! # struct Passthrough;
//! # #[async_trait]
//! # impl NodeProgram for Passthrough {
//! #     async fn run(&self, io: &mut NodeIo) -> Result<(), ProgramError> {
//! #         while let Some(r) = io.read_arbitrary().await? { io.write_all(&r).await?; }
//! #         Ok(())
//! #     }
//! # }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = ApplicationGraph::new("wordcount", "/data");
//! let mapper = graph.insert_node(Passthrough);
//! let reducer = graph.insert_node(Passthrough);
//!
//! graph.insert_edge(&mapper, &reducer, CommunicationMode::Socket)?;
//! graph.add_source(&mapper, "corpus.dat")?;
//! graph.add_sink(&reducer, "counts.out")?;
//!
//! let spec = graph.finalize()?;
//! assert_eq!(spec.name(), "wordcount");
//! # Ok(())
//! # }
//! ```
//!
//! Finalization wires the named channel maps: for every edge the producer
//! gains an output channel named after the consumer and the consumer gains
//! an input channel named after the producer. File edges between two
//! computation nodes are assigned generated intermediate paths under the
//! application's storage directory.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use thiserror::Error;

use super::node::{ChannelSpec, EdgeSpec, NodeId, NodeProgram, NodeSpec};
use crate::extensions::{Aggregator, AggregatorMap, Controller, ControllerMap, Decider};
use crate::types::CommunicationMode;

/// Errors raised while building or finalizing an application graph.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    /// An edge or declaration referenced a node this graph never inserted.
    #[error("unknown node {name}")]
    #[diagnostic(
        code(tideflow::graph::unknown_node),
        help("Use the NodeId returned by insert_node; ids are scoped to one graph.")
    )]
    UnknownNode { name: String },

    /// Two sink declarations claim the same output location.
    #[error("output location {path} is claimed by more than one sink")]
    #[diagnostic(code(tideflow::graph::overlapping_output))]
    OverlappingOutput { path: PathBuf },
}

struct PendingNode {
    program: Arc<dyn NodeProgram>,
}

/// Mutable application graph under construction.
pub struct ApplicationGraph {
    name: String,
    base_directory: PathBuf,
    nodes: FxHashMap<String, PendingNode>,
    insertion_order: Vec<String>,
    edges: Vec<EdgeSpec>,
    /// (node, channel name, absolute path) triples for declared sources.
    sources: Vec<(String, String, PathBuf)>,
    /// Ditto for declared sinks.
    sinks: Vec<(String, String, PathBuf)>,
    claimed_outputs: FxHashSet<PathBuf>,
    initials: FxHashSet<String>,
    decider: Option<Arc<dyn Decider>>,
    aggregators: AggregatorMap,
    controllers: ControllerMap,
    node_counter: u64,
    input_counter: u64,
    output_counter: u64,
}

impl ApplicationGraph {
    /// Start an empty graph for the named application.
    ///
    /// `base_directory` anchors every relative file path of this
    /// application at `<base>/<name>/`.
    pub fn new(name: impl Into<String>, base_directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            base_directory: base_directory.into(),
            nodes: FxHashMap::default(),
            insertion_order: Vec::new(),
            edges: Vec::new(),
            sources: Vec::new(),
            sinks: Vec::new(),
            claimed_outputs: FxHashSet::default(),
            initials: FxHashSet::default(),
            decider: None,
            aggregators: AggregatorMap::default(),
            controllers: ControllerMap::default(),
            node_counter: 0,
            input_counter: 0,
            output_counter: 0,
        }
    }

    /// Insert a node, assigning it a stable generated name.
    pub fn insert_node(&mut self, program: impl NodeProgram + 'static) -> NodeId {
        let name = format!("node-{}", self.node_counter);
        self.node_counter += 1;
        self.nodes.insert(
            name.clone(),
            PendingNode {
                program: Arc::new(program),
            },
        );
        self.insertion_order.push(name.clone());
        NodeId(name)
    }

    /// Add one directed edge.
    pub fn insert_edge(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        mode: CommunicationMode,
    ) -> Result<(), GraphError> {
        self.check_known(source)?;
        self.check_known(target)?;
        self.edges.push(EdgeSpec {
            source: source.0.clone(),
            target: target.0.clone(),
            mode,
        });
        Ok(())
    }

    /// Connect every origin to every destination with the given mode.
    pub fn insert_edges(
        &mut self,
        origins: &[NodeId],
        destinations: &[NodeId],
        mode: CommunicationMode,
    ) -> Result<(), GraphError> {
        for origin in origins {
            for destination in destinations {
                self.insert_edge(origin, destination, mode)?;
            }
        }
        Ok(())
    }

    /// Declare `node` as a source reading the given input file.
    ///
    /// Relative paths are anchored at the application's storage directory.
    pub fn add_source(
        &mut self,
        node: &NodeId,
        filename: impl AsRef<Path>,
    ) -> Result<(), GraphError> {
        self.check_known(node)?;
        let channel = format!("input-{}", self.input_counter);
        self.input_counter += 1;
        let path = self.absolute_path(filename.as_ref());
        self.sources.push((node.0.clone(), channel, path));
        Ok(())
    }

    /// Declare `node` as a sink writing the given output file.
    ///
    /// No two sinks may claim the same location; this is checked here and
    /// again at finalize time.
    pub fn add_sink(
        &mut self,
        node: &NodeId,
        filename: impl AsRef<Path>,
    ) -> Result<(), GraphError> {
        self.check_known(node)?;
        let path = self.absolute_path(filename.as_ref());
        if !self.claimed_outputs.insert(path.clone()) {
            return Err(GraphError::OverlappingOutput { path });
        }
        let channel = format!("output-{}", self.output_counter);
        self.output_counter += 1;
        self.sinks.push((node.0.clone(), channel, path));
        Ok(())
    }

    /// Declare `node` as initial: schedulable at the start of every
    /// iteration regardless of derived file dependencies.
    pub fn add_initial(&mut self, node: &NodeId) -> Result<(), GraphError> {
        self.check_known(node)?;
        self.initials.insert(node.0.clone());
        Ok(())
    }

    /// Install the iteration decider.
    pub fn set_decider(&mut self, decider: impl Decider + 'static) {
        self.decider = Some(Arc::new(decider));
    }

    /// Register a named aggregator.
    pub fn register_aggregator(
        &mut self,
        name: impl Into<String>,
        aggregator: impl Aggregator + 'static,
    ) {
        self.aggregators.insert(name.into(), Arc::new(aggregator));
    }

    /// Register a named controller.
    pub fn register_controller(
        &mut self,
        name: impl Into<String>,
        controller: impl Controller + 'static,
    ) {
        self.controllers.insert(name.into(), Arc::new(controller));
    }

    /// Resolve a file name against the application's storage directory.
    /// Absolute paths pass through untouched.
    #[must_use]
    pub fn absolute_path(&self, filename: &Path) -> PathBuf {
        if filename.is_absolute() {
            filename.to_path_buf()
        } else {
            self.base_directory.join(&self.name).join(filename)
        }
    }

    /// Wire the channel maps and freeze the graph.
    pub fn finalize(self) -> Result<ApplicationSpec, GraphError> {
        let mut inputs: FxHashMap<String, FxHashMap<String, ChannelSpec>> = FxHashMap::default();
        let mut outputs: FxHashMap<String, FxHashMap<String, ChannelSpec>> = FxHashMap::default();

        // Intermediate file edges get generated locations, numbered apart
        // from user-declared channels.
        let mut anonymous_counter = 1000u64;
        let storage = self.base_directory.join(&self.name);

        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !self.nodes.contains_key(endpoint) {
                    return Err(GraphError::UnknownNode {
                        name: endpoint.clone(),
                    });
                }
            }
            let (output_spec, input_spec) = match edge.mode {
                CommunicationMode::InProcess | CommunicationMode::Socket => {
                    (ChannelSpec::wired(edge.mode), ChannelSpec::wired(edge.mode))
                }
                CommunicationMode::File => {
                    let path =
                        storage.join(format!("anonymous-filechannel-{anonymous_counter}.dat"));
                    anonymous_counter += 1;
                    (ChannelSpec::file(path.clone()), ChannelSpec::file(path))
                }
            };
            outputs
                .entry(edge.source.clone())
                .or_default()
                .insert(edge.target.clone(), output_spec);
            inputs
                .entry(edge.target.clone())
                .or_default()
                .insert(edge.source.clone(), input_spec);
        }

        let mut input_paths = Vec::new();
        for (node, channel, path) in &self.sources {
            inputs
                .entry(node.clone())
                .or_default()
                .insert(channel.clone(), ChannelSpec::file(path.clone()));
            input_paths.push(path.clone());
        }

        let mut output_paths = Vec::new();
        let mut seen_outputs = FxHashSet::default();
        for (node, channel, path) in &self.sinks {
            if !seen_outputs.insert(path.clone()) {
                return Err(GraphError::OverlappingOutput { path: path.clone() });
            }
            outputs
                .entry(node.clone())
                .or_default()
                .insert(channel.clone(), ChannelSpec::file(path.clone()));
            output_paths.push(path.clone());
        }

        let mut nodes = FxHashMap::default();
        for name in &self.insertion_order {
            let Some(pending) = self.nodes.get(name) else {
                return Err(GraphError::UnknownNode { name: name.clone() });
            };
            nodes.insert(
                name.clone(),
                NodeSpec {
                    name: name.clone(),
                    program: pending.program.clone(),
                    inputs: inputs.remove(name).unwrap_or_default(),
                    outputs: outputs.remove(name).unwrap_or_default(),
                },
            );
        }

        Ok(ApplicationSpec {
            name: self.name,
            base_directory: self.base_directory,
            nodes,
            node_order: self.insertion_order,
            edges: self.edges,
            input_paths,
            output_paths,
            initials: self.initials,
            decider: self.decider,
            aggregators: self.aggregators,
            controllers: self.controllers,
            terminate: Arc::new(AtomicBool::new(false)),
        })
    }

    fn check_known(&self, node: &NodeId) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.0) {
            Ok(())
        } else {
            Err(GraphError::UnknownNode {
                name: node.0.clone(),
            })
        }
    }
}

/// An immutable, finalized application: the unit submitted to the
/// orchestrator.
pub struct ApplicationSpec {
    name: String,
    base_directory: PathBuf,
    nodes: FxHashMap<String, NodeSpec>,
    node_order: Vec<String>,
    edges: Vec<EdgeSpec>,
    input_paths: Vec<PathBuf>,
    output_paths: Vec<PathBuf>,
    initials: FxHashSet<String>,
    decider: Option<Arc<dyn Decider>>,
    aggregators: AggregatorMap,
    controllers: ControllerMap,
    /// Application-wide wind-down flag surfaced to node programs.
    terminate: Arc<AtomicBool>,
}

impl ApplicationSpec {
    /// Application name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base storage directory the application was declared against.
    #[must_use]
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Finalized nodes, keyed by name.
    #[must_use]
    pub fn nodes(&self) -> &FxHashMap<String, NodeSpec> {
        &self.nodes
    }

    /// Node names in insertion order.
    #[must_use]
    pub fn node_names(&self) -> &[String] {
        &self.node_order
    }

    /// Look up one node.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name)
    }

    /// All edges of the graph.
    #[must_use]
    pub fn edges(&self) -> &[EdgeSpec] {
        &self.edges
    }

    /// Declared input files, verified to exist before every iteration.
    #[must_use]
    pub fn input_paths(&self) -> &[PathBuf] {
        &self.input_paths
    }

    /// Declared output files, verified to exist after every iteration.
    #[must_use]
    pub fn output_paths(&self) -> &[PathBuf] {
        &self.output_paths
    }

    /// The initial (dependency-free) node set: the declared initials, or -
    /// absent any declaration - every file-consuming node with no in-graph
    /// predecessor.
    #[must_use]
    pub fn initial_nodes(&self) -> FxHashSet<&str> {
        if !self.initials.is_empty() {
            return self.initials.iter().map(String::as_str).collect();
        }
        let mut derived: FxHashSet<&str> = self
            .nodes
            .values()
            .filter(|node| node.consumes_files())
            .map(|node| node.name.as_str())
            .collect();
        for edge in &self.edges {
            derived.remove(edge.target.as_str());
        }
        derived
    }

    /// The application's iteration decider, if any.
    #[must_use]
    pub fn decider(&self) -> Option<&Arc<dyn Decider>> {
        self.decider.as_ref()
    }

    /// Registered aggregators.
    #[must_use]
    pub fn aggregators(&self) -> &AggregatorMap {
        &self.aggregators
    }

    /// Look up one aggregator.
    #[must_use]
    pub fn aggregator(&self, name: &str) -> Option<Arc<dyn Aggregator>> {
        self.aggregators.get(name).cloned()
    }

    /// Look up one controller.
    #[must_use]
    pub fn controller(&self, name: &str) -> Option<Arc<dyn Controller>> {
        self.controllers.get(name).cloned()
    }

    /// The application-wide terminate flag shared with every NodeIo.
    #[must_use]
    pub fn terminate_flag(&self) -> Arc<AtomicBool> {
        self.terminate.clone()
    }
}

impl std::fmt::Debug for ApplicationSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationSpec")
            .field("name", &self.name)
            .field("nodes", &self.node_order.len())
            .field("edges", &self.edges.len())
            .finish_non_exhaustive()
    }
}
