//! Graph partitioning: NodeGroups and Stages.
//!
//! Two passes of multi-source connected-component labeling turn a flat
//! node/edge graph into schedulable units:
//!
//! 1. nodes mutually reachable over **in-process** edges (followed in both
//!    directions) form a [`NodeGroup`] - the unit of scheduling affinity,
//!    always placed whole onto one worker;
//! 2. treating NodeGroups as atomic vertices, groups mutually reachable
//!    over **socket** edges form a [`Stage`] - the unit of wave release.
//!
//! Both relations are symmetric and transitive, so groups partition the
//! node set exactly and stages partition the group set exactly. A group
//! with no socket edges forms a singleton stage.
//!
//! `partition` is a pure function of the finalized graph. Group and stage
//! numbering depends on the iteration order of the node set, which is not
//! specified - identical graphs may number their components differently
//! across runs. Callers must not rely on specific ids.

mod validate;

pub use validate::{ValidationError, validate};

use rustc_hash::FxHashMap;
use std::collections::VecDeque;

use crate::graph::ApplicationSpec;
use crate::types::{CommunicationMode, GroupId, StageId};

/// A maximal cluster of nodes connected by in-process edges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeGroup {
    /// Member node names.
    pub members: Vec<String>,
}

impl NodeGroup {
    /// Number of member nodes - the slot cost of dispatching this group.
    #[must_use]
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// A maximal cluster of NodeGroups connected by socket edges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    /// Member groups, by id.
    pub groups: Vec<GroupId>,
}

/// The partitioned view of one application graph.
#[derive(Clone, Debug)]
pub struct Partition {
    groups: Vec<NodeGroup>,
    stages: Vec<Stage>,
    group_of: FxHashMap<String, GroupId>,
    stage_of: Vec<StageId>,
}

impl Partition {
    /// All NodeGroups.
    #[must_use]
    pub fn groups(&self) -> &[NodeGroup] {
        &self.groups
    }

    /// All Stages.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The group a node belongs to.
    #[must_use]
    pub fn group_of(&self, node: &str) -> Option<GroupId> {
        self.group_of.get(node).copied()
    }

    /// The stage a group belongs to.
    #[must_use]
    pub fn stage_of(&self, group: GroupId) -> Option<StageId> {
        self.stage_of.get(group).copied()
    }

    /// The stage a node's group belongs to.
    #[must_use]
    pub fn stage_of_node(&self, node: &str) -> Option<StageId> {
        self.stage_of(self.group_of(node)?)
    }
}

/// Cluster the finalized graph into NodeGroups and Stages.
#[must_use]
pub fn partition(spec: &ApplicationSpec) -> Partition {
    // Pass 1: undirected reachability over in-process edges.
    let in_process = adjacency(spec, CommunicationMode::InProcess);
    let mut group_of: FxHashMap<String, GroupId> = FxHashMap::default();
    let mut groups: Vec<NodeGroup> = Vec::new();

    for seed in spec.nodes().keys() {
        if group_of.contains_key(seed) {
            continue;
        }
        let id = groups.len();
        let mut members = Vec::new();
        let mut queue = VecDeque::from([seed.clone()]);
        group_of.insert(seed.clone(), id);

        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = in_process.get(&current) {
                for neighbor in neighbors {
                    if !group_of.contains_key(neighbor) {
                        group_of.insert(neighbor.clone(), id);
                        queue.push_back(neighbor.clone());
                    }
                }
            }
            members.push(current);
        }
        groups.push(NodeGroup { members });
    }

    // Pass 2: the same labeling over the derived group graph, with an edge
    // between two groups iff some socket edge connects their members.
    let mut group_adjacency: Vec<Vec<GroupId>> = vec![Vec::new(); groups.len()];
    for edge in spec.edges() {
        if edge.mode != CommunicationMode::Socket {
            continue;
        }
        let (Some(&source), Some(&target)) =
            (group_of.get(&edge.source), group_of.get(&edge.target))
        else {
            continue;
        };
        group_adjacency[source].push(target);
        group_adjacency[target].push(source);
    }

    let mut stage_of: Vec<Option<StageId>> = vec![None; groups.len()];
    let mut stages: Vec<Stage> = Vec::new();

    for seed in 0..groups.len() {
        if stage_of[seed].is_some() {
            continue;
        }
        let id = stages.len();
        let mut members = Vec::new();
        let mut queue = VecDeque::from([seed]);
        stage_of[seed] = Some(id);

        while let Some(current) = queue.pop_front() {
            for &neighbor in &group_adjacency[current] {
                if stage_of[neighbor].is_none() {
                    stage_of[neighbor] = Some(id);
                    queue.push_back(neighbor);
                }
            }
            members.push(current);
        }
        stages.push(Stage { groups: members });
    }

    Partition {
        groups,
        stages,
        group_of,
        // Every group was visited by the second pass.
        stage_of: stage_of.into_iter().flatten().collect(),
    }
}

/// Undirected adjacency restricted to one communication mode.
fn adjacency(
    spec: &ApplicationSpec,
    mode: CommunicationMode,
) -> FxHashMap<String, Vec<String>> {
    let mut adjacency: FxHashMap<String, Vec<String>> = FxHashMap::default();
    for edge in spec.edges() {
        if edge.mode == mode {
            adjacency
                .entry(edge.source.clone())
                .or_default()
                .push(edge.target.clone());
            adjacency
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
        }
    }
    adjacency
}
