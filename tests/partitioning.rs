//! Property tests for partition and stage correctness.
//!
//! The reference model is a plain union-find: nodes united over in-process
//! edges must match NodeGroup membership, and groups united over socket
//! edges must match Stage membership, for arbitrary graphs.

mod common;

use common::*;
use proptest::prelude::*;

use tideflow::graph::{ApplicationGraph, ApplicationSpec, NodeId};
use tideflow::partition::partition;
use tideflow::types::CommunicationMode;

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

fn mode_strategy() -> impl Strategy<Value = CommunicationMode> {
    prop::sample::select(vec![
        CommunicationMode::InProcess,
        CommunicationMode::Socket,
        CommunicationMode::File,
    ])
}

fn graph_strategy()
-> impl Strategy<Value = (usize, Vec<(usize, usize, CommunicationMode)>)> {
    (2usize..10).prop_flat_map(|nodes| {
        let edges = prop::collection::vec(
            (0..nodes, 0..nodes, mode_strategy()),
            0..20,
        );
        edges.prop_map(move |edges| (nodes, edges))
    })
}

fn build(nodes: usize, edges: &[(usize, usize, CommunicationMode)]) -> (ApplicationSpec, Vec<NodeId>) {
    let mut graph = ApplicationGraph::new("prop", "/data");
    let ids: Vec<NodeId> = (0..nodes).map(|_| graph.insert_node(Forward)).collect();
    for (source, target, mode) in edges {
        graph
            .insert_edge(&ids[*source], &ids[*target], *mode)
            .expect("edge between inserted nodes");
    }
    (graph.finalize().expect("finalize"), ids)
}

proptest! {
    /// Every node lands in exactly one group, and two nodes share a group
    /// iff they are connected by an undirected path of in-process edges.
    #[test]
    fn groups_match_in_process_reachability((nodes, edges) in graph_strategy()) {
        let (spec, ids) = build(nodes, &edges);
        let parts = partition(&spec);

        let total: usize = parts.groups().iter().map(|group| group.size()).sum();
        prop_assert_eq!(total, nodes);

        let mut reference = UnionFind::new(nodes);
        for (source, target, mode) in &edges {
            if *mode == CommunicationMode::InProcess {
                reference.union(*source, *target);
            }
        }

        for a in 0..nodes {
            for b in 0..nodes {
                let same_component = reference.find(a) == reference.find(b);
                let same_group =
                    parts.group_of(ids[a].as_str()) == parts.group_of(ids[b].as_str());
                prop_assert_eq!(
                    same_component,
                    same_group,
                    "nodes {} and {} disagree with the reference model",
                    a,
                    b
                );
            }
        }
    }

    /// Two groups share a stage iff connected by a path of socket edges
    /// over the group-level graph; equivalently, no socket edge ever
    /// crosses a stage boundary and stages are minimal.
    #[test]
    fn stages_match_socket_reachability((nodes, edges) in graph_strategy()) {
        let (spec, ids) = build(nodes, &edges);
        let parts = partition(&spec);

        // Union nodes over both in-process and socket edges: that is
        // exactly stage-level reachability.
        let mut reference = UnionFind::new(nodes);
        for (source, target, mode) in &edges {
            match mode {
                CommunicationMode::InProcess | CommunicationMode::Socket => {
                    reference.union(*source, *target);
                }
                CommunicationMode::File => {}
            }
        }

        for a in 0..nodes {
            for b in 0..nodes {
                let same_component = reference.find(a) == reference.find(b);
                let same_stage = parts.stage_of_node(ids[a].as_str())
                    == parts.stage_of_node(ids[b].as_str());
                prop_assert_eq!(same_component, same_stage);
            }
        }

        // Direct restatement: no socket edge crosses a stage boundary.
        for (source, target, mode) in &edges {
            if *mode == CommunicationMode::Socket {
                prop_assert_eq!(
                    parts.stage_of_node(ids[*source].as_str()),
                    parts.stage_of_node(ids[*target].as_str())
                );
            }
        }
    }

    /// Every group belongs to exactly one stage.
    #[test]
    fn stages_partition_the_groups((nodes, edges) in graph_strategy()) {
        let (spec, _ids) = build(nodes, &edges);
        let parts = partition(&spec);

        let mut seen = vec![false; parts.groups().len()];
        for stage in parts.stages() {
            for &group in &stage.groups {
                assert!(!seen[group], "group {group} appears in two stages");
                seen[group] = true;
            }
        }
        prop_assert!(seen.into_iter().all(|covered| covered));
    }
}
