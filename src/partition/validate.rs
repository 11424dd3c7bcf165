//! Stage-level dependency validation.
//!
//! File edges induce ordering between stages. Two shapes of graph cannot be
//! scheduled and are rejected before any work is dispatched:
//!
//! - a **cycle** of file dependencies among stages - no release order
//!   exists;
//! - a file edge whose endpoints resolve to the **same** stage - the
//!   stage's members all run concurrently, so the strict before/after
//!   ordering a file handoff needs cannot be guaranteed.

use miette::Diagnostic;
use thiserror::Error;

use super::Partition;
use crate::graph::ApplicationSpec;
use crate::types::CommunicationMode;

/// Structural problems that make a graph unschedulable.
#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    /// The stage-level file-dependency graph contains a cycle.
    #[error("cyclic file dependency among stages")]
    #[diagnostic(
        code(tideflow::partition::cyclic_dependency),
        help("Break the cycle by replacing one file edge with a socket edge, or restructure the graph.")
    )]
    CyclicDependency,

    /// A file edge connects two nodes of the same stage.
    #[error("temporal file dependency between {src} and {target}: both run in the same stage")]
    #[diagnostic(
        code(tideflow::partition::temporal_dependency),
        help("Same-stage members run concurrently; a file handoff needs the producer's stage to finish first.")
    )]
    TemporalDependency { src: String, target: String },
}

/// Check the stage-level file-dependency graph of a partitioned
/// application.
pub fn validate(spec: &ApplicationSpec, partition: &Partition) -> Result<(), ValidationError> {
    let stage_count = partition.stages().len();
    let mut stage_edges: Vec<Vec<usize>> = vec![Vec::new(); stage_count];

    for edge in spec.edges() {
        if edge.mode != CommunicationMode::File {
            continue;
        }
        let (Some(source_stage), Some(target_stage)) = (
            partition.stage_of_node(&edge.source),
            partition.stage_of_node(&edge.target),
        ) else {
            continue;
        };
        if source_stage == target_stage {
            return Err(ValidationError::TemporalDependency {
                src: edge.source.clone(),
                target: edge.target.clone(),
            });
        }
        stage_edges[source_stage].push(target_stage);
    }

    // Three-color DFS; a back edge into an in-progress stage is a cycle.
    let mut colors = vec![Color::White; stage_count];
    for root in 0..stage_count {
        if colors[root] == Color::White && has_cycle(root, &stage_edges, &mut colors) {
            return Err(ValidationError::CyclicDependency);
        }
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

fn has_cycle(stage: usize, edges: &[Vec<usize>], colors: &mut [Color]) -> bool {
    colors[stage] = Color::Gray;
    for &next in &edges[stage] {
        match colors[next] {
            Color::Gray => return true,
            Color::White => {
                if has_cycle(next, edges, colors) {
                    return true;
                }
            }
            Color::Black => {}
        }
    }
    colors[stage] = Color::Black;
    false
}
