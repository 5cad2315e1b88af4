//! Dependency graph analysis: DAG validation, ready-set computation, and
//! stuck diagnosis.
//!
//! `validate_dag` uses `petgraph` to reject cycles and dangling references
//! when a definition is created. At run time the scheduler only needs the
//! cheaper `ready_steps` query plus `describe_stuck` when nothing can move.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use sentinel_types::workflow::WorkflowStep;

use super::definition::WorkflowError;

// ---------------------------------------------------------------------------
// DAG validation
// ---------------------------------------------------------------------------

/// Validate that steps form a valid DAG (no cycles, all references exist).
pub fn validate_dag(steps: &[WorkflowStep]) -> Result<(), WorkflowError> {
    let id_to_idx: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    // Edge from dependency -> dependent
    let mut graph = DiGraph::<&str, ()>::new();
    let node_indices: Vec<_> = steps.iter().map(|s| graph.add_node(s.id.as_str())).collect();

    for (to_idx, step) in steps.iter().enumerate() {
        for dep in &step.depends_on {
            let from_idx = id_to_idx.get(dep.as_str()).ok_or_else(|| {
                WorkflowError::UnknownDependency(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                ))
            })?;
            graph.add_edge(node_indices[*from_idx], node_indices[to_idx], ());
        }
    }

    toposort(&graph, None).map_err(|cycle| {
        let node_id = graph[cycle.node_id()];
        WorkflowError::CycleDetected(format!("cycle detected involving step '{node_id}'"))
    })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Ready set
// ---------------------------------------------------------------------------

/// Indices of steps that may start now.
///
/// A step is ready when it has not completed, is not already in flight, and
/// every ID in its `depends_on` is in `completed`. Indices come back in
/// definition order.
pub fn ready_steps(
    steps: &[WorkflowStep],
    completed: &HashSet<String>,
    in_flight: &HashSet<usize>,
) -> Vec<usize> {
    steps
        .iter()
        .enumerate()
        .filter(|(idx, step)| {
            !completed.contains(&step.id)
                && !in_flight.contains(idx)
                && step.depends_on.iter().all(|dep| completed.contains(dep))
        })
        .map(|(idx, _)| idx)
        .collect()
}

// ---------------------------------------------------------------------------
// Stuck diagnosis
// ---------------------------------------------------------------------------

/// Human-readable explanation of why the remaining steps can never start.
///
/// Lists every incomplete step with its unmet dependencies, tagging the ones
/// that name no step in the definition.
pub fn describe_stuck(steps: &[WorkflowStep], completed: &HashSet<String>) -> String {
    let known: HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();

    let blocked: Vec<String> = steps
        .iter()
        .filter(|s| !completed.contains(&s.id))
        .map(|s| {
            let unmet: Vec<String> = s
                .depends_on
                .iter()
                .filter(|dep| !completed.contains(*dep))
                .map(|dep| {
                    if known.contains(dep.as_str()) {
                        dep.clone()
                    } else {
                        format!("{dep} (unknown)")
                    }
                })
                .collect();
            format!("{} <- [{}]", s.id, unmet.join(", "))
        })
        .collect();

    format!(
        "workflow execution stuck: remaining steps have unmet dependencies: {}",
        blocked.join("; ")
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
