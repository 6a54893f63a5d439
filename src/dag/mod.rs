//! DAG Builder & Level Scheduler (spec §4.5)
//!
//! One node per `DependencyInfo`. An edge `d -> v` exists for every
//! dependency `d` that is itself a known node in this DAG (external
//! references — reserved names, context-supplied values, already-resolved
//! upstream variables from another pass — are not nodes and contribute no
//! edge). Levels are emitted by repeatedly taking the zero-in-degree
//! frontier, splitting it into a parallel batch and a sequence of
//! single-node sequential levels, in source order.

use crate::analysis::DependencyInfo;
use crate::error::ImseError;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelKind {
    Parallel,
    Sequential,
}

#[derive(Debug, Clone)]
pub struct Level {
    pub kind: LevelKind,
    /// Indices into the `nodes` slice passed to `build`.
    pub node_indices: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Dag {
    pub levels: Vec<Level>,
}

/// Builds the level schedule for `nodes`. Node order is preserved as the
/// tie-break for both in-degree-zero frontier iteration and sequential
/// emission order (spec §4.5 step 4: "in their original script order").
pub fn build(nodes: &[DependencyInfo]) -> Result<Dag, ImseError> {
    let index_of: IndexMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (n.var_name.as_str(), i)).collect();

    // adjacency[i] = indices that depend on node i (outgoing edges from i).
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];

    for (i, node) in nodes.iter().enumerate() {
        for dep in &node.dependencies {
            if let Some(&dep_idx) = index_of.get(dep.as_str()) {
                adjacency[dep_idx].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut processed = vec![false; nodes.len()];
    let mut remaining = nodes.len();
    let mut levels = Vec::new();

    while remaining > 0 {
        let frontier: Vec<usize> = (0..nodes.len()).filter(|&i| !processed[i] && in_degree[i] == 0).collect();
        if frontier.is_empty() {
            let stuck: Vec<String> = (0..nodes.len()).filter(|&i| !processed[i]).map(|i| nodes[i].var_name.clone()).collect();
            return Err(ImseError::Circular { variables: stuck });
        }

        let (parallel, sequential): (Vec<usize>, Vec<usize>) = frontier.iter().copied().partition(|&i| {
            let n = &nodes[i];
            n.has_function_call && !n.has_stateful_function && !n.has_non_concurrent_function
        });

        if !parallel.is_empty() {
            levels.push(Level { kind: LevelKind::Parallel, node_indices: parallel });
        }
        for seq_idx in sequential {
            levels.push(Level { kind: LevelKind::Sequential, node_indices: vec![seq_idx] });
        }

        for &i in &frontier {
            processed[i] = true;
            remaining -= 1;
            for &dependent in &adjacency[i] {
                in_degree[dependent] -= 1;
            }
        }
    }

    Ok(Dag { levels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, SectionKind};
    use indexmap::IndexSet;

    fn node(name: &str, deps: &[&str], has_call: bool, stateful: bool, non_concurrent: bool) -> DependencyInfo {
        DependencyInfo {
            var_name: name.to_string(),
            dependencies: deps.iter().map(|s| s.to_string()).collect::<IndexSet<_>>(),
            has_function_call: has_call,
            has_stateful_function: stateful,
            has_non_concurrent_function: non_concurrent,
            has_parallel_function_arguments: false,
            expr: Expr::Number(0.0),
            expr_text: String::new(),
            section_kind: SectionKind::Outputs,
            section_name: "outputs".to_string(),
        }
    }

    #[test]
    fn independent_pure_calls_share_a_parallel_level() {
        let nodes = vec![node("a", &[], true, false, false), node("b", &[], true, false, false)];
        let dag = build(&nodes).unwrap();
        assert_eq!(dag.levels.len(), 1);
        assert_eq!(dag.levels[0].kind, LevelKind::Parallel);
        assert_eq!(dag.levels[0].node_indices.len(), 2);
    }

    #[test]
    fn stateful_node_gets_its_own_sequential_level() {
        let nodes = vec![node("a", &[], true, false, false), node("d", &[], false, true, false)];
        let dag = build(&nodes).unwrap();
        let seq_levels: Vec<_> = dag.levels.iter().filter(|l| l.kind == LevelKind::Sequential).collect();
        assert_eq!(seq_levels.len(), 1);
        assert_eq!(seq_levels[0].node_indices, vec![1]);
    }

    #[test]
    fn detects_cycle() {
        let nodes = vec![node("y", &["y"], false, false, false)];
        let err = build(&nodes).unwrap_err();
        match err {
            ImseError::Circular { variables } => assert_eq!(variables, vec!["y".to_string()]),
            other => panic!("expected Circular, got {other:?}"),
        }
    }

    #[test]
    fn layers_respect_dependency_order() {
        let nodes = vec![
            node("a", &[], true, false, false),
            node("b", &[], true, false, false),
            node("c", &["a", "b"], false, false, false),
            node("e", &["c"], false, false, false),
        ];
        let dag = build(&nodes).unwrap();
        // a, b parallel; then c sequential (no call); then e sequential (no call).
        assert_eq!(dag.levels[0].kind, LevelKind::Parallel);
        assert_eq!(dag.levels[0].node_indices.len(), 2);
        assert_eq!(dag.levels[1].node_indices, vec![2]);
        assert_eq!(dag.levels[2].node_indices, vec![3]);
    }
}
