//! Graphviz DOT Debug Dump (spec §6.3)
//!
//! Renders the dependency DAG as a Graphviz `digraph`: nodes colored by
//! purity (stateful = red, non-concurrent = orange, function call = light
//! blue, simple expression = light gray), with same-rank clusters per
//! parallel level. No templating crate is pulled in for a single small
//! render function, matching the teacher's plain string-building formatter
//! style (e.g. `fs::path` display helpers).

use crate::analysis::DependencyInfo;
use crate::dag::{Dag, LevelKind};
use std::fmt::Write as _;

/// Render `dag` (built over `nodes`, in the same order) as a Graphviz DOT
/// document.
pub fn render(nodes: &[DependencyInfo], dag: &Dag) -> String {
    let mut out = String::new();
    out.push_str("digraph imse {\n");
    out.push_str("  rankdir=TB;\n");
    out.push_str("  node [style=filled, fontname=\"monospace\"];\n");

    for (i, node) in nodes.iter().enumerate() {
        let color = node_color(node);
        let label = escape_html(&format!("{}\\n{}", node.var_name, truncate(&node.expr_text, 40)));
        let _ = writeln!(out, "  n{i} [label=\"{label}\", fillcolor=\"{color}\"];");
    }

    for (i, node) in nodes.iter().enumerate() {
        for dep in &node.dependencies {
            if let Some(dep_idx) = nodes.iter().position(|n| &n.var_name == dep) {
                let _ = writeln!(out, "  n{dep_idx} -> n{i};");
            }
        }
    }

    for (level_idx, level) in dag.levels.iter().enumerate() {
        if level.kind == LevelKind::Parallel && level.node_indices.len() > 1 {
            let _ = writeln!(out, "  subgraph cluster_level_{level_idx} {{");
            let _ = writeln!(out, "    label=\"level {level_idx} (parallel)\";");
            let _ = writeln!(out, "    style=dashed;");
            let _ = writeln!(out, "    {{ rank = same; {} }}", level.node_indices.iter().map(|i| format!("n{i}")).collect::<Vec<_>>().join(" "));
            let _ = writeln!(out, "  }}");
        }
    }

    out.push_str("}\n");
    out
}

fn node_color(node: &DependencyInfo) -> &'static str {
    if node.has_stateful_function {
        "#f28b82" // red
    } else if node.has_non_concurrent_function {
        "#fbbc04" // orange
    } else if node.has_function_call {
        "#aecbfa" // light blue
    } else {
        "#e8eaed" // light gray
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max).collect::<String>())
    }
}

/// Escapes the characters Graphviz labels require escaped, plus HTML
/// metacharacters so the label is also safe if rendered inside an HTML-like
/// label string: `& < > " \n`.
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, SectionKind};
    use crate::dag;
    use indexmap::IndexSet;

    fn node(name: &str, deps: &[&str], has_call: bool, stateful: bool) -> DependencyInfo {
        DependencyInfo {
            var_name: name.to_string(),
            dependencies: deps.iter().map(|s| s.to_string()).collect::<IndexSet<_>>(),
            has_function_call: has_call,
            has_stateful_function: stateful,
            has_non_concurrent_function: false,
            has_parallel_function_arguments: false,
            expr: Expr::Number(0.0),
            expr_text: "img(0)".to_string(),
            section_kind: SectionKind::Outputs,
            section_name: "outputs".to_string(),
        }
    }

    #[test]
    fn renders_nodes_and_edges() {
        let nodes = vec![node("a", &[], true, false), node("b", &["a"], false, false)];
        let dag = dag::build(&nodes).unwrap();
        let dot = render(&nodes, &dag);
        assert!(dot.contains("digraph imse"));
        assert!(dot.contains("n0 -> n1"));
    }

    #[test]
    fn escapes_html_metacharacters_in_labels() {
        let mut n = node("a", &[], false, false);
        n.expr_text = "\"<tag> & \"quote\"".to_string();
        let dag = dag::build(std::slice::from_ref(&n)).unwrap();
        let dot = render(std::slice::from_ref(&n), &dag);
        assert!(dot.contains("&lt;tag&gt;"));
        assert!(dot.contains("&amp;"));
        assert!(dot.contains("&quot;"));
    }

    #[test]
    fn stateful_node_colored_red() {
        let n = node("w", &[], true, true);
        let dag = dag::build(std::slice::from_ref(&n)).unwrap();
        let dot = render(std::slice::from_ref(&n), &dag);
        assert!(dot.contains("#f28b82"));
    }
}
