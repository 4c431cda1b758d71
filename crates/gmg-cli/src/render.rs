//! Output renderers for the resolved dependency graph.

use std::collections::HashSet;
use std::fmt::Write;

use console::style;

use gmg_core::Result;
use gmg_solver::{Dependency, DependencyGraph};

/// Indented tree from the root. A node already printed earlier is dimmed and
/// annotated instead of being expanded again (the graph may be cyclic).
pub fn tree(dg: &DependencyGraph) -> Result<String> {
    let mut out = String::new();
    let mut seen = HashSet::new();
    visit_tree(dg, &dg.root(), false, 0, &mut seen, &mut out)?;
    Ok(out)
}

fn visit_tree(
    dg: &DependencyGraph,
    dep: &Dependency,
    surprise: bool,
    indent: usize,
    seen: &mut HashSet<Dependency>,
    out: &mut String,
) -> Result<()> {
    let repeat = !seen.insert(dep.clone());
    let _ = write!(out, "{}", "  ".repeat(indent));
    if repeat {
        let _ = write!(out, "{}{}", style(dep).dim(), style(" (repeat)").dim());
    } else {
        let _ = write!(out, "{dep}");
    }
    if surprise {
        let _ = write!(out, "{}", style(" (surprise indirect)").cyan());
    }
    let _ = writeln!(out);
    if repeat {
        return Ok(());
    }
    let mut children = dg.deps(dep)?;
    children.sort();
    for (child, surprise) in children {
        visit_tree(dg, &child, surprise, indent + 1, seen, out)?;
    }
    Ok(())
}

/// The selection set, one module per line, sorted.
pub fn raw(dg: &DependencyGraph) -> Result<String> {
    let mut out = String::new();
    for dep in dg.all() {
        let _ = writeln!(out, "{dep}");
    }
    Ok(out)
}

/// Graphviz digraph. Surprise edges are dashed and classed for styling.
pub fn dot(dg: &DependencyGraph) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(out, "digraph {{");
    let _ = writeln!(out, "  outputorder=\"edgesfirst\";");
    let _ = writeln!(out, "  overlap=prism;");
    let _ = writeln!(out, "  node [style=filled,fillcolor=\"white\",shape=box];");
    let root = dg.root();
    let mut seen = HashSet::new();
    let mut stack = vec![root.clone()];
    let mut nodes = Vec::new();
    while let Some(dep) = stack.pop() {
        if !seen.insert(dep.clone()) {
            continue;
        }
        nodes.push(dep.clone());
        for (child, _) in dg.deps(&dep)? {
            stack.push(child);
        }
    }
    nodes.sort();
    for dep in &nodes {
        let mut attrs = vec![format!("URL=\"https://pkg.go.dev/{dep}\"")];
        if *dep == root {
            attrs.push("fillcolor=\"black\"".to_string());
            attrs.push("fontcolor=\"white\"".to_string());
        }
        let _ = writeln!(out, "  \"{dep}\" [{}];", attrs.join(","));
    }
    for dep in &nodes {
        let mut edges = dg.deps(dep)?;
        edges.sort();
        for (child, surprise) in edges {
            let attrs = if surprise {
                "class=\"surprise\",style=\"dashed\""
            } else {
                ""
            };
            let _ = writeln!(out, "  \"{dep}\" -> \"{child}\" [{attrs}];");
        }
    }
    let _ = writeln!(out, "}}");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use gmg_core::ModuleId;
    use gmg_graph::MemoryGraph;
    use gmg_solver::resolve_mvs;

    async fn sample() -> DependencyGraph {
        console::set_colors_enabled(false);
        let root = ModuleId::parse("example.com/root@v1.0.0");
        let mut g = MemoryGraph::new(root.clone());
        g.insert_edge(&root, ModuleId::parse("example.com/a@v1.0.0"), false);
        g.insert_edge(&root, ModuleId::parse("example.com/b@v1.0.0"), true);
        g.insert_edge(
            &ModuleId::parse("example.com/a@v1.0.0"),
            root.clone(),
            false,
        );
        resolve_mvs(&CancellationToken::new(), Arc::new(g))
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tree_marks_repeats_and_surprises() {
        let dg = sample().await;
        let out = tree(&dg).unwrap();
        let want = "\
example.com/root@v1.0.0
  example.com/a@v1.0.0
    example.com/root@v1.0.0 (repeat)
  example.com/b@v1.0.0 (surprise indirect)
";
        assert_eq!(out, want);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_raw_is_sorted_selection() {
        let dg = sample().await;
        let out = raw(&dg).unwrap();
        assert_eq!(
            out,
            "example.com/a@v1.0.0\nexample.com/b@v1.0.0\nexample.com/root@v1.0.0\n"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dot_shape() {
        let dg = sample().await;
        let out = dot(&dg).unwrap();
        assert!(out.starts_with("digraph {"));
        assert!(out.trim_end().ends_with('}'));
        assert!(out.contains(
            "\"example.com/root@v1.0.0\" [URL=\"https://pkg.go.dev/example.com/root@v1.0.0\",fillcolor=\"black\",fontcolor=\"white\"]"
        ));
        assert!(out.contains(
            "\"example.com/root@v1.0.0\" -> \"example.com/b@v1.0.0\" [class=\"surprise\",style=\"dashed\"];"
        ));
        assert!(out
            .contains("\"example.com/a@v1.0.0\" -> \"example.com/root@v1.0.0\" [];"));
    }
}
