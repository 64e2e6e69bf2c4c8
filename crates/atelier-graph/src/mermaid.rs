use atelier_core::types::StepKind;

use crate::graph::Graph;

/// Render a compiled graph as a Mermaid `graph TD` diagram.
///
/// Pure serialization over the graph: one line per node (shape keyed by
/// kind), then one line per edge, in declaration/derivation order. Identical
/// input yields byte-identical output, so this is safe for diff-based
/// diagnostics.
pub fn render(graph: &Graph) -> String {
    let mut out = String::from("graph TD;\n");

    for node in &graph.nodes {
        let (open, close) = match node.kind {
            StepKind::Start | StepKind::End => ("((", "))"),
            StepKind::Process => ("[", "]"),
            StepKind::Decision => ("{", "}"),
            StepKind::Parallel => ("{{", "}}"),
        };
        out.push_str(&format!(
            "  {}{}\"{}\"{};\n",
            node.id, open, node.name, close
        ));
    }

    for edge in &graph.edges {
        out.push_str(&format!("  {} --> {};\n", edge.from, edge.to));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::types::StepDescriptor;

    fn sample() -> Graph {
        Graph::compile(vec![
            StepDescriptor::new("start", StepKind::Start, "Start task"),
            StepDescriptor::new("work", StepKind::Process, "Do work").depends_on("start"),
            StepDescriptor::new("pick", StepKind::Decision, "Pick branch").depends_on("work"),
            StepDescriptor::new("end", StepKind::End, "End task").depends_on("pick"),
        ])
    }

    #[test]
    fn test_render_shapes_and_edges() {
        let out = render(&sample());

        assert!(out.starts_with("graph TD;\n"));
        assert!(out.contains("  start((\"Start task\"));\n"));
        assert!(out.contains("  work[\"Do work\"];\n"));
        assert!(out.contains("  pick{\"Pick branch\"};\n"));
        assert!(out.contains("  end((\"End task\"));\n"));
        assert!(out.contains("  start --> work;\n"));
        assert!(out.contains("  work --> pick;\n"));
        assert!(out.contains("  pick --> end;\n"));
    }

    #[test]
    fn test_render_is_idempotent() {
        let graph = sample();
        assert_eq!(render(&graph), render(&graph));
    }

    #[test]
    fn test_nodes_precede_edges() {
        let out = render(&sample());
        let first_edge = out.find("-->").unwrap();
        let last_node = out.rfind("\"));").unwrap();
        assert!(last_node < first_edge);
    }
}
