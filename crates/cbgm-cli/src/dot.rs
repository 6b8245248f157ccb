//! Graphviz DOT rendering for local stemmata, textual-flow diagrams, and the
//! global stemma.
//!
//! This lives in the CLI crate: it is tooling output, evolves independently
//! of the engine, and nothing in the core needs to know about Graphviz.

use std::collections::HashMap;

use cbgm_core::{
    FlowRoot, GlobalStemma, LocalStemma, TextualFlow, TextualFlowEdge, TextualFlowNode,
};

fn dot_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Stable node identifier from an arbitrary witness/reading ID.
fn node_id(prefix: &str, name: &str, index: usize) -> String {
    let _ = name;
    format!("{prefix}{index}")
}

/// Fill colors cycled over the readings of a unit so flow diagrams are
/// scannable; the palette wraps for units with many readings.
const READING_FILLS: [&str; 6] = [
    "#eaf2ff", "#c6f6d5", "#fff3c7", "#e9d8fd", "#ffd7d7", "#d7f4f4",
];

/// Render one local stemma. Zero-weight edges are drawn dashed (equal
/// priority); other edges carry their weight as a label.
pub fn render_local_stemma(stemma: &LocalStemma) -> String {
    let mut out = String::new();
    out.push_str("digraph local_stemma {\n");
    out.push_str("  rankdir=TB;\n");
    out.push_str("  node [shape=ellipse, fontname=\"Helvetica\"];\n");
    out.push_str("  edge [fontname=\"Helvetica\"];\n");
    out.push_str(&format!(
        "  label=\"{}\";\n  labelloc=t;\n\n",
        dot_escape(stemma.label())
    ));

    let index: HashMap<&str, usize> = stemma
        .readings()
        .iter()
        .enumerate()
        .map(|(i, r)| (r.as_str(), i))
        .collect();
    for (i, reading) in stemma.readings().iter().enumerate() {
        let mut attrs = vec![format!("label=\"{}\"", dot_escape(reading))];
        if stemma.is_unclear(reading) {
            attrs.push("style=dashed".to_string());
            attrs.push("color=gray50".to_string());
        }
        out.push_str(&format!(
            "  {} [{}];\n",
            node_id("r", reading, i),
            attrs.join(", ")
        ));
    }
    out.push('\n');
    for edge in stemma.edges() {
        let (Some(&p), Some(&q)) = (
            index.get(edge.prior.as_str()),
            index.get(edge.posterior.as_str()),
        ) else {
            continue;
        };
        let mut attrs = Vec::new();
        if edge.weight == 0.0 {
            attrs.push("style=dashed".to_string());
            attrs.push("dir=none".to_string());
        } else {
            attrs.push(format!("label=\"{}\"", edge.weight));
        }
        out.push_str(&format!(
            "  {} -> {} [{}];\n",
            node_id("r", &edge.prior, p),
            node_id("r", &edge.posterior, q),
            attrs.join(", ")
        ));
    }
    out.push_str("}\n");
    out
}

fn flow_node_line(
    id: &str,
    node: &TextualFlowNode,
    fill: &str,
) -> String {
    let mut attrs = vec![
        format!(
            "label=\"{} ({})\"",
            dot_escape(&node.witness),
            dot_escape(&node.reading)
        ),
        "shape=box".to_string(),
        "style=\"rounded,filled\"".to_string(),
        format!("fillcolor=\"{fill}\""),
    ];
    match node.root {
        Some(FlowRoot::TextualLoss) => {
            attrs.push("color=\"#b83232\"".to_string());
            attrs.push("penwidth=2".to_string());
        }
        Some(FlowRoot::StemmaRoot) => {
            attrs.push("color=\"#2f855a\"".to_string());
            attrs.push("penwidth=2".to_string());
        }
        None => {}
    }
    format!("  {id} [{}];\n", attrs.join(", "))
}

fn flow_edge_line(
    ids: &HashMap<&str, String>,
    edge: &TextualFlowEdge,
    strengths: bool,
) -> Option<String> {
    let src = ids.get(edge.ancestor.as_str())?;
    let dst = ids.get(edge.descendant.as_str())?;
    let mut attrs = Vec::new();
    // Rank 1 edges are the unmarked default; deeper connectivity is labeled.
    if edge.rank > 1 {
        attrs.push(format!("label=\"{}\"", edge.rank));
    }
    if strengths {
        attrs.push(format!("penwidth={:.2}", 1.0 + 4.0 * edge.strength));
    }
    if attrs.is_empty() {
        Some(format!("  {src} -> {dst};\n"))
    } else {
        Some(format!("  {src} -> {dst} [{}];\n", attrs.join(", ")))
    }
}

fn render_flow_graph(
    title: &str,
    nodes: &[&TextualFlowNode],
    edges: &[&TextualFlowEdge],
    readings: &[&str],
    strengths: bool,
) -> String {
    let mut out = String::new();
    out.push_str("digraph textual_flow {\n");
    out.push_str("  rankdir=LR;\n");
    out.push_str("  node [fontname=\"Helvetica\"];\n");
    out.push_str("  edge [fontname=\"Helvetica\"];\n");
    out.push_str(&format!("  label=\"{}\";\n  labelloc=t;\n\n", dot_escape(title)));

    let fill_of: HashMap<&str, &str> = readings
        .iter()
        .enumerate()
        .map(|(i, r)| (*r, READING_FILLS[i % READING_FILLS.len()]))
        .collect();
    let ids: HashMap<&str, String> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.witness.as_str(), node_id("w", &n.witness, i)))
        .collect();

    for node in nodes {
        let fill = fill_of.get(node.reading.as_str()).copied().unwrap_or("#ffffff");
        out.push_str(&flow_node_line(&ids[node.witness.as_str()], node, fill));
    }
    out.push('\n');
    for edge in edges {
        if let Some(line) = flow_edge_line(&ids, edge, strengths) {
            out.push_str(&line);
        }
    }
    out.push_str("}\n");
    out
}

/// The complete textual-flow diagram of one unit.
pub fn render_textual_flow(flow: &TextualFlow, readings: &[&str], strengths: bool) -> String {
    let nodes: Vec<&TextualFlowNode> = flow.nodes().iter().collect();
    let edges: Vec<&TextualFlowEdge> = flow.edges().iter().collect();
    render_flow_graph(flow.label(), &nodes, &edges, readings, strengths)
}

/// Coherence in the attestation of one reading.
pub fn render_coherence_in_attestation(
    flow: &TextualFlow,
    reading: &str,
    readings: &[&str],
    strengths: bool,
) -> String {
    let (nodes, edges) = flow.attestation_view(reading);
    let title = format!("{} R{}", flow.label(), reading);
    render_flow_graph(&title, &nodes, &edges, readings, strengths)
}

/// Coherence at variant passages: flow between different readings only.
pub fn render_coherence_at_variants(
    flow: &TextualFlow,
    readings: &[&str],
    strengths: bool,
) -> String {
    let edges = flow.variant_view();
    let nodes: Vec<&TextualFlowNode> = flow
        .nodes()
        .iter()
        .filter(|n| {
            edges
                .iter()
                .any(|e| e.ancestor == n.witness || e.descendant == n.witness)
        })
        .collect();
    render_flow_graph(flow.label(), &nodes, &edges, readings, strengths)
}

/// The global stemma. `lengths` prints genealogical costs as edge labels;
/// `strengths` widens edges by agreement proportion.
pub fn render_global_stemma(stemma: &GlobalStemma, lengths: bool, strengths: bool) -> String {
    let mut out = String::new();
    out.push_str("digraph global_stemma {\n");
    out.push_str("  rankdir=TB;\n");
    out.push_str("  node [shape=box, style=\"rounded,filled\", fillcolor=\"#eaf2ff\", fontname=\"Helvetica\"];\n");
    out.push_str("  edge [fontname=\"Helvetica\"];\n\n");

    let ids: HashMap<&str, String> = stemma
        .nodes
        .iter()
        .enumerate()
        .map(|(i, w)| (w.as_str(), node_id("w", w, i)))
        .collect();
    for node in &stemma.nodes {
        out.push_str(&format!(
            "  {} [label=\"{}\"];\n",
            ids[node.as_str()],
            dot_escape(node)
        ));
    }
    out.push('\n');
    for edge in &stemma.edges {
        let (Some(src), Some(dst)) = (
            ids.get(edge.ancestor.as_str()),
            ids.get(edge.descendant.as_str()),
        ) else {
            continue;
        };
        let mut attrs = Vec::new();
        if lengths {
            attrs.push(format!("label=\"{}\"", crate::tables::format_cost(edge.length)));
        }
        if strengths {
            attrs.push(format!("penwidth={:.2}", 1.0 + 4.0 * edge.strength));
        }
        if attrs.is_empty() {
            out.push_str(&format!("  {src} -> {dst};\n"));
        } else {
            out.push_str(&format!("  {src} -> {dst} [{}];\n", attrs.join(", ")));
        }
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbgm_core::{
        Apparatus, CollationDoc, IngestOptions, LocalStemmaEdge, LocalStemmaVertex, Witness,
    };

    fn stemma() -> LocalStemma {
        LocalStemma::new(
            "u1",
            "1:1",
            vec![
                LocalStemmaVertex::new("a"),
                LocalStemmaVertex::new("a-orth"),
                LocalStemmaVertex::new("b"),
            ],
            vec![
                LocalStemmaEdge {
                    prior: "a".into(),
                    posterior: "a-orth".into(),
                    weight: 0.0,
                },
                LocalStemmaEdge {
                    prior: "a".into(),
                    posterior: "b".into(),
                    weight: 1.0,
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn local_stemma_dot_marks_equal_priority_edges() {
        let dot = render_local_stemma(&stemma());
        assert!(dot.starts_with("digraph local_stemma {"));
        assert!(dot.contains("style=dashed, dir=none"));
        assert!(dot.contains("label=\"1\""));
    }

    #[test]
    fn flow_dot_colors_by_reading_and_flags_roots() {
        let doc: CollationDoc = serde_json::from_value(serde_json::json!({
            "witnesses": ["A", "W"],
            "units": [{
                "id": "u1",
                "label": "1:1",
                "readings": [
                    {"id": "a", "witnesses": ["A"]},
                    {"id": "b", "witnesses": ["W"]}
                ],
                "edges": [{"prior": "a", "posterior": "b", "weight": 1.0}]
            }]
        }))
        .unwrap();
        let app = Apparatus::from_collation(&doc, &IngestOptions::default()).unwrap();
        let witnesses: Vec<Witness> = app
            .list_wit()
            .iter()
            .map(|w| Witness::from_apparatus(w, &app).unwrap())
            .collect();
        let flow = TextualFlow::build(&app.units()[0], &witnesses, None);
        let readings: Vec<&str> = app.units()[0].readings().iter().map(String::as_str).collect();

        let dot = render_textual_flow(&flow, &readings, true);
        assert!(dot.contains("A (a)"));
        assert!(dot.contains("W (b)"));
        assert!(dot.contains("penwidth"));
        // A reads the stemma root and is drawn as one.
        assert!(dot.contains("#2f855a"));
    }
}
