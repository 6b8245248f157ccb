//! Textual flow at one variation unit.
//!
//! For every witness extant at the unit, at most one *stemmatic ancestor* is
//! selected: the highest-ranked potential ancestor, within the unit's
//! connectivity window, whose reading is equal or prior to the witness's
//! reading. Witnesses with no such ancestor are drawn as roots — either
//! because their reading heads the local stemma, or as a *textual loss*
//! (the reading arose independently, or by contamination from beyond the
//! window).

use std::collections::HashMap;

use crate::apparatus::{VariationUnit, UNLIMITED_CONNECTIVITY};
use crate::witness::Witness;

/// Why a witness has no incoming flow edge at this unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowRoot {
    /// The witness's reading has no prior reading in the local stemma.
    StemmaRoot,
    /// A prior reading exists, but no in-window ancestor attests one.
    TextualLoss,
}

/// One witness node in the flow graph, colored by its reading.
#[derive(Debug, Clone, PartialEq)]
pub struct TextualFlowNode {
    pub witness: String,
    pub reading: String,
    /// Set when the witness has no stemmatic ancestor at this unit.
    pub root: Option<FlowRoot>,
}

/// One stemmatic-ancestor selection.
#[derive(Debug, Clone, PartialEq)]
pub struct TextualFlowEdge {
    pub ancestor: String,
    pub descendant: String,
    /// 1-based rank of the ancestor in the descendant's potential-ancestor
    /// ordering.
    pub rank: usize,
    /// Genealogical cost contribution at this unit.
    pub cost: f64,
    /// Agreement proportion between the pair over their common extant units;
    /// used to style edge strength.
    pub strength: f64,
}

/// The complete textual-flow graph of one variation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TextualFlow {
    unit_id: String,
    label: String,
    connectivity: u32,
    nodes: Vec<TextualFlowNode>,
    edges: Vec<TextualFlowEdge>,
}

impl TextualFlow {
    /// Build the flow graph for `unit` over the given witnesses (in witness
    /// list order). `connectivity_override` replaces the unit's own limit
    /// when present.
    pub fn build(
        unit: &VariationUnit,
        witnesses: &[Witness],
        connectivity_override: Option<u32>,
    ) -> Self {
        let connectivity = connectivity_override.unwrap_or_else(|| unit.connectivity());
        let stemma = unit.local_stemma();
        let extant: HashMap<&str, &Witness> = witnesses
            .iter()
            .filter(|w| unit.reading_for(w.id()).is_some())
            .map(|w| (w.id(), w))
            .collect();

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for witness in witnesses {
            let Some(r_w) = unit.reading_for(witness.id()) else {
                continue;
            };

            let window = witness
                .potential_ancestor_ids()
                .iter()
                .take(if connectivity == UNLIMITED_CONNECTIVITY {
                    usize::MAX
                } else {
                    connectivity as usize
                });

            let mut selected = None;
            for (rank0, ancestor_id) in window.enumerate() {
                let Some(ancestor) = extant.get(ancestor_id.as_str()) else {
                    continue;
                };
                let Some(r_a) = unit.reading_for(ancestor.id()) else {
                    continue;
                };
                if stemma.is_equal_or_prior(r_a, r_w) {
                    selected = Some((ancestor_id.clone(), rank0 + 1, r_a));
                    break;
                }
            }

            match selected {
                Some((ancestor_id, rank, r_a)) => {
                    let strength = witness
                        .comparison_for(&ancestor_id)
                        .map(|c| c.agreement_ratio())
                        .unwrap_or(0.0);
                    edges.push(TextualFlowEdge {
                        ancestor: ancestor_id,
                        descendant: witness.id().to_string(),
                        rank,
                        cost: stemma.path_cost(r_a, r_w).unwrap_or(0.0),
                        strength,
                    });
                    nodes.push(TextualFlowNode {
                        witness: witness.id().to_string(),
                        reading: r_w.to_string(),
                        root: None,
                    });
                }
                None => {
                    let root = if stemma.is_root(r_w) {
                        FlowRoot::StemmaRoot
                    } else {
                        FlowRoot::TextualLoss
                    };
                    nodes.push(TextualFlowNode {
                        witness: witness.id().to_string(),
                        reading: r_w.to_string(),
                        root: Some(root),
                    });
                }
            }
        }

        Self {
            unit_id: unit.id().to_string(),
            label: unit.label().to_string(),
            connectivity,
            nodes,
            edges,
        }
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn connectivity(&self) -> u32 {
        self.connectivity
    }

    /// All extant witnesses at the unit, in witness-list order.
    pub fn nodes(&self) -> &[TextualFlowNode] {
        &self.nodes
    }

    /// The complete flow: every stemmatic-ancestor edge.
    pub fn edges(&self) -> &[TextualFlowEdge] {
        &self.edges
    }

    pub fn node_for(&self, witness: &str) -> Option<&TextualFlowNode> {
        self.nodes.iter().find(|n| n.witness == witness)
    }

    /// Coherence in the attestation of `reading`: the subgraph of witnesses
    /// reading it, keeping only edges internal to that set.
    pub fn attestation_view(&self, reading: &str) -> (Vec<&TextualFlowNode>, Vec<&TextualFlowEdge>) {
        let nodes: Vec<&TextualFlowNode> = self
            .nodes
            .iter()
            .filter(|n| n.reading == reading)
            .collect();
        let edges = self
            .edges
            .iter()
            .filter(|e| {
                nodes.iter().any(|n| n.witness == e.descendant)
                    && nodes.iter().any(|n| n.witness == e.ancestor)
            })
            .collect();
        (nodes, edges)
    }

    /// Coherence at variant passages: only the edges whose endpoints read
    /// different readings.
    pub fn variant_view(&self) -> Vec<&TextualFlowEdge> {
        self.edges
            .iter()
            .filter(|e| {
                let anc = self.node_for(&e.ancestor).map(|n| n.reading.as_str());
                let desc = self.node_for(&e.descendant).map(|n| n.reading.as_str());
                anc.is_some() && anc != desc
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apparatus::{Apparatus, CollationDoc, IngestOptions};
    use crate::witness::Witness;

    /// Five potential ancestors of W in rank order A1..A5. At the focus unit
    /// u0 the chain is a -> b -> c: only A3 reads the prior `a`, W reads `b`,
    /// and the rest read the later `c`. Padding units make every A_i prior
    /// to W (u1..u5) and tune agreement counts so the ranks come out
    /// A1 > A2 > A3 > A4 > A5 (g1..g5).
    fn flow_fixture() -> (Apparatus, Vec<Witness>) {
        let ancestors = ["A1", "A2", "A3", "A4", "A5"];
        let mut units = vec![serde_json::json!({
            "id": "u0",
            "connectivity": 2,
            "readings": [
                {"id": "a", "witnesses": ["A3"]},
                {"id": "b", "witnesses": ["W"]},
                {"id": "c", "witnesses": ["A1", "A2", "A4", "A5"]}
            ],
            "edges": [
                {"prior": "a", "posterior": "b", "weight": 1.0},
                {"prior": "b", "posterior": "c", "weight": 1.0}
            ]
        })];
        for i in 1..=5 {
            units.push(serde_json::json!({
                "id": format!("u{i}"),
                "readings": [
                    {"id": "x", "witnesses": ancestors},
                    {"id": "y", "witnesses": ["W"]}
                ],
                "edges": [{"prior": "x", "posterior": "y", "weight": 1.0}]
            }));
        }
        for k in 1..=5usize {
            let with_w: Vec<&str> = std::iter::once("W")
                .chain(ancestors.iter().copied().take(6 - k))
                .collect();
            let rest: Vec<&str> = ancestors.iter().copied().skip(6 - k).collect();
            units.push(serde_json::json!({
                "id": format!("g{k}"),
                "readings": [
                    {"id": "z", "witnesses": with_w},
                    {"id": "w", "witnesses": rest}
                ],
                "edges": []
            }));
        }
        let doc: CollationDoc = serde_json::from_value(serde_json::json!({
            "witnesses": ["A1", "A2", "A3", "A4", "A5", "W"],
            "units": units,
        }))
        .unwrap();
        let app = Apparatus::from_collation(&doc, &IngestOptions::default()).unwrap();
        let witnesses: Vec<Witness> = app
            .list_wit()
            .iter()
            .map(|w| Witness::from_apparatus(w, &app).unwrap())
            .collect();
        (app, witnesses)
    }

    #[test]
    fn ranking_orders_the_five_ancestors() {
        let (_, witnesses) = flow_fixture();
        let w = witnesses.iter().find(|w| w.id() == "W").unwrap();
        assert_eq!(
            w.potential_ancestor_ids(),
            &["A1", "A2", "A3", "A4", "A5"]
        );
    }

    #[test]
    fn out_of_window_prior_reading_is_a_textual_loss() {
        let (app, witnesses) = flow_fixture();
        // Connectivity 2 comes from the unit: W's window is [A1, A2], both
        // reading the later `c`. The only source of `b`'s prior reading is
        // A3 at rank 3.
        let flow = TextualFlow::build(&app.units()[0], &witnesses, None);
        let w_node = flow.node_for("W").unwrap();
        assert_eq!(w_node.root, Some(FlowRoot::TextualLoss));
        assert!(flow.edges().iter().all(|e| e.descendant != "W"));
    }

    #[test]
    fn widening_the_window_restores_the_flow_edge() {
        let (app, witnesses) = flow_fixture();
        let flow = TextualFlow::build(&app.units()[0], &witnesses, Some(3));
        let edge = flow.edges().iter().find(|e| e.descendant == "W").unwrap();
        assert_eq!(edge.ancestor, "A3");
        assert_eq!(edge.rank, 3);
        assert_eq!(edge.cost, 1.0);
    }

    #[test]
    fn stemma_root_readings_are_roots_not_losses() {
        let (app, witnesses) = flow_fixture();
        let flow = TextualFlow::build(&app.units()[0], &witnesses, None);
        let a3 = flow.node_for("A3").unwrap();
        assert_eq!(a3.root, Some(FlowRoot::StemmaRoot));
    }

    #[test]
    fn flow_construction_is_idempotent() {
        let (app, witnesses) = flow_fixture();
        let once = TextualFlow::build(&app.units()[0], &witnesses, Some(2));
        let twice = TextualFlow::build(&app.units()[0], &witnesses, Some(2));
        assert_eq!(once, twice);
    }

    #[test]
    fn views_restrict_nodes_and_edges() {
        let (app, witnesses) = flow_fixture();
        let flow = TextualFlow::build(&app.units()[0], &witnesses, Some(5));

        let (c_nodes, c_edges) = flow.attestation_view("c");
        assert!(!c_nodes.is_empty());
        assert!(c_nodes.iter().all(|n| n.reading == "c"));
        assert!(c_edges.iter().all(|e| {
            flow.node_for(&e.ancestor).unwrap().reading == "c"
                && flow.node_for(&e.descendant).unwrap().reading == "c"
        }));

        for e in flow.variant_view() {
            let anc = flow.node_for(&e.ancestor).unwrap();
            let desc = flow.node_for(&e.descendant).unwrap();
            assert_ne!(anc.reading, desc.reading);
        }
    }
}
