//! Global stemma: inferred ancestry over the whole witness list.
//!
//! Every witness contributes one canonical substemma (its cheapest cover,
//! ties broken by the lexicographically smallest sorted-ID tuple); the graph
//! has one node per witness and one edge per selected stemmatic ancestor.

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use crate::pool::run_over_items;
use crate::set_cover::{canonical_solution, SearchLimits, SetCoverProblem};
use crate::witness::Witness;

/// One ancestry edge. `length` is the genealogical cost of deriving the
/// descendant from this ancestor; `strength` the agreement proportion.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalStemmaEdge {
    pub ancestor: String,
    pub descendant: String,
    pub length: f64,
    pub strength: f64,
}

/// The assembled global stemma.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalStemma {
    /// Witness IDs in witness-list order.
    pub nodes: Vec<String>,
    pub edges: Vec<GlobalStemmaEdge>,
    /// Witnesses whose substemma search hit its time budget.
    pub possibly_suboptimal: Vec<String>,
}

impl GlobalStemma {
    /// Optimize one substemma per witness (in parallel) and assemble the
    /// stemma. Witnesses with no feasible substemma — the initial text, and
    /// any witness whose extant units cannot all be explained — simply get
    /// no incoming edges. The canonical stemmatic-ancestor lists are written
    /// back onto the witnesses.
    pub fn build(witnesses: &mut [Witness], per_witness_budget: Option<Duration>) -> Result<Self> {
        let selections = run_over_items(&*witnesses, |witness, token| {
            let problem = SetCoverProblem::for_witness(witness);
            let limits = SearchLimits {
                deadline: per_witness_budget.map(|b| Instant::now() + b),
                cancel: Some(token.flag()),
            };
            let result = problem.solve(None, &limits);
            let ancestors = canonical_solution(&result.solutions)
                .map(|s| s.rows.clone())
                .unwrap_or_default();
            debug!(
                witness = witness.id(),
                ancestors = ancestors.len(),
                truncated = result.possibly_suboptimal,
                "optimized substemma"
            );
            Ok((ancestors, result.possibly_suboptimal))
        })?;

        let mut stemma = GlobalStemma::default();
        for (witness, (ancestors, truncated)) in witnesses.iter_mut().zip(selections) {
            stemma.nodes.push(witness.id().to_string());
            if truncated {
                stemma.possibly_suboptimal.push(witness.id().to_string());
            }
            for ancestor in &ancestors {
                let comp = witness.comparison_for(ancestor);
                stemma.edges.push(GlobalStemmaEdge {
                    ancestor: ancestor.clone(),
                    descendant: witness.id().to_string(),
                    length: comp.map(|c| c.cost).unwrap_or(0.0),
                    strength: comp.map(|c| c.agreement_ratio()).unwrap_or(0.0),
                });
            }
            witness.set_stemmatic_ancestor_ids(ancestors);
        }
        Ok(stemma)
    }
}
