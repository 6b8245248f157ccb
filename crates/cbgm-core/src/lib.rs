//! Genealogical comparison engine for the Coherence-Based Genealogical
//! Method (CBGM).
//!
//! Given a collation of manuscript witnesses over a set of variation units,
//! the engine computes pairwise genealogical relationships as compact
//! bitmaps, derives each witness's potential ancestors, optimizes substemmata
//! by weighted set cover, and constructs per-unit textual-flow graphs and the
//! global stemma.
//!
//! ## Module organization
//!
//! - `local_stemma`: per-unit DAG of reading priorities, shortest-path costs
//! - `apparatus`: the normalized collation and its ingestion options
//! - `comparison`: pairwise bitmap statistics (`GenealogicalComparison`)
//! - `witness`: per-witness comparisons and potential-ancestor ranking
//! - `set_cover`: branch-and-bound substemma optimizer
//! - `textual_flow`: stemmatic-ancestor selection per variation unit
//! - `global_stemma`: canonical substemmata assembled into one DAG
//! - `pool`: bounded worker pool for the per-witness stages
//!
//! All externally observable orderings (witness list, unit list, ancestor
//! ranking, substemma enumeration) are deterministic and independent of
//! scheduling; bit indices are fixed by the apparatus's frozen unit order.

pub mod apparatus;
pub mod comparison;
pub mod global_stemma;
pub mod local_stemma;
pub mod pool;
pub mod set_cover;
pub mod textual_flow;
pub mod witness;

pub use apparatus::{
    Apparatus, CollationDoc, CollationReading, CollationUnit, IngestOptions, VariationUnit,
    UNLIMITED_CONNECTIVITY,
};
pub use comparison::{compare_witnesses, GenealogicalComparison};
pub use global_stemma::{GlobalStemma, GlobalStemmaEdge};
pub use local_stemma::{LocalStemma, LocalStemmaEdge, LocalStemmaVertex};
pub use pool::{run_over_items, CancellationToken};
pub use set_cover::{
    canonical_solution, SearchLimits, SetCoverProblem, SetCoverResult, SetCoverRow,
    SetCoverSolution,
};
pub use textual_flow::{FlowRoot, TextualFlow, TextualFlowEdge, TextualFlowNode};
pub use witness::{compare_rank, default_ancestor_predicate, AncestorPredicate, Witness};

/// Initialize every witness of the apparatus on the worker pool, in witness
/// list order.
pub fn initialize_witnesses(app: &Apparatus) -> anyhow::Result<Vec<Witness>> {
    let ids: Vec<String> = app.list_wit().to_vec();
    run_over_items(&ids, |id, _| Witness::from_apparatus(id, app))
}
