//! Witnesses: a witness ID, its comparisons against every other witness, and
//! the derived potential-ancestor ranking.
//!
//! A witness can be built two ways: from an apparatus (computing all
//! comparisons) or from comparisons loaded out of the persisted cache. Both
//! paths derive the same potential-ancestor ordering, so downstream analyses
//! see identical results regardless of where the data came from.

use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::apparatus::Apparatus;
use crate::comparison::{compare_witnesses, GenealogicalComparison};

/// Predicate deciding whether a secondary witness counts as a potential
/// ancestor of the comparison's primary. The default is the standard CBGM
/// rule; callers may swap in a stricter filter.
pub type AncestorPredicate = fn(&GenealogicalComparison) -> bool;

/// Standard rule: the secondary's reading is prior to the primary's more
/// often than the reverse.
pub fn default_ancestor_predicate(comp: &GenealogicalComparison) -> bool {
    comp.posterior.len() > comp.prior.len()
}

/// A witness with its comparisons and derived orderings, frozen after
/// construction (the one exception is the stemmatic-ancestor list, which the
/// global stemma pass fills in).
#[derive(Debug, Clone)]
pub struct Witness {
    id: String,
    comparisons: Vec<GenealogicalComparison>,
    by_secondary: HashMap<String, usize>,
    potential_ancestor_ids: Vec<String>,
    stemmatic_ancestor_ids: Vec<String>,
}

impl Witness {
    /// Build a witness against every witness of the apparatus, applying the
    /// classic-mode adjustment when the apparatus was ingested with it.
    pub fn from_apparatus(id: &str, app: &Apparatus) -> Result<Self> {
        if !app.list_wit().iter().any(|w| w == id) {
            return Err(anyhow!("witness `{id}` is not in the apparatus"));
        }
        let comparisons: Vec<GenealogicalComparison> = app
            .list_wit()
            .iter()
            .map(|s| compare_witnesses(app, id, s))
            .collect();
        let mut wit = Self::from_comparisons(id, comparisons);
        if app.classic() {
            wit.apply_classic_rule(app);
        }
        debug!(
            witness = id,
            potential_ancestors = wit.potential_ancestor_ids.len(),
            "initialized witness"
        );
        Ok(wit)
    }

    /// Assemble a witness from previously computed comparisons (the cache
    /// loading path). Comparisons keep their given order; the
    /// potential-ancestor ranking is recomputed from the bitmaps.
    pub fn from_comparisons(id: &str, comparisons: Vec<GenealogicalComparison>) -> Self {
        Self::with_predicate(id, comparisons, default_ancestor_predicate)
    }

    /// Like [`Witness::from_comparisons`] with a custom ancestor predicate.
    pub fn with_predicate(
        id: &str,
        comparisons: Vec<GenealogicalComparison>,
        predicate: AncestorPredicate,
    ) -> Self {
        let by_secondary: HashMap<String, usize> = comparisons
            .iter()
            .enumerate()
            .map(|(i, c)| (c.secondary.clone(), i))
            .collect();
        let potential_ancestor_ids = rank_potential_ancestors(id, &comparisons, predicate);
        Self {
            id: id.to_string(),
            comparisons,
            by_secondary,
            potential_ancestor_ids,
            stemmatic_ancestor_ids: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// All comparisons, in the order they were built (apparatus witness
    /// order, or cache row order).
    pub fn comparisons(&self) -> &[GenealogicalComparison] {
        &self.comparisons
    }

    pub fn comparison_for(&self, secondary: &str) -> Option<&GenealogicalComparison> {
        self.by_secondary.get(secondary).map(|&i| &self.comparisons[i])
    }

    /// Potential ancestors in rank order (best first).
    pub fn potential_ancestor_ids(&self) -> &[String] {
        &self.potential_ancestor_ids
    }

    /// 1-based rank of a potential ancestor, if it is one.
    pub fn ancestor_rank(&self, id: &str) -> Option<usize> {
        self.potential_ancestor_ids
            .iter()
            .position(|a| a == id)
            .map(|i| i + 1)
    }

    pub fn stemmatic_ancestor_ids(&self) -> &[String] {
        &self.stemmatic_ancestor_ids
    }

    pub fn set_stemmatic_ancestor_ids(&mut self, ids: Vec<String>) {
        self.stemmatic_ancestor_ids = ids;
    }

    /// Classic CBGM rule for unclear units: when this witness agrees with the
    /// majority reading among its potential ancestors at an unclear unit,
    /// that unit counts as explained (at cost 0) in every comparison whose
    /// unclear set contains it. Ties in the majority vote leave the unit
    /// unexplained.
    fn apply_classic_rule(&mut self, app: &Apparatus) {
        let ancestors = self.potential_ancestor_ids.clone();
        if ancestors.is_empty() {
            return;
        }
        let majority_at: Vec<Option<String>> = app
            .units()
            .iter()
            .map(|unit| {
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for a in &ancestors {
                    if let Some(r) = unit.reading_for(a) {
                        *counts.entry(r).or_insert(0) += 1;
                    }
                }
                let best = counts.values().copied().max()?;
                let mut leaders: Vec<&str> = counts
                    .iter()
                    .filter(|(_, &c)| c == best)
                    .map(|(&r, _)| r)
                    .collect();
                if leaders.len() == 1 {
                    Some(leaders.pop().unwrap().to_string())
                } else {
                    None
                }
            })
            .collect();

        for comp in &mut self.comparisons {
            let unclear: Vec<u32> = comp.unclear.iter().collect();
            for i in unclear {
                let unit = &app.units()[i as usize];
                let Some(r_p) = unit.reading_for(&self.id) else {
                    continue;
                };
                if majority_at[i as usize].as_deref() == Some(r_p) {
                    comp.explained.insert(i);
                }
            }
        }
    }
}

/// Rank the qualifying secondaries by descending agreement ratio, then raw
/// agreement count, then by how often the secondary is prior, then ascending
/// witness ID. The result is a total order, so re-runs over identical inputs
/// produce identical orderings.
fn rank_potential_ancestors(
    id: &str,
    comparisons: &[GenealogicalComparison],
    predicate: AncestorPredicate,
) -> Vec<String> {
    let mut ranked: Vec<&GenealogicalComparison> = comparisons
        .iter()
        .filter(|c| c.secondary != id && predicate(c))
        .collect();
    ranked.sort_by(|a, b| compare_rank(b, a));
    ranked.iter().map(|c| c.secondary.clone()).collect()
}

/// The potential-ancestor rank key as a comparator. `Ordering::Greater`
/// means `a` ranks higher.
pub fn compare_rank(a: &GenealogicalComparison, b: &GenealogicalComparison) -> Ordering {
    a.agreement_ratio()
        .partial_cmp(&b.agreement_ratio())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.agreements.len().cmp(&b.agreements.len()))
        .then_with(|| a.posterior.len().cmp(&b.posterior.len()))
        .then_with(|| b.secondary.cmp(&a.secondary))
}
