//! Local stemma: the per-variation-unit DAG of reading priorities.
//!
//! Each variation unit carries a small directed graph whose vertices are
//! reading IDs and whose edges assert "the prior reading gave rise to the
//! posterior reading" at a non-negative cost. Weight-0 edges mean the two
//! readings have equal priority (orthographic subvariants and the like), so
//! they are inserted in both directions before the shortest-path pass: every
//! member of a zero-weight component can stand in for every other at cost 0.
//!
//! Derived products, computed once at construction:
//! - an all-pairs minimum-cost path matrix (`None` = unreachable),
//! - the equal-priority classes (connected components of weight-0 edges).

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

/// One directed priority assertion between two readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalStemmaEdge {
    pub prior: String,
    pub posterior: String,
    pub weight: f64,
}

/// A reading vertex. The `unclear` flag marks readings whose genealogical
/// placement the editors left open; comparisons route such units into the
/// `unclear` bucket instead of a categorical one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalStemmaVertex {
    pub id: String,
    #[serde(default)]
    pub unclear: bool,
}

impl LocalStemmaVertex {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            unclear: false,
        }
    }
}

/// The frozen local stemma of one variation unit.
#[derive(Debug, Clone)]
pub struct LocalStemma {
    unit_id: String,
    label: String,
    readings: Vec<String>,
    index: HashMap<String, usize>,
    unclear: Vec<bool>,
    edges: Vec<LocalStemmaEdge>,
    /// Row-major `n x n` matrix of minimum path costs.
    paths: Vec<Option<f64>>,
    /// Equal-priority class representative per reading index.
    class_of: Vec<usize>,
}

impl LocalStemma {
    /// Build a local stemma from its vertex and edge lists.
    ///
    /// Fails on unknown edge endpoints, negative weights, duplicate reading
    /// IDs, and on any cycle of strictly positive total weight (a logical
    /// contradiction in the priority assertions). Zero-weight cycles are
    /// tolerated; they only enlarge an equal-priority class.
    pub fn new(
        unit_id: impl Into<String>,
        label: impl Into<String>,
        vertices: Vec<LocalStemmaVertex>,
        edges: Vec<LocalStemmaEdge>,
    ) -> Result<Self> {
        let unit_id = unit_id.into();
        let label = label.into();

        let mut readings = Vec::with_capacity(vertices.len());
        let mut unclear = Vec::with_capacity(vertices.len());
        let mut index = HashMap::with_capacity(vertices.len());
        for v in &vertices {
            if index.insert(v.id.clone(), readings.len()).is_some() {
                bail!(
                    "variation unit {unit_id}: duplicate reading ID `{}` in local stemma",
                    v.id
                );
            }
            readings.push(v.id.clone());
            unclear.push(v.unclear);
        }

        let n = readings.len();
        let at = |r: usize, c: usize| r * n + c;
        let mut paths: Vec<Option<f64>> = vec![None; n * n];
        for i in 0..n {
            paths[at(i, i)] = Some(0.0);
        }

        // Union-find over zero-weight edges for the equal-priority classes.
        let mut class_of: Vec<usize> = (0..n).collect();
        fn find(class_of: &mut Vec<usize>, mut i: usize) -> usize {
            while class_of[i] != i {
                class_of[i] = class_of[class_of[i]];
                i = class_of[i];
            }
            i
        }

        for e in &edges {
            let p = *index.get(&e.prior).ok_or_else(|| {
                anyhow!(
                    "variation unit {unit_id}: local stemma edge refers to unknown reading `{}`",
                    e.prior
                )
            })?;
            let q = *index.get(&e.posterior).ok_or_else(|| {
                anyhow!(
                    "variation unit {unit_id}: local stemma edge refers to unknown reading `{}`",
                    e.posterior
                )
            })?;
            if !e.weight.is_finite() || e.weight < 0.0 {
                bail!(
                    "variation unit {unit_id}: edge `{}` -> `{}` has invalid weight {}",
                    e.prior,
                    e.posterior,
                    e.weight
                );
            }
            let shorter = |cur: Option<f64>, cand: f64| match cur {
                Some(c) if c <= cand => Some(c),
                _ => Some(cand),
            };
            paths[at(p, q)] = shorter(paths[at(p, q)], e.weight);
            if e.weight == 0.0 {
                // Equal priority works both ways.
                paths[at(q, p)] = shorter(paths[at(q, p)], 0.0);
                let (rp, rq) = (find(&mut class_of, p), find(&mut class_of, q));
                if rp != rq {
                    class_of[rp.max(rq)] = rp.min(rq);
                }
            }
        }

        // Floyd-Warshall over the non-negative weights.
        for k in 0..n {
            for i in 0..n {
                let Some(ik) = paths[at(i, k)] else { continue };
                for j in 0..n {
                    let Some(kj) = paths[at(k, j)] else { continue };
                    let cand = ik + kj;
                    match paths[at(i, j)] {
                        Some(cur) if cur <= cand => {}
                        _ => paths[at(i, j)] = Some(cand),
                    }
                }
            }
        }

        // A pair that is mutually reachable at positive round-trip cost means
        // the editors asserted both directions of development.
        for i in 0..n {
            for j in (i + 1)..n {
                if let (Some(a), Some(b)) = (paths[at(i, j)], paths[at(j, i)]) {
                    if a + b > 0.0 {
                        bail!(
                            "variation unit {unit_id}: readings `{}` and `{}` lie on a cycle of positive weight",
                            readings[i],
                            readings[j]
                        );
                    }
                }
            }
        }

        // Flatten the union-find so lookups are a single probe.
        let class_of: Vec<usize> = {
            let mut flat = class_of.clone();
            for i in 0..n {
                flat[i] = find(&mut class_of, i);
            }
            flat
        };

        Ok(Self {
            unit_id,
            label,
            readings,
            index,
            unclear,
            edges,
            paths,
            class_of,
        })
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Reading IDs in insertion order.
    pub fn readings(&self) -> &[String] {
        &self.readings
    }

    /// The raw edge list, as given at construction.
    pub fn edges(&self) -> &[LocalStemmaEdge] {
        &self.edges
    }

    pub fn contains(&self, reading: &str) -> bool {
        self.index.contains_key(reading)
    }

    /// Minimum path cost from `prior` to `posterior`, or `None` when
    /// `posterior` is unreachable (or either reading is unknown).
    pub fn path_cost(&self, prior: &str, posterior: &str) -> Option<f64> {
        let p = *self.index.get(prior)?;
        let q = *self.index.get(posterior)?;
        self.paths[p * self.readings.len() + q]
    }

    /// True iff `r2` could descend from `r1`: equal, equal-priority, or
    /// reachable along priority edges.
    pub fn is_equal_or_prior(&self, r1: &str, r2: &str) -> bool {
        self.path_cost(r1, r2).is_some()
    }

    /// True iff the two readings belong to the same equal-priority class.
    pub fn is_equal(&self, r1: &str, r2: &str) -> bool {
        match (self.index.get(r1), self.index.get(r2)) {
            (Some(&a), Some(&b)) => self.class_of[a] == self.class_of[b],
            _ => false,
        }
    }

    /// True iff the reading was flagged as genealogically unclear.
    pub fn is_unclear(&self, reading: &str) -> bool {
        self.index
            .get(reading)
            .map(|&i| self.unclear[i])
            .unwrap_or(false)
    }

    /// True iff no reading outside `reading`'s equal-priority class is prior
    /// to it. Textual flow draws such witnesses as roots.
    pub fn is_root(&self, reading: &str) -> bool {
        let Some(&q) = self.index.get(reading) else {
            return false;
        };
        let n = self.readings.len();
        (0..n).all(|p| {
            self.class_of[p] == self.class_of[q] || self.paths[p * n + q].is_none()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertices(ids: &[&str]) -> Vec<LocalStemmaVertex> {
        ids.iter().map(|id| LocalStemmaVertex::new(*id)).collect()
    }

    fn edge(prior: &str, posterior: &str, weight: f64) -> LocalStemmaEdge {
        LocalStemmaEdge {
            prior: prior.into(),
            posterior: posterior.into(),
            weight,
        }
    }

    #[test]
    fn path_costs_follow_minimum_weight_routes() {
        let ls = LocalStemma::new(
            "u1",
            "u1",
            vertices(&["a", "b", "c"]),
            vec![edge("a", "b", 1.0), edge("b", "c", 1.0), edge("a", "c", 5.0)],
        )
        .unwrap();

        assert_eq!(ls.path_cost("a", "b"), Some(1.0));
        assert_eq!(ls.path_cost("a", "c"), Some(2.0));
        assert_eq!(ls.path_cost("c", "a"), None);
        assert!(ls.is_equal_or_prior("a", "a"));
        assert!(!ls.is_equal_or_prior("b", "a"));
    }

    #[test]
    fn zero_weight_edges_form_equal_priority_classes() {
        let ls = LocalStemma::new(
            "u1",
            "u1",
            vertices(&["a", "a-orth", "b"]),
            vec![edge("a", "a-orth", 0.0), edge("a", "b", 1.0)],
        )
        .unwrap();

        assert!(ls.is_equal("a", "a-orth"));
        assert!(ls.is_equal("a-orth", "a"));
        assert!(!ls.is_equal("a", "b"));
        // Both directions cost 0 within the class.
        assert_eq!(ls.path_cost("a-orth", "a"), Some(0.0));
        // And class members inherit each other's outgoing paths.
        assert_eq!(ls.path_cost("a-orth", "b"), Some(1.0));
    }

    #[test]
    fn positive_weight_cycle_is_rejected() {
        let err = LocalStemma::new(
            "u1",
            "u1",
            vertices(&["a", "b"]),
            vec![edge("a", "b", 1.0), edge("b", "a", 1.0)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn zero_weight_cycle_is_tolerated() {
        let ls = LocalStemma::new(
            "u1",
            "u1",
            vertices(&["a", "b"]),
            vec![edge("a", "b", 0.0), edge("b", "a", 0.0)],
        )
        .unwrap();
        assert!(ls.is_equal("a", "b"));
    }

    #[test]
    fn roots_are_readings_with_no_prior_reading() {
        let ls = LocalStemma::new(
            "u1",
            "u1",
            vertices(&["a", "a-orth", "b"]),
            vec![edge("a", "a-orth", 0.0), edge("a", "b", 1.0)],
        )
        .unwrap();
        assert!(ls.is_root("a"));
        // Equal-priority siblings of the root are still roots.
        assert!(ls.is_root("a-orth"));
        assert!(!ls.is_root("b"));
    }

    #[test]
    fn unknown_edge_endpoint_is_rejected() {
        let err = LocalStemma::new(
            "u1",
            "u1",
            vertices(&["a"]),
            vec![edge("a", "zz", 1.0)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown reading"));
    }
}
