//! Apparatus: the normalized collation consumed by the comparison engine.
//!
//! The apparatus is built from an already-parsed collation document (the XML
//! front end lives outside this crate) and is immutable afterwards. Its unit
//! order defines the bit index used by every genealogical bitmap, and its
//! witness order defines every externally observable witness ordering.

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::local_stemma::{LocalStemma, LocalStemmaEdge, LocalStemmaVertex};

/// Connectivity sentinel for "no rank limit at this unit".
pub const UNLIMITED_CONNECTIVITY: u32 = u32::MAX;

// ============================================================================
// Collation document (parsed input form)
// ============================================================================

/// One reading of one unit in the collation document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollationReading {
    pub id: String,
    /// Editorial classification (e.g. "defective", "orthographic"); consulted
    /// by the trivial/dropped ingestion options.
    #[serde(default)]
    pub reading_type: Option<String>,
    /// For split attestations: the underlying reading this one is a split of.
    #[serde(default)]
    pub base: Option<String>,
    /// Marks a reading whose genealogical placement is left open.
    #[serde(default)]
    pub unclear: bool,
    /// Sigla of the witnesses supporting this reading.
    #[serde(default)]
    pub witnesses: Vec<String>,
}

/// One variation unit in the collation document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollationUnit {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Absent means unlimited.
    #[serde(default)]
    pub connectivity: Option<u32>,
    pub readings: Vec<CollationReading>,
    /// Local stemma edges over the reading IDs above.
    #[serde(default)]
    pub edges: Vec<LocalStemmaEdge>,
}

/// The structured collation document: the engine's sole input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollationDoc {
    pub witnesses: Vec<String>,
    pub units: Vec<CollationUnit>,
}

// ============================================================================
// Ingestion options
// ============================================================================

/// Options shaping how a collation document becomes an apparatus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Reading types whose support merges into the nearest preceding
    /// non-trivial reading (counted as agreement with it).
    #[serde(default)]
    pub trivial_reading_types: BTreeSet<String>,
    /// Reading types removed entirely; a witness left without any reading at
    /// a unit is lacunose there.
    #[serde(default)]
    pub dropped_reading_types: BTreeSet<String>,
    /// Suffix tokens stripped from witness sigla before matching.
    #[serde(default)]
    pub ignored_suffixes: Vec<String>,
    /// Fold split attestations into their base reading.
    #[serde(default)]
    pub merge_splits: bool,
    /// Minimum number of extant units for a witness to be retained.
    #[serde(default)]
    pub threshold: usize,
    /// Use the classic CBGM rules for explained readings and costs.
    #[serde(default)]
    pub classic: bool,
}

// ============================================================================
// Variation unit and apparatus
// ============================================================================

/// A frozen variation unit: ordered readings, per-witness support, a
/// connectivity limit, and the local stemma.
#[derive(Debug, Clone)]
pub struct VariationUnit {
    id: String,
    label: String,
    readings: Vec<String>,
    reading_support: HashMap<String, String>,
    connectivity: u32,
    local_stemma: LocalStemma,
}

impl VariationUnit {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        readings: Vec<String>,
        reading_support: HashMap<String, String>,
        connectivity: u32,
        local_stemma: LocalStemma,
    ) -> Result<Self> {
        let id = id.into();
        for (wit, rdg) in &reading_support {
            if !local_stemma.contains(rdg) {
                bail!(
                    "variation unit {id}: witness {wit} supports reading `{rdg}` which has no local stemma vertex"
                );
            }
        }
        Ok(Self {
            id,
            label: label.into(),
            readings,
            reading_support,
            connectivity,
            local_stemma,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn readings(&self) -> &[String] {
        &self.readings
    }

    pub fn reading_support(&self) -> &HashMap<String, String> {
        &self.reading_support
    }

    /// The reading a witness supports here, or `None` when lacunose.
    pub fn reading_for(&self, witness: &str) -> Option<&str> {
        self.reading_support.get(witness).map(String::as_str)
    }

    pub fn connectivity(&self) -> u32 {
        self.connectivity
    }

    pub fn local_stemma(&self) -> &LocalStemma {
        &self.local_stemma
    }
}

/// The normalized, immutable collation.
#[derive(Debug, Clone)]
pub struct Apparatus {
    units: Vec<VariationUnit>,
    list_wit: Vec<String>,
    classic: bool,
}

impl Apparatus {
    /// Ingest a collation document under the given options.
    pub fn from_collation(doc: &CollationDoc, options: &IngestOptions) -> Result<Apparatus> {
        let mut list_wit: Vec<String> = Vec::new();
        let mut seen_wit: HashSet<String> = HashSet::new();
        for siglum in &doc.witnesses {
            let normalized = strip_suffixes(siglum, &options.ignored_suffixes);
            if normalized.is_empty() {
                bail!("witness siglum `{siglum}` is empty after suffix stripping");
            }
            if seen_wit.insert(normalized.clone()) {
                list_wit.push(normalized);
            }
        }

        let mut units: Vec<VariationUnit> = Vec::with_capacity(doc.units.len());
        let mut seen_units: HashSet<String> = HashSet::new();
        for unit in &doc.units {
            if !seen_units.insert(unit.id.clone()) {
                bail!("duplicate variation unit ID `{}`", unit.id);
            }
            let vu = build_unit(unit, options, &seen_wit)
                .with_context(|| format!("ingesting variation unit {}", unit.id))?;
            units.push(vu);
        }

        let mut app = Apparatus {
            units,
            list_wit,
            classic: options.classic,
        };

        if options.threshold > 0 {
            let before = app.list_wit.len();
            let threshold = options.threshold;
            let units = &app.units;
            app.list_wit.retain(|wit| {
                units.iter().filter(|u| u.reading_for(wit).is_some()).count() >= threshold
            });
            debug!(
                kept = app.list_wit.len(),
                dropped = before - app.list_wit.len(),
                threshold,
                "applied extant-units threshold"
            );
        }

        Ok(app)
    }

    /// Variation units in collation order; this order defines bit indices.
    pub fn units(&self) -> &[VariationUnit] {
        &self.units
    }

    /// Witness IDs in collation order.
    pub fn list_wit(&self) -> &[String] {
        &self.list_wit
    }

    pub fn classic(&self) -> bool {
        self.classic
    }

    /// Number of units at which the witness has a reading.
    pub fn extant_units(&self, witness: &str) -> usize {
        self.units
            .iter()
            .filter(|u| u.reading_for(witness).is_some())
            .count()
    }

    pub fn unit_by_id(&self, id: &str) -> Option<&VariationUnit> {
        self.units.iter().find(|u| u.id() == id)
    }
}

/// Strip ignored suffix tokens from a siglum until none applies.
fn strip_suffixes(siglum: &str, suffixes: &[String]) -> String {
    let mut s = siglum.trim().to_string();
    loop {
        let mut stripped = false;
        for suffix in suffixes {
            if suffix.is_empty() {
                continue;
            }
            if let Some(rest) = s.strip_suffix(suffix.as_str()) {
                if !rest.is_empty() {
                    s = rest.to_string();
                    stripped = true;
                }
            }
        }
        if !stripped {
            return s;
        }
    }
}

fn build_unit(
    unit: &CollationUnit,
    options: &IngestOptions,
    known_wits: &HashSet<String>,
) -> Result<VariationUnit> {
    // Working copies of the unit's readings and edges; the option passes
    // below rewrite them in place before the local stemma is built.
    let mut readings: Vec<CollationReading> = unit.readings.clone();
    let mut edges: Vec<LocalStemmaEdge> = unit.edges.clone();

    {
        let mut seen = HashSet::new();
        for r in &readings {
            if !seen.insert(r.id.clone()) {
                bail!("duplicate reading ID `{}`", r.id);
            }
        }
    }

    // Split attestations fold into their base reading first, so the later
    // passes see the merged form.
    if options.merge_splits {
        let mut target: HashMap<String, String> = HashMap::new();
        for r in &readings {
            if let Some(base) = &r.base {
                if !readings.iter().any(|o| &o.id == base) {
                    bail!("reading `{}` names unknown base reading `{base}`", r.id);
                }
                target.insert(r.id.clone(), base.clone());
            }
        }
        remap_readings(&mut readings, &mut edges, &target);
    }

    // Dropped reading types disappear outright, together with any stemma
    // edges that touched them.
    if !options.dropped_reading_types.is_empty() {
        let dropped: HashSet<String> = readings
            .iter()
            .filter(|r| {
                r.reading_type
                    .as_ref()
                    .map(|t| options.dropped_reading_types.contains(t))
                    .unwrap_or(false)
            })
            .map(|r| r.id.clone())
            .collect();
        readings.retain(|r| !dropped.contains(&r.id));
        edges.retain(|e| !dropped.contains(&e.prior) && !dropped.contains(&e.posterior));
    }

    // Trivial reading types merge into the nearest preceding non-trivial
    // reading; their support counts as agreement with it.
    if !options.trivial_reading_types.is_empty() {
        let is_trivial = |r: &CollationReading| {
            r.reading_type
                .as_ref()
                .map(|t| options.trivial_reading_types.contains(t))
                .unwrap_or(false)
        };
        let mut target: HashMap<String, String> = HashMap::new();
        let mut last_parent: Option<String> = None;
        for r in &readings {
            if is_trivial(r) {
                let Some(parent) = &last_parent else {
                    bail!(
                        "trivial reading `{}` has no preceding non-trivial reading to merge into",
                        r.id
                    );
                };
                target.insert(r.id.clone(), parent.clone());
            } else {
                last_parent = Some(r.id.clone());
            }
        }
        remap_readings(&mut readings, &mut edges, &target);
    }

    // Resolve per-witness support. The first reading listed for a witness
    // wins; later occurrences (e.g. corrector hands collapsed by suffix
    // stripping) are ignored.
    let mut reading_support: HashMap<String, String> = HashMap::new();
    for r in &readings {
        for siglum in &r.witnesses {
            let wit = strip_suffixes(siglum, &options.ignored_suffixes);
            if !known_wits.contains(&wit) {
                bail!("reading `{}` is supported by unlisted witness `{siglum}`", r.id);
            }
            reading_support.entry(wit).or_insert_with(|| r.id.clone());
        }
    }

    let vertices: Vec<LocalStemmaVertex> = readings
        .iter()
        .map(|r| LocalStemmaVertex {
            id: r.id.clone(),
            unclear: r.unclear,
        })
        .collect();
    let label = unit.label.clone().unwrap_or_else(|| unit.id.clone());
    let stemma = LocalStemma::new(unit.id.clone(), label.clone(), vertices, edges)?;

    VariationUnit::new(
        unit.id.clone(),
        label,
        readings.into_iter().map(|r| r.id).collect(),
        reading_support,
        unit.connectivity.unwrap_or(UNLIMITED_CONNECTIVITY),
        stemma,
    )
}

/// Fold the readings named as keys of `target` into their target readings:
/// support lists merge, stemma edges are re-pointed, self-edges vanish.
fn remap_readings(
    readings: &mut Vec<CollationReading>,
    edges: &mut Vec<LocalStemmaEdge>,
    target: &HashMap<String, String>,
) {
    if target.is_empty() {
        return;
    }
    let resolve = |id: &str| -> String {
        // Chains (split of a split) resolve transitively; cycles cannot
        // occur because a reading never targets itself.
        let mut cur = id.to_string();
        let mut hops = 0;
        while let Some(next) = target.get(&cur) {
            cur = next.clone();
            hops += 1;
            if hops > target.len() {
                break;
            }
        }
        cur
    };

    let mut merged_support: HashMap<String, Vec<String>> = HashMap::new();
    for r in readings.iter() {
        if target.contains_key(&r.id) {
            merged_support
                .entry(resolve(&r.id))
                .or_default()
                .extend(r.witnesses.iter().cloned());
        }
    }
    readings.retain(|r| !target.contains_key(&r.id));
    for r in readings.iter_mut() {
        if let Some(extra) = merged_support.remove(&r.id) {
            r.witnesses.extend(extra);
        }
    }
    for e in edges.iter_mut() {
        e.prior = resolve(&e.prior);
        e.posterior = resolve(&e.posterior);
    }
    edges.retain(|e| e.prior != e.posterior);
    edges.dedup_by(|a, b| a.prior == b.prior && a.posterior == b.posterior && a.weight == b.weight);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> CollationDoc {
        serde_json::from_value(serde_json::json!({
            "witnesses": ["A", "W1", "W2", "W2-corr"],
            "units": [
                {
                    "id": "u1",
                    "label": "Unit 1",
                    "connectivity": 3,
                    "readings": [
                        {"id": "a", "witnesses": ["A", "W1"]},
                        {"id": "af", "reading_type": "defective", "witnesses": ["W2-corr"]},
                        {"id": "b", "witnesses": ["W2"]}
                    ],
                    "edges": [{"prior": "a", "posterior": "b", "weight": 1.0}]
                },
                {
                    "id": "u2",
                    "readings": [
                        {"id": "a", "witnesses": ["A", "W2"]},
                        {"id": "b", "witnesses": ["W1"]}
                    ],
                    "edges": [{"prior": "a", "posterior": "b", "weight": 1.0}]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn suffix_stripping_collapses_witnesses() {
        let options = IngestOptions {
            ignored_suffixes: vec!["-corr".into()],
            trivial_reading_types: ["defective".to_string()].into_iter().collect(),
            ..IngestOptions::default()
        };
        let app = Apparatus::from_collation(&doc(), &options).unwrap();
        assert_eq!(app.list_wit(), &["A", "W1", "W2"]);
        // W2-corr collapses into W2; readings are scanned in order, so the
        // merged attestation of `a` wins over W2's own `b`.
        assert_eq!(app.units()[0].reading_for("W2"), Some("a"));
    }

    #[test]
    fn trivial_readings_merge_into_preceding_reading() {
        let options = IngestOptions {
            trivial_reading_types: ["defective".to_string()].into_iter().collect(),
            ..IngestOptions::default()
        };
        let app = Apparatus::from_collation(&doc(), &options).unwrap();
        let u1 = &app.units()[0];
        assert_eq!(u1.readings(), &["a", "b"]);
        assert_eq!(u1.reading_for("W2-corr"), Some("a"));
    }

    #[test]
    fn dropped_readings_leave_witness_lacunose() {
        let options = IngestOptions {
            dropped_reading_types: ["defective".to_string()].into_iter().collect(),
            ..IngestOptions::default()
        };
        let app = Apparatus::from_collation(&doc(), &options).unwrap();
        let u1 = &app.units()[0];
        assert_eq!(u1.reading_for("W2-corr"), None);
        assert_eq!(app.extant_units("W2-corr"), 0);
    }

    #[test]
    fn threshold_filters_fragmentary_witnesses() {
        let options = IngestOptions {
            dropped_reading_types: ["defective".to_string()].into_iter().collect(),
            threshold: 1,
            ..IngestOptions::default()
        };
        let app = Apparatus::from_collation(&doc(), &options).unwrap();
        assert_eq!(app.list_wit(), &["A", "W1", "W2"]);
    }

    #[test]
    fn merge_splits_folds_base_readings() {
        let doc: CollationDoc = serde_json::from_value(serde_json::json!({
            "witnesses": ["A", "W1", "W2"],
            "units": [{
                "id": "u1",
                "readings": [
                    {"id": "a", "witnesses": ["A"]},
                    {"id": "a-split", "base": "a", "witnesses": ["W1"]},
                    {"id": "b", "witnesses": ["W2"]}
                ],
                "edges": [
                    {"prior": "a", "posterior": "b", "weight": 1.0},
                    {"prior": "a-split", "posterior": "b", "weight": 1.0}
                ]
            }]
        }))
        .unwrap();

        let options = IngestOptions {
            merge_splits: true,
            ..IngestOptions::default()
        };
        let app = Apparatus::from_collation(&doc, &options).unwrap();
        let u1 = &app.units()[0];
        assert_eq!(u1.readings(), &["a", "b"]);
        assert_eq!(u1.reading_for("W1"), Some("a"));
        assert_eq!(u1.local_stemma().edges().len(), 1);
    }

    #[test]
    fn duplicate_unit_ids_are_rejected() {
        let mut d = doc();
        let dup = d.units[0].clone();
        d.units.push(dup);
        let err = Apparatus::from_collation(&d, &IngestOptions::default()).unwrap_err();
        assert!(err.to_string().contains("duplicate variation unit"));
    }

    #[test]
    fn unlisted_witness_support_is_rejected() {
        let d: CollationDoc = serde_json::from_value(serde_json::json!({
            "witnesses": ["A"],
            "units": [{
                "id": "u1",
                "readings": [{"id": "a", "witnesses": ["A", "B"]}],
                "edges": []
            }]
        }))
        .unwrap();
        let err = Apparatus::from_collation(&d, &IngestOptions::default()).unwrap_err();
        assert!(err.to_string().contains("unlisted witness"));
    }
}
