//! The persisted genealogical cache.
//!
//! One file holds the whole cache: a 4-byte magic tag and a little-endian
//! `u32` schema version, followed by a bincode body with the six logical
//! tables (witnesses, variation units, readings, reading relations, reading
//! support, genealogical comparisons) plus a metadata record. Row order is
//! semantic: the witness and variation-unit tables define the bit indices
//! used by every comparison bitmap.
//!
//! Bitmaps are stored as blobs in roaring's portable serialization format and
//! read back through its bounds-checked deserializer, so a corrupted or
//! truncated blob surfaces as an error instead of undefined bits.
//!
//! The cache is written once by a single coordinator after witness
//! initialization; readers only ever see a complete file.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cbgm_core::{
    Apparatus, GenealogicalComparison, IngestOptions, LocalStemma, LocalStemmaEdge,
    LocalStemmaVertex, VariationUnit, Witness,
};

/// File magic: "CBGM genealogical cache".
pub const CACHE_MAGIC: &[u8; 4] = b"CBGC";
/// Bumped whenever the table layout or the bitmap blob format changes.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Table rows
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessRow {
    pub row_id: u32,
    pub witness: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationUnitRow {
    pub row_id: u32,
    pub variation_unit: String,
    pub label: String,
    /// `u32::MAX` encodes an unlimited connectivity.
    pub connectivity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingRow {
    pub row_id: u32,
    pub variation_unit: String,
    pub reading: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingRelationRow {
    pub row_id: u32,
    pub variation_unit: String,
    pub prior: String,
    pub posterior: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingSupportRow {
    pub row_id: u32,
    pub variation_unit: String,
    pub witness: String,
    pub reading: String,
}

/// One comparison row; the seven bitmap columns are serialized blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenealogicalComparisonRow {
    pub row_id: u32,
    pub primary_wit: String,
    pub secondary_wit: String,
    pub extant: Vec<u8>,
    pub agreements: Vec<u8>,
    pub prior: Vec<u8>,
    pub posterior: Vec<u8>,
    pub norel: Vec<u8>,
    pub unclear: Vec<u8>,
    pub explained: Vec<u8>,
    pub cost: f64,
}

/// Provenance record: schema version echo, creation time, and the ingestion
/// options the cache was built with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub options: IngestOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheTables {
    meta: CacheMeta,
    witnesses: Vec<WitnessRow>,
    variation_units: Vec<VariationUnitRow>,
    readings: Vec<ReadingRow>,
    reading_relations: Vec<ReadingRelationRow>,
    reading_support: Vec<ReadingSupportRow>,
    genealogical_comparisons: Vec<GenealogicalComparisonRow>,
}

// ============================================================================
// Bitmap blobs
// ============================================================================

fn bitmap_to_blob(bitmap: &RoaringBitmap) -> Result<Vec<u8>> {
    let mut blob = Vec::with_capacity(bitmap.serialized_size());
    bitmap
        .serialize_into(&mut blob)
        .context("serializing bitmap")?;
    Ok(blob)
}

fn bitmap_from_blob(blob: &[u8]) -> Result<RoaringBitmap> {
    RoaringBitmap::deserialize_from(blob).context("deserializing bitmap blob")
}

// ============================================================================
// Cache
// ============================================================================

/// An open cache with its keyed lookups built.
#[derive(Debug)]
pub struct Cache {
    tables: CacheTables,
    wit_index: HashMap<String, usize>,
    unit_index: HashMap<String, usize>,
    readings_by_unit: HashMap<String, Vec<usize>>,
    relations_by_unit: HashMap<String, Vec<usize>>,
    support_by_unit: HashMap<String, Vec<usize>>,
    comps_by_primary: HashMap<String, Vec<usize>>,
}

impl Cache {
    /// Build a cache from a frozen apparatus and its initialized witnesses.
    ///
    /// Comparison rows are written for every ordered witness pair in witness
    /// list order, primary-major, mirroring the bit-index discipline of the
    /// unit table.
    pub fn build(
        app: &Apparatus,
        witnesses: &[Witness],
        options: &IngestOptions,
    ) -> Result<Cache> {
        let mut tables = CacheTables {
            meta: CacheMeta {
                schema_version: CACHE_SCHEMA_VERSION,
                created_at: Utc::now(),
                options: options.clone(),
            },
            witnesses: Vec::new(),
            variation_units: Vec::new(),
            readings: Vec::new(),
            reading_relations: Vec::new(),
            reading_support: Vec::new(),
            genealogical_comparisons: Vec::new(),
        };

        for (i, wit) in app.list_wit().iter().enumerate() {
            tables.witnesses.push(WitnessRow {
                row_id: i as u32,
                witness: wit.clone(),
            });
        }

        let mut reading_row = 0u32;
        let mut relation_row = 0u32;
        let mut support_row = 0u32;
        for (i, unit) in app.units().iter().enumerate() {
            tables.variation_units.push(VariationUnitRow {
                row_id: i as u32,
                variation_unit: unit.id().to_string(),
                label: unit.label().to_string(),
                connectivity: unit.connectivity(),
            });
            for reading in unit.readings() {
                tables.readings.push(ReadingRow {
                    row_id: reading_row,
                    variation_unit: unit.id().to_string(),
                    reading: reading.clone(),
                });
                reading_row += 1;
            }
            for edge in unit.local_stemma().edges() {
                tables.reading_relations.push(ReadingRelationRow {
                    row_id: relation_row,
                    variation_unit: unit.id().to_string(),
                    prior: edge.prior.clone(),
                    posterior: edge.posterior.clone(),
                    weight: edge.weight,
                });
                relation_row += 1;
            }
            for wit in app.list_wit() {
                let Some(reading) = unit.reading_for(wit) else {
                    continue;
                };
                tables.reading_support.push(ReadingSupportRow {
                    row_id: support_row,
                    variation_unit: unit.id().to_string(),
                    witness: wit.clone(),
                    reading: reading.to_string(),
                });
                support_row += 1;
            }
        }

        let mut comp_row = 0u32;
        for witness in witnesses {
            for comp in witness.comparisons() {
                tables
                    .genealogical_comparisons
                    .push(comparison_to_row(comp_row, comp)?);
                comp_row += 1;
            }
        }

        debug!(
            witnesses = tables.witnesses.len(),
            units = tables.variation_units.len(),
            comparisons = tables.genealogical_comparisons.len(),
            "built cache tables"
        );
        Ok(Self::from_tables(tables))
    }

    fn from_tables(tables: CacheTables) -> Cache {
        let wit_index = tables
            .witnesses
            .iter()
            .enumerate()
            .map(|(i, r)| (r.witness.clone(), i))
            .collect();
        let unit_index = tables
            .variation_units
            .iter()
            .enumerate()
            .map(|(i, r)| (r.variation_unit.clone(), i))
            .collect();

        let mut readings_by_unit: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, r) in tables.readings.iter().enumerate() {
            readings_by_unit
                .entry(r.variation_unit.clone())
                .or_default()
                .push(i);
        }
        let mut relations_by_unit: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, r) in tables.reading_relations.iter().enumerate() {
            relations_by_unit
                .entry(r.variation_unit.clone())
                .or_default()
                .push(i);
        }
        let mut support_by_unit: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, r) in tables.reading_support.iter().enumerate() {
            support_by_unit
                .entry(r.variation_unit.clone())
                .or_default()
                .push(i);
        }
        let mut comps_by_primary: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, r) in tables.genealogical_comparisons.iter().enumerate() {
            comps_by_primary
                .entry(r.primary_wit.clone())
                .or_default()
                .push(i);
        }

        Cache {
            tables,
            wit_index,
            unit_index,
            readings_by_unit,
            relations_by_unit,
            support_by_unit,
            comps_by_primary,
        }
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(&self.tables).context("serializing cache tables")?;
        let mut out = Vec::with_capacity(body.len() + 8);
        out.extend_from_slice(CACHE_MAGIC);
        out.extend_from_slice(&CACHE_SCHEMA_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Cache> {
        if bytes.len() < 8 || &bytes[0..4] != CACHE_MAGIC {
            bail!("not a genealogical cache file");
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into()?);
        if version != CACHE_SCHEMA_VERSION {
            bail!(
                "unsupported cache schema version {version} (expected {CACHE_SCHEMA_VERSION})"
            );
        }
        let tables: CacheTables =
            bincode::deserialize(&bytes[8..]).context("deserializing cache tables")?;
        if tables.meta.schema_version != version {
            bail!(
                "cache metadata declares schema version {}, header says {version}",
                tables.meta.schema_version
            );
        }
        Ok(Self::from_tables(tables))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("writing cache to {}", path.display()))?;
        Ok(())
    }

    pub fn open(path: &Path) -> Result<Cache> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading cache from {}", path.display()))?;
        Self::from_bytes(&bytes)
    }

    // ========================================================================
    // Readers
    // ========================================================================

    pub fn meta(&self) -> &CacheMeta {
        &self.tables.meta
    }

    /// Witness IDs in row order (the witness bit indices).
    pub fn witness_ids(&self) -> Vec<&str> {
        self.tables
            .witnesses
            .iter()
            .map(|r| r.witness.as_str())
            .collect()
    }

    /// Variation-unit IDs in row order (the unit bit indices).
    pub fn unit_ids(&self) -> Vec<&str> {
        self.tables
            .variation_units
            .iter()
            .map(|r| r.variation_unit.as_str())
            .collect()
    }

    /// Variation-unit labels in row order; label lookups by bitmap index go
    /// through this.
    pub fn unit_labels(&self) -> Vec<&str> {
        self.tables
            .variation_units
            .iter()
            .map(|r| r.label.as_str())
            .collect()
    }

    pub fn witness_exists(&self, id: &str) -> bool {
        self.wit_index.contains_key(id)
    }

    pub fn unit_exists(&self, id: &str) -> bool {
        self.unit_index.contains_key(id)
    }

    /// Witnesses extant at fewer than `min_extant` units, determined from
    /// their self-comparison rows.
    pub fn fragmentary_witnesses(&self, min_extant: u64) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for row in &self.tables.genealogical_comparisons {
            if row.primary_wit != row.secondary_wit {
                continue;
            }
            let extant = bitmap_from_blob(&row.extant)?;
            if extant.len() < min_extant {
                out.push(row.primary_wit.clone());
            }
        }
        Ok(out)
    }

    /// Load one witness: its comparison rows in row order, minus any
    /// excluded secondaries. The potential-ancestor ranking is recomputed
    /// from the loaded bitmaps.
    pub fn load_witness(&self, id: &str, excluded: &[String]) -> Result<Witness> {
        let rows = self
            .comps_by_primary
            .get(id)
            .ok_or_else(|| anyhow!("no genealogical comparisons for witness {id}"))?;
        let mut comparisons = Vec::with_capacity(rows.len());
        for &i in rows {
            let row = &self.tables.genealogical_comparisons[i];
            if excluded.iter().any(|e| e == &row.secondary_wit) {
                continue;
            }
            comparisons.push(row_to_comparison(row)?);
        }
        Ok(Witness::from_comparisons(id, comparisons))
    }

    /// Load every witness (in witness row order) that is not excluded.
    pub fn load_all_witnesses(&self, excluded: &[String]) -> Result<Vec<Witness>> {
        self.tables
            .witnesses
            .iter()
            .filter(|r| !excluded.iter().any(|e| e == &r.witness))
            .map(|r| self.load_witness(&r.witness, excluded))
            .collect()
    }

    /// Rebuild one variation unit (readings, local stemma, support,
    /// connectivity) from its table rows.
    pub fn load_variation_unit(&self, id: &str) -> Result<VariationUnit> {
        let &unit_row = self
            .unit_index
            .get(id)
            .ok_or_else(|| anyhow!("no variation unit {id} in the cache"))?;
        let row = &self.tables.variation_units[unit_row];

        let readings: Vec<String> = self
            .readings_by_unit
            .get(id)
            .map(|rows| {
                rows.iter()
                    .map(|&i| self.tables.readings[i].reading.clone())
                    .collect()
            })
            .unwrap_or_default();
        let vertices: Vec<LocalStemmaVertex> = readings
            .iter()
            .map(|r| LocalStemmaVertex::new(r.clone()))
            .collect();
        let edges: Vec<LocalStemmaEdge> = self
            .relations_by_unit
            .get(id)
            .map(|rows| {
                rows.iter()
                    .map(|&i| {
                        let r = &self.tables.reading_relations[i];
                        LocalStemmaEdge {
                            prior: r.prior.clone(),
                            posterior: r.posterior.clone(),
                            weight: r.weight,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        let stemma = LocalStemma::new(id, row.label.clone(), vertices, edges)?;

        let support: HashMap<String, String> = self
            .support_by_unit
            .get(id)
            .map(|rows| {
                rows.iter()
                    .map(|&i| {
                        let r = &self.tables.reading_support[i];
                        (r.witness.clone(), r.reading.clone())
                    })
                    .collect()
            })
            .unwrap_or_default();

        VariationUnit::new(
            id,
            row.label.clone(),
            readings,
            support,
            row.connectivity,
            stemma,
        )
    }

    /// Load the units named by `filter` (or all units) in row order.
    pub fn load_variation_units(&self, filter: &[String]) -> Result<Vec<VariationUnit>> {
        for id in filter {
            if !self.unit_exists(id) {
                bail!("no variation unit {id} in the cache");
            }
        }
        self.tables
            .variation_units
            .iter()
            .filter(|r| filter.is_empty() || filter.iter().any(|f| f == &r.variation_unit))
            .map(|r| self.load_variation_unit(&r.variation_unit))
            .collect()
    }
}

fn comparison_to_row(row_id: u32, comp: &GenealogicalComparison) -> Result<GenealogicalComparisonRow> {
    Ok(GenealogicalComparisonRow {
        row_id,
        primary_wit: comp.primary.clone(),
        secondary_wit: comp.secondary.clone(),
        extant: bitmap_to_blob(&comp.extant)?,
        agreements: bitmap_to_blob(&comp.agreements)?,
        prior: bitmap_to_blob(&comp.prior)?,
        posterior: bitmap_to_blob(&comp.posterior)?,
        norel: bitmap_to_blob(&comp.norel)?,
        unclear: bitmap_to_blob(&comp.unclear)?,
        explained: bitmap_to_blob(&comp.explained)?,
        cost: comp.cost,
    })
}

fn row_to_comparison(row: &GenealogicalComparisonRow) -> Result<GenealogicalComparison> {
    Ok(GenealogicalComparison {
        primary: row.primary_wit.clone(),
        secondary: row.secondary_wit.clone(),
        extant: bitmap_from_blob(&row.extant)?,
        agreements: bitmap_from_blob(&row.agreements)?,
        prior: bitmap_from_blob(&row.prior)?,
        posterior: bitmap_from_blob(&row.posterior)?,
        norel: bitmap_from_blob(&row.norel)?,
        unclear: bitmap_from_blob(&row.unclear)?,
        explained: bitmap_from_blob(&row.explained)?,
        cost: row.cost,
    })
}
