//! Pairwise genealogical comparisons.
//!
//! For an ordered witness pair `(primary, secondary)` the engine keeps seven
//! bitmaps over variation-unit indices plus one scalar cost. Bit `i` refers
//! to the `i`-th unit of the apparatus, so downstream analyses reduce to
//! cheap set operations on the persisted bitmaps.

use roaring::RoaringBitmap;

use crate::apparatus::Apparatus;

/// The genealogical relationship of one witness pair, unit by unit.
///
/// Invariants (`extant` is the universe):
/// - `extant` is the disjoint union of `agreements`, `prior`, `posterior`,
///   `norel`, and `unclear`;
/// - `agreements ⊆ explained ⊆ extant`;
/// - `cost >= 0`, and `cost == 0` when `primary == secondary`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenealogicalComparison {
    pub primary: String,
    pub secondary: String,
    /// Units where both witnesses have a reading.
    pub extant: RoaringBitmap,
    /// Units where the readings agree (including equal-priority variants).
    pub agreements: RoaringBitmap,
    /// Units where the primary's reading is prior to the secondary's.
    pub prior: RoaringBitmap,
    /// Units where the primary's reading is posterior to the secondary's.
    pub posterior: RoaringBitmap,
    /// Units where the readings are unrelated in the local stemma.
    pub norel: RoaringBitmap,
    /// Units where the relationship is indeterminate.
    pub unclear: RoaringBitmap,
    /// Units where the primary's reading could have descended from the
    /// secondary's (agreement, equal priority, or a priority path).
    pub explained: RoaringBitmap,
    /// Total minimum path cost of deriving the primary's readings from the
    /// secondary's over the explained units.
    pub cost: f64,
}

impl GenealogicalComparison {
    /// Proportion of agreements over the units extant in common, the primary
    /// sort key for potential-ancestor ranking. 0 when nothing is shared.
    pub fn agreement_ratio(&self) -> f64 {
        let extant = self.extant.len();
        if extant == 0 {
            0.0
        } else {
            self.agreements.len() as f64 / extant as f64
        }
    }
}

/// Compare `primary` against `secondary` across all units of the apparatus.
///
/// The walk follows the local stemma of each unit: agreement (including
/// equal-priority classes), priority in either direction, no relation, or —
/// when either reading is flagged unclear — indeterminate. A unit is
/// *explained* when the primary's reading is reachable from the secondary's,
/// and contributes the minimum path cost of that derivation. Classic-mode
/// adjustments for unclear units are applied later by the witness builder,
/// once potential ancestors are known.
pub fn compare_witnesses(
    app: &Apparatus,
    primary: &str,
    secondary: &str,
) -> GenealogicalComparison {
    let mut comp = GenealogicalComparison {
        primary: primary.to_string(),
        secondary: secondary.to_string(),
        ..GenealogicalComparison::default()
    };

    for (i, unit) in app.units().iter().enumerate() {
        let i = i as u32;
        let (Some(r_p), Some(r_s)) = (unit.reading_for(primary), unit.reading_for(secondary))
        else {
            continue;
        };
        comp.extant.insert(i);

        let stemma = unit.local_stemma();
        if stemma.is_unclear(r_p) || stemma.is_unclear(r_s) {
            comp.unclear.insert(i);
            continue;
        }

        if r_p == r_s || stemma.is_equal(r_p, r_s) {
            comp.agreements.insert(i);
        } else if stemma.is_equal_or_prior(r_p, r_s) {
            comp.prior.insert(i);
        } else if stemma.is_equal_or_prior(r_s, r_p) {
            comp.posterior.insert(i);
        } else {
            comp.norel.insert(i);
        }

        if let Some(c) = stemma.path_cost(r_s, r_p) {
            comp.explained.insert(i);
            comp.cost += c;
        }
    }

    comp
}
