//! Weighted set cover over explained-passage bitmaps: the substemma search.
//!
//! For a witness `w`, the universe is `comp(w, w).extant` and each potential
//! ancestor `a` contributes the covering set `comp(w, a).explained ∩ U` at
//! weight `comp(w, a).cost`. The optimizer finds every minimum-cost cover,
//! or — when the caller fixes an upper bound — every cover within the bound.
//!
//! The search is a depth-first branch and bound over the candidates in the
//! witness's potential-ancestor rank order, so enumeration order (and
//! therefore every downstream artifact) is deterministic.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use roaring::RoaringBitmap;
use tracing::debug;

use crate::witness::Witness;

/// One covering candidate: a potential ancestor's explained set and cost.
#[derive(Debug, Clone)]
pub struct SetCoverRow {
    pub id: String,
    pub bits: RoaringBitmap,
    pub cost: f64,
}

/// One feasible substemma.
#[derive(Debug, Clone, PartialEq)]
pub struct SetCoverSolution {
    /// Selected ancestor IDs, in candidate rank order.
    pub rows: Vec<String>,
    pub cost: f64,
    pub covered: RoaringBitmap,
}

impl SetCoverSolution {
    /// Sorted-ID tuple used for deterministic tie-breaking and for the
    /// canonical global-stemma pick.
    fn sorted_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.rows.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Search outcome. `uncovered` is non-empty exactly when no candidate subset
/// can cover the universe; `possibly_suboptimal` is set when the search was
/// cut short by the time budget or a cancellation.
#[derive(Debug, Clone, Default)]
pub struct SetCoverResult {
    pub solutions: Vec<SetCoverSolution>,
    pub uncovered: RoaringBitmap,
    pub possibly_suboptimal: bool,
}

/// External limits on a single search.
#[derive(Debug, Clone, Default)]
pub struct SearchLimits {
    /// Hard deadline; on expiry the best solutions found so far are returned.
    pub deadline: Option<Instant>,
    /// Cooperative cancellation, checked between node expansions.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl SearchLimits {
    fn interrupted(&self) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        self.cancel
            .as_ref()
            .map(|c| c.load(AtomicOrdering::Relaxed))
            .unwrap_or(false)
    }
}

/// A prepared weighted set-cover instance.
#[derive(Debug, Clone)]
pub struct SetCoverProblem {
    universe: RoaringBitmap,
    rows: Vec<SetCoverRow>,
}

impl SetCoverProblem {
    pub fn new(universe: RoaringBitmap, rows: Vec<SetCoverRow>) -> Self {
        Self { universe, rows }
    }

    /// Build the substemma instance for a witness: universe and candidate
    /// rows in potential-ancestor rank order.
    pub fn for_witness(witness: &Witness) -> Self {
        let universe = witness
            .comparison_for(witness.id())
            .map(|c| c.extant.clone())
            .unwrap_or_default();
        let rows = witness
            .potential_ancestor_ids()
            .iter()
            .filter_map(|a| witness.comparison_for(a))
            .map(|c| SetCoverRow {
                id: c.secondary.clone(),
                bits: &c.explained & &universe,
                cost: c.cost,
            })
            .collect();
        Self::new(universe, rows)
    }

    pub fn universe(&self) -> &RoaringBitmap {
        &self.universe
    }

    pub fn rows(&self) -> &[SetCoverRow] {
        &self.rows
    }

    /// Run the branch-and-bound search.
    ///
    /// With `fixed_bound = Some(b)`, every feasible cover of cost `<= b` is
    /// enumerated. Without it, only the minimum-cost covers are kept (all
    /// ties). Solutions come back sorted by ascending cost, ties broken by
    /// the lexicographically smaller sorted-ID tuple.
    pub fn solve(&self, fixed_bound: Option<f64>, limits: &SearchLimits) -> SetCoverResult {
        let mut result = SetCoverResult::default();

        // Infeasibility short-circuit: even selecting every candidate leaves
        // part of the universe unexplained.
        let mut max_cover = RoaringBitmap::new();
        for row in &self.rows {
            max_cover |= &row.bits;
        }
        let uncovered = &self.universe - &max_cover;
        if !uncovered.is_empty() {
            debug!(
                uncovered = uncovered.len(),
                "set cover is infeasible; reporting uncovered units"
            );
            result.uncovered = uncovered;
            return result;
        }

        let mut search = Search {
            problem: self,
            fixed_bound,
            limits,
            best: fixed_bound.unwrap_or(f64::INFINITY),
            chosen: Vec::new(),
            solutions: Vec::new(),
            interrupted: false,
        };
        search.visit(0, 0.0, RoaringBitmap::new());

        let mut solutions = search.solutions;
        solutions.sort_by(|a, b| {
            a.cost
                .partial_cmp(&b.cost)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.sorted_ids().cmp(&b.sorted_ids()))
        });
        result.solutions = solutions;
        result.possibly_suboptimal = search.interrupted;
        result
    }
}

/// Mutable search state for one `solve` call.
struct Search<'a> {
    problem: &'a SetCoverProblem,
    fixed_bound: Option<f64>,
    limits: &'a SearchLimits,
    /// Cost ceiling: the fixed bound, or the best cost found so far.
    best: f64,
    chosen: Vec<usize>,
    solutions: Vec<SetCoverSolution>,
    interrupted: bool,
}

const COST_EPSILON: f64 = 1e-9;

impl Search<'_> {
    fn visit(&mut self, next: usize, cost: f64, covered: RoaringBitmap) {
        if self.interrupted {
            return;
        }
        if self.limits.interrupted() {
            self.interrupted = true;
            return;
        }

        let covered_all = self.problem.universe.is_subset(&covered);
        if covered_all && self.fixed_bound.is_none() {
            // Minimum-cost mode stops at coverage; each covering selection
            // is reached along exactly one include/exclude path.
            self.record(cost, covered);
            return;
        }
        if next >= self.problem.rows.len() {
            // Bound mode records at the leaf so that supersets of a cover
            // are enumerated once each.
            if covered_all {
                self.record(cost, covered);
            }
            return;
        }

        // Partial cost only grows, so a branch already above the ceiling is
        // dead (ties stay alive for enumeration).
        if cost > self.best + COST_EPSILON {
            return;
        }

        if !covered_all {
            // Remaining-coverage check: the rest of the candidate list must
            // be able to close the gap at all.
            let mut reachable = covered.clone();
            for row in &self.problem.rows[next..] {
                reachable |= &row.bits;
            }
            if !self.problem.universe.is_subset(&reachable) {
                return;
            }

            // Greedy completion in rank order: take every remaining
            // candidate that adds coverage. A feasible completion tightens
            // the ceiling early, which keeps the exhaustive branch below
            // affordable.
            if self.fixed_bound.is_none() {
                let mut greedy_cost = cost;
                let mut greedy_covered = covered.clone();
                for row in &self.problem.rows[next..] {
                    if self.problem.universe.is_subset(&greedy_covered) {
                        break;
                    }
                    if !row.bits.is_subset(&greedy_covered) {
                        greedy_covered |= &row.bits;
                        greedy_cost += row.cost;
                    }
                }
                if self.problem.universe.is_subset(&greedy_covered) && greedy_cost < self.best {
                    self.best = greedy_cost;
                    self.prune_solutions();
                }
            }
        }

        // Branch: include the next candidate, then exclude it. A candidate
        // adding no new coverage is skipped in minimum-cost mode only.
        let row = &self.problem.rows[next];
        let with_cost = cost + row.cost;
        let redundant = row.bits.is_subset(&covered);
        if with_cost <= self.best + COST_EPSILON && (self.fixed_bound.is_some() || !redundant) {
            let with_covered = &covered | &row.bits;
            self.chosen.push(next);
            self.visit(next + 1, with_cost, with_covered);
            self.chosen.pop();
        }
        self.visit(next + 1, cost, covered);
    }

    fn record(&mut self, cost: f64, covered: RoaringBitmap) {
        if cost > self.best + COST_EPSILON {
            return;
        }
        if self.fixed_bound.is_none() && cost < self.best - COST_EPSILON {
            self.best = cost;
            self.prune_solutions();
        }
        let rows = self
            .chosen
            .iter()
            .map(|&i| self.problem.rows[i].id.clone())
            .collect();
        self.solutions.push(SetCoverSolution {
            rows,
            cost,
            covered,
        });
    }

    /// Drop stored solutions that a newly lowered ceiling excludes.
    fn prune_solutions(&mut self) {
        let ceiling = self.best + COST_EPSILON;
        self.solutions.retain(|s| s.cost <= ceiling);
    }
}

/// Pick the canonical solution for the global stemma: minimum cost, ties
/// broken by the lexicographically smallest sorted-ID tuple. `solutions`
/// must already be in the order `solve` returns.
pub fn canonical_solution(solutions: &[SetCoverSolution]) -> Option<&SetCoverSolution> {
    solutions.first()
}
