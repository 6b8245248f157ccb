//! Property tests: the pairwise bitmap invariants must hold for arbitrary
//! small collations, not just the hand-built fixtures.

use cbgm_core::*;
use proptest::prelude::*;

const MAX_WITNESSES: usize = 5;
const MAX_UNITS: usize = 6;

/// An arbitrary collation over a fixed chain stemma a -> b -> c (weight 1
/// each). Each witness, at each unit, is lacunose or reads one of the three.
fn collation_strategy() -> impl Strategy<Value = CollationDoc> {
    let support = prop::collection::vec(
        prop::collection::vec(0usize..4, 2..=MAX_WITNESSES),
        1..=MAX_UNITS,
    );
    support.prop_map(|units| {
        let n_wits = units.iter().map(|u| u.len()).min().unwrap_or(2);
        let witnesses: Vec<String> = (0..n_wits).map(|i| format!("W{i}")).collect();
        let units = units
            .iter()
            .enumerate()
            .map(|(ui, choices)| {
                let readings = ["a", "b", "c"]
                    .iter()
                    .map(|r| CollationReading {
                        id: r.to_string(),
                        witnesses: witnesses
                            .iter()
                            .zip(choices)
                            .filter(|(_, &c)| c > 0 && ["a", "b", "c"][c - 1] == *r)
                            .map(|(w, _)| w.clone())
                            .collect(),
                        ..CollationReading::default()
                    })
                    .collect();
                CollationUnit {
                    id: format!("u{ui}"),
                    label: None,
                    connectivity: None,
                    readings,
                    edges: vec![
                        LocalStemmaEdge {
                            prior: "a".into(),
                            posterior: "b".into(),
                            weight: 1.0,
                        },
                        LocalStemmaEdge {
                            prior: "b".into(),
                            posterior: "c".into(),
                            weight: 1.0,
                        },
                    ],
                }
            })
            .collect();
        CollationDoc { witnesses, units }
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn extant_is_the_disjoint_union_of_the_five_buckets(doc in collation_strategy()) {
        let app = Apparatus::from_collation(&doc, &IngestOptions::default()).unwrap();
        for p in app.list_wit() {
            for s in app.list_wit() {
                let c = compare_witnesses(&app, p, s);
                let union = &c.agreements | &c.prior | &c.posterior | &c.norel | &c.unclear;
                prop_assert_eq!(&union, &c.extant);
                let total = c.agreements.len() + c.prior.len() + c.posterior.len()
                    + c.norel.len() + c.unclear.len();
                prop_assert_eq!(total, c.extant.len());
                prop_assert!(c.explained.is_subset(&c.extant));
                prop_assert!(c.agreements.is_subset(&c.explained));
                prop_assert!(c.cost >= 0.0);
            }
        }
    }

    #[test]
    fn pairwise_statistics_mirror_correctly(doc in collation_strategy()) {
        let app = Apparatus::from_collation(&doc, &IngestOptions::default()).unwrap();
        for p in app.list_wit() {
            for s in app.list_wit() {
                let ps = compare_witnesses(&app, p, s);
                let sp = compare_witnesses(&app, s, p);
                prop_assert_eq!(&ps.extant, &sp.extant);
                prop_assert_eq!(&ps.agreements, &sp.agreements);
                prop_assert_eq!(&ps.prior, &sp.posterior);
                prop_assert_eq!(&ps.norel, &sp.norel);
                prop_assert_eq!(&ps.unclear, &sp.unclear);
            }
        }
    }

    #[test]
    fn ancestor_ranking_is_stable_and_total(doc in collation_strategy()) {
        let app = Apparatus::from_collation(&doc, &IngestOptions::default()).unwrap();
        for id in app.list_wit() {
            let once = Witness::from_apparatus(id, &app).unwrap();
            let twice = Witness::from_apparatus(id, &app).unwrap();
            prop_assert_eq!(once.potential_ancestor_ids(), twice.potential_ancestor_ids());
            // No duplicates, and never the witness itself.
            let ids = once.potential_ancestor_ids();
            let mut dedup = ids.to_vec();
            dedup.sort();
            dedup.dedup();
            prop_assert_eq!(dedup.len(), ids.len());
            prop_assert!(ids.iter().all(|a| a != id));
        }
    }

    #[test]
    fn substemma_solutions_cover_the_universe_within_cost(doc in collation_strategy()) {
        let app = Apparatus::from_collation(&doc, &IngestOptions::default()).unwrap();
        for id in app.list_wit() {
            let wit = Witness::from_apparatus(id, &app).unwrap();
            let problem = SetCoverProblem::for_witness(&wit);
            let result = problem.solve(None, &SearchLimits::default());
            if result.solutions.is_empty() {
                // Either infeasible (with a witness to that effect), or the
                // witness has no potential ancestors at all.
                prop_assert!(
                    !result.uncovered.is_empty() || problem.rows().is_empty()
                        || problem.universe().is_empty()
                );
                continue;
            }
            let optimum = result.solutions[0].cost;
            for sol in &result.solutions {
                prop_assert!(problem.universe().is_subset(&sol.covered));
                prop_assert!((sol.cost - optimum).abs() < 1e-9);
            }
        }
    }
}
