// tests/alert_properties.rs

use proptest::prelude::*;

use nanocas::alert::{crosses_threshold, evaluate};
use nanocas::config::Query;
use nanocas::coverage::CoverageRecord;

fn pass(depth: f64) -> Vec<CoverageRecord> {
    vec![CoverageRecord {
        timestamp: "2024-03-01 10:00:00".into(),
        reference: "geneA".into(),
        depth,
        breadth: 100.0,
        read_count: 1,
    }]
}

fn query(threshold: f64) -> Query {
    Query {
        header: "geneA".into(),
        ..Query::new("KPC", threshold)
    }
}

/// Run every pass through `evaluate` and return the depths that fired.
fn fired_values(threshold: f64, depths: &[f64]) -> Vec<f64> {
    let mut queries = vec![query(threshold)];
    depths
        .iter()
        .flat_map(|d| evaluate(&mut queries, &pass(*d)))
        .map(|a| a.value)
        .collect()
}

#[test]
fn fires_on_each_upward_crossing() {
    assert_eq!(fired_values(5.0, &[3.0, 7.0, 9.0, 4.0, 8.0]), vec![7.0, 8.0]);
}

#[test]
fn first_observation_at_threshold_fires() {
    assert_eq!(fired_values(5.0, &[5.0, 5.0]), vec![5.0]);
}

#[test]
fn unmatched_and_headerless_queries_are_untouched() {
    let mut queries = vec![Query::new("no-header", 1.0), {
        let mut q = query(1.0);
        q.header = "geneZ".into();
        q
    }];
    assert!(evaluate(&mut queries, &pass(10.0)).is_empty());
    assert!(queries.iter().all(|q| q.current_value.is_none() && !q.triggered));
}

proptest! {
    #[test]
    fn alerts_match_upward_crossings(
        threshold in 0.0f64..20.0,
        depths in proptest::collection::vec(0.0f64..40.0, 1..30),
    ) {
        let mut expected = Vec::new();
        let mut previous: Option<f64> = None;
        for d in &depths {
            let was_below = previous.is_none_or(|p| p < threshold);
            if *d >= threshold && was_below {
                expected.push(*d);
            }
            previous = Some(*d);
        }

        prop_assert_eq!(fired_values(threshold, &depths), expected);
    }

    #[test]
    fn no_two_consecutive_passes_both_fire(
        threshold in 0.0f64..20.0,
        depths in proptest::collection::vec(0.0f64..40.0, 2..30),
    ) {
        let mut queries = vec![query(threshold)];
        let fired: Vec<bool> = depths
            .iter()
            .map(|d| !evaluate(&mut queries, &pass(*d)).is_empty())
            .collect();
        prop_assert!(fired.windows(2).all(|w| !(w[0] && w[1])));
        prop_assert_eq!(queries[0].triggered, *depths.last().unwrap() >= threshold);
    }

    #[test]
    fn crossing_requires_reaching_threshold(
        previous in proptest::option::of(0.0f64..40.0),
        current in 0.0f64..40.0,
        threshold in 0.0f64..40.0,
    ) {
        if crosses_threshold(previous, current, threshold) {
            prop_assert!(current >= threshold);
            prop_assert!(previous.is_none_or(|p| p < threshold));
        }
    }
}
