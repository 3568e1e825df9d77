// src/alert/mod.rs

//! Threshold alerts over coverage passes.
//!
//! An alert fires when a query's depth reaches its threshold after having
//! been below it (or never observed). Staying above the threshold on later
//! passes does not re-fire; dropping below and rising again does.

pub mod dispatch;

use serde::Serialize;

use crate::config::project::Query;
use crate::coverage::CoverageRecord;

pub use dispatch::{AlertDispatcher, Channel, DispatchResult, LogNotificationSink, NotificationSink};

/// A threshold crossing observed in one coverage pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiredAlert {
    pub query: String,
    pub reference: String,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

/// True when moving from `previous` to `current` crosses `threshold` upwards.
pub fn crosses_threshold(previous: Option<f64>, current: f64, threshold: f64) -> bool {
    current >= threshold && previous.is_none_or(|p| p < threshold)
}

pub fn alert_message(name: &str, value: f64, threshold: f64) -> String {
    format!("Alert: {name} depth coverage reached {value:.2}x (threshold: {threshold}x)")
}

/// Evaluate `queries` against one coverage pass.
///
/// Every query whose header names a reference in `records` has its last
/// observed value and triggered flag updated. Returns the alerts that fired.
pub fn evaluate(queries: &mut [Query], records: &[CoverageRecord]) -> Vec<FiredAlert> {
    let mut fired = Vec::new();

    for query in queries.iter_mut() {
        if query.header.is_empty() {
            continue;
        }
        let Some(record) = records.iter().find(|r| r.reference == query.header) else {
            continue;
        };

        let current = record.depth;
        if crosses_threshold(query.current_value, current, query.threshold) {
            fired.push(FiredAlert {
                query: query.name.clone(),
                reference: record.reference.clone(),
                value: current,
                threshold: query.threshold,
                message: alert_message(&query.name, current, query.threshold),
            });
        }
        query.current_value = Some(current);
        query.triggered = current >= query.threshold;
    }

    fired
}
