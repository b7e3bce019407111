//! Collector registry.

use crate::collectors::fitbit::{FitbitCollector, Metric};
use crate::Collector;
use std::sync::Arc;

/// Returns every built-in collector in run order.
pub fn default_collectors() -> Vec<Arc<dyn Collector>> {
    Metric::ALL
        .into_iter()
        .map(|metric| Arc::new(FitbitCollector::new(metric)) as Arc<dyn Collector>)
        .collect()
}
