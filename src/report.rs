use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::estimator::Estimator;
use crate::invariant::Invariant;
use crate::window::{Clock, TimeWindowEstimator};

/// Anything that can answer quantile queries against registered invariants.
pub trait QuantileSource {
    fn invariants(&self) -> &[Invariant];
    fn query(&mut self, rank: f64) -> Option<f64>;
}

impl QuantileSource for Estimator {
    fn invariants(&self) -> &[Invariant] {
        Estimator::invariants(self)
    }

    fn query(&mut self, rank: f64) -> Option<f64> {
        Estimator::query(self, rank)
    }
}

impl<C: Clock> QuantileSource for TimeWindowEstimator<C> {
    fn invariants(&self) -> &[Invariant] {
        TimeWindowEstimator::invariants(self)
    }

    fn query(&mut self, rank: f64) -> Option<f64> {
        TimeWindowEstimator::query(self, rank)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimationMode {
    Stream,
    Window {
        max_age_seconds: f64,
        age_buckets: usize,
    },
}

/// Running statistics over every value fed to an estimator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl StreamStats {
    pub fn record(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }

        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |min| min.min(value)));
        self.max = Some(self.max.map_or(value, |max| max.max(value)));
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Snapshot of quantile estimates for a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantileReport {
    pub source: String,
    pub mode: EstimationMode,
    pub generated_at: DateTime<Utc>,
    pub stats: StreamStats,
    pub invariants: Vec<Invariant>,
    /// Estimates keyed by percentile label (`p50`, `p99.9`), in query order.
    pub estimates: IndexMap<String, Option<f64>>,
}

impl QuantileReport {
    /// Queries `source` at each rank; with no ranks the invariants' quantiles
    /// are used.
    pub fn collect<S: QuantileSource>(
        source_name: impl Into<String>,
        mode: EstimationMode,
        stats: StreamStats,
        source: &mut S,
        ranks: &[f64],
    ) -> Self {
        let invariants = source.invariants().to_vec();
        let ranks: Vec<f64> = if ranks.is_empty() {
            invariants.iter().map(Invariant::quantile).collect()
        } else {
            ranks.to_vec()
        };

        let mut estimates = IndexMap::with_capacity(ranks.len());
        for rank in ranks {
            // Ranks sharing a label get a longer one. Only a repeated rank
            // runs out of digits, and its estimate is already present.
            let label = (LABEL_DECIMALS..=MAX_LABEL_DECIMALS)
                .map(|decimals| label_with_decimals(rank, decimals))
                .find(|label| !estimates.contains_key(label));
            if let Some(label) = label {
                estimates.insert(label, source.query(rank));
            }
        }

        Self {
            source: source_name.into(),
            mode,
            generated_at: Utc::now(),
            stats,
            invariants,
            estimates,
        }
    }
}

/// Formats a rank on `[0, 1]` as a percentile label: `0.5` is `p50`, `0.999`
/// is `p99.9`.
pub fn percentile_label(rank: f64) -> String {
    label_with_decimals(rank, LABEL_DECIMALS)
}

const LABEL_DECIMALS: usize = 3;
const MAX_LABEL_DECIMALS: usize = 15;

fn label_with_decimals(rank: f64, decimals: usize) -> String {
    let percent = format!("{:.*}", decimals, rank * 100.0);
    let percent = percent.trim_end_matches('0').trim_end_matches('.');
    format!("p{percent}")
}
