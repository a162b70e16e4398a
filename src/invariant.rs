use serde::{Deserialize, Serialize};

use crate::error::{QEstimateError, Result};

/// Default targets: the median at 1% error and the 99th percentile at 0.1%.
pub const DEFAULT_INVARIANTS: [(f64, f64); 2] = [(0.50, 0.01), (0.99, 0.001)];

/// A targeted quantile together with the rank error allowed when estimating it.
///
/// Both values live on the `[0, 1]` interval. An invariant of `(0.99, 0.001)`
/// asks for the 99th percentile with a rank error of at most 0.1% of the
/// observations seen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Invariant {
    quantile: f64,
    error: f64,
}

impl Invariant {
    /// Creates an invariant, rejecting values outside `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns `QEstimateError::InvalidInvariant` if either value is not a
    /// finite number in `[0, 1]`.
    pub fn new(quantile: f64, error: f64) -> Result<Self> {
        let invalid = |reason| QEstimateError::InvalidInvariant {
            quantile,
            error,
            reason,
        };

        if !quantile.is_finite() || !(0.0..=1.0).contains(&quantile) {
            return Err(invalid("quantile must lie in [0, 1]"));
        }
        if !error.is_finite() || !(0.0..=1.0).contains(&error) {
            return Err(invalid("allowed error must lie in [0, 1]"));
        }

        Ok(Self { quantile, error })
    }

    pub fn quantile(&self) -> f64 {
        self.quantile
    }

    pub fn error(&self) -> f64 {
        self.error
    }

    /// Rank error tolerated at `rank` after `n` observations.
    ///
    /// Below the target rank the tolerance shrinks towards the target from the
    /// top of the stream, above it the tolerance grows with the rank. Returns
    /// `None` on the side of a border quantile (0 or 1) where the bound is
    /// undefined, meaning this invariant places no constraint there.
    pub fn allowed_error(&self, rank: f64, n: f64) -> Option<f64> {
        if rank <= (self.quantile * n).floor() {
            (self.quantile < 1.0).then(|| 2.0 * self.error / (1.0 - self.quantile) * (n - rank))
        } else {
            (self.quantile > 0.0).then(|| 2.0 * self.error / self.quantile * rank)
        }
    }
}

/// Builds the invariant list for an estimator from `(quantile, error)` pairs.
///
/// An empty slice selects [`DEFAULT_INVARIANTS`].
pub fn parse_invariants(pairs: &[(f64, f64)]) -> Result<Vec<Invariant>> {
    if pairs.is_empty() {
        return Ok(default_invariants());
    }

    pairs.iter().map(|&(q, e)| Invariant::new(q, e)).collect()
}

pub fn default_invariants() -> Vec<Invariant> {
    DEFAULT_INVARIANTS
        .iter()
        .map(|&(quantile, error)| Invariant { quantile, error })
        .collect()
}

/// Smallest tolerance across all invariants, floored to a whole rank.
///
/// Starts from `n + 1`, so a rank no invariant constrains is allowed to absorb
/// the entire stream.
pub(crate) fn combined_allowed_error(invariants: &[Invariant], rank: f64, n: f64) -> f64 {
    invariants
        .iter()
        .filter_map(|i| i.allowed_error(rank, n))
        .fold(n + 1.0, f64::min)
        .floor()
}

/// Smallest combined tolerance at any rank in `[low, high]`.
///
/// Each invariant's tolerance falls towards its target rank and rises past
/// it, so the minimum over the range sits at one of its ends or on either
/// side of a target rank inside it.
pub(crate) fn combined_allowed_error_between(
    invariants: &[Invariant],
    low: f64,
    high: f64,
    n: f64,
) -> f64 {
    let targets = invariants.iter().flat_map(|invariant| {
        let target = (invariant.quantile * n).floor();
        [target, target + 1.0]
    });

    [low, high]
        .into_iter()
        .chain(targets.filter(|rank| (low..=high).contains(rank)))
        .map(|rank| combined_allowed_error(invariants, rank, n))
        .fold(n + 1.0, f64::min)
}
