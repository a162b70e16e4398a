use log::{debug, trace};

use crate::error::Result;
use crate::invariant::{
    combined_allowed_error, combined_allowed_error_between, default_invariants, parse_invariants,
    Invariant,
};

/// Number of observations buffered before they are merged into the summary.
pub const BUFFER_SIZE: usize = 512;

/// A retained observation in the summary.
///
/// `width` is the rank distance to the preceding sample and `delta` the
/// uncertainty of this sample's rank.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    value: f64,
    width: u64,
    delta: u64,
}

/// Estimates quantiles over a stream of values in bounded memory.
///
/// Implements Cormode and Muthukrishnan's biased quantiles summary (ICDE'05):
/// only as many samples are retained as the registered invariants require.
/// Observations are buffered and merged in sorted batches of [`BUFFER_SIZE`].
///
/// The estimator is not safe for concurrent use; wrap it in a `Mutex` to
/// share it between threads.
#[derive(Debug, Clone)]
pub struct Estimator {
    invariants: Vec<Invariant>,
    buffer: Vec<f64>,
    samples: Vec<Sample>,
    observations: u64,
}

impl Default for Estimator {
    fn default() -> Self {
        Self::with_invariants(default_invariants())
    }
}

impl Estimator {
    /// Creates an estimator targeting the given `(quantile, error)` pairs.
    ///
    /// With no pairs the median at 1% and the 99th percentile at 0.1% are
    /// targeted.
    ///
    /// # Errors
    ///
    /// Returns `QEstimateError::InvalidInvariant` if a pair lies outside `[0, 1]`.
    pub fn new(invariants: &[(f64, f64)]) -> Result<Self> {
        Ok(Self::with_invariants(parse_invariants(invariants)?))
    }

    /// Creates an estimator from already validated invariants.
    pub fn with_invariants(invariants: Vec<Invariant>) -> Self {
        let invariants = if invariants.is_empty() {
            default_invariants()
        } else {
            invariants
        };

        Self {
            invariants,
            buffer: Vec::with_capacity(BUFFER_SIZE),
            samples: Vec::new(),
            observations: 0,
        }
    }

    pub fn invariants(&self) -> &[Invariant] {
        &self.invariants
    }

    /// Number of observations committed to the summary, excluding buffered ones.
    pub fn count(&self) -> u64 {
        self.observations
    }

    /// Number of samples the summary currently retains.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.buffer.is_empty()
    }

    /// Samples an observation. Non-finite values are ignored.
    pub fn observe(&mut self, value: f64) {
        if !value.is_finite() {
            trace!("Ignoring non-finite observation: {value}");
            return;
        }

        self.buffer.push(value);
        if self.buffer.len() >= BUFFER_SIZE {
            self.flush();
        }
    }

    /// Estimates the value at quantile `rank` along `[0, 1]`.
    ///
    /// The rank should be one of the registered invariants for the error bound
    /// to hold. Ranks 0 and 1 return the smallest and largest retained sample.
    /// Returns `None` if nothing has been observed or the rank is NaN.
    pub fn query(&mut self, rank: f64) -> Option<f64> {
        self.flush();

        if rank.is_nan() {
            return None;
        }
        let first = self.samples.first()?.value;
        let last = self.samples.last()?.value;

        let rank = rank.clamp(0.0, 1.0);
        if rank == 0.0 {
            return Some(first);
        }
        if rank == 1.0 {
            return Some(last);
        }

        let n = as_rank(self.observations);
        let target = (rank * n).ceil();
        let max_rank =
            target + (combined_allowed_error(&self.invariants, target, n) / 2.0).ceil();

        let mut accumulated = 0.0;
        for pair in self.samples.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            accumulated += as_rank(current.width);
            if accumulated + as_rank(next.width + next.delta) > max_rank {
                return Some(current.value);
            }
        }

        Some(last)
    }

    /// Commits all buffered observations into the summary and compresses it.
    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let batch = self.buffer.len();
        self.merge_buffer();
        self.compress();
        debug!(
            "Flushed {} observations: {} samples retained for {} observations",
            batch,
            self.samples.len(),
            self.observations
        );
    }

    /// Merges the sorted buffer into the sample list in a single pass.
    fn merge_buffer(&mut self) {
        self.buffer.sort_unstable_by(f64::total_cmp);

        let mut existing = std::mem::take(&mut self.samples).into_iter().peekable();
        let mut merged = Vec::with_capacity(existing.len() + self.buffer.len());
        let mut rank = 0.0;

        for &value in &self.buffer {
            while let Some(sample) = existing.next_if(|s| s.value <= value) {
                rank += as_rank(sample.width);
                merged.push(sample);
            }

            // New extremes are known exactly.
            let delta = if merged.is_empty() || existing.peek().is_none() {
                0
            } else {
                // The new sample may span up to `widest` ranks, all of which
                // must tolerate its uncertainty.
                let n = as_rank(self.observations);
                let widest = combined_allowed_error(&self.invariants, rank, n);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let allowed =
                    combined_allowed_error_between(&self.invariants, rank, rank + widest, n) as u64;
                allowed.saturating_sub(1)
            };

            merged.push(Sample {
                value,
                width: 1,
                delta,
            });
            rank += 1.0;
            self.observations += 1;
        }

        merged.extend(existing);
        self.samples = merged;
        self.buffer.clear();
    }

    /// Folds samples into their successors wherever the invariants allow it.
    ///
    /// A fold is kept only if every rank the merged sample may cover tolerates
    /// its width plus the successor's uncertainty. Each sample takes part in at
    /// most one fold per pass.
    fn compress(&mut self) {
        if self.samples.len() < 2 {
            return;
        }

        let n = as_rank(self.observations);
        let mut samples = std::mem::take(&mut self.samples).into_iter().peekable();
        let mut compressed = Vec::with_capacity(samples.len());
        let mut rank = 0.0;

        while let Some(mut current) = samples.next() {
            let fold = samples.next_if(|next| {
                let span = as_rank(current.width + next.width + next.delta);
                span <= combined_allowed_error_between(&self.invariants, rank, rank + span, n)
            });
            if let Some(next) = fold {
                current = Sample {
                    value: next.value,
                    width: current.width + next.width,
                    delta: next.delta,
                };
            }

            rank += as_rank(current.width);
            compressed.push(current);
        }

        self.samples = compressed;
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_rank(count: u64) -> f64 {
    count as f64
}
