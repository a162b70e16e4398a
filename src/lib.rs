//! Streaming biased-quantile estimation.
//!
//! [`Estimator`] implements Cormode and Muthukrishnan's "Effective Computation
//! of Biased Quantiles over Data Streams" (ICDE'05): it answers quantile
//! queries within a per-quantile rank error while retaining only a small
//! summary of the stream. [`TimeWindowEstimator`] keeps a ring of estimators to
//! answer the same queries over a sliding window of time.
//!
//! ```
//! use qestimate::Estimator;
//!
//! let mut estimator = Estimator::new(&[(0.5, 0.01), (0.9, 0.01)]).unwrap();
//! for value in 1..=1000 {
//!     estimator.observe(f64::from(value));
//! }
//!
//! let median = estimator.query(0.5).unwrap();
//! assert!((480.0..=520.0).contains(&median));
//! ```

pub mod error;
pub mod estimator;
pub mod input;
pub mod invariant;
pub mod report;
pub mod window;

pub use error::{QEstimateError, Result};
pub use estimator::{Estimator, BUFFER_SIZE};
pub use invariant::{Invariant, DEFAULT_INVARIANTS};
pub use report::{EstimationMode, QuantileReport, QuantileSource, StreamStats};
pub use window::{Clock, ManualClock, SystemClock, TimeWindowEstimator};
