use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use qestimate::{
    EstimationMode, Estimator, ManualClock, QEstimateError, QuantileReport, StreamStats,
    TimeWindowEstimator,
};

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values
}

#[test]
fn estimates_skewed_stream_within_bounds() {
    let mut rng = StdRng::seed_from_u64(20_000);
    // Exponential-ish latencies: most small, a long tail.
    let values: Vec<f64> = (0..20_000)
        .map(|_| -rng.gen_range(f64::EPSILON..1.0_f64).ln() * 100.0)
        .collect();

    let invariants = [(0.5, 0.01), (0.9, 0.005), (0.99, 0.001)];
    let mut estimator = Estimator::new(&invariants).unwrap();
    for &value in &values {
        estimator.observe(value);
    }

    let values = sorted(values);
    let n = values.len() as f64;
    for (quantile, error) in invariants {
        let low = (quantile * n - error * n).floor() as usize;
        let high = ((quantile * n + error * n).ceil() as usize).min(values.len() - 1);
        let estimate = estimator.query(quantile).unwrap();
        assert!(
            values[low] <= estimate && estimate <= values[high],
            "q={quantile}: {estimate} outside [{}, {}]",
            values[low],
            values[high]
        );
    }
}

#[test]
fn sorted_and_reversed_streams_keep_extremes() {
    let ascending: Vec<f64> = (0..5_000).map(f64::from).collect();
    let descending: Vec<f64> = ascending.iter().rev().copied().collect();

    for stream in [ascending, descending] {
        let mut estimator = Estimator::new(&[(0.0, 0.0), (1.0, 0.0)]).unwrap();
        for value in stream {
            estimator.observe(value);
        }
        assert_eq!(estimator.query(0.0), Some(0.0));
        assert_eq!(estimator.query(1.0), Some(4_999.0));
    }
}

#[test]
fn constant_stream_returns_the_constant() {
    let mut estimator = Estimator::default();
    for _ in 0..3_000 {
        estimator.observe(7.5);
    }

    assert_eq!(estimator.query(0.5), Some(7.5));
    assert_eq!(estimator.query(0.99), Some(7.5));
}

#[test]
fn invalid_invariants_are_reported() {
    let err = Estimator::new(&[(0.5, -0.1)]).unwrap_err();
    assert!(matches!(err, QEstimateError::InvalidInvariant { .. }));
    assert!(err.to_string().contains("allowed error"));
}

#[test]
fn window_tracks_recent_latencies() {
    let clock = ManualClock::new(0);
    let mut window = TimeWindowEstimator::with_clock(
        &[(0.5, 0.01)],
        Duration::from_secs(60),
        6,
        clock.clone(),
    )
    .unwrap();

    // A slow minute followed by a fast one.
    for second in 0..60 {
        clock.set(second * 1_000);
        window.observe(500.0);
    }
    for second in 60..120 {
        clock.set(second * 1_000);
        window.observe(10.0);
    }
    clock.set(121_000);

    assert_eq!(window.query(0.5), Some(10.0));
    assert_eq!(window.count(), 120);
    assert!((window.sum() - (60.0 * 500.0 + 60.0 * 10.0)).abs() < 1e-9);
}

#[test]
fn report_collects_from_window() {
    let clock = ManualClock::new(0);
    let mut window =
        TimeWindowEstimator::with_clock(&[], Duration::from_secs(10), 5, clock.clone()).unwrap();
    let mut stats = StreamStats::default();
    for value in [1.0, 2.0, 3.0] {
        window.observe(value);
        stats.record(value);
    }

    let report = QuantileReport::collect(
        "integration",
        EstimationMode::Window {
            max_age_seconds: 10.0,
            age_buckets: 5,
        },
        stats,
        &mut window,
        &[],
    );

    assert_eq!(report.estimates.len(), 2);
    assert_eq!(report.estimates["p50"], Some(2.0));
    assert_eq!(report.stats.max, Some(3.0));
}
