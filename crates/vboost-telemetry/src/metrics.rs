//! Prometheus metrics for the vboost executor.
//!
//! Covers round outcomes, round phase latencies, traded volume, and the
//! account state read between rounds.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A failure means a
//! duplicate metric name, which must crash at startup. These panics only
//! occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec,
};

/// Bucket bounds shared by the latency histograms, in milliseconds.
const LATENCY_BUCKETS_MS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0,
];

/// Finished rounds.
/// Labels: instrument, outcome (success/warning_recovered/fail_transient/fail_permanent)
pub static ROUNDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vboost_rounds_total",
        "Finished maker/taker rounds by outcome",
        &["instrument", "outcome"]
    )
    .unwrap()
});

/// Wait for the maker order to show up on the order stream.
pub static CONFIRM_WAIT_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "vboost_confirm_wait_ms",
        "Maker confirmation wait in milliseconds",
        &["instrument"],
        LATENCY_BUCKETS_MS.to_vec()
    )
    .unwrap()
});

/// Maker submit to taker fire.
pub static MAKER_TO_TAKER_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "vboost_maker_to_taker_ms",
        "Gap between maker submission and taker submission in milliseconds",
        &["instrument"],
        LATENCY_BUCKETS_MS.to_vec()
    )
    .unwrap()
});

/// REST latency of order submission.
/// Labels: instrument, leg (maker/taker)
pub static SUBMIT_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "vboost_submit_latency_ms",
        "Order submission latency in milliseconds",
        &["instrument", "leg"],
        LATENCY_BUCKETS_MS.to_vec()
    )
    .unwrap()
});

/// Notional traded by successful rounds, both accounts counted.
pub static VOLUME_USD_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vboost_volume_usd_total",
        "Traded notional in USD",
        &["instrument"]
    )
    .unwrap()
});

/// Maintenance margin over equity, per account.
pub static MARGIN_RATIO: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "vboost_margin_ratio",
        "Account margin ratio",
        &["account"]
    )
    .unwrap()
});

/// Signed position size, per account and instrument.
pub static POSITION_SIZE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "vboost_position_size",
        "Signed position size",
        &["account", "instrument"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a finished round.
    pub fn round_finished(instrument: &str, outcome: &str) {
        ROUNDS_TOTAL.with_label_values(&[instrument, outcome]).inc();
    }

    pub fn confirm_wait(instrument: &str, wait_ms: f64) {
        CONFIRM_WAIT_MS.with_label_values(&[instrument]).observe(wait_ms);
    }

    pub fn maker_to_taker(instrument: &str, gap_ms: f64) {
        MAKER_TO_TAKER_MS.with_label_values(&[instrument]).observe(gap_ms);
    }

    pub fn submit_latency(instrument: &str, leg: &str, latency_ms: f64) {
        SUBMIT_LATENCY_MS
            .with_label_values(&[instrument, leg])
            .observe(latency_ms);
    }

    pub fn volume(instrument: &str, notional_usd: f64) {
        if notional_usd > 0.0 {
            VOLUME_USD_TOTAL
                .with_label_values(&[instrument])
                .inc_by(notional_usd);
        }
    }

    pub fn margin_ratio(account: &str, ratio: f64) {
        MARGIN_RATIO.with_label_values(&[account]).set(ratio);
    }

    pub fn position(account: &str, instrument: &str, size: f64) {
        POSITION_SIZE
            .with_label_values(&[account, instrument])
            .set(size);
    }
}
