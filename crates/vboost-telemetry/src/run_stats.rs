//! End-of-run summary built from the round metrics.

use crate::metrics::{CONFIRM_WAIT_MS, MAKER_TO_TAKER_MS, ROUNDS_TOTAL, VOLUME_USD_TOTAL};
use chrono::{DateTime, Utc};
use prometheus::core::Collector;
use serde::Serialize;
use tracing::info;

/// Statistics of one run on one instrument.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub instrument: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub successful_rounds: u64,
    /// Successful rounds that needed a recovery flatten.
    pub recovered_rounds: u64,
    pub failed_rounds: u64,
    pub volume_usd: f64,
    pub confirm_wait_p50_ms: f64,
    pub confirm_wait_p95_ms: f64,
    pub maker_to_taker_p50_ms: f64,
    pub maker_to_taker_p95_ms: f64,
}

/// Collects the run summary for one instrument.
pub struct RunStatsReporter {
    instrument: String,
    start_time: DateTime<Utc>,
}

impl RunStatsReporter {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            start_time: Utc::now(),
        }
    }

    pub fn stats(&self) -> RunStats {
        let instrument = self.instrument.as_str();
        let count = |outcome: &str| {
            ROUNDS_TOTAL
                .with_label_values(&[instrument, outcome])
                .get() as u64
        };
        let success = count("success");
        let recovered = count("warning_recovered");
        let failed = count("fail_transient") + count("fail_permanent");

        let (confirm_p50, confirm_p95) = histogram_percentiles(&CONFIRM_WAIT_MS, instrument);
        let (gap_p50, gap_p95) = histogram_percentiles(&MAKER_TO_TAKER_MS, instrument);

        RunStats {
            instrument: self.instrument.clone(),
            started_at: self.start_time,
            duration_secs: (Utc::now() - self.start_time).num_seconds(),
            successful_rounds: success + recovered,
            recovered_rounds: recovered,
            failed_rounds: failed,
            volume_usd: VOLUME_USD_TOTAL.with_label_values(&[instrument]).get(),
            confirm_wait_p50_ms: confirm_p50,
            confirm_wait_p95_ms: confirm_p95,
            maker_to_taker_p50_ms: gap_p50,
            maker_to_taker_p95_ms: gap_p95,
        }
    }

    /// Log the summary, with the final position of each account.
    pub fn output_summary(&self, final_positions: &[(String, String)]) {
        let s = self.stats();

        info!("=============== Run Summary ===============");
        info!(
            "Period: {} ({} min {} s)",
            s.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            s.duration_secs / 60,
            s.duration_secs % 60
        );
        info!("Instrument: {}", s.instrument);
        info!(
            "Rounds: {} ok ({} recovered), {} failed",
            s.successful_rounds, s.recovered_rounds, s.failed_rounds
        );
        info!("Volume: ${:.2}", s.volume_usd);
        info!(
            "Confirm wait (ms): P50={:.1}, P95={:.1}",
            s.confirm_wait_p50_ms, s.confirm_wait_p95_ms
        );
        info!(
            "Maker->taker (ms): P50={:.1}, P95={:.1}",
            s.maker_to_taker_p50_ms, s.maker_to_taker_p95_ms
        );
        for (account, position) in final_positions {
            info!("Final position {}: {}", account, position);
        }
        info!("===========================================");
    }
}

/// (p50, p95) of a single-label histogram.
fn histogram_percentiles(histogram: &prometheus::HistogramVec, label: &str) -> (f64, f64) {
    for mf in histogram.collect() {
        for m in mf.get_metric() {
            let pairs = m.get_label();
            if pairs.len() != 1 || pairs[0].get_value() != label {
                continue;
            }
            let h = m.get_histogram();
            let count = h.get_sample_count();
            if count == 0 {
                return (0.0, 0.0);
            }
            let buckets = h.get_bucket();
            return (
                percentile_from_buckets(buckets, count, 0.50),
                percentile_from_buckets(buckets, count, 0.95),
            );
        }
    }
    (0.0, 0.0)
}

/// Linear interpolation inside the bucket holding the target rank.
fn percentile_from_buckets(
    buckets: &[prometheus::proto::Bucket],
    total_count: u64,
    percentile: f64,
) -> f64 {
    let target = (total_count as f64 * percentile).ceil() as u64;
    let mut prev_bound = 0.0;
    let mut prev_count = 0u64;

    for bucket in buckets {
        let upper_bound = bucket.get_upper_bound();
        let cumulative_count = bucket.get_cumulative_count();

        if cumulative_count >= target {
            let bucket_count = cumulative_count - prev_count;
            if bucket_count == 0 {
                return upper_bound;
            }
            let position = (target - prev_count) as f64 / bucket_count as f64;
            return prev_bound + position * (upper_bound - prev_bound);
        }

        prev_bound = upper_bound;
        prev_count = cumulative_count;
    }

    buckets.last().map(|b| b.get_upper_bound()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;

    #[test]
    fn test_stats_count_outcomes() {
        let instrument = "TEST_RUN_STATS";
        Metrics::round_finished(instrument, "success");
        Metrics::round_finished(instrument, "warning_recovered");
        Metrics::round_finished(instrument, "fail_transient");
        Metrics::round_finished(instrument, "fail_permanent");
        Metrics::volume(instrument, 400.0);

        let stats = RunStatsReporter::new(instrument).stats();
        assert_eq!(stats.successful_rounds, 2);
        assert_eq!(stats.recovered_rounds, 1);
        assert_eq!(stats.failed_rounds, 2);
        assert_eq!(stats.volume_usd, 400.0);
    }

    #[test]
    fn test_percentiles_within_bucket() {
        let instrument = "TEST_RUN_PCT";
        for _ in 0..10 {
            Metrics::confirm_wait(instrument, 30.0);
        }
        let stats = RunStatsReporter::new(instrument).stats();
        // All samples sit in the (25, 50] bucket
        assert!(stats.confirm_wait_p50_ms > 25.0 && stats.confirm_wait_p50_ms <= 50.0);
        assert!(stats.confirm_wait_p95_ms <= 50.0);
        assert_eq!(stats.maker_to_taker_p50_ms, 0.0);
    }
}
