//! Run modes on top of single rounds.
//!
//! # Modes
//!
//! - Instant: per round open, wait, close. Any failed open or close ends
//!   the run, since a failed close may leave positions behind.
//! - Build/hold/close: open rounds while both margin ratios stay under the
//!   limit, hold, then close as many rounds as were opened. A failed close
//!   falls back to reduce-only market orders on both accounts.
//!
//! Shutdown is checked at round boundaries and interrupts waits, but a
//! run that has opened positions always proceeds to close them.

use std::time::Duration;

use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vboost_core::{OrderIntent, OrderSide, RoundOutcome, Size, EXTERNAL_FILL_WARNING};
use vboost_executor::{ExecutionAccount, PairExecutor, RetryCoordinator, RoundReport};
use vboost_telemetry::Metrics;

use crate::config::{AppConfig, RunMode};
use crate::direction::{long_short, DirectionPolicy};

/// Gap between rounds in build/hold/close mode.
const ROUND_GAP: Duration = Duration::from_secs(1);
/// Instant mode waits a random time in this range (ms) between rounds.
const INSTANT_GAP_MS: (u64, u64) = (1_000, 2_000);

/// Run parameters taken from `AppConfig`.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub mode: RunMode,
    pub rounds: u32,
    /// Instant mode: wait between open and close.
    pub delay: Duration,
    pub hold: Duration,
    pub max_margin_ratio: Decimal,
    pub direction: DirectionPolicy,
    pub max_retries: u32,
    pub halt_on_external_fill: bool,
}

impl From<&AppConfig> for RunSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            mode: config.mode,
            rounds: config.rounds,
            delay: Duration::from_secs_f64(config.delay_secs),
            hold: Duration::from_secs(config.hold_minutes * 60),
            max_margin_ratio: config.max_margin_ratio,
            direction: config.direction,
            max_retries: config.max_retries,
            halt_on_external_fill: config.halt_on_external_fill,
        }
    }
}

/// What a run achieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Pair rounds (opens and closes) that ended in a hedged state.
    pub successful_rounds: u32,
    /// Successful rounds that needed a recovery flatten.
    pub recovered_rounds: u32,
    pub failed_rounds: u32,
    /// Build/hold/close: rounds opened before the hold.
    pub opened_rounds: u32,
    /// Notional traded across both accounts.
    pub volume_usd: Decimal,
    /// Why the run stopped early, if it did.
    pub halted: Option<String>,
}

/// Drives rounds between two accounts on one instrument.
pub struct Orchestrator {
    executor: PairExecutor,
    /// Account 1 then account 2.
    accounts: [ExecutionAccount; 2],
    size: Size,
    settings: RunSettings,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        executor: PairExecutor,
        accounts: [ExecutionAccount; 2],
        size: Size,
        settings: RunSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            executor,
            accounts,
            size,
            settings,
            shutdown,
        }
    }

    fn instrument(&self) -> &str {
        &self.executor.meta().instrument
    }

    pub async fn run(&self) -> RunReport {
        match self.settings.mode {
            RunMode::Instant => self.run_instant().await,
            RunMode::BuildHoldClose => self.run_build_hold_close().await,
        }
    }

    // ========================================================================
    // Instant mode
    // ========================================================================

    async fn run_instant(&self) -> RunReport {
        let mut report = RunReport::default();
        let rounds = self.settings.rounds;
        info!(
            instrument = %self.instrument(),
            size = %self.size,
            rounds,
            direction = ?self.settings.direction,
            delay_ms = self.settings.delay.as_millis() as u64,
            "=== INSTANT CLOSE MODE ==="
        );

        let open_retry = RetryCoordinator::new(self.settings.max_retries, self.shutdown.clone());
        // Closing must not be cut short by shutdown
        let close_retry = RetryCoordinator::new(self.settings.max_retries, CancellationToken::new());

        for i in 0..rounds {
            if self.shutdown.is_cancelled() {
                info!("Shutdown requested, not starting round {}", i + 1);
                break;
            }
            let account1_long = self.settings.direction.account1_long(&mut rand::thread_rng());
            let (long, short) = long_short(account1_long);
            info!(
                round = i + 1,
                rounds,
                long = %self.accounts[long].name(),
                short = %self.accounts[short].name(),
                "Round start"
            );

            let mid = self.mid_price().await;

            let opened = open_retry
                .execute_with_retry(|_| self.round(long, short, true))
                .await;
            if !opened.success {
                let message = opened.message.unwrap_or_else(|| "Open failed".to_string());
                error!(round = i + 1, error = %message, "Open failed, stopping");
                report.failed_rounds += 1;
                report.halted = Some(message);
                break;
            }

            self.sleep(self.settings.delay).await;

            let closed = close_retry
                .execute_with_retry(|_| self.round(long, short, false))
                .await;
            if !closed.success {
                let message = format!(
                    "CLOSE FAILED - positions may be open: {}",
                    closed.message.unwrap_or_default()
                );
                error!(round = i + 1, error = %message, "Close failed, stopping");
                report.failed_rounds += 1;
                report.halted = Some(message);
                break;
            }

            report.successful_rounds += 1;
            let warned = opened.is_warning() || closed.is_warning();
            if warned {
                report.recovered_rounds += 1;
            }
            if let Some(mid) = mid {
                let volume = Decimal::from(4) * self.size.inner() * mid;
                report.volume_usd += volume;
                Metrics::volume(self.instrument(), volume.to_f64().unwrap_or(0.0));
            }
            info!(round = i + 1, "Round OK");

            if (i + 1) % 10 == 0 {
                info!(volume_usd = %report.volume_usd.round_dp(2), ">> Accumulated volume");
            }

            if warned && self.settings.halt_on_external_fill {
                report.halted = Some(format!("{EXTERNAL_FILL_WARNING} in round {}", i + 1));
                warn!("External fill recovered, halting as configured");
                break;
            }

            if i + 1 < rounds {
                let gap = rand::thread_rng().gen_range(INSTANT_GAP_MS.0..=INSTANT_GAP_MS.1);
                if !self.sleep(Duration::from_millis(gap)).await {
                    break;
                }
            }
        }

        report
    }

    // ========================================================================
    // Build / hold / close mode
    // ========================================================================

    async fn run_build_hold_close(&self) -> RunReport {
        let mut report = RunReport::default();
        let policy = self.settings.direction.fixed(&mut rand::thread_rng());
        let (long, short) = long_short(policy == DirectionPolicy::Account1Long);
        info!(
            instrument = %self.instrument(),
            size = %self.size,
            rounds = self.settings.rounds,
            direction = ?policy,
            max_margin_ratio = %self.settings.max_margin_ratio,
            hold_secs = self.settings.hold.as_secs(),
            "=== BUILD / HOLD / CLOSE MODE ==="
        );

        info!("=== PHASE 1: BUILDING POSITIONS ===");
        for i in 0..self.settings.rounds {
            if self.shutdown.is_cancelled() {
                break;
            }
            if !self.margin_allows_open(i + 1).await {
                break;
            }

            let mid = self.mid_price().await;
            let outcome = self.round(long, short, true).await;
            if !outcome.is_success() {
                warn!(round = i + 1, outcome = ?outcome, "Open failed, stopping build-up");
                report.failed_rounds += 1;
                if outcome.is_permanent() {
                    report.halted = Some(outcome_message(&outcome));
                }
                break;
            }

            report.opened_rounds += 1;
            self.record_success(&mut report, &outcome, mid);
            if matches!(outcome, RoundOutcome::WarningRecovered { .. })
                && self.settings.halt_on_external_fill
            {
                report.halted = Some(format!("{EXTERNAL_FILL_WARNING} in round {}", i + 1));
                break;
            }
            if !self.sleep(ROUND_GAP).await {
                break;
            }
        }

        if report.opened_rounds == 0 {
            info!("No positions opened");
            return report;
        }

        info!(
            opened = report.opened_rounds,
            total_size = %(self.size.inner() * Decimal::from(report.opened_rounds)),
            "=== PHASE 2: HOLDING ==="
        );
        if !self.sleep(self.settings.hold).await {
            info!("Hold interrupted by shutdown, closing now");
        }

        info!("=== PHASE 3: CLOSING POSITIONS ===");
        for i in 0..report.opened_rounds {
            let mid = self.mid_price().await;
            let outcome = self.round(long, short, false).await;
            if outcome.is_success() {
                self.record_success(&mut report, &outcome, mid);
            } else {
                report.failed_rounds += 1;
                warn!(
                    close = i + 1,
                    error = %outcome_message(&outcome),
                    "Limit close failed, using market close"
                );
                let closed_a = self.market_close(0).await;
                let closed_b = self.market_close(1).await;
                if !(closed_a && closed_b) {
                    report.halted = Some("market close failed - positions may be open".to_string());
                }
                break;
            }
            tokio::time::sleep(ROUND_GAP).await;
        }

        report
    }

    async fn margin_allows_open(&self, round: u32) -> bool {
        let (a, b) = tokio::join!(
            self.accounts[0].gateway.margin_ratio(),
            self.accounts[1].gateway.margin_ratio()
        );
        let (a, b) = match (a, b) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                warn!(round, error = %e, "Failed to get margin, stopping");
                return false;
            }
        };
        Metrics::margin_ratio(self.accounts[0].name(), a.to_f64().unwrap_or(0.0));
        Metrics::margin_ratio(self.accounts[1].name(), b.to_f64().unwrap_or(0.0));
        info!(round, margin_a = %a, margin_b = %b, "Margin");

        let max = self.settings.max_margin_ratio;
        if a > max || b > max {
            info!(%max, "Max margin reached, stopping build-up");
            return false;
        }
        true
    }

    fn record_success(&self, report: &mut RunReport, outcome: &RoundOutcome, mid: Option<Decimal>) {
        report.successful_rounds += 1;
        if matches!(outcome, RoundOutcome::WarningRecovered { .. }) {
            report.recovered_rounds += 1;
        }
        if let Some(mid) = mid {
            let volume = Decimal::from(2) * self.size.inner() * mid;
            report.volume_usd += volume;
            Metrics::volume(self.instrument(), volume.to_f64().unwrap_or(0.0));
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// One round between `accounts[maker]` and `accounts[taker]`, with metrics.
    async fn round(&self, maker: usize, taker: usize, opening: bool) -> RoundOutcome {
        let report = self
            .executor
            .execute_round(&self.accounts[maker], &self.accounts[taker], self.size, opening)
            .await;
        self.record_round(&report);
        report.outcome
    }

    fn record_round(&self, report: &RoundReport) {
        let instrument = self.instrument();
        let ms = |d: Duration| d.as_secs_f64() * 1_000.0;
        Metrics::round_finished(instrument, report.outcome.label());
        let t = &report.timings;
        if let Some(d) = t.confirm_wait {
            Metrics::confirm_wait(instrument, ms(d));
        }
        if let Some(d) = t.maker_to_taker {
            Metrics::maker_to_taker(instrument, ms(d));
        }
        if let Some(d) = t.maker_submit {
            Metrics::submit_latency(instrument, "maker", ms(d));
        }
        if let Some(d) = t.taker_submit {
            Metrics::submit_latency(instrument, "taker", ms(d));
        }
    }

    async fn mid_price(&self) -> Option<Decimal> {
        match self.executor.market_data().ticker(self.instrument()).await {
            Ok(ticker) => ticker.mid().ok().map(|m| m.inner()),
            Err(e) => {
                warn!(error = %e, "Ticker unavailable, round volume not counted");
                None
            }
        }
    }

    /// Reduce-only market order closing the whole position of one account.
    pub async fn market_close(&self, index: usize) -> bool {
        let account = &self.accounts[index];
        let instrument = self.instrument();
        let position = match account.gateway.position_size(instrument).await {
            Ok(p) => p,
            Err(e) => {
                error!(account = %account.name(), error = %e, "Market close: position read failed");
                return false;
            }
        };
        if position.is_zero() {
            return true;
        }

        let side = if position.is_positive() {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        let intent = OrderIntent::market_reduce_only(instrument, side, position.abs());
        match account.gateway.create_order(&intent).await {
            Ok(_) => {
                info!(account = %account.name(), %side, size = %position.abs(), "Market close sent");
                true
            }
            Err(e) => {
                error!(account = %account.name(), error = %e, "Market close failed");
                false
            }
        }
    }

    /// Current position of each account, for the run summary.
    pub async fn final_positions(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(2);
        for account in &self.accounts {
            let value = match account.gateway.position_size(self.instrument()).await {
                Ok(p) => {
                    Metrics::position(
                        account.name(),
                        self.instrument(),
                        p.inner().to_f64().unwrap_or(0.0),
                    );
                    p.normalized().to_string()
                }
                Err(e) => format!("unknown ({e})"),
            };
            out.push((account.name().to_string(), value));
        }
        out
    }

    /// Sleep unless shutdown comes first. Returns false when interrupted.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

fn outcome_message(outcome: &RoundOutcome) -> String {
    match outcome {
        RoundOutcome::FailTransient(m) | RoundOutcome::FailPermanent(m) => m.clone(),
        RoundOutcome::WarningRecovered { message, .. } => message.clone(),
        RoundOutcome::Success => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use vboost_core::{InstrumentMeta, OrderEvent, OrderStatus, Price, Ticker};
    use vboost_executor::{ExecutorConfig, LeverageBumpLimiter};
    use vboost_feed::OrderIndex;
    use vboost_gateway::{GatewayError, MockGateway, MockMarketData};

    const INSTRUMENT: &str = "ETH_USDT_Perp";

    fn meta() -> InstrumentMeta {
        InstrumentMeta {
            instrument: INSTRUMENT.to_string(),
            tick_size: Price::new(dec!(0.1)),
            base_decimals: 3,
            min_size: Size::new(dec!(0.001)),
            min_notional: Decimal::ZERO,
            asset_id: "0x02".to_string(),
        }
    }

    fn signed(intent: &OrderIntent) -> Size {
        if intent.is_buying() {
            intent.size
        } else {
            -intent.size
        }
    }

    struct Fixture {
        a: Arc<MockGateway>,
        b: Arc<MockGateway>,
        orchestrator: Orchestrator,
    }

    /// Account 1 always makes. Its makers are confirmed on its stream and
    /// account 2's takers fill against them, unless `close_fills` is false.
    fn fixture(settings: RunSettings, close_fills: bool, shutdown: CancellationToken) -> Fixture {
        let market = Arc::new(MockMarketData::new());
        market.push_ticker(Ticker::new(Price::new(dec!(100.0)), Price::new(dec!(100.3))));
        let a = Arc::new(MockGateway::new("Account1"));
        let b = Arc::new(MockGateway::new("Account2"));
        let index_a = Arc::new(OrderIndex::default());

        let idx = index_a.clone();
        a.set_on_create(Box::new(move |intent| {
            if intent.post_only {
                idx.ingest(OrderEvent {
                    correlation_id: Some(intent.correlation_id),
                    instrument: intent.instrument.clone(),
                    status: OrderStatus::Open,
                    leg_size: Some(intent.size),
                    leg_price: Some(intent.price),
                    is_buying: Some(intent.is_buying()),
                    received_at_ms: chrono::Utc::now().timestamp_millis() as u64,
                });
                None
            } else {
                Some(signed(intent))
            }
        }));
        let maker = a.clone();
        b.set_on_create(Box::new(move |intent| {
            if intent.is_market() {
                return Some(signed(intent));
            }
            if intent.reduce_only && !close_fills {
                return None;
            }
            maker.adjust_position(-signed(intent));
            Some(signed(intent))
        }));

        let config = ExecutorConfig {
            skip_stability: true,
            ..Default::default()
        };
        let executor = PairExecutor::new(
            meta(),
            market,
            config,
            Arc::new(LeverageBumpLimiter::default()),
        );
        let accounts = [
            ExecutionAccount::new(a.clone(), index_a),
            ExecutionAccount::new(b.clone(), Arc::new(OrderIndex::default())),
        ];
        let orchestrator =
            Orchestrator::new(executor, accounts, Size::new(dec!(1)), settings, shutdown);
        Fixture { a, b, orchestrator }
    }

    fn settings(mode: RunMode, rounds: u32) -> RunSettings {
        RunSettings {
            mode,
            rounds,
            delay: Duration::from_secs(1),
            hold: Duration::from_secs(60),
            max_margin_ratio: dec!(0.15),
            direction: DirectionPolicy::Account1Long,
            max_retries: 3,
            halt_on_external_fill: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_instant_rounds_open_and_close() {
        let f = fixture(settings(RunMode::Instant, 2), true, CancellationToken::new());
        let report = f.orchestrator.run().await;

        assert_eq!(report.successful_rounds, 2);
        assert_eq!(report.failed_rounds, 0);
        assert!(report.halted.is_none());
        // 4 * size * mid per round
        assert_eq!(report.volume_usd, dec!(801.20));
        assert!(f.a.position().is_zero());
        assert!(f.b.position().is_zero());

        let positions = f.orchestrator.final_positions().await;
        assert_eq!(positions[0], ("Account1".to_string(), "0".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_instant_stops_on_permanent_open_failure() {
        let f = fixture(settings(RunMode::Instant, 5), true, CancellationToken::new());
        f.a.push_create_failure(GatewayError::Rejected {
            code: 2066,
            message: "too small".into(),
        });

        let report = f.orchestrator.run().await;
        assert_eq!(report.successful_rounds, 0);
        assert_eq!(report.failed_rounds, 1);
        assert_eq!(report.halted.as_deref(), Some("Order size too small"));
        assert!(f.b.orders().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_start_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let f = fixture(settings(RunMode::Instant, 3), true, token);
        let report = f.orchestrator.run().await;
        assert_eq!(report, RunReport::default());
        assert!(f.a.orders().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_hold_close_cycle() {
        let f = fixture(settings(RunMode::BuildHoldClose, 3), true, CancellationToken::new());
        let report = f.orchestrator.run().await;

        assert_eq!(report.opened_rounds, 3);
        assert_eq!(report.successful_rounds, 6);
        assert!(f.a.position().is_zero());
        assert!(f.b.position().is_zero());
        // 2 * size * mid per pair round
        assert_eq!(report.volume_usd, dec!(1201.80));
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_stops_at_margin_limit() {
        let f = fixture(settings(RunMode::BuildHoldClose, 3), true, CancellationToken::new());
        f.b.set_margin_ratio(dec!(0.2));

        let report = f.orchestrator.run().await;
        assert_eq!(report.opened_rounds, 0);
        assert!(f.a.orders().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_close_falls_back_to_market_close() {
        let f = fixture(settings(RunMode::BuildHoldClose, 2), false, CancellationToken::new());
        let report = f.orchestrator.run().await;

        assert_eq!(report.opened_rounds, 2);
        assert_eq!(report.failed_rounds, 1);
        assert!(report.halted.is_none());

        let a_close = f.a.orders().into_iter().last().unwrap();
        assert!(a_close.is_market());
        assert!(a_close.reduce_only);
        assert_eq!(a_close.side, OrderSide::Sell);
        assert_eq!(a_close.size, Size::new(dec!(2)));
        assert!(f.a.position().is_zero());
        assert!(f.b.position().is_zero());
    }
}
