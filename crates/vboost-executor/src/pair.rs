//! One maker/taker round between two accounts.
//!
//! # Phases
//!
//! 1. PRICING: positions snapshot, stability check, maker price
//! 2. MAKER_SUBMIT: post-only limit on the maker account
//! 3. MAKER_WAIT_CONFIRM: wait for the maker to appear on its order stream.
//!    The taker is never sent for an unconfirmed maker.
//! 4. TAKER_SUBMIT: IOC at the same price and size, opposite side
//! 5. RECONCILE: poll positions and compare deltas with the expected
//!    `{+size, -size}` (opening) or `{-size, +size}` (closing)
//!
//! A mismatch in phase 5 means the taker traded with someone else. The net
//! exposure is flattened before the round reports a warning.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use vboost_core::{
    normalize_size, DeltaPair, ExecutionResult, InstrumentMeta, OrderIntent, OrderSide, Price,
    RoundOutcome, Size, Ticker, EXTERNAL_FILL_WARNING,
};
use vboost_feed::{OrderIndex, PriceBuffer};
use vboost_gateway::{CreateOrderAck, DynMarketData, DynTradingGateway, TradingGateway};

use crate::cancel::{cancel_verified, clear_open_orders, CancelPolicy};
use crate::config::ExecutorConfig;
use crate::error::{codes, ExecutorError, ExecutorResult};
use crate::leverage::{bump_initial_leverage, LeverageBumpLimiter};
use crate::pricing::choose_maker_price;
use crate::recovery::{plan_flatten, Leg};
use crate::stability::check_price_stable;

/// One side of the pair: how to trade it and where its orders are reported.
#[derive(Clone)]
pub struct ExecutionAccount {
    pub gateway: DynTradingGateway,
    /// Index of this account's order stream.
    pub orders: Arc<OrderIndex>,
}

impl ExecutionAccount {
    pub fn new(gateway: DynTradingGateway, orders: Arc<OrderIndex>) -> Self {
        Self { gateway, orders }
    }

    pub fn name(&self) -> &str {
        &self.gateway.account().name
    }
}

/// Latencies observed during one round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundTimings {
    pub maker_submit: Option<Duration>,
    pub confirm_wait: Option<Duration>,
    /// From maker submit to firing the taker.
    pub maker_to_taker: Option<Duration>,
    pub taker_submit: Option<Duration>,
    pub total: Duration,
}

/// Outcome of one round plus what was observed on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub outcome: RoundOutcome,
    pub maker_price: Option<Price>,
    pub timings: RoundTimings,
}

impl From<RoundReport> for ExecutionResult {
    fn from(report: RoundReport) -> Self {
        report.outcome.into()
    }
}

#[derive(Default)]
struct RoundTrace {
    maker_price: Option<Price>,
    timings: RoundTimings,
}

/// Executes rounds on one instrument.
pub struct PairExecutor {
    meta: InstrumentMeta,
    market_data: DynMarketData,
    price_buffer: Option<Arc<PriceBuffer>>,
    leverage_limiter: Arc<LeverageBumpLimiter>,
    config: ExecutorConfig,
}

impl PairExecutor {
    pub fn new(
        meta: InstrumentMeta,
        market_data: DynMarketData,
        config: ExecutorConfig,
        leverage_limiter: Arc<LeverageBumpLimiter>,
    ) -> Self {
        Self {
            meta,
            market_data,
            price_buffer: None,
            leverage_limiter,
            config,
        }
    }

    /// Judge stability from a live ticker buffer instead of REST polling.
    #[must_use]
    pub fn with_price_buffer(mut self, buffer: Arc<PriceBuffer>) -> Self {
        self.price_buffer = Some(buffer);
        self
    }

    pub fn meta(&self) -> &InstrumentMeta {
        &self.meta
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn market_data(&self) -> &DynMarketData {
        &self.market_data
    }

    /// Run one round: `maker` posts, `taker` crosses.
    ///
    /// Opening rounds make the maker account long; closing rounds reverse
    /// both sides and are reduce-only. Always runs to a terminal outcome,
    /// including reconciliation and recovery.
    pub async fn execute_round(
        &self,
        maker: &ExecutionAccount,
        taker: &ExecutionAccount,
        size: Size,
        opening: bool,
    ) -> RoundReport {
        let started = Instant::now();
        let mut trace = RoundTrace::default();

        let outcome = match self.run_round(maker, taker, size, opening, &mut trace).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    instrument = %self.meta.instrument,
                    error = %e,
                    permanent = e.is_permanent(),
                    "Round failed"
                );
                e.into_outcome()
            }
        };

        if let (Some(buffer), Some(price)) = (&self.price_buffer, trace.maker_price) {
            buffer.unregister_own_price(price);
        }
        trace.timings.total = started.elapsed();

        info!(
            instrument = %self.meta.instrument,
            maker = %maker.name(),
            taker = %taker.name(),
            opening,
            %size,
            outcome = outcome.label(),
            total_ms = trace.timings.total.as_millis() as u64,
            "Round finished"
        );

        RoundReport {
            outcome,
            maker_price: trace.maker_price,
            timings: trace.timings,
        }
    }

    async fn run_round(
        &self,
        maker: &ExecutionAccount,
        taker: &ExecutionAccount,
        size: Size,
        opening: bool,
        trace: &mut RoundTrace,
    ) -> ExecutorResult<RoundOutcome> {
        let instrument = self.meta.instrument.as_str();
        self.validate_size(size)?;

        let (maker_before, taker_before) = self
            .read_positions(maker, taker, "reading positions")
            .await?;

        // ===== PRICING =====
        let Some(ticker) = self.pricing_ticker().await? else {
            return Ok(RoundOutcome::FailTransient("Price unstable".to_string()));
        };
        let maker_side = if opening { OrderSide::Buy } else { OrderSide::Sell };
        let reduce_only = !opening;
        let price = choose_maker_price(&ticker, self.meta.tick_size, maker_side);
        trace.maker_price = Some(price);
        debug!(
            instrument,
            bid = %ticker.bid,
            ask = %ticker.ask,
            spread = %(ticker.ask - ticker.bid),
            spread_ticks = ?ticker.spread_ticks(self.meta.tick_size),
            maker_price = %price,
            "Round pricing"
        );

        // ===== MAKER_SUBMIT =====
        if let Some(buffer) = &self.price_buffer {
            buffer.register_own_price(price);
        }
        let maker_intent = OrderIntent::maker(instrument, maker_side, price, size, reduce_only);
        let submitted_at = Instant::now();
        let maker_ack = match maker.gateway.create_order(&maker_intent).await {
            Ok(ack) => ack,
            Err(e) => {
                if e.code() == Some(codes::INSUFFICIENT_MARGIN) {
                    bump_initial_leverage(maker.gateway.as_ref(), instrument, &self.leverage_limiter)
                        .await;
                }
                return Err(ExecutorError::from_rejection("Maker", e));
            }
        };
        trace.timings.maker_submit = Some(submitted_at.elapsed());
        debug!(
            account = %maker.name(),
            order_id = ?maker_ack.order_id,
            correlation_id = %maker_ack.correlation_id,
            side = %maker_side,
            %price,
            req_ms = submitted_at.elapsed().as_millis() as u64,
            "Maker order placed"
        );

        // ===== MAKER_WAIT_CONFIRM =====
        let confirm_started = Instant::now();
        let on_book = maker
            .orders
            .wait_for_maker_confirm(
                Some(maker_ack.correlation_id),
                instrument,
                size,
                price,
                maker_side.is_buying(),
                self.config.confirm_timeout(),
            )
            .await;
        let confirm_wait = confirm_started.elapsed();
        trace.timings.confirm_wait = Some(confirm_wait);

        if !on_book {
            debug!(wait_ms = confirm_wait.as_millis() as u64, "Maker not observed on order stream");
            self.cancel_maker(maker, &maker_ack).await?;
            return Err(ExecutorError::ConfirmationTimeout(format!(
                "maker not observed on book within {}ms; taker leg skipped",
                self.config.confirm_timeout_ms
            )));
        }
        let gap = submitted_at.elapsed();
        trace.timings.maker_to_taker = Some(gap);
        debug!(
            gap_ms = gap.as_millis() as u64,
            ws_wait_ms = confirm_wait.as_millis() as u64,
            "maker->taker gap"
        );

        // ===== TAKER_SUBMIT =====
        let taker_intent =
            OrderIntent::taker(instrument, maker_side.opposite(), price, size, reduce_only);
        let taker_started = Instant::now();
        let taker_result = taker.gateway.create_order(&taker_intent).await;
        trace.timings.taker_submit = Some(taker_started.elapsed());

        // Whatever happened to the taker, nothing of ours may keep resting
        self.cancel_maker(maker, &maker_ack).await?;

        if let Err(e) = taker_result {
            if e.code() == Some(codes::INSUFFICIENT_MARGIN) {
                bump_initial_leverage(taker.gateway.as_ref(), instrument, &self.leverage_limiter)
                    .await;
            }
            return Err(ExecutorError::from_rejection("Taker", e));
        }
        debug!(
            account = %taker.name(),
            req_ms = trace.timings.taker_submit.map_or(0, |d| d.as_millis() as u64),
            "Taker IOC placed"
        );

        // ===== RECONCILE =====
        let (maker_after, taker_after) = self
            .poll_positions(maker, taker, maker_before, taker_before)
            .await?;
        let observed = DeltaPair::new(maker_after - maker_before, taker_after - taker_before);
        let expected = DeltaPair::expected(size, opening);
        let tol = self.meta.position_tolerance();
        debug!(%observed, %expected, %tol, "Position deltas");

        if observed.is_flat(tol) {
            let cancel = self.config.cancel_policy();
            let maker_cleared = self.ensure_cleared(maker, cancel).await;
            let taker_cleared = self.ensure_cleared(taker, cancel).await;
            maker_cleared.and(taker_cleared)?;
            return Err(ExecutorError::NoFillObserved(
                "no fill observed (positions unchanged); retrying".to_string(),
            ));
        }

        if observed.within(&expected, tol) {
            return Ok(RoundOutcome::Success);
        }

        self.recover(
            maker,
            taker,
            (maker_before, taker_before),
            (maker_after, taker_after),
            observed,
            expected,
        )
        .await
    }

    fn validate_size(&self, size: Size) -> ExecutorResult<()> {
        let normalized =
            normalize_size(&self.meta, size).map_err(|e| ExecutorError::Validation(e.to_string()))?;
        if normalized != size {
            return Err(ExecutorError::Validation(format!(
                "size {size} is not a multiple of step {}",
                self.meta.size_step()
            )));
        }
        Ok(())
    }

    /// Touch to price against, or `None` when the market is moving.
    async fn pricing_ticker(&self) -> ExecutorResult<Option<Ticker>> {
        let instrument = self.meta.instrument.as_str();
        if self.config.skip_stability {
            let ticker = self
                .market_data
                .ticker(instrument)
                .await
                .map_err(|e| ExecutorError::from_gateway("reading ticker", e))?;
            return Ok(Some(ticker));
        }

        let check = check_price_stable(
            self.market_data.as_ref(),
            instrument,
            self.price_buffer.as_deref(),
            self.config.stability_window_ms,
            self.config.fallback_stability_wait(),
        )
        .await
        .map_err(|e| ExecutorError::from_gateway("checking price stability", e))?;

        if !check.stable {
            info!(
                instrument,
                source = ?check.source,
                bid = %check.ticker.bid,
                ask = %check.ticker.ask,
                "Price unstable, skipping round"
            );
            return Ok(None);
        }
        Ok(Some(check.ticker))
    }

    async fn read_positions(
        &self,
        maker: &ExecutionAccount,
        taker: &ExecutionAccount,
        context: &str,
    ) -> ExecutorResult<(Size, Size)> {
        let instrument = self.meta.instrument.as_str();
        let (a, b) = tokio::join!(
            maker.gateway.position_size(instrument),
            taker.gateway.position_size(instrument)
        );
        let a = a.map_err(|e| ExecutorError::from_gateway(context, e))?;
        let b = b.map_err(|e| ExecutorError::from_gateway(context, e))?;
        Ok((a, b))
    }

    /// Positions lag fills; poll until either account moves or the window
    /// closes.
    async fn poll_positions(
        &self,
        maker: &ExecutionAccount,
        taker: &ExecutionAccount,
        maker_before: Size,
        taker_before: Size,
    ) -> ExecutorResult<(Size, Size)> {
        let deadline = Instant::now() + self.config.reconcile_window();
        loop {
            let (a, b) = self
                .read_positions(maker, taker, "checking positions after trade")
                .await?;
            if a != maker_before || b != taker_before || Instant::now() >= deadline {
                return Ok((a, b));
            }
            tokio::time::sleep(self.config.reconcile_interval()).await;
        }
    }

    async fn cancel_maker(
        &self,
        maker: &ExecutionAccount,
        ack: &CreateOrderAck,
    ) -> ExecutorResult<()> {
        let instrument = self.meta.instrument.as_str();
        let policy = self.config.cancel_policy();
        if let Some(order_id) = &ack.order_id {
            cancel_verified(maker.gateway.as_ref(), order_id, instrument, policy).await;
        }
        self.ensure_cleared(maker, policy).await
    }

    /// Cancel everything resting on `account`. An order that survives every
    /// attempt is exposure no later round will clean up, so the run halts.
    async fn ensure_cleared(
        &self,
        account: &ExecutionAccount,
        policy: CancelPolicy,
    ) -> ExecutorResult<()> {
        let instrument = self.meta.instrument.as_str();
        if clear_open_orders(account.gateway.as_ref(), instrument, policy).await {
            return Ok(());
        }
        Err(ExecutorError::RecoveryFailure(format!(
            "open orders on {} still resting after {} cancel attempts",
            account.name(),
            policy.attempts
        )))
    }

    async fn recover(
        &self,
        maker: &ExecutionAccount,
        taker: &ExecutionAccount,
        before: (Size, Size),
        after: (Size, Size),
        observed: DeltaPair,
        expected: DeltaPair,
    ) -> ExecutorResult<RoundOutcome> {
        let instrument = self.meta.instrument.as_str();
        let tol = self.meta.position_tolerance();
        let diff = DeltaPair::new(
            (observed.a - expected.a).abs(),
            (observed.b - expected.b).abs(),
        );
        warn!(
            instrument,
            %observed,
            %expected,
            %diff,
            "Position mismatch detected"
        );

        // The usual cause is a deep queue at our price on a 1-tick book
        if let Ok(t) = self.market_data.ticker(instrument).await {
            debug!(bid_size = ?t.bid_size, ask_size = ?t.ask_size, "top_of_book");
        }

        let policy = self.config.cancel_policy();
        let maker_cleared = self.ensure_cleared(maker, policy).await;
        let taker_cleared = self.ensure_cleared(taker, policy).await;
        maker_cleared.and(taker_cleared)?;

        let imbalance = observed.net();
        if let Some(plan) = plan_flatten(imbalance, after.0, self.meta.flatten_threshold()) {
            let account = match plan.leg {
                Leg::Maker => maker,
                Leg::Taker => taker,
            };
            info!(
                %imbalance,
                leg = %plan.leg,
                account = %account.name(),
                side = %plan.side,
                size = %plan.size,
                "Recovery: market reduce-only flatten"
            );
            let intent = OrderIntent::market_reduce_only(instrument, plan.side, plan.size);
            account.gateway.create_order(&intent).await.map_err(|e| {
                ExecutorError::RecoveryFailure(format!(
                    "flatten order on {} failed: {e}",
                    account.name()
                ))
            })?;

            tokio::time::sleep(self.config.recovery_settle()).await;

            let (final_maker, final_taker) = self
                .read_positions(maker, taker, "verifying recovery")
                .await
                .map_err(|e| ExecutorError::RecoveryFailure(e.to_string()))?;
            info!(
                maker = %maker.name(),
                maker_position = %final_maker,
                taker = %taker.name(),
                taker_position = %final_taker,
                "Post-recovery positions"
            );
            let residual = (final_maker - before.0) + (final_taker - before.1);
            if residual.abs() > tol {
                return Err(ExecutorError::RecoveryFailure(format!(
                    "residual exposure {} after flatten (tolerance {})",
                    residual.normalized(),
                    tol
                )));
            }
        } else {
            info!(%imbalance, threshold = %self.meta.flatten_threshold(), "Imbalance below flatten threshold");
        }

        let message = format!(
            "{EXTERNAL_FILL_WARNING}: Position mismatch after IOC - \
             maker delta={} expected={} diff={}, \
             taker delta={} expected={} diff={}, tol={}",
            observed.a.normalized(),
            expected.a.normalized(),
            diff.a.normalized(),
            observed.b.normalized(),
            expected.b.normalized(),
            diff.b.normalized(),
            tol.normalized(),
        );
        Ok(RoundOutcome::WarningRecovered {
            observed,
            expected,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use vboost_core::{OrderEvent, OrderStatus};
    use vboost_gateway::{GatewayError, MockGateway, MockMarketData, OpenOrder};

    const INSTRUMENT: &str = "BTC_USDT_Perp";

    fn meta() -> InstrumentMeta {
        InstrumentMeta {
            instrument: INSTRUMENT.to_string(),
            tick_size: Price::new(dec!(0.1)),
            base_decimals: 3,
            min_size: Size::new(dec!(0.001)),
            min_notional: Decimal::ZERO,
            asset_id: "0x01".to_string(),
        }
    }

    fn sz(d: Decimal) -> Size {
        Size::new(d)
    }

    fn signed(intent: &OrderIntent) -> Size {
        if intent.is_buying() {
            intent.size
        } else {
            -intent.size
        }
    }

    struct Fixture {
        executor: PairExecutor,
        market: Arc<MockMarketData>,
        a: Arc<MockGateway>,
        b: Arc<MockGateway>,
        maker: ExecutionAccount,
        taker: ExecutionAccount,
    }

    fn fixture(config: ExecutorConfig) -> Fixture {
        let market = Arc::new(MockMarketData::new());
        market.push_ticker(Ticker::new(Price::new(dec!(100.0)), Price::new(dec!(100.3))));
        let a = Arc::new(MockGateway::new("A"));
        let b = Arc::new(MockGateway::new("B"));
        let maker = ExecutionAccount::new(a.clone(), Arc::new(OrderIndex::default()));
        let taker = ExecutionAccount::new(b.clone(), Arc::new(OrderIndex::default()));
        let executor = PairExecutor::new(
            meta(),
            market.clone(),
            config,
            Arc::new(LeverageBumpLimiter::default()),
        );
        Fixture {
            executor,
            market,
            a,
            b,
            maker,
            taker,
        }
    }

    fn skip_stability() -> ExecutorConfig {
        ExecutorConfig {
            skip_stability: true,
            ..Default::default()
        }
    }

    /// Maker orders on A show up on A's order stream as OPEN.
    fn confirm_makers(f: &Fixture) {
        let index = f.maker.orders.clone();
        f.a.set_on_create(Box::new(move |intent| {
            if intent.post_only {
                index.ingest(OrderEvent {
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
    }

    /// Taker orders on B fill `maker_fill` against A and `taker_fill`
    /// (absolute) on B. Market orders on B fill in full.
    fn taker_fills(f: &Fixture, maker_fill: Decimal, taker_fill: Decimal) {
        let a = f.a.clone();
        f.b.set_on_create(Box::new(move |intent| {
            if intent.is_market() {
                return Some(signed(intent));
            }
            let direction = if intent.is_buying() { dec!(1) } else { dec!(-1) };
            a.adjust_position(sz(-direction * maker_fill));
            Some(sz(direction * taker_fill))
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_opening_round_success() {
        let f = fixture(skip_stability());
        confirm_makers(&f);
        taker_fills(&f, dec!(2), dec!(2));

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(2)), true)
            .await;
        assert_eq!(report.outcome, RoundOutcome::Success);
        assert_eq!(report.maker_price, Some(Price::new(dec!(100.2))));
        assert!(report.timings.confirm_wait.is_some());
        assert!(report.timings.taker_submit.is_some());

        let maker_orders = f.a.orders();
        assert_eq!(maker_orders.len(), 1);
        assert!(maker_orders[0].post_only);
        assert_eq!(maker_orders[0].side, OrderSide::Buy);
        assert!(!maker_orders[0].reduce_only);

        let taker_orders = f.b.orders();
        assert_eq!(taker_orders.len(), 1);
        assert_eq!(taker_orders[0].side, OrderSide::Sell);
        assert_eq!(taker_orders[0].price, Price::new(dec!(100.2)));
        assert_eq!(taker_orders[0].size, sz(dec!(2)));

        assert_eq!(f.a.position(), sz(dec!(2)));
        assert_eq!(f.b.position(), sz(dec!(-2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_round_reverses_sides() {
        let f = fixture(skip_stability());
        f.a.set_position(sz(dec!(2)));
        f.b.set_position(sz(dec!(-2)));
        confirm_makers(&f);
        taker_fills(&f, dec!(2), dec!(2));

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(2)), false)
            .await;
        assert_eq!(report.outcome, RoundOutcome::Success);

        let maker_order = &f.a.orders()[0];
        assert_eq!(maker_order.side, OrderSide::Sell);
        assert_eq!(maker_order.price, Price::new(dec!(100.1)));
        assert!(maker_order.reduce_only);
        assert!(f.b.orders()[0].reduce_only);
        assert!(f.a.position().is_zero());
        assert!(f.b.position().is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_fill_is_flattened() {
        let f = fixture(skip_stability());
        confirm_makers(&f);
        // Taker sold 3, only 2 of it against our maker
        taker_fills(&f, dec!(2), dec!(3));

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(2)), true)
            .await;

        match &report.outcome {
            RoundOutcome::WarningRecovered {
                observed,
                expected,
                message,
            } => {
                assert_eq!(*observed, DeltaPair::new(sz(dec!(2)), sz(dec!(-3))));
                assert_eq!(*expected, DeltaPair::new(sz(dec!(2)), sz(dec!(-2))));
                assert!(message.starts_with(EXTERNAL_FILL_WARNING));
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        // Net short 1 closed on B, which holds the short
        let b_orders = f.b.orders();
        assert_eq!(b_orders.len(), 2);
        let flatten = &b_orders[1];
        assert!(flatten.is_market());
        assert!(flatten.reduce_only);
        assert_eq!(flatten.side, OrderSide::Buy);
        assert_eq!(flatten.size, sz(dec!(1)));
        assert_eq!(f.b.position(), sz(dec!(-2)));

        let result: ExecutionResult = report.into();
        assert!(result.success);
        assert!(result.is_warning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_maker_never_fires_taker() {
        let f = fixture(skip_stability());
        // No stream events for the maker

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(1)), true)
            .await;

        match &report.outcome {
            RoundOutcome::FailTransient(msg) => assert!(msg.contains("maker not observed")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(f.b.orders().is_empty());
        assert_eq!(f.a.cancels().len(), 1);
        assert!(report.timings.confirm_wait.unwrap() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fill_clears_both_accounts() {
        let f = fixture(skip_stability());
        confirm_makers(&f);
        // B accepts the IOC but nothing fills; a stray order rests on B
        f.b.add_open_order(OpenOrder::new("0xstray"), 0);

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(1)), true)
            .await;

        match &report.outcome {
            RoundOutcome::FailTransient(msg) => assert!(msg.contains("no fill observed")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(f.b.open_orders_snapshot().is_empty());
        assert!(f.b.cancels().contains(&"0xstray".to_string()));
        assert!(f.a.open_order_queries() > 0);
        // Reconcile polled across the whole window
        assert!(f.a.position_reads() > 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncancellable_order_after_no_fill_halts() {
        let f = fixture(skip_stability());
        confirm_makers(&f);
        // Survives every cancel the round sends
        f.b.add_open_order(OpenOrder::new("0xstuck"), 100);

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(1)), true)
            .await;

        match &report.outcome {
            RoundOutcome::FailPermanent(msg) => {
                assert!(msg.starts_with("Recovery failed"));
                assert!(msg.contains("on B"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(f.b.open_orders_snapshot().len(), 1);
        assert!(f.b.cancels().len() >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncancellable_unconfirmed_maker_halts() {
        let f = fixture(skip_stability());
        // No stream events for the maker, and A's book will not clear
        f.a.add_open_order(OpenOrder::new("0xstuck"), 100);

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(1)), true)
            .await;

        match &report.outcome {
            RoundOutcome::FailPermanent(msg) => {
                assert!(msg.starts_with("Recovery failed"));
                assert!(msg.contains("on A"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(f.b.orders().is_empty());
        assert_eq!(f.a.open_orders_snapshot().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_maker_rejection() {
        let f = fixture(skip_stability());
        f.a.push_create_failure(GatewayError::Rejected {
            code: codes::ORDER_TOO_SMALL,
            message: "too small".into(),
        });

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(1)), true)
            .await;
        assert_eq!(
            report.outcome,
            RoundOutcome::FailPermanent("Order size too small".to_string())
        );
        assert!(f.b.orders().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_margin_bumps_leverage() {
        let f = fixture(skip_stability());
        f.a.set_leverage(Some(dec!(20)), None);
        f.a.push_create_failure(GatewayError::Rejected {
            code: codes::INSUFFICIENT_MARGIN,
            message: "margin".into(),
        });

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(1)), true)
            .await;
        assert_eq!(
            report.outcome,
            RoundOutcome::FailTransient("Insufficient margin".to_string())
        );
        assert_eq!(f.a.leverage_sets(), vec![dec!(50)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_taker_rejection_cancels_maker() {
        let f = fixture(skip_stability());
        confirm_makers(&f);
        f.b.push_create_failure(GatewayError::Rejected {
            code: codes::SIGNATURE_ERROR,
            message: "bad sig".into(),
        });

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(1)), true)
            .await;
        assert_eq!(
            report.outcome,
            RoundOutcome::FailPermanent("Taker order failed: signature error".to_string())
        );
        assert_eq!(f.a.cancels().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_on_positions_is_permanent() {
        let f = fixture(skip_stability());
        f.a.set_fail_position_reads(true);

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(1)), true)
            .await;
        match &report.outcome {
            RoundOutcome::FailPermanent(msg) => assert!(msg.contains("Auth failed")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(f.a.orders().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfilled_flatten_is_recovery_failure() {
        let f = fixture(skip_stability());
        confirm_makers(&f);
        let a = f.a.clone();
        f.b.set_on_create(Box::new(move |intent| {
            if intent.is_market() {
                // Flatten order accepted but never fills
                return None;
            }
            a.adjust_position(sz(dec!(2)));
            Some(sz(dec!(-3)))
        }));

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(2)), true)
            .await;
        match &report.outcome {
            RoundOutcome::FailPermanent(msg) => assert!(msg.starts_with("Recovery failed")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unstable_price_skips_round() {
        let f = fixture(ExecutorConfig::default());
        // Second ticker moved past the first mid
        f.market
            .push_ticker(Ticker::new(Price::new(dec!(100.5)), Price::new(dec!(100.7))));

        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(1)), true)
            .await;
        assert_eq!(
            report.outcome,
            RoundOutcome::FailTransient("Price unstable".to_string())
        );
        assert!(f.a.orders().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_off_step_size_rejected() {
        let f = fixture(skip_stability());
        let report = f
            .executor
            .execute_round(&f.maker, &f.taker, sz(dec!(1.0005)), true)
            .await;
        assert!(report.outcome.is_permanent());
        assert_eq!(f.a.position_reads(), 0);
    }
}
