//! Main application wiring.
//!
//! Builds the live components from `AppConfig`:
//! - REST gateway, order signer and order stream per account
//! - Market data client and optional public price feed
//! - Pair executor and run orchestrator
//!
//! then runs the configured mode and prints the run summary.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vboost_core::{normalize_size, size_from_notional, InstrumentMeta, Size};
use vboost_executor::{ExecutionAccount, LeverageBumpLimiter, PairExecutor};
use vboost_feed::{OrderEventStream, OrderStreamConfig, PriceFeed, PriceFeedConfig};
use vboost_gateway::{
    AccountCredentials, Eip712OrderSigner, KeySource, MarketData, RestGateway, RestGatewayConfig,
    RestMarketData,
};
use vboost_telemetry::RunStatsReporter;

use crate::config::{AccountConfig, AppConfig, Endpoints};
use crate::error::{AppError, AppResult};
use crate::orchestrator::{Orchestrator, RunReport, RunSettings};

/// Main application.
pub struct Application {
    config: AppConfig,
    endpoints: Endpoints,
    shutdown: CancellationToken,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate().map_err(AppError::Config)?;
        let endpoints = config.endpoints();
        Ok(Self {
            config,
            endpoints,
            shutdown: CancellationToken::new(),
        })
    }

    /// Cancelling this stops the run at the next round boundary.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(&self) -> AppResult<RunReport> {
        let instrument = self.config.instrument.as_str();
        info!(
            chain_id = self.endpoints.chain_id,
            trades_url = %self.endpoints.trades_url,
            instrument,
            "Starting run"
        );

        let market = Arc::new(RestMarketData::new(&self.endpoints.market_data_url)?);
        let meta = market.instrument(instrument).await?;
        meta.validate()?;
        let size = self.order_size(market.as_ref(), &meta).await?;
        info!(
            tick_size = %meta.tick_size,
            min_size = %meta.min_size,
            %size,
            "Instrument loaded"
        );

        let mut streams = Vec::with_capacity(2);
        let mut accounts = Vec::with_capacity(2);
        for account in &self.config.accounts {
            let (execution, stream) = self.connect_account(account, &meta)?;
            accounts.push(execution);
            streams.push(stream);
        }
        let accounts: [ExecutionAccount; 2] = accounts
            .try_into()
            .map_err(|_| AppError::Config("exactly two accounts required".to_string()))?;

        let executor_config = self.config.executor.clone();
        let limiter = Arc::new(LeverageBumpLimiter::new(executor_config.leverage_bump_interval()));
        let mut executor = PairExecutor::new(meta.clone(), market.clone(), executor_config, limiter);

        let price_feed = if self.config.use_price_feed && !self.config.executor.skip_stability {
            let feed = PriceFeed::spawn(
                PriceFeedConfig::new(&self.endpoints.market_data_ws_url, instrument),
                self.shutdown.clone(),
            );
            executor = executor.with_price_buffer(feed.buffer());
            Some(feed)
        } else {
            None
        };

        let stats = RunStatsReporter::new(instrument);
        let orchestrator = Orchestrator::new(
            executor,
            accounts,
            size,
            RunSettings::from(&self.config),
            self.shutdown.clone(),
        );

        let report = orchestrator.run().await;

        let positions = orchestrator.final_positions().await;
        stats.output_summary(&positions);
        if let Some(reason) = &report.halted {
            warn!(%reason, "Run halted early");
        }

        if let Some(feed) = price_feed {
            feed.stop().await;
        }
        for stream in streams {
            stream.stop().await;
        }
        Ok(report)
    }

    /// Order size from `size` or `notional_usd`.
    async fn order_size(&self, market: &dyn MarketData, meta: &InstrumentMeta) -> AppResult<Size> {
        if let Some(notional) = self.config.notional_usd {
            let ticker = market.ticker(&meta.instrument).await?;
            let sizing = size_from_notional(meta, &ticker, notional)?;
            info!(%notional, size = %sizing.size, mid = %sizing.mid, "Computed size from notional");
            return Ok(sizing.size);
        }
        let requested = self
            .config
            .size
            .ok_or_else(|| AppError::Config("size or notional_usd required".to_string()))?;
        Ok(normalize_size(meta, Size::new(requested))?)
    }

    fn connect_account(
        &self,
        account: &AccountConfig,
        meta: &InstrumentMeta,
    ) -> AppResult<(ExecutionAccount, OrderEventStream)> {
        let cookie = KeySource::from(&account.session_token).load()?;
        let signer =
            Eip712OrderSigner::from_source(&KeySource::from(&account.signing_key), self.endpoints.chain_id)?;
        let credentials = AccountCredentials::new(
            account.name.as_str(),
            account.main_account_id.as_str(),
            account.sub_account_id.as_str(),
            cookie.as_str(),
        );

        let gateway = RestGateway::new(
            RestGatewayConfig::new(&self.endpoints.trades_url, &self.endpoints.origin),
            credentials,
            Arc::new(signer),
        )?;
        gateway.register_instrument(meta.clone());

        let stream = OrderEventStream::spawn(
            OrderStreamConfig::new(
                &self.endpoints.trades_ws_url,
                account.main_account_id.as_str(),
                account.sub_account_id.as_str(),
                cookie.as_str(),
            )
            .with_instrument(meta.instrument.as_str()),
            self.shutdown.clone(),
        );
        info!(account = %account.name, sub_account = %account.sub_account_id, "Account connected");

        Ok((ExecutionAccount::new(Arc::new(gateway), stream.index()), stream))
    }
}
