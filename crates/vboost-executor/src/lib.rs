//! Paired maker/taker round execution.
//!
//! # Key Components
//!
//! - [`PairExecutor`]: one round from pricing to reconciliation
//! - [`RetryCoordinator`]: bounded retries with doubling backoff
//! - [`choose_maker_price`]: maker price that stays off external liquidity
//! - [`LeverageBumpLimiter`]: rate limit for leverage bumps on margin rejects
//! - [`plan_flatten`]: reduce-only order that closes a hedge mismatch
//!
//! # Outcome Mapping
//!
//! 1. Validation / Auth -> FailPermanent
//! 2. Signature error (2002), order too small (2066) -> FailPermanent
//! 3. Insufficient margin (2080) -> leverage bump, FailTransient
//! 4. Maker not confirmed / no fill -> FailTransient
//! 5. Hedge mismatch -> flatten, WarningRecovered
//! 6. Flatten did not close the exposure -> FailPermanent

pub mod cancel;
pub mod config;
pub mod error;
pub mod leverage;
pub mod pair;
pub mod pricing;
pub mod recovery;
pub mod retry;
pub mod stability;

pub use cancel::{cancel_verified, clear_open_orders, CancelPolicy};
pub use config::ExecutorConfig;
pub use error::{codes, ExecutorError, ExecutorResult};
pub use leverage::{bump_initial_leverage, LeverageBumpLimiter, LEVERAGE_CANDIDATES};
pub use pair::{ExecutionAccount, PairExecutor, RoundReport, RoundTimings};
pub use pricing::choose_maker_price;
pub use recovery::{plan_flatten, FlattenPlan, Leg};
pub use retry::RetryCoordinator;
pub use stability::{check_price_stable, StabilityCheck, StabilitySource};
