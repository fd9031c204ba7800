//! Flattening residual exposure after a hedge mismatch.
//!
//! When the taker IOC fills against someone else's order, the two accounts
//! no longer offset. The net exposure the round introduced is closed with a
//! reduce-only market order on the account that holds it.

use vboost_core::{OrderSide, Size};

/// Which account of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    /// Account A, the maker.
    Maker,
    /// Account B, the taker.
    Taker,
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Maker => write!(f, "maker"),
            Self::Taker => write!(f, "taker"),
        }
    }
}

/// Reduce-only market order that closes the imbalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenPlan {
    pub leg: Leg,
    pub side: OrderSide,
    pub size: Size,
}

/// Decide how to close `imbalance` (sum of both accounts' deltas).
///
/// Net long sells on the maker account if it is long, otherwise on the
/// taker; net short buys on the maker if it is short, otherwise on the
/// taker. Nothing is sent while `|imbalance|` is below `threshold`.
#[must_use]
pub fn plan_flatten(imbalance: Size, maker_position: Size, threshold: Size) -> Option<FlattenPlan> {
    if imbalance.abs() < threshold || imbalance.is_zero() {
        return None;
    }

    let (side, maker_holds) = if imbalance.is_positive() {
        (OrderSide::Sell, maker_position.is_positive())
    } else {
        (OrderSide::Buy, maker_position.is_negative())
    };

    Some(FlattenPlan {
        leg: if maker_holds { Leg::Maker } else { Leg::Taker },
        side,
        size: imbalance.abs(),
    })
}
