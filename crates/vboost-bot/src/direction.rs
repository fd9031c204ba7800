//! Which account goes long on the opening leg.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionPolicy {
    /// Coin flip. Drawn per round in instant mode, once per run otherwise.
    #[default]
    Random,
    Account1Long,
    Account1Short,
}

impl DirectionPolicy {
    /// Whether account 1 opens long (and is therefore the maker).
    pub fn account1_long<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        match self {
            Self::Account1Long => true,
            Self::Account1Short => false,
            Self::Random => rng.gen_bool(0.5),
        }
    }

    /// Collapse `Random` into a fixed policy for a whole run.
    pub fn fixed<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        if self.account1_long(rng) {
            Self::Account1Long
        } else {
            Self::Account1Short
        }
    }
}

/// Indices into the account pair: `(long, short)` for the opening leg.
pub fn long_short(account1_long: bool) -> (usize, usize) {
    if account1_long {
        (0, 1)
    } else {
        (1, 0)
    }
}
