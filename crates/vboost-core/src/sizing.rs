//! Size quantization.
//!
//! Every order size is a positive multiple of the instrument's size step
//! (`max(quantum, min_size)`). Requested sizes round down so we never trade
//! more than asked; notional-derived sizes round up so we never trade less
//! than the venue minimums.

use rust_decimal::Decimal;

use crate::{CoreError, InstrumentMeta, Price, Result, Size, Ticker};

/// Size computed from a quote-currency notional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotionalSizing {
    pub size: Size,
    /// Mid price the size was derived from.
    pub mid: Price,
}

/// Round `requested` down to the size step.
///
/// Idempotent: normalizing an already-normalized size returns it unchanged.
pub fn normalize_size(meta: &InstrumentMeta, requested: Size) -> Result<Size> {
    let step = meta.size_step();
    let size = requested.floor_to_step(step).normalized();

    if !size.is_positive() {
        return Err(CoreError::InvalidSize(format!(
            "computed size is 0 after rounding {requested} to step {step}"
        )));
    }
    if meta.min_size.is_positive() && size < meta.min_size {
        return Err(CoreError::InvalidSize(format!(
            "size {size} below min_size {}",
            meta.min_size
        )));
    }
    Ok(size)
}

/// Derive an order size from a notional amount at the current mid.
///
/// The result satisfies `size * mid >= notional` (up to one step) and
/// `size * mid >= min_notional`.
pub fn size_from_notional(
    meta: &InstrumentMeta,
    ticker: &Ticker,
    notional: Decimal,
) -> Result<NotionalSizing> {
    if notional <= Decimal::ZERO {
        return Err(CoreError::InvalidNotional(format!(
            "notional must be positive, got {notional}"
        )));
    }
    let mid = ticker.mid()?;
    let step = meta.size_step();

    let raw = Size::new(notional / mid.inner());
    let mut size = raw.ceil_to_step(step);
    if size < meta.min_size {
        size = meta.min_size;
    }

    if meta.min_notional > Decimal::ZERO && size.notional(mid) < meta.min_notional {
        let shortfall = meta.min_notional / mid.inner() - size.inner();
        let steps = (shortfall / step.inner()).ceil();
        size = size + step * steps;
    }

    if !size.is_positive() {
        return Err(CoreError::InvalidSize(format!(
            "computed size is 0 for notional {notional} at mid {mid}"
        )));
    }

    Ok(NotionalSizing {
        size: size.normalized(),
        mid,
    })
}
