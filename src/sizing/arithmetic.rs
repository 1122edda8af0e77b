//! Value-of-movement and margin arithmetic.
//!
//! Every function returns `0.0` for non-positive inputs instead of failing.

use crate::models::InstrumentSpec;

/// Largest share of free margin that may be held back.
pub const MAX_BUFFER_FRACTION: f64 = 0.9;

/// Dollar value of a one-point move on one lot: `contract_size × price_point`.
pub fn value_per_point_per_lot(spec: &InstrumentSpec) -> f64 {
    spec.contract_size * spec.price_point
}

/// Dollar value of a one-pip move on one lot.
pub fn value_per_pip_per_lot(spec: &InstrumentSpec) -> f64 {
    value_per_point_per_lot(spec) * f64::from(spec.pip_points)
}

/// P/L in USD for `lots` moving `move_points`.
pub fn pnl_usd(lots: f64, move_points: f64, spec: &InstrumentSpec) -> f64 {
    lots * move_points * value_per_point_per_lot(spec)
}

/// Margin for one lot: `(contract × price) / leverage`.
pub fn margin_per_lot(price: f64, leverage: f64, spec: &InstrumentSpec) -> f64 {
    if leverage <= 0.0 || price <= 0.0 {
        return 0.0;
    }
    spec.contract_size * price / leverage
}

/// Largest position the balance can carry at this leverage, minus a reserve.
///
/// `buffer_fraction` is clamped into `[0, 0.9]`.
pub fn max_lot(
    balance: f64,
    price: f64,
    leverage: f64,
    spec: &InstrumentSpec,
    buffer_fraction: f64,
) -> f64 {
    if price <= 0.0 || leverage <= 0.0 {
        return 0.0;
    }
    let raw = (balance * leverage) / (price * spec.contract_size);
    let keep = 1.0 - buffer_fraction.clamp(0.0, MAX_BUFFER_FRACTION);
    (raw * keep).max(0.0)
}

/// `max_lot` without any reserve.
pub fn max_lot_theoretical(balance: f64, price: f64, leverage: f64, spec: &InstrumentSpec) -> f64 {
    max_lot(balance, price, leverage, spec, 0.0)
}

/// Distance between two prices in points; zero when either is missing.
pub fn points_distance(a: Option<f64>, b: Option<f64>, spec: &InstrumentSpec) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() / spec.price_point,
        _ => 0.0,
    }
}

/// Convert a stop distance given in pips into points.
pub fn pips_to_points(pips: f64, spec: &InstrumentSpec) -> f64 {
    pips * f64::from(spec.pip_points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_value_per_point_gold_is_one_dollar() {
        let gold = InstrumentSpec::xauusd();
        assert!(close(value_per_point_per_lot(&gold), 1.0));
        assert!(close(value_per_pip_per_lot(&gold), 10.0));
        assert!(close(value_per_point_per_lot(&InstrumentSpec::btcusd()), 1.0));
    }

    #[test]
    fn test_margin_per_lot_formula_and_monotonicity() {
        let gold = InstrumentSpec::xauusd();
        assert!(close(margin_per_lot(4000.0, 1000.0, &gold), 400.0));

        for (lev_lo, lev_hi) in [(100.0, 200.0), (500.0, 2000.0)] {
            assert!(margin_per_lot(4000.0, lev_lo, &gold) > margin_per_lot(4000.0, lev_hi, &gold));
        }
        assert!(margin_per_lot(4100.0, 1000.0, &gold) > margin_per_lot(4000.0, 1000.0, &gold));
    }

    #[test]
    fn test_non_positive_inputs_yield_zero() {
        let gold = InstrumentSpec::xauusd();
        for (price, leverage) in [(0.0, 1000.0), (-1.0, 1000.0), (4000.0, 0.0), (4000.0, -5.0)] {
            assert_eq!(margin_per_lot(price, leverage, &gold), 0.0);
            assert_eq!(max_lot(10_000.0, price, leverage, &gold, 0.0), 0.0);
        }
    }

    #[test]
    fn test_max_lot_buffer_scales_linearly() {
        let gold = InstrumentSpec::xauusd();
        let base = max_lot(1000.0, 4000.0, 1000.0, &gold, 0.0);
        assert!(close(base, 2.5));
        for buffer in [0.0, 0.1, 0.25, 0.5, 0.9] {
            let buffered = max_lot(1000.0, 4000.0, 1000.0, &gold, buffer);
            assert!(close(buffered, base * (1.0 - buffer)));
        }
    }

    #[test]
    fn test_points_distance() {
        let gold = InstrumentSpec::xauusd();
        assert!(close(points_distance(Some(3774.03), Some(3785.34), &gold), 1131.0));
        assert_eq!(points_distance(None, Some(1.0), &gold), 0.0);
    }

    #[test]
    fn test_pnl_usd() {
        let gold = InstrumentSpec::xauusd();
        assert!(close(pnl_usd(0.5, 200.0, &gold), 100.0));
    }
}
