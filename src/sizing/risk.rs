//! Risk-based lot sizing: risk budget and stop distance to order size.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::arithmetic::{max_lot_theoretical, value_per_point_per_lot};
use crate::models::InstrumentSpec;

/// Absorbs binary float noise such as `0.07 / 0.01 = 6.999999…`.
const STEP_EPSILON: Decimal = dec!(0.000000001);

/// How the risk budget is derived from the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingMode {
    /// Risk a percentage of balance
    Safe,
    /// Risk the whole balance on one stop
    AllIn,
}

impl SizingMode {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "allin" | "all-in" | "all_in" => Self::AllIn,
            _ => Self::Safe,
        }
    }
}

/// A loss budget entered either as a percentage of balance or in dollars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskInput {
    Percent(f64),
    Amount(f64),
}

/// Lot for a risk percentage and stop distance.
///
/// `lot = balance × risk% / (distance × $/point/lot)`
pub fn optimal_lot_by_risk(
    balance: f64,
    risk_percent: f64,
    distance_points: f64,
    spec: &InstrumentSpec,
) -> f64 {
    if distance_points <= 0.0 {
        return 0.0;
    }
    let risk_amount = balance * (risk_percent / 100.0);
    risk_amount / (distance_points * value_per_point_per_lot(spec))
}

/// Lot when the whole balance is the risk amount.
pub fn optimal_lot_all_in(balance: f64, distance_points: f64, spec: &InstrumentSpec) -> f64 {
    if distance_points <= 0.0 {
        return 0.0;
    }
    balance / (distance_points * value_per_point_per_lot(spec))
}

/// Normalize a loss input into `(amount, percent)` of balance.
pub fn loss_to_amount_and_percent(balance: f64, input: RiskInput) -> (f64, f64) {
    if balance <= 0.0 {
        return (0.0, 0.0);
    }
    match input {
        RiskInput::Percent(pct) => (balance * (pct / 100.0), pct),
        RiskInput::Amount(amount) => (amount, amount / balance * 100.0),
    }
}

/// Floor `value` to a whole number of `step`s using decimal arithmetic.
pub fn floor_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    units_to_lots(step_units(value, step), step)
}

/// Number of whole `step`s contained in `value`.
pub fn step_units(value: f64, step: f64) -> u64 {
    let (Some(v), Some(s)) = (Decimal::from_f64(value), Decimal::from_f64(step)) else {
        return 0;
    };
    if s <= Decimal::ZERO || v <= Decimal::ZERO {
        return 0;
    }
    ((v / s) + STEP_EPSILON).floor().to_u64().unwrap_or(0)
}

/// `units × step` without accumulating float error.
pub fn units_to_lots(units: u64, step: f64) -> f64 {
    Decimal::from_f64(step)
        .map(|s| Decimal::from(units) * s)
        .and_then(|lots| lots.to_f64())
        .unwrap_or(0.0)
}

/// Quantize a raw lot: floor to the lot step, never below the minimum lot.
///
/// Non-positive raw lots stay zero.
pub fn quantize_lot(raw_lot: f64, spec: &InstrumentSpec) -> f64 {
    if raw_lot.is_nan() || raw_lot <= 0.0 {
        return 0.0;
    }
    let floored = floor_to_step(raw_lot, spec.lot_step);
    floored.max(spec.min_lot)
}

/// Quantize first, then cap at the leverage-implied maximum.
///
/// A cap of zero (unknown price) leaves the quantized lot untouched.
pub fn quantize_then_cap(raw_lot: f64, cap: f64, spec: &InstrumentSpec) -> f64 {
    let quantized = quantize_lot(raw_lot, spec);
    if cap > 0.0 {
        quantized.min(cap)
    } else {
        quantized
    }
}

/// Input bundle for one sizing calculation.
#[derive(Debug, Clone)]
pub struct RiskRequest {
    pub balance: f64,
    pub leverage: f64,
    /// Reference price used for the leverage cap; zero when unknown
    pub price: f64,
    pub risk: RiskInput,
    pub distance_points: f64,
    pub mode: SizingMode,
}

/// Result of a sizing calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct LotSizing {
    pub risk_amount: f64,
    pub risk_percent: f64,
    pub distance_points: f64,
    pub value_per_point: f64,
    /// Formula output before any rounding
    pub raw_lot: f64,
    /// Floored to lot step, at least the minimum lot
    pub quantized_lot: f64,
    /// Leverage-implied maximum (0 when the price is unknown)
    pub max_lot: f64,
    /// Lot to trade
    pub final_lot: f64,
    /// Loss at the stop in USD (negative)
    pub pnl_at_stop: f64,
}

impl LotSizing {
    /// True when the leverage cap reduced the quantized lot.
    pub fn capped(&self) -> bool {
        self.max_lot > 0.0 && self.quantized_lot > self.max_lot
    }
}

impl std::fmt::Display for LotSizing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Risk Amount:   ${:.2} ({:.2}%)", self.risk_amount, self.risk_percent)?;
        writeln!(f, "Distance:      {:.0} points", self.distance_points)?;
        writeln!(f, "$/point/lot:   ${:.2}", self.value_per_point)?;
        writeln!(f, "Lot (raw):     {:.4}", self.raw_lot)?;
        writeln!(f, "Lot (step):    {:.2}", self.quantized_lot)?;
        writeln!(f, "MaxLot (cap):  {:.2}", self.max_lot)?;
        writeln!(f, "Lot:           {:.2}", self.final_lot)?;
        write!(f, "P/L @SL:       ${:.2}", self.pnl_at_stop)?;
        if self.capped() {
            write!(f, "\nLot exceeded MaxLot and was reduced to the cap")?;
        }
        Ok(())
    }
}

/// Calculator for order sizes on one instrument.
pub struct LotSizer {
    spec: InstrumentSpec,
}

impl LotSizer {
    pub fn new(spec: InstrumentSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &InstrumentSpec {
        &self.spec
    }

    /// Size an order from a risk request.
    pub fn size(&self, req: &RiskRequest) -> LotSizing {
        let (risk_amount, risk_percent) = match req.mode {
            SizingMode::AllIn => (req.balance.max(0.0), if req.balance > 0.0 { 100.0 } else { 0.0 }),
            SizingMode::Safe => loss_to_amount_and_percent(req.balance, req.risk),
        };

        let raw_lot = match req.mode {
            SizingMode::AllIn => optimal_lot_all_in(req.balance, req.distance_points, &self.spec),
            SizingMode::Safe => {
                optimal_lot_by_risk(req.balance, risk_percent, req.distance_points, &self.spec)
            }
        };

        let cap = max_lot_theoretical(req.balance, req.price, req.leverage, &self.spec);
        let quantized_lot = quantize_lot(raw_lot, &self.spec);
        let final_lot = quantize_then_cap(raw_lot, cap, &self.spec);
        let value_per_point = value_per_point_per_lot(&self.spec);

        LotSizing {
            risk_amount,
            risk_percent,
            distance_points: req.distance_points,
            value_per_point,
            raw_lot,
            quantized_lot,
            max_lot: cap,
            final_lot,
            pnl_at_stop: -(final_lot * req.distance_points.max(0.0) * value_per_point),
        }
    }

    /// Lots per stop distance for a fixed risk amount.
    ///
    /// Distances are merged with `custom`, sorted and de-duplicated; each
    /// row is flagged when it exceeds `max_lot` (ignored when `max_lot` is 0).
    pub fn stop_table(
        &self,
        risk_amount: f64,
        standard: &[u32],
        custom: Option<u32>,
        max_lot: f64,
    ) -> Vec<StopRow> {
        let mut stops: Vec<u32> = standard.to_vec();
        if let Some(c) = custom.filter(|c| *c > 0) {
            stops.push(c);
        }
        stops.sort_unstable();
        stops.dedup();

        lots_for_stop_distances(risk_amount, &stops, &self.spec)
            .into_iter()
            .map(|(points, lots)| StopRow {
                points,
                lots,
                exceeds_max: max_lot > 0.0 && lots > max_lot,
            })
            .collect()
    }
}

/// One row of the stop-distance table.
#[derive(Debug, Clone, PartialEq)]
pub struct StopRow {
    pub points: u32,
    pub lots: f64,
    pub exceeds_max: bool,
}

/// `(stop_points, lots)` pairs for a fixed risk amount.
pub fn lots_for_stop_distances(
    risk_amount: f64,
    stops_points: &[u32],
    spec: &InstrumentSpec,
) -> Vec<(u32, f64)> {
    let vpp = value_per_point_per_lot(spec);
    stops_points
        .iter()
        .map(|&p| {
            let lots = if p > 0 && vpp > 0.0 {
                risk_amount / (f64::from(p) * vpp)
            } else {
                0.0
            };
            (p, lots)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_full_risk_equals_all_in() {
        let gold = InstrumentSpec::xauusd();
        for (balance, distance) in [(1000.0, 500.0), (25_000.0, 1234.0), (3.5, 10.0)] {
            assert!(close(
                optimal_lot_by_risk(balance, 100.0, distance, &gold),
                optimal_lot_all_in(balance, distance, &gold)
            ));
        }
    }

    #[test]
    fn test_optimal_lot_by_risk() {
        let gold = InstrumentSpec::xauusd();
        // $10 risk over 1000 points at $1/point/lot
        assert!(close(optimal_lot_by_risk(1000.0, 1.0, 1000.0, &gold), 0.01));
        assert_eq!(optimal_lot_by_risk(1000.0, 1.0, 0.0, &gold), 0.0);
        assert_eq!(optimal_lot_all_in(1000.0, -5.0, &gold), 0.0);
    }

    #[test]
    fn test_loss_normalization() {
        assert_eq!(loss_to_amount_and_percent(1000.0, RiskInput::Percent(10.0)), (100.0, 10.0));
        assert_eq!(loss_to_amount_and_percent(1000.0, RiskInput::Amount(50.0)), (50.0, 5.0));
        assert_eq!(loss_to_amount_and_percent(0.0, RiskInput::Amount(50.0)), (0.0, 0.0));
    }

    #[test]
    fn test_quantize_floors_to_step() {
        let gold = InstrumentSpec::xauusd();
        assert_eq!(quantize_lot(0.079, &gold), 0.07);
        assert_eq!(quantize_lot(0.07, &gold), 0.07);
        assert_eq!(quantize_lot(0.3, &gold), 0.3);
        // below the step falls back to the minimum lot
        assert_eq!(quantize_lot(0.004, &gold), 0.01);
        assert_eq!(quantize_lot(0.0, &gold), 0.0);
    }

    #[test]
    fn test_quantize_happens_before_cap() {
        let gold = InstrumentSpec::xauusd();
        // the cap is not a multiple of the step: it must win as-is
        assert_eq!(quantize_then_cap(0.5, 0.123, &gold), 0.123);
        // capping first and then flooring would give 0.12 instead
        assert_ne!(quantize_lot(0.123, &gold), quantize_then_cap(0.5, 0.123, &gold));
        // no cap available
        assert_eq!(quantize_then_cap(0.079, 0.0, &gold), 0.07);
    }

    #[test]
    fn test_sizer_safe_mode() {
        let sizer = LotSizer::new(InstrumentSpec::xauusd());
        let result = sizer.size(&RiskRequest {
            balance: 1000.0,
            leverage: 1000.0,
            price: 4000.0,
            risk: RiskInput::Percent(1.0),
            distance_points: 1000.0,
            mode: SizingMode::Safe,
        });

        assert!(close(result.risk_amount, 10.0));
        assert!(close(result.raw_lot, 0.01));
        assert_eq!(result.final_lot, 0.01);
        assert!(close(result.max_lot, 2.5));
        assert!(!result.capped());
        assert!(close(result.pnl_at_stop, -10.0));
    }

    #[test]
    fn test_sizer_all_in_is_capped() {
        let sizer = LotSizer::new(InstrumentSpec::xauusd());
        let result = sizer.size(&RiskRequest {
            balance: 1000.0,
            leverage: 100.0,
            price: 4000.0,
            risk: RiskInput::Percent(1.0),
            distance_points: 100.0,
            mode: SizingMode::AllIn,
        });

        // 1000 / (100 × 1) = 10 lots, cap = 1000×100/(4000×100) = 0.25
        assert!(close(result.raw_lot, 10.0));
        assert!(close(result.final_lot, 0.25));
        assert!(result.capped());
        assert_eq!(result.risk_percent, 100.0);
    }

    #[test]
    fn test_stop_table() {
        let sizer = LotSizer::new(InstrumentSpec::xauusd());
        let rows = sizer.stop_table(100.0, &[100, 1000, 10], Some(1000), 0.5);

        let points: Vec<u32> = rows.iter().map(|r| r.points).collect();
        assert_eq!(points, vec![10, 100, 1000]);
        assert!(close(rows[0].lots, 10.0));
        assert!(rows[0].exceeds_max);
        assert!(close(rows[2].lots, 0.1));
        assert!(!rows[2].exceeds_max);
    }
}
