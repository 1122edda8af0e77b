//! Sizing and grid planning driven by a parsed signal.

use serde::Serialize;

use super::arithmetic::{points_distance, value_per_point_per_lot};
use super::risk::{step_units, units_to_lots};
use crate::models::{GridSide, InstrumentSpec, ParsedSignal};

/// P/L if price reaches one take-profit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TpOutcome {
    /// 1-based TP number
    pub index: usize,
    pub price: f64,
    pub distance_points: f64,
    pub pnl: f64,
}

/// Single-order sizing for a signal and a risk amount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSizing {
    pub risk_amount: f64,
    pub distance_points: f64,
    pub lots: f64,
    /// Loss at the stop (negative)
    pub pnl_at_stop: f64,
    pub take_profits: Vec<TpOutcome>,
}

impl SignalSizing {
    /// `None` when the signal has no entry or stop, or they coincide.
    pub fn compute(signal: &ParsedSignal, risk_amount: f64, spec: &InstrumentSpec) -> Option<Self> {
        let distance = points_distance(signal.entry, signal.stop_loss, spec);
        let vpp = value_per_point_per_lot(spec);
        if distance <= 0.0 || vpp <= 0.0 {
            return None;
        }
        let lots = risk_amount.max(0.0) / (distance * vpp);

        let take_profits = signal
            .take_profits
            .iter()
            .enumerate()
            .map(|(i, &tp)| {
                let d = points_distance(signal.entry, Some(tp), spec);
                TpOutcome {
                    index: i + 1,
                    price: tp,
                    distance_points: d,
                    pnl: lots * d * vpp,
                }
            })
            .collect();

        Some(Self {
            risk_amount,
            distance_points: distance,
            lots,
            pnl_at_stop: -(lots * distance * vpp),
            take_profits,
        })
    }
}

/// One row of the risk-percentage table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskRow {
    pub risk_percent: f64,
    pub risk_amount: f64,
    pub lots: f64,
    /// P/L at each take-profit, in signal order
    pub tp_pnls: Vec<f64>,
}

/// Lots and TP outcomes for every percentage in `risk_set`.
pub fn risk_table(
    signal: &ParsedSignal,
    balance: f64,
    risk_set: &[f64],
    spec: &InstrumentSpec,
) -> Vec<RiskRow> {
    risk_set
        .iter()
        .map(|&pct| {
            let risk_amount = balance.max(0.0) * (pct / 100.0);
            match SignalSizing::compute(signal, risk_amount, spec) {
                Some(s) => RiskRow {
                    risk_percent: pct,
                    risk_amount,
                    lots: s.lots,
                    tp_pnls: s.take_profits.iter().map(|t| t.pnl).collect(),
                },
                None => RiskRow {
                    risk_percent: pct,
                    risk_amount,
                    lots: 0.0,
                    tp_pnls: vec![0.0; signal.take_profits.len()],
                },
            }
        })
        .collect()
}

/// All divisors of `n`, ascending.
pub fn divisors(n: u64) -> Vec<u64> {
    let mut small = Vec::new();
    let mut large = Vec::new();
    let mut i = 1;
    while i * i <= n {
        if n % i == 0 {
            small.push(i);
            if i != n / i {
                large.push(n / i);
            }
        }
        i += 1;
    }
    large.reverse();
    small.extend(large);
    small
}

/// Total lot a risk budget buys on a signal, split-able into equal orders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalGridBudget {
    pub side: GridSide,
    pub entry: f64,
    pub stop_loss: f64,
    pub distance_points: f64,
    pub lot_step: f64,
    /// Total lot measured in lot steps
    pub total_units: u64,
    pub total_lot: f64,
    /// True when even one minimum lot exceeds the risk and one was used anyway
    pub min_lot_fallback: bool,
    /// Order counts that divide the total lot evenly
    pub order_options: Vec<u64>,
}

impl SignalGridBudget {
    /// `None` unless the signal is actionable and the risk is positive.
    pub fn compute(signal: &ParsedSignal, risk_amount: f64, spec: &InstrumentSpec) -> Option<Self> {
        let (side, entry, stop_loss) = match (signal.direction, signal.entry, signal.stop_loss) {
            (Some(side), Some(entry), Some(sl)) => (side, entry, sl),
            _ => return None,
        };
        let distance = points_distance(Some(entry), Some(stop_loss), spec);
        let vpp = value_per_point_per_lot(spec);
        if distance <= 0.0 || vpp <= 0.0 || risk_amount <= 0.0 {
            return None;
        }

        let lot_step = spec.lot_step.max(0.01);
        let min_lot = spec.min_lot.max(lot_step);
        let loss_one_min = min_lot * vpp * distance;

        let (total_units, min_lot_fallback) = if risk_amount < loss_one_min - 1e-12 {
            ((min_lot / lot_step).round() as u64, true)
        } else {
            (step_units(risk_amount / (distance * vpp), lot_step), false)
        };

        Some(Self {
            side,
            entry,
            stop_loss,
            distance_points: distance,
            lot_step,
            total_units,
            total_lot: units_to_lots(total_units, lot_step),
            min_lot_fallback,
            order_options: divisors(total_units),
        })
    }

    /// Split the budget into `orders` entries between entry and stop.
    ///
    /// Returns `None` when `orders` does not divide the total lot evenly.
    pub fn plan(
        &self,
        orders: u64,
        take_profits: &[f64],
        spec: &InstrumentSpec,
    ) -> Option<SignalGridPlan> {
        if orders == 0 || !self.order_options.contains(&orders) {
            return None;
        }
        let n = orders as f64;
        let lot_per_order = units_to_lots(self.total_units / orders, self.lot_step);
        let vpp = value_per_point_per_lot(spec);
        let sign = self.side.profit_sign();

        let entries: Vec<f64> = (0..orders)
            .map(|k| self.entry + (self.stop_loss - self.entry) * (k as f64 / n))
            .collect();

        let pnl_to = |target: f64, filled: &[f64]| -> f64 {
            filled
                .iter()
                .map(|e| lot_per_order * vpp * (target - e) / spec.price_point * sign)
                .sum()
        };

        let pnl_at_stop = pnl_to(self.stop_loss, &entries);
        let break_even = (orders >= 2).then(|| entries.iter().sum::<f64>() / n);

        let tp_table = (1..=entries.len())
            .map(|filled| FilledOutcome {
                filled,
                tp_pnls: take_profits
                    .iter()
                    .map(|&tp| pnl_to(tp, &entries[..filled]))
                    .collect(),
            })
            .collect();

        Some(SignalGridPlan {
            orders,
            lot_per_order,
            total_lot: self.total_lot,
            step_points: self.distance_points / n,
            entries,
            pnl_at_stop,
            break_even,
            tp_table,
        })
    }
}

/// P/L at each take-profit when only the first `filled` orders were hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilledOutcome {
    pub filled: usize,
    pub tp_pnls: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalGridPlan {
    pub orders: u64,
    pub lot_per_order: f64,
    pub total_lot: f64,
    pub step_points: f64,
    pub entries: Vec<f64>,
    pub pnl_at_stop: f64,
    /// Mean entry; only meaningful with two or more orders
    pub break_even: Option<f64>,
    pub tp_table: Vec<FilledOutcome>,
}

impl std::fmt::Display for SignalGridPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:=^60}", " SIGNAL GRID PLAN ")?;
        writeln!(f, "Orders:       {}", self.orders)?;
        writeln!(f, "Lot/Order:    {:.2}", self.lot_per_order)?;
        writeln!(f, "Total Lot:    {:.2}", self.total_lot)?;
        writeln!(f, "Step:         {:.0} pts", self.step_points)?;
        writeln!(f, "P/L @SL:      ${:.2}", self.pnl_at_stop)?;
        if let Some(be) = self.break_even {
            writeln!(f, "Break-even:   {:.2}", be)?;
        }
        writeln!(f)?;
        for (i, e) in self.entries.iter().enumerate() {
            writeln!(f, "  #{:<3} {:.2}", i + 1, e)?;
        }
        if !self.tp_table.is_empty() && !self.tp_table[0].tp_pnls.is_empty() {
            writeln!(f)?;
            write!(f, "{:>8}", "Filled")?;
            for i in 0..self.tp_table[0].tp_pnls.len() {
                write!(f, "{:>12}", format!("TP{}", i + 1))?;
            }
            writeln!(f)?;
            for row in &self.tp_table {
                write!(f, "{:>8}", row.filled)?;
                for pnl in &row.tp_pnls {
                    write!(f, "{:>12.2}", pnl)?;
                }
                writeln!(f)?;
            }
        }
        write!(f, "{}", "=".repeat(60))
    }
}
