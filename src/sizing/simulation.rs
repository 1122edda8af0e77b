//! Stop-out walk for a grid under a worst-case price path.
//!
//! Price moves away from favourability in fixed increments. Each increment
//! opens any grid level that was reached, re-marks every open position and
//! checks the margin level against the broker's stop-out threshold. Below the
//! threshold the worst-losing position is closed until the level recovers.
//!
//! The loss of every force-closed position stays realized in equity, so runs
//! that hit a stop-out report lower equity than a model that recomputes
//! equity from the still-open positions alone.

use serde::Serialize;
use tracing::debug;

use super::arithmetic::value_per_point_per_lot;
use crate::models::{GridSide, InstrumentSpec, Position};

/// Most grid levels one run will open.
pub const MAX_GRID_LEVELS: u64 = 10_000;

/// Inputs for one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub balance: f64,
    pub leverage: f64,
    pub current_price: f64,
    pub side: GridSide,
    /// Distance between grid levels in points
    pub step_points: f64,
    /// Adverse excursion the walk must cover, in points
    pub buffer_points: f64,
    pub lots: f64,
    /// Margin level (percent) at or below which positions are cut
    pub stop_out_pct: f64,
    /// Price increment per step, in points
    pub granularity_points: f64,
}

/// Account state after one price step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurvePoint {
    pub price: f64,
    pub open_positions: usize,
    pub equity: f64,
    pub used_margin: f64,
    /// `None` while nothing is open
    pub margin_level: Option<f64>,
}

/// A position closed by the stop-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Liquidation {
    pub price: f64,
    pub cut_entry: f64,
    pub realized_pnl: f64,
    pub equity_after: f64,
    pub used_margin_after: f64,
    pub margin_level_after: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndReason {
    /// Walked the full buffer distance
    BufferReached,
    /// Equity fell to zero or below
    EquityDepleted,
    /// Stop-out closed every open position
    AllLiquidated,
    /// Inputs were not usable
    InvalidInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub curve: Vec<CurvePoint>,
    /// Entries still open when the walk ended
    pub open_entries: Vec<f64>,
    pub liquidations: Vec<Liquidation>,
    /// Price increments taken after the starting price
    pub steps: u64,
    pub orders_opened: usize,
    pub realized_pnl: f64,
    pub final_equity: f64,
    pub end_reason: EndReason,
}

impl SimulationReport {
    fn empty(balance: f64) -> Self {
        Self {
            curve: Vec::new(),
            open_entries: Vec::new(),
            liquidations: Vec::new(),
            steps: 0,
            orders_opened: 0,
            realized_pnl: 0.0,
            final_equity: balance,
            end_reason: EndReason::InvalidInput,
        }
    }

    /// Lowest margin level seen during the walk.
    pub fn min_margin_level(&self) -> Option<f64> {
        self.curve
            .iter()
            .filter_map(|p| p.margin_level)
            .fold(None, |acc, lvl| Some(acc.map_or(lvl, |a: f64| a.min(lvl))))
    }
}

impl std::fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:=^60}", " STOP-OUT SIMULATION ")?;
        writeln!(f, "End:            {:?}", self.end_reason)?;
        writeln!(f, "Steps:          {}", self.steps)?;
        writeln!(f, "Orders opened:  {}", self.orders_opened)?;
        writeln!(f, "Still open:     {}", self.open_entries.len())?;
        writeln!(f, "Liquidations:   {}", self.liquidations.len())?;
        writeln!(f, "Realized P/L:   ${:.2}", self.realized_pnl)?;
        writeln!(f, "Final equity:   ${:.2}", self.final_equity)?;
        match self.min_margin_level() {
            Some(lvl) => writeln!(f, "Min margin lvl: {:.2}%", lvl)?,
            None => writeln!(f, "Min margin lvl: n/a")?,
        }
        write!(f, "{}", "=".repeat(60))
    }
}

struct Book<'a> {
    spec: &'a InstrumentSpec,
    leverage: f64,
    balance: f64,
    realized: f64,
    open: Vec<Position>,
}

impl Book<'_> {
    fn used_margin(&self) -> f64 {
        self.open
            .iter()
            .map(|p| p.margin(self.spec.contract_size, self.leverage))
            .sum()
    }

    fn floating(&self, price: f64) -> f64 {
        self.open.iter().map(|p| self.pnl(p, price)).sum()
    }

    fn pnl(&self, pos: &Position, price: f64) -> f64 {
        let points = pos.price_diff(price) / self.spec.price_point;
        pos.lots * value_per_point_per_lot(self.spec) * points
    }

    fn snapshot(&self, price: f64) -> CurvePoint {
        let used_margin = self.used_margin();
        let equity = self.balance + self.realized + self.floating(price);
        CurvePoint {
            price,
            open_positions: self.open.len(),
            equity,
            used_margin,
            margin_level: (used_margin > 0.0).then(|| equity / used_margin * 100.0),
        }
    }

    /// Index of the position with the lowest P/L.
    fn worst(&self, price: f64) -> Option<usize> {
        self.open
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| self.pnl(a, price).total_cmp(&self.pnl(b, price)))
            .map(|(i, _)| i)
    }
}

/// Walk price against the grid until the buffer is covered, equity is gone,
/// or the stop-out has closed everything.
///
/// The walk takes at most `ceil(buffer / granularity)` price steps.
pub fn simulate(params: &SimulationParams, spec: &InstrumentSpec) -> SimulationReport {
    if params.balance <= 0.0
        || params.lots <= 0.0
        || params.step_points <= 0.0
        || params.current_price <= 0.0
        || params.buffer_points < 0.0
    {
        return SimulationReport::empty(params.balance);
    }

    let granularity = if params.granularity_points > 0.0 {
        params.granularity_points
    } else {
        1.0
    };
    let sign = params.side.adverse_sign();
    let price_at = |points: f64| params.current_price + sign * points * spec.price_point;

    let mut book = Book {
        spec,
        leverage: params.leverage,
        balance: params.balance,
        realized: 0.0,
        open: Vec::new(),
    };
    let mut curve = Vec::new();
    let mut liquidations = Vec::new();
    let mut next_level: u64 = 0;
    let mut step: u64 = 0;

    let end_reason = loop {
        let walked = step as f64 * granularity;
        let price = price_at(walked);

        while next_level < MAX_GRID_LEVELS
            && walked + 1e-9 >= next_level as f64 * params.step_points
        {
            let entry = price_at(next_level as f64 * params.step_points);
            book.open.push(Position::new(params.side, entry, params.lots));
            next_level += 1;
        }

        let point = book.snapshot(price);
        let breached = point
            .margin_level
            .map_or(false, |lvl| lvl <= params.stop_out_pct);
        curve.push(point);

        if breached {
            while let Some(idx) = book.worst(price) {
                let cut = book.open.remove(idx);
                let pnl = book.pnl(&cut, price);
                book.realized += pnl;

                let after = book.snapshot(price);
                liquidations.push(Liquidation {
                    price,
                    cut_entry: cut.entry_price,
                    realized_pnl: pnl,
                    equity_after: after.equity,
                    used_margin_after: after.used_margin,
                    margin_level_after: after.margin_level,
                });
                match after.margin_level {
                    Some(lvl) if lvl <= params.stop_out_pct => continue,
                    _ => break,
                }
            }
            curve.push(book.snapshot(price));

            if book.open.is_empty() {
                break EndReason::AllLiquidated;
            }
        }

        let equity = curve.last().map_or(params.balance, |p| p.equity);
        if equity <= 0.0 {
            break EndReason::EquityDepleted;
        }
        if walked >= params.buffer_points {
            break EndReason::BufferReached;
        }
        step += 1;
    };

    let final_equity = curve.last().map_or(params.balance, |p| p.equity);
    debug!(
        steps = step,
        opened = next_level,
        liquidations = liquidations.len(),
        final_equity,
        ?end_reason,
        "Simulation finished"
    );

    SimulationReport {
        curve,
        open_entries: book.open.iter().map(|p| p.entry_price).collect(),
        liquidations,
        steps: step,
        orders_opened: next_level as usize,
        realized_pnl: book.realized,
        final_equity,
        end_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SimulationParams {
        SimulationParams {
            balance: 1_000_000.0,
            leverage: 1000.0,
            current_price: 4000.0,
            side: GridSide::Long,
            step_points: 1000.0,
            buffer_points: 10_000.0,
            lots: 0.01,
            stop_out_pct: 30.0,
            granularity_points: 100.0,
        }
    }

    #[test]
    fn test_well_funded_grid_reaches_buffer() {
        let report = simulate(&params(), &InstrumentSpec::xauusd());

        assert_eq!(report.end_reason, EndReason::BufferReached);
        assert_eq!(report.orders_opened, 11);
        assert_eq!(report.steps, 100);
        assert!(report.liquidations.is_empty());
        assert_eq!(report.open_entries.len(), 11);
        assert!(report.open_entries.windows(2).all(|w| w[1] < w[0]));
        // first point: one order open, nothing floating yet
        assert_eq!(report.curve[0].open_positions, 1);
        assert!((report.curve[0].equity - 1_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_stop_out_cuts_worst_first() {
        let p = SimulationParams {
            balance: 100.0,
            step_points: 100.0,
            buffer_points: 5000.0,
            lots: 0.1,
            ..params()
        };
        let report = simulate(&p, &InstrumentSpec::xauusd());

        assert!(!report.liquidations.is_empty());
        assert_ne!(report.end_reason, EndReason::BufferReached);
        // the deepest entry (first filled for a long grid) goes first
        assert!((report.liquidations[0].cut_entry - 4000.0).abs() < 1e-9);
        assert!(report.liquidations[0].realized_pnl < 0.0);
        assert!(report.realized_pnl < 0.0);
    }

    #[test]
    fn test_stop_out_stops_cutting_once_level_recovers() {
        let p = SimulationParams {
            balance: 100.0,
            step_points: 100.0,
            buffer_points: 5000.0,
            lots: 0.1,
            ..params()
        };
        let report = simulate(&p, &InstrumentSpec::xauusd());

        // at 3997 four orders are open: equity 40 on 159.94 margin, level 25%
        let first = &report.liquidations[0];
        assert!((first.price - 3997.0).abs() < 1e-9);
        assert!((first.realized_pnl + 30.0).abs() < 1e-9);
        let level = first.margin_level_after.unwrap();
        assert!((level - 40.0 / 119.94 * 100.0).abs() < 1e-9);
        assert!(level > p.stop_out_pct);
        assert!(first.used_margin_after > 0.0);
        let cuts_at_first_price = report
            .liquidations
            .iter()
            .filter(|l| (l.price - first.price).abs() < 1e-9)
            .count();
        assert_eq!(cuts_at_first_price, 1);

        // a pass that leaves positions open ends above the threshold
        for (i, cut) in report.liquidations.iter().enumerate() {
            let last_of_pass = report
                .liquidations
                .get(i + 1)
                .map_or(true, |next| (next.price - cut.price).abs() > 1e-9);
            if last_of_pass && cut.used_margin_after > 0.0 {
                assert!(cut.margin_level_after.unwrap() > p.stop_out_pct);
            }
        }

        // at 3996 no single cut recovers the level and the book empties
        assert_eq!(report.end_reason, EndReason::AllLiquidated);
        assert!(report.open_entries.is_empty());
        assert!((report.realized_pnl + 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_grid_levels_are_capped() {
        let p = SimulationParams {
            balance: 1e12,
            step_points: 0.1,
            buffer_points: 10_000.0,
            ..params()
        };
        let report = simulate(&p, &InstrumentSpec::xauusd());

        assert_eq!(report.end_reason, EndReason::BufferReached);
        assert_eq!(report.orders_opened as u64, MAX_GRID_LEVELS);
        assert_eq!(report.open_entries.len() as u64, MAX_GRID_LEVELS);
    }

    #[test]
    fn test_step_bound() {
        let spec = InstrumentSpec::xauusd();
        for (buffer, granularity) in [(10_000.0, 100.0), (10_050.0, 100.0), (999.0, 7.0), (0.0, 100.0)] {
            let p = SimulationParams {
                buffer_points: buffer,
                granularity_points: granularity,
                ..params()
            };
            let report = simulate(&p, &spec);
            let bound = (buffer / granularity).ceil() as u64;
            assert!(report.steps <= bound, "steps {} > {}", report.steps, bound);
        }
    }

    #[test]
    fn test_short_grid_walks_up() {
        let p = SimulationParams {
            side: GridSide::Short,
            ..params()
        };
        let report = simulate(&p, &InstrumentSpec::xauusd());
        assert!(report.curve.windows(2).all(|w| w[1].price >= w[0].price));
        assert!(report.open_entries.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_invalid_input() {
        let p = SimulationParams {
            lots: 0.0,
            ..params()
        };
        let report = simulate(&p, &InstrumentSpec::xauusd());
        assert_eq!(report.end_reason, EndReason::InvalidInput);
        assert!(report.curve.is_empty());
    }
}
