//! Grid / martingale planning.
//!
//! A grid is a ladder of same-direction orders spaced a fixed number of
//! points apart, each adding margin as price moves against the position.
//! The planner answers two questions: how many orders fit the balance by
//! margin, and how many fit while still surviving a required adverse move.

use serde::Serialize;

use super::arithmetic::value_per_point_per_lot;
use crate::models::{GridSide, InstrumentSpec};

/// `n` entry prices starting at `start`, stepping away from favourability.
pub fn grid_entry_prices(
    start: f64,
    n: i64,
    step_points: f64,
    price_point: f64,
    side: GridSide,
) -> Vec<f64> {
    if n <= 0 || step_points <= 0.0 || price_point <= 0.0 {
        return Vec::new();
    }
    let step_price = step_points * price_point;
    let sign = side.adverse_sign();
    (0..n).map(|i| start + sign * i as f64 * step_price).collect()
}

/// Last index whose running value is still within `budget`.
pub fn last_feasible_index(values: &[f64], budget: f64) -> Option<usize> {
    values.iter().rposition(|v| *v <= budget)
}

/// Cumulative loss of `n` filled orders after a further `buffer` point move.
///
/// `L(N) = lot × vpp × (N·B + S·N(N−1)/2)`
pub fn loss_at_breach(n: u64, lot: f64, vpp: f64, buffer_points: f64, spacing_points: f64) -> f64 {
    let n = n as f64;
    lot * vpp * (n * buffer_points + spacing_points * n * (n - 1.0) / 2.0)
}

/// Largest order count whose loss at the breach point stays within balance.
///
/// Solves `A·N² + B'·N + C ≤ 0` for its positive root, where
/// `A = lot·vpp·S/2`, `B' = lot·vpp·(B − S/2)` and `C = −balance`.
pub fn max_orders_by_buffer(
    balance: f64,
    lot: f64,
    buffer_points: f64,
    spacing_points: f64,
    vpp: f64,
) -> u64 {
    if balance <= 0.0 || lot <= 0.0 || buffer_points <= 0.0 || spacing_points <= 0.0 || vpp <= 0.0 {
        return 0;
    }
    let a = lot * vpp * spacing_points / 2.0;
    let b = lot * vpp * (buffer_points - spacing_points / 2.0);
    let c = -balance;

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return 0;
    }
    let root = (-b + disc.sqrt()) / (2.0 * a);
    let mut n = if root > 0.0 { root.floor() as u64 } else { 0 };

    // the root can land a hair off an exact fit; settle on the inequality itself
    let loss = |n: u64| loss_at_breach(n, lot, vpp, buffer_points, spacing_points);
    while loss(n + 1) <= balance {
        n += 1;
    }
    while n > 0 && loss(n) > balance {
        n -= 1;
    }
    n
}

/// Adverse points the account still tolerates after filling `n` orders.
///
/// Inverse of [`max_orders_by_buffer`]: `(balance/(lot·vpp) − S·N(N−1)/2) / N`.
pub fn remaining_buffer_points(
    balance: f64,
    lot: f64,
    spacing_points: f64,
    n: u64,
    vpp: f64,
) -> f64 {
    if n == 0 || balance <= 0.0 || lot <= 0.0 || spacing_points <= 0.0 || vpp <= 0.0 {
        return 0.0;
    }
    let n = n as f64;
    let capacity = balance / (lot * vpp);
    let consumed = spacing_points * n * (n - 1.0) / 2.0;
    ((capacity - consumed) / n).max(0.0)
}

/// Orders needed to cover `coverage` points at `spacing`, capped at `max_rows`.
pub fn coverage_orders(coverage_points: f64, spacing_points: f64, max_rows: usize) -> usize {
    if spacing_points <= 0.0 || coverage_points < 0.0 {
        return 0;
    }
    let rows = (coverage_points / spacing_points).floor() as usize + 1;
    rows.min(max_rows)
}

/// Round to the nearest multiple of `step` (plain rounding when `step ≤ 0`).
pub fn round_to_step(x: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return x.round();
    }
    (x / step).round() * step
}

/// How much of the required buffer survives at a given order count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BufferHealth {
    Safe,
    Warning,
    Danger,
}

impl BufferHealth {
    /// `warning_ratio` is the share of the requirement that still counts as amber.
    pub fn classify(remaining_points: f64, required_points: f64, warning_ratio: f64) -> Self {
        if remaining_points >= required_points {
            Self::Safe
        } else if remaining_points >= warning_ratio * required_points {
            Self::Warning
        } else {
            Self::Danger
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Warning => "WARNING",
            Self::Danger => "DANGER",
        }
    }
}

impl std::fmt::Display for BufferHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggressiveness preset turning candle statistics into spacing and coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskPreset {
    Low,
    Medium,
    High,
}

impl RiskPreset {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    fn spacing_factor(&self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 0.5,
            Self::High => 0.25,
        }
    }

    fn coverage_sigmas(&self) -> f64 {
        match self {
            Self::Low => 3.0,
            Self::Medium => 2.0,
            Self::High => 1.0,
        }
    }

    /// Suggested `(spacing, coverage)` in points from mean/SD of candle range.
    pub fn suggest(&self, mean_points: f64, sd_points: f64) -> (f64, f64) {
        let spacing = round_to_step((mean_points * self.spacing_factor()).max(50.0), 50.0);
        let coverage =
            round_to_step((mean_points + self.coverage_sigmas() * sd_points).max(1000.0), 500.0);
        (spacing, coverage)
    }
}

/// Inputs for a grid table.
#[derive(Debug, Clone)]
pub struct GridRequest {
    pub start_price: f64,
    pub side: GridSide,
    pub spacing_points: f64,
    pub lots: f64,
    pub orders: usize,
    pub leverage: f64,
    /// Take-profit distance per order; none leaves the column empty
    pub tp_points: Option<f64>,
    /// Price at which the whole grid is assumed to be liquidated
    pub liquidation_price: Option<f64>,
}

/// One rung of the ladder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRow {
    /// 1-based order number
    pub index: usize,
    pub entry_price: f64,
    pub take_profit: Option<f64>,
    pub cost: f64,
    pub margin: f64,
    pub cum_cost: f64,
    pub cum_margin: f64,
    pub liq_cost: Option<f64>,
    pub liq_margin: Option<f64>,
    pub liq_cum_cost: Option<f64>,
    pub liq_cum_margin: Option<f64>,
}

/// Derived order ladder with cost and margin prefix sums.
#[derive(Debug, Clone, Serialize)]
pub struct GridPlan {
    pub side: GridSide,
    pub spacing_points: f64,
    pub lots: f64,
    pub rows: Vec<GridRow>,
}

impl GridPlan {
    pub fn build(req: &GridRequest, spec: &InstrumentSpec) -> Self {
        let prices = grid_entry_prices(
            req.start_price,
            req.orders as i64,
            req.spacing_points,
            spec.price_point,
            req.side,
        );

        let margin_of = |cost: f64| if req.leverage > 0.0 { cost / req.leverage } else { 0.0 };
        let profit_sign = req.side.profit_sign();

        let mut cum_cost = 0.0;
        let mut cum_margin = 0.0;
        let mut liq_cum_cost = 0.0;
        let mut liq_cum_margin = 0.0;
        let mut rows = Vec::with_capacity(prices.len());

        for (i, price) in prices.into_iter().enumerate() {
            let cost = price * req.lots * spec.contract_size;
            let margin = margin_of(cost);
            cum_cost += cost;
            cum_margin += margin;

            let take_profit = req
                .tp_points
                .map(|tp| price + profit_sign * tp * spec.price_point);

            let liq = req.liquidation_price.map(|liq| {
                let span = match req.side {
                    GridSide::Long => (price - liq).max(0.0),
                    GridSide::Short => (liq - price).max(0.0),
                };
                let cost = span * req.lots * spec.contract_size;
                let margin = margin_of(cost);
                liq_cum_cost += cost;
                liq_cum_margin += margin;
                (cost, margin, liq_cum_cost, liq_cum_margin)
            });

            rows.push(GridRow {
                index: i + 1,
                entry_price: price,
                take_profit,
                cost,
                margin,
                cum_cost,
                cum_margin,
                liq_cost: liq.map(|l| l.0),
                liq_margin: liq.map(|l| l.1),
                liq_cum_cost: liq.map(|l| l.2),
                liq_cum_margin: liq.map(|l| l.3),
            });
        }

        Self {
            side: req.side,
            spacing_points: req.spacing_points,
            lots: req.lots,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the last order whose cumulative margin fits the balance.
    pub fn margin_limit_index(&self, balance: f64) -> Option<usize> {
        let cum: Vec<f64> = self.rows.iter().map(|r| r.cum_margin).collect();
        last_feasible_index(&cum, balance)
    }

    /// Same as [`margin_limit_index`](Self::margin_limit_index) using the
    /// liquidation-price margin column.
    pub fn liquidation_limit_index(&self, balance: f64) -> Option<usize> {
        let cum: Vec<f64> = self.rows.iter().filter_map(|r| r.liq_cum_margin).collect();
        if cum.is_empty() {
            return None;
        }
        last_feasible_index(&cum, balance)
    }

    /// Buffer-constrained order index, clipped to the rows in the plan.
    pub fn buffer_limit_index(&self, balance: f64, buffer_points: f64, spec: &InstrumentSpec) -> Option<usize> {
        let n = max_orders_by_buffer(
            balance,
            self.lots,
            buffer_points,
            self.spacing_points,
            value_per_point_per_lot(spec),
        );
        if n == 0 || self.rows.is_empty() {
            return None;
        }
        Some((n as usize - 1).min(self.rows.len() - 1))
    }

    /// Summarize both constraints and pick the tighter one.
    pub fn recommend(
        &self,
        balance: f64,
        buffer_points: f64,
        warning_ratio: f64,
        spec: &InstrumentSpec,
    ) -> GridRecommendation {
        let vpp = value_per_point_per_lot(spec);
        let limit = |idx: Option<usize>| {
            idx.map(|i| {
                let orders = i + 1;
                let remaining = remaining_buffer_points(
                    balance,
                    self.lots,
                    self.spacing_points,
                    orders as u64,
                    vpp,
                );
                OrderLimit {
                    orders,
                    cum_margin: self.rows[i].cum_margin,
                    remaining_buffer_points: remaining,
                    health: BufferHealth::classify(remaining, buffer_points, warning_ratio),
                }
            })
        };

        let by_margin = limit(self.margin_limit_index(balance));
        let by_buffer = limit(self.buffer_limit_index(balance, buffer_points, spec));
        let recommended = match (by_margin.as_ref(), by_buffer.as_ref()) {
            (Some(m), Some(b)) => Some(m.orders.min(b.orders)),
            (Some(m), None) => Some(m.orders),
            (None, Some(b)) => Some(b.orders),
            (None, None) => None,
        };

        GridRecommendation {
            by_margin,
            by_buffer,
            recommended_orders: recommended,
        }
    }
}

/// Order count allowed by one constraint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLimit {
    pub orders: usize,
    pub cum_margin: f64,
    pub remaining_buffer_points: f64,
    pub health: BufferHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRecommendation {
    pub by_margin: Option<OrderLimit>,
    pub by_buffer: Option<OrderLimit>,
    pub recommended_orders: Option<usize>,
}

impl std::fmt::Display for GridRecommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:=^60}", " GRID LIMITS ")?;
        match &self.by_margin {
            Some(l) => writeln!(
                f,
                "By margin:  {} orders | Cum Margin ${:.2} | Buffer left {:.0} pts [{}]",
                l.orders, l.cum_margin, l.remaining_buffer_points, l.health
            )?,
            None => writeln!(f, "By margin:  balance does not cover the first order")?,
        }
        match &self.by_buffer {
            Some(l) => writeln!(
                f,
                "By buffer:  {} orders | Buffer left {:.0} pts [{}]",
                l.orders, l.remaining_buffer_points, l.health
            )?,
            None => writeln!(f, "By buffer:  not even one order survives the buffer")?,
        }
        match self.recommended_orders {
            Some(n) => writeln!(f, "Recommended: {} orders", n)?,
            None => writeln!(f, "Recommended: none")?,
        }
        write!(f, "{}", "=".repeat(60))
    }
}
