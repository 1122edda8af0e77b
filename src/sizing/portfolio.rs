//! Mark-to-market snapshot of a set of open orders.

use serde::Serialize;

use crate::models::{InstrumentSpec, Position};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionLine {
    pub position: Position,
    /// Favourable price difference
    pub diff: f64,
    pub pnl: f64,
    pub margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub current_price: f64,
    pub lines: Vec<PositionLine>,
    pub total_pnl: f64,
    pub total_margin: f64,
    pub total_lots: f64,
    pub equity: f64,
    pub free_margin: f64,
    /// `None` when no margin is used
    pub margin_level: Option<f64>,
}

impl PortfolioSnapshot {
    pub fn compute(
        positions: &[Position],
        current_price: f64,
        balance: f64,
        credit: f64,
        leverage: f64,
        spec: &InstrumentSpec,
    ) -> Self {
        let lines: Vec<PositionLine> = positions
            .iter()
            .map(|p| PositionLine {
                position: p.clone(),
                diff: p.price_diff(current_price),
                pnl: p.pnl_at(current_price, spec.contract_size),
                margin: p.margin(spec.contract_size, leverage),
            })
            .collect();

        let total_pnl: f64 = lines.iter().map(|l| l.pnl).sum();
        let total_margin: f64 = lines.iter().map(|l| l.margin).sum();
        let total_lots: f64 = positions.iter().map(|p| p.lots).sum();
        let equity = balance + credit + total_pnl;

        Self {
            current_price,
            lines,
            total_pnl,
            total_margin,
            total_lots,
            equity,
            free_margin: equity - total_margin,
            margin_level: (total_margin > 0.0).then(|| equity / total_margin * 100.0),
        }
    }
}

impl std::fmt::Display for PortfolioSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:=^60}", " PORTFOLIO ")?;
        writeln!(
            f,
            "{:<6} {:>12} {:>8} {:>10} {:>12} {:>10}",
            "Type", "Entry", "Lot", "Diff", "P/L ($)", "Margin"
        )?;
        for l in &self.lines {
            writeln!(
                f,
                "{:<6} {:>12.2} {:>8.2} {:>10.2} {:>12.2} {:>10.2}",
                l.position.side.as_str(), l.position.entry_price, l.position.lots, l.diff, l.pnl, l.margin
            )?;
        }
        writeln!(f, "{}", "-".repeat(60))?;
        writeln!(f, "Current price: {:.2}", self.current_price)?;
        writeln!(f, "Total lots:    {:.2}", self.total_lots)?;
        writeln!(f, "Total P/L:     ${:.2}", self.total_pnl)?;
        writeln!(f, "Used margin:   ${:.2}", self.total_margin)?;
        writeln!(f, "Equity:        ${:.2}", self.equity)?;
        writeln!(f, "Free margin:   ${:.2}", self.free_margin)?;
        match self.margin_level {
            Some(lvl) => writeln!(f, "Margin level:  {:.2}%", lvl)?,
            None => writeln!(f, "Margin level:  n/a")?,
        }
        write!(f, "{}", "=".repeat(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GridSide;

    #[test]
    fn test_snapshot_totals() {
        let gold = InstrumentSpec::xauusd();
        let positions = vec![
            Position::new(GridSide::Long, 3710.0, 0.01),
            Position::new(GridSide::Short, 3690.0, 0.02),
        ];
        let snap = PortfolioSnapshot::compute(&positions, 3700.0, 10_000.0, 0.0, 2000.0, &gold);

        // long: -10 × 0.01 × 100 = -10, short: -10 × 0.02 × 100 = -20
        assert!((snap.total_pnl + 30.0).abs() < 1e-9);
        assert!((snap.equity - 9_970.0).abs() < 1e-9);
        // margins: 3710×1/2000 + 3690×2/2000
        assert!((snap.total_margin - (1.855 + 3.69)).abs() < 1e-9);
        assert!((snap.free_margin - (snap.equity - snap.total_margin)).abs() < 1e-9);
        assert!(snap.margin_level.unwrap() > 100.0);
        assert!((snap.total_lots - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_empty_portfolio() {
        let snap = PortfolioSnapshot::compute(&[], 3700.0, 500.0, 100.0, 1000.0, &InstrumentSpec::xauusd());
        assert_eq!(snap.equity, 600.0);
        assert!(snap.margin_level.is_none());
    }
}
