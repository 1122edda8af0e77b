//! Position model: a filled order held in the account.

use serde::{Deserialize, Serialize};

use super::GridSide;

/// An open order at a fixed entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Trade direction
    pub side: GridSide,

    /// Entry price
    pub entry_price: f64,

    /// Order size in lots
    pub lots: f64,
}

impl Position {
    pub fn new(side: GridSide, entry_price: f64, lots: f64) -> Self {
        Self {
            side,
            entry_price,
            lots,
        }
    }

    /// Favourable price difference: positive when the position is in profit.
    pub fn price_diff(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) * self.side.profit_sign()
    }

    /// Floating P/L in USD.
    pub fn pnl_at(&self, current_price: f64, contract_size: f64) -> f64 {
        self.price_diff(current_price) * self.lots * contract_size
    }

    /// Notional value at entry.
    pub fn cost(&self, contract_size: f64) -> f64 {
        self.entry_price * self.lots * contract_size
    }

    /// Margin held for the position, zero without leverage.
    pub fn margin(&self, contract_size: f64, leverage: f64) -> f64 {
        if leverage <= 0.0 {
            return 0.0;
        }
        self.cost(contract_size) / leverage
    }

    /// Parse `BUY 3700 0.01` style lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.split(|c: char| c.is_whitespace() || c == ',').filter(|p| !p.is_empty());
        let side = GridSide::parse(parts.next()?)?;
        let entry_price = parts.next()?.parse().ok()?;
        let lots = parts.next()?.parse().ok()?;
        Some(Self::new(side, entry_price, lots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pnl_long() {
        let pos = Position::new(GridSide::Long, 3700.0, 0.01);
        // 10 USD move on 1 oz
        assert!((pos.pnl_at(3710.0, 100.0) - 10.0).abs() < 1e-9);
        assert!((pos.pnl_at(3690.0, 100.0) + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_pnl_short() {
        let pos = Position::new(GridSide::Short, 3700.0, 0.02);
        assert!((pos.pnl_at(3690.0, 100.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_margin() {
        let pos = Position::new(GridSide::Long, 4000.0, 0.01);
        assert!((pos.margin(100.0, 1000.0) - 4.0).abs() < 1e-9);
        assert_eq!(pos.margin(100.0, 0.0), 0.0);
    }

    #[test]
    fn test_parse_line() {
        let pos = Position::parse_line("sell, 3705.5, 0.03").unwrap();
        assert_eq!(pos.side, GridSide::Short);
        assert_eq!(pos.entry_price, 3705.5);
        assert_eq!(pos.lots, 0.03);
        assert!(Position::parse_line("HOLD 1 1").is_none());
    }
}
