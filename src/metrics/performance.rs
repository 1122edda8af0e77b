//! Compounding P/L chain: each result as a share of the equity it was made on.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// One result in the chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRow {
    pub index: usize,
    pub amount: Decimal,
    pub equity_before: Decimal,
    pub equity_after: Decimal,
    /// Amount as a percentage of `equity_before`
    pub pct_of_equity: f64,
    pub cumulative_profit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub base: Decimal,
    pub rows: Vec<PerformanceRow>,
    pub total_profit: Decimal,
    pub final_equity: Decimal,
    /// Total profit as a percentage of the starting capital
    pub total_pct_of_base: f64,
}

/// Calculator for a sequence of trade results.
pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Chain `deltas` over a starting capital of `base`.
    pub fn calculate(base: Decimal, deltas: &[Decimal]) -> PerformanceReport {
        let mut equity = base;
        let mut cumulative = Decimal::ZERO;
        let mut rows = Vec::with_capacity(deltas.len());

        for (i, &delta) in deltas.iter().enumerate() {
            let pct = percent_of(delta, equity);
            let before = equity;
            equity += delta;
            cumulative += delta;
            rows.push(PerformanceRow {
                index: i + 1,
                amount: delta,
                equity_before: before,
                equity_after: equity,
                pct_of_equity: pct,
                cumulative_profit: cumulative,
            });
        }

        PerformanceReport {
            base,
            rows,
            total_profit: cumulative,
            final_equity: equity,
            total_pct_of_base: percent_of(cumulative, base),
        }
    }

    /// Profit needed to make `target_pct` percent on `base`.
    pub fn target_profit(base: Decimal, target_pct: Decimal) -> Decimal {
        target_pct / Decimal::ONE_HUNDRED * base
    }
}

fn percent_of(part: Decimal, whole: Decimal) -> f64 {
    if whole.is_zero() {
        return 0.0;
    }
    (part / whole * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0)
}

/// Parse a comma or whitespace separated list, skipping tokens that are not numbers.
pub fn parse_amounts(raw: &str) -> Vec<Decimal> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter_map(|t| Decimal::from_str(t).ok())
        .collect()
}

impl std::fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:=^60}", " PERFORMANCE ")?;
        writeln!(
            f,
            "{:>4} {:>12} {:>16} {:>12} {:>12}",
            "#", "Amount", "Equity before", "% equity", "Cum profit"
        )?;
        for r in &self.rows {
            writeln!(
                f,
                "{:>4} {:>12.2} {:>16.2} {:>11.2}% {:>12.2}",
                r.index, r.amount, r.equity_before, r.pct_of_equity, r.cumulative_profit
            )?;
        }
        writeln!(f, "{}", "-".repeat(60))?;
        writeln!(
            f,
            "Total profit: ${:.2} = {:.2}% of starting capital ${:.2}",
            self.total_profit, self.total_pct_of_base, self.base
        )?;
        write!(f, "{}", "=".repeat(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_chain() {
        let report =
            PerformanceCalculator::calculate(dec!(100), &[dec!(1), dec!(-1), dec!(20), dec!(-2)]);

        assert_eq!(report.rows.len(), 4);
        assert_eq!(report.rows[0].pct_of_equity, 1.0);
        assert_eq!(report.rows[1].equity_before, dec!(101));
        assert_eq!(report.rows[2].equity_before, dec!(100));
        assert_eq!(report.rows[2].pct_of_equity, 20.0);
        assert_eq!(report.rows[3].equity_before, dec!(120));
        assert_eq!(report.total_profit, dec!(18));
        assert_eq!(report.final_equity, dec!(118));
        assert_eq!(report.total_pct_of_base, 18.0);
    }

    #[test]
    fn test_zero_equity_gives_zero_percent() {
        let report = PerformanceCalculator::calculate(dec!(10), &[dec!(-10), dec!(5)]);
        assert_eq!(report.rows[1].equity_before, Decimal::ZERO);
        assert_eq!(report.rows[1].pct_of_equity, 0.0);
    }

    #[test]
    fn test_target_profit() {
        assert_eq!(PerformanceCalculator::target_profit(dec!(100), dec!(2)), dec!(2));
        assert_eq!(PerformanceCalculator::target_profit(dec!(2500), dec!(1.5)), dec!(37.5));
    }

    #[test]
    fn test_parse_amounts() {
        assert_eq!(parse_amounts("1, -1, 20, -2"), vec![dec!(1), dec!(-1), dec!(20), dec!(-2)]);
        assert_eq!(parse_amounts("5 abc\n-2.5,,"), vec![dec!(5), dec!(-2.5)]);
        assert!(parse_amounts("").is_empty());
    }
}
