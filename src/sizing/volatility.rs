//! Candle-range statistics and ATR-based grid suggestions.

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use statrs::statistics::{Data, Median, Statistics};

use super::grid::round_to_step;

/// One OHLC bar; `open` is not needed.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub date: Option<String>,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// ATR smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtrMethod {
    /// Rolling mean
    Sma,
    /// Exponential, `alpha = 2 / (window + 1)`
    Ema,
    /// Wilder's smoothing, `alpha = 1 / window`
    Rma,
}

impl AtrMethod {
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SMA" => Self::Sma,
            "EMA" => Self::Ema,
            _ => Self::Rma,
        }
    }
}

/// Read bars from CSV. Needs `high`, `low` and `close` columns; the first
/// of `date`, `time`, `datetime` or `timestamp` is kept as the label.
pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();
    let col = |name: &str| headers.iter().position(|h| h == name);

    let (high, low, close) = match (col("high"), col("low"), col("close")) {
        (Some(h), Some(l), Some(c)) => (h, l, c),
        _ => bail!("CSV must contain high, low and close columns"),
    };
    let date = ["date", "time", "datetime", "timestamp"]
        .iter()
        .find_map(|name| col(name));

    let mut bars = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Bad CSV record at row {}", line + 1))?;
        let field = |idx: usize| -> Result<f64> {
            record
                .get(idx)
                .unwrap_or_default()
                .parse::<f64>()
                .with_context(|| format!("Non-numeric value at row {}", line + 1))
        };
        bars.push(Bar {
            date: date.and_then(|i| record.get(i)).map(str::to_string),
            high: field(high)?,
            low: field(low)?,
            close: field(close)?,
        });
    }
    Ok(bars)
}

pub fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    read_bars(file).with_context(|| format!("Failed to parse {}", path.display()))
}

/// High-low range of each bar in points.
pub fn range_points(bars: &[Bar], price_point: f64) -> Vec<f64> {
    bars.iter().map(|b| (b.high - b.low) / price_point).collect()
}

/// True range in points. The first bar has no previous close and uses its
/// own range.
pub fn true_range_points(bars: &[Bar], price_point: f64) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, b)| {
            let hl = (b.high - b.low).abs();
            let tr = match i.checked_sub(1).map(|p| bars[p].close) {
                Some(prev) => hl.max((b.high - prev).abs()).max((b.low - prev).abs()),
                None => hl,
            };
            tr / price_point
        })
        .collect()
}

/// Smooth true range into ATR.
pub fn atr(tr: &[f64], window: usize, method: AtrMethod) -> Vec<f64> {
    let window = window.max(1);
    match method {
        AtrMethod::Sma => (0..tr.len())
            .map(|i| {
                let from = (i + 1).saturating_sub(window);
                let slice = &tr[from..=i];
                slice.iter().sum::<f64>() / slice.len() as f64
            })
            .collect(),
        AtrMethod::Ema => ewm(tr, 2.0 / (window as f64 + 1.0)),
        AtrMethod::Rma => ewm(tr, 1.0 / window as f64),
    }
}

fn ewm(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            Some(p) => alpha * v + (1.0 - alpha) * p,
            None => v,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Tunables for [`VolatilityReport::compute`].
#[derive(Debug, Clone)]
pub struct VolatilityParams {
    pub window: usize,
    pub method: AtrMethod,
    /// ATR multiple used for spacing
    pub atr_multiplier: f64,
    /// Spacing is rounded to this many points
    pub round_step: f64,
    /// Coverage is `mean + k·SD`
    pub coverage_k: f64,
}

impl Default for VolatilityParams {
    fn default() -> Self {
        Self {
            window: 14,
            method: AtrMethod::Rma,
            atr_multiplier: 0.4,
            round_step: 50.0,
            coverage_k: 2.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityReport {
    pub bars: usize,
    pub mean_range_points: f64,
    pub sd_range_points: f64,
    pub atr_median_points: f64,
    pub last_close: Option<f64>,
    pub spacing_points: f64,
    pub coverage_points: f64,
}

impl VolatilityReport {
    /// `None` for an empty series.
    pub fn compute(bars: &[Bar], price_point: f64, params: &VolatilityParams) -> Option<Self> {
        if bars.is_empty() || price_point <= 0.0 {
            return None;
        }
        let ranges = range_points(bars, price_point);
        let atr_values = atr(&true_range_points(bars, price_point), params.window, params.method);

        let mean = ranges.iter().mean();
        let sd = if ranges.len() > 1 { ranges.iter().std_dev() } else { 0.0 };
        let atr_median = Data::new(atr_values).median();

        let spacing = round_to_step(atr_median * params.atr_multiplier, params.round_step).max(50.0);
        let coverage = round_to_step(mean + params.coverage_k * sd, 500.0).max(1000.0);

        Some(Self {
            bars: bars.len(),
            mean_range_points: mean,
            sd_range_points: sd,
            atr_median_points: atr_median,
            last_close: bars.last().map(|b| b.close),
            spacing_points: spacing,
            coverage_points: coverage,
        })
    }
}

impl std::fmt::Display for VolatilityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:=^60}", " VOLATILITY ")?;
        writeln!(f, "Bars:              {}", self.bars)?;
        writeln!(f, "Mean range:        {:.0} pts", self.mean_range_points)?;
        writeln!(f, "SD range:          {:.0} pts", self.sd_range_points)?;
        writeln!(f, "ATR median:        {:.0} pts", self.atr_median_points)?;
        if let Some(close) = self.last_close {
            writeln!(f, "Last close:        {:.2}", close)?;
        }
        writeln!(f, "Suggested spacing: {:.0} pts", self.spacing_points)?;
        writeln!(f, "Suggested cover:   {:.0} pts", self.coverage_points)?;
        write!(f, "{}", "=".repeat(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "Date,Open,High,Low,Close\n\
        2025-01-01,2600,2610,2590,2605\n\
        2025-01-02,2605,2630,2600,2625\n\
        2025-01-03,2625,2640,2580,2590\n\
        2025-01-06,2590,2600,2570,2575\n";

    fn bars() -> Vec<Bar> {
        read_bars(CSV.as_bytes()).unwrap()
    }

    #[test]
    fn test_read_bars() {
        let bars = bars();
        assert_eq!(bars.len(), 4);
        assert_eq!(bars[0].date.as_deref(), Some("2025-01-01"));
        assert_eq!(bars[2].low, 2580.0);
    }

    #[test]
    fn test_missing_columns() {
        assert!(read_bars("date,open,close\n1,2,3\n".as_bytes()).is_err());
        assert!(read_bars("high,low,close\nx,1,2\n".as_bytes()).is_err());
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let tr = true_range_points(&bars(), 0.01);
        assert!((tr[0] - 2000.0).abs() < 1e-6);
        // bar 4: h-l = 30, |2600-2590| = 10, |2570-2590| = 20
        assert!((tr[3] - 3000.0).abs() < 1e-6);
        // bar 2: h-l = 30, |2630-2605| = 25
        assert!((tr[1] - 3000.0).abs() < 1e-6);
    }

    #[test]
    fn test_atr_methods() {
        let tr = [10.0, 20.0, 30.0];
        let sma = atr(&tr, 2, AtrMethod::Sma);
        assert_eq!(sma, vec![10.0, 15.0, 25.0]);

        let rma = atr(&tr, 2, AtrMethod::Rma);
        assert_eq!(rma, vec![10.0, 15.0, 22.5]);

        let ema = atr(&tr, 3, AtrMethod::Ema);
        assert_eq!(ema, vec![10.0, 15.0, 22.5]);
    }

    #[test]
    fn test_report() {
        let report = VolatilityReport::compute(&bars(), 0.01, &VolatilityParams::default()).unwrap();
        // ranges 2000, 3000, 6000, 3000
        assert!((report.mean_range_points - 3500.0).abs() < 1e-6);
        assert!(report.sd_range_points > 0.0);
        assert!(report.spacing_points >= 50.0);
        assert_eq!(report.spacing_points % 50.0, 0.0);
        assert!(report.coverage_points >= 1000.0);
        assert_eq!(report.coverage_points % 500.0, 0.0);
        assert_eq!(report.last_close, Some(2575.0));

        assert!(VolatilityReport::compute(&[], 0.01, &VolatilityParams::default()).is_none());
    }
}
