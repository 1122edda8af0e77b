//! Parsed trade signal.

use serde::{Deserialize, Serialize};

use super::GridSide;

/// Fields extracted from a signal message. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedSignal {
    /// Canonical preset name (e.g., "XAUUSD")
    pub symbol: Option<String>,

    pub direction: Option<GridSide>,

    pub entry: Option<f64>,

    pub stop_loss: Option<f64>,

    /// Take-profit levels in order of appearance (at most six)
    #[serde(default)]
    pub take_profits: Vec<f64>,

    /// Chart timeframe token (e.g., "M5", "H1")
    pub timeframe: Option<String>,

    /// Original message text
    #[serde(default)]
    pub raw: String,
}

impl ParsedSignal {
    /// True when entry, stop-loss and direction are all present.
    pub fn is_actionable(&self) -> bool {
        self.entry.is_some() && self.stop_loss.is_some() && self.direction.is_some()
    }

    /// True when nothing at all was recognized.
    pub fn is_empty(&self) -> bool {
        self.symbol.is_none()
            && self.direction.is_none()
            && self.entry.is_none()
            && self.stop_loss.is_none()
            && self.take_profits.is_empty()
            && self.timeframe.is_none()
    }
}

impl std::fmt::Display for ParsedSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn opt<T: std::fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map(|x| x.to_string()).unwrap_or_else(|| "-".to_string())
        }

        writeln!(f, "Symbol:     {}", opt(&self.symbol))?;
        writeln!(f, "Direction:  {}", opt(&self.direction))?;
        writeln!(f, "Timeframe:  {}", opt(&self.timeframe))?;
        writeln!(f, "Entry:      {}", opt(&self.entry))?;
        writeln!(f, "Stop Loss:  {}", opt(&self.stop_loss))?;
        if self.take_profits.is_empty() {
            writeln!(f, "TPs:        -")?;
        } else {
            for (i, tp) in self.take_profits.iter().enumerate() {
                writeln!(f, "TP{}:        {}", i + 1, tp)?;
            }
        }
        Ok(())
    }
}
