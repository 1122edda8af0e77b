//! Direction of a grid or signal.

use serde::{Deserialize, Serialize};

/// Trade direction. A long grid adds orders as price falls, a short grid as it rises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GridSide {
    Long,
    Short,
}

impl GridSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridSide::Long => "LONG",
            GridSide::Short => "SHORT",
        }
    }

    /// Parse `LONG`/`BUY`/`SHORT`/`SELL` in any case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "LONG" | "BUY" => Some(GridSide::Long),
            "SHORT" | "SELL" => Some(GridSide::Short),
            _ => None,
        }
    }

    /// Sign of an adverse price move: long loses as price falls.
    pub fn adverse_sign(&self) -> f64 {
        match self {
            GridSide::Long => -1.0,
            GridSide::Short => 1.0,
        }
    }

    /// Sign applied to a price difference to get profit.
    pub fn profit_sign(&self) -> f64 {
        -self.adverse_sign()
    }
}

impl std::fmt::Display for GridSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GridSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown direction '{}' (expected LONG or SHORT)", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(GridSide::parse("buy"), Some(GridSide::Long));
        assert_eq!(GridSide::parse("SELL"), Some(GridSide::Short));
        assert_eq!(GridSide::parse(" short "), Some(GridSide::Short));
        assert_eq!(GridSide::parse("flat"), None);
    }

    #[test]
    fn test_signs() {
        assert_eq!(GridSide::Long.adverse_sign(), -1.0);
        assert_eq!(GridSide::Short.profit_sign(), -1.0);
    }
}
