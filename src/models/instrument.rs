//! Instrument specification: contract size, point/pip definition and lot granularity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons an instrument definition is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum SpecError {
    #[error("contract size must be positive, got {0}")]
    ContractSize(f64),

    #[error("price point must be positive, got {0}")]
    PricePoint(f64),

    #[error("pip must span at least one point")]
    PipPoints,

    #[error("lot step must be positive, got {0}")]
    LotStep(f64),

    #[error("minimum lot must be positive, got {0}")]
    MinLot(f64),

    #[error("unknown instrument: {0}")]
    Unknown(String),
}

/// Static parameters of a tradable symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Symbol name (e.g., "XAUUSD")
    pub name: String,

    /// Units per 1.0 lot (e.g., 100 oz for gold)
    pub contract_size: f64,

    /// Price change representing one point (e.g., 0.01)
    pub price_point: f64,

    /// Number of points per pip
    pub pip_points: u32,

    /// Smallest order size accepted
    pub min_lot: f64,

    /// Order size increment
    pub lot_step: f64,
}

impl InstrumentSpec {
    /// Check the invariants. `min_lot` may be smaller than `lot_step`.
    pub fn validate(&self) -> Result<(), SpecError> {
        if !(self.contract_size > 0.0) {
            return Err(SpecError::ContractSize(self.contract_size));
        }
        if !(self.price_point > 0.0) {
            return Err(SpecError::PricePoint(self.price_point));
        }
        if self.pip_points < 1 {
            return Err(SpecError::PipPoints);
        }
        if !(self.lot_step > 0.0) {
            return Err(SpecError::LotStep(self.lot_step));
        }
        if !(self.min_lot > 0.0) {
            return Err(SpecError::MinLot(self.min_lot));
        }
        Ok(())
    }

    /// Gold: 100 oz per lot, 1 point = 0.01, 1 pip = 10 points.
    pub fn xauusd() -> Self {
        Self {
            name: "XAUUSD".to_string(),
            contract_size: 100.0,
            price_point: 0.01,
            pip_points: 10,
            min_lot: 0.01,
            lot_step: 0.01,
        }
    }

    /// Bitcoin CFD: 1 coin per lot, 1 point = 1 USD.
    pub fn btcusd() -> Self {
        Self {
            name: "BTCUSD".to_string(),
            contract_size: 1.0,
            price_point: 1.0,
            pip_points: 1,
            min_lot: 0.01,
            lot_step: 0.01,
        }
    }

    /// All built-in presets.
    pub fn presets() -> Vec<Self> {
        vec![Self::xauusd(), Self::btcusd()]
    }

    /// Look up a preset by name (case-insensitive).
    pub fn preset(name: &str) -> Result<Self, SpecError> {
        let wanted = name.trim().to_uppercase();
        Self::presets()
            .into_iter()
            .find(|s| s.name == wanted)
            .ok_or(SpecError::Unknown(name.to_string()))
    }

    /// Number of decimals implied by the price point (0.01 -> 2).
    pub fn price_decimals(&self) -> usize {
        let mut decimals = 0;
        let mut step = self.price_point;
        while decimals < 10 && (step - step.round()).abs() > 1e-9 {
            step *= 10.0;
            decimals += 1;
        }
        decimals
    }
}

impl Default for InstrumentSpec {
    fn default() -> Self {
        Self::xauusd()
    }
}

impl std::fmt::Display for InstrumentSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (contract {}, 1 point = {}, 1 pip = {} points, min lot {}, step {})",
            self.name, self.contract_size, self.price_point, self.pip_points, self.min_lot, self.lot_step
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for spec in InstrumentSpec::presets() {
            assert!(spec.validate().is_ok(), "{} invalid", spec.name);
        }
    }

    #[test]
    fn test_preset_lookup_ignores_case() {
        assert_eq!(InstrumentSpec::preset("xauusd").unwrap().contract_size, 100.0);
        assert!(matches!(InstrumentSpec::preset("EURUSD"), Err(SpecError::Unknown(_))));
    }

    #[test]
    fn test_rejects_bad_specs() {
        let gold = InstrumentSpec::xauusd();
        let flat = InstrumentSpec {
            contract_size: 0.0,
            ..gold.clone()
        };
        assert_eq!(flat.validate(), Err(SpecError::ContractSize(0.0)));
        let no_pip = InstrumentSpec {
            pip_points: 0,
            ..gold.clone()
        };
        assert_eq!(no_pip.validate(), Err(SpecError::PipPoints));
        // min lot below the step is allowed
        let fine = InstrumentSpec {
            min_lot: 0.001,
            ..gold
        };
        assert!(fine.validate().is_ok());
    }

    #[test]
    fn test_price_decimals() {
        assert_eq!(InstrumentSpec::xauusd().price_decimals(), 2);
        assert_eq!(InstrumentSpec::btcusd().price_decimals(), 0);
    }
}
