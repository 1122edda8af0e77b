//! Calculator configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Defaults shared by the sizing, grid and simulation calculators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorConfig {
    /// Leverage used when none is given
    pub leverage: f64,

    /// Fraction of free margin kept in reserve (0.0 to 0.9)
    pub buffer_fraction: f64,

    /// Adverse points a filled grid must still survive
    pub grid_buffer_points: f64,

    /// Distance between grid orders in points
    pub grid_step_points: f64,

    /// Maximum rows generated for a coverage-bounded grid
    pub max_grid_rows: usize,

    /// Broker stop-out level in percent
    pub stop_out_pct: f64,

    /// Price increment of the stop-out walk in points
    pub simulation_granularity_points: f64,

    /// Remaining buffer below this share of the requirement is flagged red
    pub buffer_warning_ratio: f64,

    /// Risk percentages listed in the risk tables
    pub risk_set: Vec<f64>,

    /// Stop distances (points) listed in the stop-to-lot table
    pub standard_stops: Vec<u32>,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            leverage: 1000.0,
            buffer_fraction: 0.0,
            grid_buffer_points: 50_000.0,
            grid_step_points: 1_000.0,
            max_grid_rows: 400,
            stop_out_pct: 30.0,
            simulation_granularity_points: 100.0,
            buffer_warning_ratio: 0.3,
            risk_set: vec![1.0, 2.0, 3.0, 4.0, 5.0, 10.0, 15.0, 20.0, 30.0, 50.0, 100.0],
            standard_stops: vec![10, 50, 100, 200, 300, 500, 1000, 1500, 2000, 5000, 10000, 20000],
        }
    }
}

impl CalculatorConfig {
    /// Load overrides from a JSON file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config.sanitized())
    }

    /// Clamp values into the ranges the calculators accept.
    pub fn sanitized(mut self) -> Self {
        self.buffer_fraction = self.buffer_fraction.clamp(0.0, 0.9);
        if self.simulation_granularity_points <= 0.0 {
            self.simulation_granularity_points = Self::default().simulation_granularity_points;
        }
        if self.max_grid_rows == 0 {
            self.max_grid_rows = Self::default().max_grid_rows;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "leverage": 500, "buffer_fraction": 2.0 }}"#).unwrap();

        let config = CalculatorConfig::load(file.path()).unwrap();
        assert_eq!(config.leverage, 500.0);
        assert_eq!(config.buffer_fraction, 0.9);
        assert_eq!(config.stop_out_pct, 30.0);
        assert_eq!(config.risk_set.len(), 11);
    }

    #[test]
    fn test_missing_file() {
        assert!(CalculatorConfig::load(Path::new("/nonexistent/lotwise.json")).is_err());
    }
}
