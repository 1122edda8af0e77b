//! Sizing engine: margin arithmetic, risk sizing, grid planning and simulation.

mod arithmetic;
mod config;
mod grid;
mod portfolio;
mod risk;
mod signal_plan;
mod simulation;
mod volatility;

pub use arithmetic::{
    margin_per_lot, max_lot, max_lot_theoretical, pips_to_points, pnl_usd, value_per_pip_per_lot,
    value_per_point_per_lot,
};
pub use config::CalculatorConfig;
pub use grid::{coverage_orders, loss_at_breach, GridPlan, GridRequest, RiskPreset};
pub use portfolio::PortfolioSnapshot;
pub use risk::{loss_to_amount_and_percent, LotSizer, RiskInput, RiskRequest, SizingMode};
pub use signal_plan::{risk_table, SignalGridBudget, SignalSizing};
pub use simulation::{simulate, SimulationParams};
pub use volatility::{load_bars, AtrMethod, VolatilityParams, VolatilityReport};
