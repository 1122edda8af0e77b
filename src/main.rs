//! Lotwise: position sizing, margin and grid-risk calculators.
//!
//! Sizes orders from a risk budget, plans martingale grids under margin and
//! buffer constraints, simulates stop-outs and parses bot-posted signals.

mod api;
mod db;
mod metrics;
mod models;
mod session;
mod signal;
mod sizing;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::PriceClient;
use crate::db::{AuthError, Database};
use crate::metrics::{parse_amounts, PerformanceCalculator};
use crate::models::{GridSide, InstrumentSpec, ParsedSignal, Position, Role};
use crate::session::{Page, Session};
use crate::signal::parse_signal;
use crate::sizing::{
    coverage_orders, loss_at_breach, margin_per_lot, max_lot, max_lot_theoretical, pips_to_points,
    pnl_usd, risk_table, simulate, value_per_pip_per_lot, value_per_point_per_lot, AtrMethod,
    CalculatorConfig, GridPlan, GridRequest, LotSizer, PortfolioSnapshot, RiskInput, RiskPreset,
    RiskRequest, SignalGridBudget, SignalSizing, SimulationParams, SizingMode, VolatilityParams,
    VolatilityReport,
};

/// Trading calculator CLI.
#[derive(Parser)]
#[command(name = "lotwise")]
#[command(about = "Position sizing, margin and grid-risk calculators", long_about = None)]
struct Cli {
    /// Database URL for the account store
    #[arg(short, long, env = "LOTWISE_DATABASE_URL", default_value = "sqlite:./lotwise.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// JSON file overriding calculator defaults
    #[arg(short, long, env = "LOTWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Instrument preset (XAUUSD, BTCUSD)
    #[arg(short, long, default_value = "XAUUSD")]
    symbol: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List instrument presets
    Presets,

    /// Margin per lot and maximum lot for a balance
    Margin {
        #[arg(short, long)]
        balance: f64,

        /// Reference price (fetched when omitted)
        #[arg(short, long)]
        price: Option<f64>,

        #[arg(long)]
        leverage: Option<f64>,

        /// Share of free margin to keep in reserve (0.0 to 0.9)
        #[arg(long)]
        buffer: Option<f64>,
    },

    /// Lot size from a risk budget and stop distance
    Lot {
        #[arg(short, long)]
        balance: f64,

        /// Risk in percent of balance (or dollars with --amount)
        #[arg(short, long, default_value = "1")]
        risk: f64,

        /// Treat --risk as a dollar amount
        #[arg(long)]
        amount: bool,

        /// Stop distance in points (or pips with --pips)
        #[arg(short = 'D', long)]
        distance: f64,

        #[arg(long)]
        pips: bool,

        /// Reference price for the leverage cap (fetched when omitted)
        #[arg(short, long)]
        price: Option<f64>,

        #[arg(long)]
        leverage: Option<f64>,

        /// safe (risk budget) or all-in (whole balance)
        #[arg(long, default_value = "safe")]
        mode: String,
    },

    /// Lots for a fixed risk across standard stop distances
    Stops {
        #[arg(short, long)]
        balance: f64,

        #[arg(short, long, default_value = "1")]
        risk: f64,

        #[arg(long)]
        amount: bool,

        /// Extra stop distance in points
        #[arg(long)]
        custom: Option<u32>,

        #[arg(short, long)]
        price: Option<f64>,

        #[arg(long)]
        leverage: Option<f64>,
    },

    /// Grid order table with margin and buffer limits
    Grid {
        /// Starting price
        #[arg(short, long)]
        price: f64,

        /// LONG or SHORT
        #[arg(long, default_value = "LONG")]
        side: GridSide,

        #[arg(short, long)]
        balance: f64,

        /// Lot per order
        #[arg(long, default_value = "0.01")]
        lot: f64,

        /// Spacing between orders in points
        #[arg(long)]
        spacing: Option<f64>,

        /// Adverse move the filled grid must survive, in points
        #[arg(long)]
        buffer: Option<f64>,

        /// Number of orders (defaults to coverage / spacing + 1)
        #[arg(short, long)]
        orders: Option<usize>,

        /// Points the grid should cover
        #[arg(long)]
        coverage: Option<f64>,

        /// Take-profit per order in points (defaults to spacing)
        #[arg(long)]
        tp: Option<f64>,

        /// Liquidation price for the cost-at-liquidation columns
        #[arg(long)]
        liq: Option<f64>,

        #[arg(long)]
        leverage: Option<f64>,

        /// Risk preset (low, medium, high) applied to --mean / --sd
        #[arg(long, requires_all = ["mean", "sd"])]
        preset: Option<String>,

        /// Mean candle range in points
        #[arg(long)]
        mean: Option<f64>,

        /// Standard deviation of candle range in points
        #[arg(long)]
        sd: Option<f64>,
    },

    /// Walk price against a grid until stop-out or the buffer is covered
    Simulate {
        #[arg(short, long)]
        price: f64,

        #[arg(long, default_value = "LONG")]
        side: GridSide,

        #[arg(short, long)]
        balance: f64,

        #[arg(long, default_value = "0.01")]
        lot: f64,

        #[arg(long)]
        spacing: Option<f64>,

        #[arg(long)]
        buffer: Option<f64>,

        #[arg(long)]
        leverage: Option<f64>,

        /// Stop-out margin level in percent
        #[arg(long)]
        stop_out: Option<f64>,

        /// Price increment per step in points
        #[arg(long)]
        granularity: Option<f64>,

        /// Print every curve point
        #[arg(long)]
        curve: bool,
    },

    /// Parse a signal and size it
    Signal {
        /// Signal text
        text: Option<String>,

        /// Read the signal from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(short, long)]
        balance: f64,

        #[arg(short, long, default_value = "1")]
        risk: f64,

        #[arg(long)]
        amount: bool,
    },

    /// Split a signal's risk into an evenly spaced grid between entry and stop
    SignalPlan {
        text: Option<String>,

        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(short, long)]
        balance: f64,

        #[arg(short, long, default_value = "1")]
        risk: f64,

        #[arg(long)]
        amount: bool,

        /// Number of orders (must divide the total lot evenly)
        #[arg(short, long)]
        orders: Option<u64>,
    },

    /// Candle statistics and spacing/coverage suggestions from an OHLC CSV
    Volatility {
        file: PathBuf,

        #[arg(long, default_value = "14")]
        window: usize,

        /// SMA, EMA or RMA
        #[arg(long, default_value = "RMA")]
        method: String,

        /// ATR multiple for spacing
        #[arg(long, default_value = "0.4")]
        multiplier: f64,

        /// Round spacing to this many points
        #[arg(long, default_value = "50")]
        round: f64,

        /// Coverage = mean + k·SD
        #[arg(short, long, default_value = "2.5")]
        k: f64,
    },

    /// Mark open orders to market
    Portfolio {
        /// Current price
        #[arg(short, long)]
        price: f64,

        #[arg(short, long)]
        balance: f64,

        #[arg(long, default_value = "0")]
        credit: f64,

        #[arg(long)]
        leverage: Option<f64>,

        /// Orders as "BUY 3700 0.01"
        #[arg(required = true)]
        orders: Vec<String>,
    },

    /// Compound a series of trade results
    Performance {
        /// Results separated by commas or spaces, e.g. "1, -1, 20, -2"
        amounts: String,

        /// Starting capital
        #[arg(short, long, default_value = "100")]
        base: Decimal,

        /// Target return in percent of the base
        #[arg(short, long)]
        target: Option<Decimal>,
    },

    /// Fetch a reference price
    Price,

    /// Manage accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create an account
    Create {
        username: String,
        password: String,

        /// user or admin
        #[arg(long, default_value = "user")]
        role: String,

        /// Expire the account after this many days
        #[arg(long)]
        expiry_days: Option<i64>,
    },

    /// List accounts
    List,

    /// Delete an account
    Delete { username: String },

    /// Change a password
    Passwd { username: String, password: String },

    /// Set or clear the expiry date
    Expiry {
        username: String,

        /// YYYY-MM-DD or RFC 3339
        #[arg(long, conflicts_with = "clear")]
        date: Option<String>,

        #[arg(long)]
        clear: bool,
    },

    /// Set expiry to N months from now
    Extend {
        username: String,

        #[arg(short, long, default_value = "1")]
        months: u32,
    },

    /// Check credentials and show accessible pages
    Login { username: String, password: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => CalculatorConfig::load(path)?,
        None => CalculatorConfig::default(),
    };
    let spec = InstrumentSpec::preset(&cli.symbol)?;

    match cli.command {
        Commands::Presets => {
            for preset in InstrumentSpec::presets() {
                println!("{}", preset);
                println!(
                    "  $/point/lot: {:.2}  $/pip/lot: {:.2}",
                    value_per_point_per_lot(&preset),
                    value_per_pip_per_lot(&preset)
                );
            }
        }

        Commands::Margin {
            balance,
            price,
            leverage,
            buffer,
        } => {
            let leverage = leverage.unwrap_or(config.leverage);
            let buffer = buffer.unwrap_or(config.buffer_fraction);
            let Some(price) = resolve_price(price, &spec).await else {
                bail!("No price available, pass --price");
            };

            println!("\n{:=^60}", format!(" {} MARGIN ", spec.name));
            println!("Price:            {:.*}", spec.price_decimals(), price);
            println!("Leverage:         1:{:.0}", leverage);
            println!("$/point/lot:      ${:.2}", value_per_point_per_lot(&spec));
            println!("$/pip/lot:        ${:.2}", value_per_pip_per_lot(&spec));
            println!("Margin per lot:   ${:.2}", margin_per_lot(price, leverage, &spec));
            println!(
                "MaxLot (theory):  {:.2}",
                max_lot_theoretical(balance, price, leverage, &spec)
            );
            println!(
                "MaxLot (buffer {:.0}%): {:.2}",
                buffer * 100.0,
                max_lot(balance, price, leverage, &spec, buffer)
            );
        }

        Commands::Lot {
            balance,
            risk,
            amount,
            distance,
            pips,
            price,
            leverage,
            mode,
        } => {
            let distance = if pips { pips_to_points(distance, &spec) } else { distance };
            let price = resolve_price(price, &spec).await.unwrap_or(0.0);
            if price <= 0.0 {
                warn!("No reference price, leverage cap not applied");
            }

            let sizer = LotSizer::new(spec.clone());
            let result = sizer.size(&RiskRequest {
                balance,
                leverage: leverage.unwrap_or(config.leverage),
                price,
                risk: risk_input(risk, amount),
                distance_points: distance,
                mode: SizingMode::from_str(&mode),
            });
            println!("\n{:=^60}", format!(" {} LOT SIZE ", sizer.spec().name));
            println!("{}", result);
        }

        Commands::Stops {
            balance,
            risk,
            amount,
            custom,
            price,
            leverage,
        } => {
            let leverage = leverage.unwrap_or(config.leverage);
            let price = resolve_price(price, &spec).await.unwrap_or(0.0);
            let (risk_amount, risk_pct) =
                sizing::loss_to_amount_and_percent(balance, risk_input(risk, amount));
            let cap = max_lot_theoretical(balance, price, leverage, &spec);

            let sizer = LotSizer::new(spec.clone());
            let rows = sizer.stop_table(risk_amount, &config.standard_stops, custom, cap);

            println!(
                "\nRisk ${:.2} ({:.2}%)  MaxLot {:.2}",
                risk_amount, risk_pct, cap
            );
            println!("{:>10} {:>12} {:>12}", "STOP (pts)", "LOT", "LOSS $");
            println!("{}", "-".repeat(38));
            for row in rows {
                let flag = if row.exceeds_max { "  > MaxLot" } else { "" };
                let loss = pnl_usd(row.lots, f64::from(row.points), &spec);
                println!("{:>10} {:>12.2} {:>12.2}{}", row.points, row.lots, loss, flag);
            }
        }

        Commands::Grid {
            price,
            side,
            balance,
            lot,
            spacing,
            buffer,
            orders,
            coverage,
            tp,
            liq,
            leverage,
            preset,
            mean,
            sd,
        } => {
            let mut spacing = spacing.unwrap_or(config.grid_step_points);
            let mut coverage = coverage;
            if let (Some(name), Some(mean), Some(sd)) = (preset, mean, sd) {
                let preset = RiskPreset::from_str(&name)
                    .with_context(|| format!("Unknown risk preset '{}'", name))?;
                let (s, c) = preset.suggest(mean, sd);
                info!(spacing = s, coverage = c, "Applied risk preset");
                spacing = s;
                coverage = coverage.or(Some(c));
            }
            let buffer = buffer.unwrap_or(config.grid_buffer_points);
            let orders = orders.unwrap_or_else(|| {
                coverage_orders(coverage.unwrap_or(buffer), spacing, config.max_grid_rows)
            });

            let plan = GridPlan::build(
                &GridRequest {
                    start_price: price,
                    side,
                    spacing_points: spacing,
                    lots: lot,
                    orders,
                    leverage: leverage.unwrap_or(config.leverage),
                    tp_points: Some(tp.unwrap_or(spacing)),
                    liquidation_price: liq,
                },
                &spec,
            );
            if plan.is_empty() {
                bail!("Grid has no orders; check --spacing and --orders");
            }
            let rec = plan.recommend(balance, buffer, config.buffer_warning_ratio, &spec);
            let margin_idx = rec.by_margin.as_ref().map(|l| l.orders - 1);
            let buffer_idx = rec.by_buffer.as_ref().map(|l| l.orders - 1);
            let liq_idx = plan.liquidation_limit_index(balance);
            let decimals = spec.price_decimals();

            println!(
                "\n{:>4} {:>12} {:>12} {:>12} {:>12} {:>14}{}",
                "#",
                "PRICE",
                "TP",
                "COST",
                "MARGIN",
                "CUM MARGIN",
                if liq.is_some() { "   CUM MARGIN@LIQ" } else { "" }
            );
            println!("{}", "-".repeat(if liq.is_some() { 88 } else { 70 }));
            for (i, row) in plan.rows.iter().enumerate() {
                let mut marks = String::new();
                if margin_idx == Some(i) {
                    marks.push_str(" <M");
                }
                if buffer_idx == Some(i) {
                    marks.push_str(" <B");
                }
                if liq_idx == Some(i) {
                    marks.push_str(" <L");
                }
                let liq_col = row
                    .liq_cum_margin
                    .map(|v| format!(" {:>17.2}", v))
                    .unwrap_or_default();
                println!(
                    "{:>4} {:>12.*} {:>12.*} {:>12.2} {:>12.2} {:>14.2}{}{}",
                    row.index,
                    decimals,
                    row.entry_price,
                    decimals,
                    row.take_profit.unwrap_or(0.0),
                    row.cost,
                    row.margin,
                    row.cum_margin,
                    liq_col,
                    marks
                );
            }
            println!("\n{} orders planned", plan.len());
            println!("{}", rec);
            if let Some(limit) = &rec.by_buffer {
                let vpp = value_per_point_per_lot(&spec);
                println!(
                    "Loss with {} orders after a {:.0} pt run: ${:.2}",
                    limit.orders,
                    buffer,
                    loss_at_breach(limit.orders as u64, lot, vpp, buffer, spacing)
                );
            }
        }

        Commands::Simulate {
            price,
            side,
            balance,
            lot,
            spacing,
            buffer,
            leverage,
            stop_out,
            granularity,
            curve,
        } => {
            let params = SimulationParams {
                balance,
                leverage: leverage.unwrap_or(config.leverage),
                current_price: price,
                side,
                step_points: spacing.unwrap_or(config.grid_step_points),
                buffer_points: buffer.unwrap_or(config.grid_buffer_points),
                lots: lot,
                stop_out_pct: stop_out.unwrap_or(config.stop_out_pct),
                granularity_points: granularity.unwrap_or(config.simulation_granularity_points),
            };
            let report = simulate(&params, &spec);

            if curve {
                println!(
                    "\n{:>12} {:>6} {:>14} {:>14} {:>12}",
                    "PRICE", "OPEN", "EQUITY", "USED MARGIN", "LEVEL %"
                );
                for p in &report.curve {
                    let level = p
                        .margin_level
                        .map(|l| format!("{:.2}", l))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:>12.2} {:>6} {:>14.2} {:>14.2} {:>12}",
                        p.price, p.open_positions, p.equity, p.used_margin, level
                    );
                }
            }
            if !report.liquidations.is_empty() {
                println!("\n{:>12} {:>12} {:>12} {:>14}", "PRICE", "CUT ENTRY", "P/L", "EQUITY AFTER");
                for l in &report.liquidations {
                    println!(
                        "{:>12.2} {:>12.2} {:>12.2} {:>14.2}",
                        l.price, l.cut_entry, l.realized_pnl, l.equity_after
                    );
                }
            }
            println!("\n{}", report);
        }

        Commands::Signal {
            text,
            file,
            balance,
            risk,
            amount,
        } => {
            let parsed = parse_signal(&read_signal_text(text, file)?);
            if parsed.is_empty() {
                bail!("Nothing recognizable in the signal text");
            }
            println!("\n{}", parsed);
            let spec = signal_spec(&parsed, spec);

            let (risk_amount, _) = sizing::loss_to_amount_and_percent(balance, risk_input(risk, amount));
            match SignalSizing::compute(&parsed, risk_amount, &spec) {
                Some(s) => {
                    println!(
                        "\nRisk ${:.2}  Distance {:.0} pts  Lot {:.2}  P/L @SL ${:.2}",
                        s.risk_amount, s.distance_points, s.lots, s.pnl_at_stop
                    );
                    for tp in &s.take_profits {
                        println!(
                            "  TP{} {:.2}  {:>8.0} pts  ${:.2}",
                            tp.index, tp.price, tp.distance_points, tp.pnl
                        );
                    }
                }
                None => warn!("Signal needs both entry and stop-loss to size a trade"),
            }

            let rows = risk_table(&parsed, balance, &config.risk_set, &spec);
            print!("\n{:>8} {:>10} {:>8}", "RISK %", "RISK $", "LOT");
            for i in 0..parsed.take_profits.len() {
                print!(" {:>10}", format!("TP{}", i + 1));
            }
            println!();
            for row in rows {
                print!("{:>8.0} {:>10.2} {:>8.2}", row.risk_percent, row.risk_amount, row.lots);
                for pnl in row.tp_pnls {
                    print!(" {:>10.2}", pnl);
                }
                println!();
            }
        }

        Commands::SignalPlan {
            text,
            file,
            balance,
            risk,
            amount,
            orders,
        } => {
            let parsed = parse_signal(&read_signal_text(text, file)?);
            println!("\n{}", parsed);
            if !parsed.is_actionable() {
                bail!("Signal is missing entry, stop-loss or direction");
            }
            let spec = signal_spec(&parsed, spec);

            let (risk_amount, _) = sizing::loss_to_amount_and_percent(balance, risk_input(risk, amount));
            let Some(budget) = SignalGridBudget::compute(&parsed, risk_amount, &spec) else {
                bail!("Risk budget does not produce a tradable lot");
            };
            if budget.min_lot_fallback {
                warn!("Even one minimum lot exceeds the risk; using a single minimum lot");
            }
            println!(
                "\nTotal Lot {:.2}  Distance {:.0} pts  Lot step {:.2}",
                budget.total_lot, budget.distance_points, budget.lot_step
            );
            println!("Order counts: {:?}", budget.order_options);

            let orders = orders.unwrap_or(1);
            match budget.plan(orders, &parsed.take_profits, &spec) {
                Some(plan) => println!("\n{}", plan),
                None => bail!(
                    "{} orders do not divide the total lot; choose one of {:?}",
                    orders,
                    budget.order_options
                ),
            }
        }

        Commands::Volatility {
            file,
            window,
            method,
            multiplier,
            round,
            k,
        } => {
            let bars = sizing::load_bars(&file)?;
            let params = VolatilityParams {
                window,
                method: AtrMethod::from_str(&method),
                atr_multiplier: multiplier,
                round_step: round,
                coverage_k: k,
            };
            let Some(report) = VolatilityReport::compute(&bars, spec.price_point, &params) else {
                bail!("No bars in {}", file.display());
            };
            println!("\n{}", report);

            println!("\n{:<8} {:>12} {:>12}", "PRESET", "SPACING", "COVERAGE");
            for (name, preset) in [
                ("Low", RiskPreset::Low),
                ("Medium", RiskPreset::Medium),
                ("High", RiskPreset::High),
            ] {
                let (s, c) = preset.suggest(report.mean_range_points, report.sd_range_points);
                println!("{:<8} {:>12.0} {:>12.0}", name, s, c);
            }
        }

        Commands::Portfolio {
            price,
            balance,
            credit,
            leverage,
            orders,
        } => {
            let mut positions = Vec::with_capacity(orders.len());
            for line in &orders {
                let pos = Position::parse_line(line)
                    .with_context(|| format!("Cannot parse order '{}', expected \"BUY 3700 0.01\"", line))?;
                positions.push(pos);
            }
            let snapshot = PortfolioSnapshot::compute(
                &positions,
                price,
                balance,
                credit,
                leverage.unwrap_or(config.leverage),
                &spec,
            );
            println!("\n{}", snapshot);
        }

        Commands::Performance {
            amounts,
            base,
            target,
        } => {
            let deltas = parse_amounts(&amounts);
            if deltas.is_empty() || base <= Decimal::ZERO {
                bail!("Enter at least one result and a positive base");
            }
            let report = PerformanceCalculator::calculate(base, &deltas);
            println!("\n{}", report);

            let target = target.unwrap_or(dec!(2));
            println!(
                "Profit needed for {}% of ${}: ${:.2}",
                target,
                base,
                PerformanceCalculator::target_profit(base, target)
            );
        }

        Commands::Price => {
            let client = PriceClient::new()?;
            let price = client.fetch_reference_price(&spec.name).await?;
            println!("{} ≈ {:.*}", spec.name, spec.price_decimals(), price);
        }

        Commands::User { command } => {
            let db = Database::new(&cli.database).await?;
            run_user_command(&db, command).await?;
        }
    }

    Ok(())
}

async fn run_user_command(db: &Database, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Create {
            username,
            password,
            role,
            expiry_days,
        } => {
            let role = Role::from_str(&role);
            let expiry = expiry_days.map(expiry_after_days).transpose()?;
            if db.needs_initial_admin().await? && role != Role::Admin {
                warn!("No accounts exist yet; the first account should be an admin");
            }
            if db.create_user(&username, &password, role, expiry).await? {
                println!("Created {} ({})", username, role);
            } else {
                bail!("Could not create '{}': blank input or username taken", username);
            }
        }

        UserCommands::List => {
            let users = db.list_users().await?;
            println!(
                "\n{:>4} {:<20} {:<6} {:<20} {:<20}",
                "ID", "USERNAME", "ROLE", "CREATED", "EXPIRES"
            );
            println!("{}", "-".repeat(74));
            for u in users {
                println!(
                    "{:>4} {:<20} {:<6} {:<20} {:<20}",
                    u.id,
                    truncate(&u.username, 20),
                    u.role.as_str(),
                    u.created_at.format("%Y-%m-%d %H:%M"),
                    u.expiry_at
                        .map(|e| e.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }

        UserCommands::Delete { username } => {
            if !db.delete_user(&username).await? {
                bail!("No user named '{}'", username);
            }
            println!("Deleted {}", username);
        }

        UserCommands::Passwd { username, password } => {
            if !db.change_password(&username, &password).await? {
                bail!("Password not changed: unknown user or empty password");
            }
            println!("Password updated for {}", username);
        }

        UserCommands::Expiry {
            username,
            date,
            clear,
        } => {
            let expiry = match (date, clear) {
                (_, true) => None,
                (Some(d), false) => Some(parse_date(&d)?),
                (None, false) => bail!("Pass --date or --clear"),
            };
            if !db.update_expiry(&username, expiry).await? {
                bail!("No user named '{}'", username);
            }
            match expiry {
                Some(e) => println!("{} expires {}", username, e.format("%Y-%m-%d %H:%M")),
                None => println!("{} no longer expires", username),
            }
        }

        UserCommands::Extend { username, months } => match db.extend_expiry(&username, months).await? {
            Some(e) => println!("{} expires {}", username, e.format("%Y-%m-%d %H:%M")),
            None => bail!("No user named '{}'", username),
        },

        UserCommands::Login { username, password } => {
            let user = match db.verify_login(&username, &password).await {
                Ok(user) => user,
                Err(AuthError::Expired) => bail!("Account expired"),
                Err(AuthError::Invalid) => bail!("Invalid username or password"),
                Err(AuthError::Storage(e)) => return Err(e).context("Account store unavailable"),
            };

            let mut session = Session::new();
            session.login(user);
            if let (Some(u), Some(at)) = (session.current_user(), session.logged_in_at()) {
                let badge = if u.is_admin() { " [admin]" } else { "" };
                println!("Logged in as {}{} at {}", u.username, badge, at.format("%Y-%m-%d %H:%M:%S"));
            }
            for page in [
                Page::Home,
                Page::Knowledge,
                Page::SizingOnly,
                Page::MoneyManagement,
                Page::GridPlanner,
                Page::Portfolio,
                Page::Users,
            ] {
                let access = if session.can_access(page) { "yes" } else { "no" };
                println!("  {:<16} {}", format!("{:?}", page), access);
            }
            session.logout();
        }
    }
    Ok(())
}

fn risk_input(value: f64, amount: bool) -> RiskInput {
    if amount {
        RiskInput::Amount(value)
    } else {
        RiskInput::Percent(value)
    }
}

/// Use the given price, or try to fetch one.
async fn resolve_price(price: Option<f64>, spec: &InstrumentSpec) -> Option<f64> {
    if price.is_some() {
        return price;
    }
    match PriceClient::new() {
        Ok(client) => client.try_reference_price(&spec.name).await,
        Err(e) => {
            warn!(error = %e, "Price client unavailable");
            None
        }
    }
}

fn read_signal_text(text: Option<String>, file: Option<PathBuf>) -> Result<String> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read signal file {}", path.display())),
        (None, None) => bail!("Pass the signal text or --file"),
    }
}

/// Instrument named by the signal, falling back to the CLI symbol.
fn signal_spec(parsed: &ParsedSignal, fallback: InstrumentSpec) -> InstrumentSpec {
    parsed
        .symbol
        .as_deref()
        .and_then(|s| InstrumentSpec::preset(s).ok())
        .unwrap_or(fallback)
}

/// Now plus `days`, refusing offsets chrono cannot represent.
fn expiry_after_days(days: i64) -> Result<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|d| Utc::now().checked_add_signed(d))
        .with_context(|| format!("Expiry of {} days is out of range", days))
}

/// Accept `YYYY-MM-DD` (end of that day, UTC) or RFC 3339.
fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))?;
    date.and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc())
        .context("Invalid time of day")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        let d = parse_date("2026-01-31").unwrap();
        assert_eq!(d.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-01-31 23:59:59");
        assert!(parse_date("2026-01-31T10:00:00+07:00").is_ok());
        assert!(parse_date("31/01/2026").is_err());
    }

    #[test]
    fn test_expiry_after_days() {
        let in_a_week = expiry_after_days(7).unwrap();
        assert!(in_a_week > Utc::now() + Duration::days(6));
        assert!(expiry_after_days(-1).unwrap() < Utc::now());
        assert!(expiry_after_days(i64::MAX).is_err());
        assert!(expiry_after_days(1_000_000_000).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 20), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_signal_spec_fallback() {
        let parsed = parse_signal("BTC BUY @60000 SL=59000");
        assert_eq!(signal_spec(&parsed, InstrumentSpec::xauusd()).name, "BTCUSD");
        let blank = ParsedSignal::default();
        assert_eq!(signal_spec(&blank, InstrumentSpec::xauusd()).name, "XAUUSD");
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "lotwise", "grid", "--price", "4000", "--balance", "1000", "--side", "short",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Grid { side: GridSide::Short, .. }));
    }
}
