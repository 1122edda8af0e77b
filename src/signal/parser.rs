//! Best-effort parser for bot-posted trade signals.
//!
//! Expected shape:
//!
//! ```text
//! XAUUSD.mg M5 SELL @3774.03
//! SL=3785.34
//! TP1=3771.77
//! TP2=3769.51
//! ```
//!
//! Every field is optional. Nothing here fails; callers check
//! [`ParsedSignal::is_actionable`] before sizing a trade.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::models::{GridSide, ParsedSignal};

/// Most take-profit levels kept from one signal.
pub const MAX_TAKE_PROFITS: usize = 6;

const SYMBOL_ALIASES: &[(&str, &str)] = &[
    ("XAUUSD", "XAUUSD"),
    ("XAU", "XAUUSD"),
    ("GOLD", "XAUUSD"),
    ("GOLDUSD", "XAUUSD"),
    ("BTCUSD", "BTCUSD"),
    ("BTC", "BTCUSD"),
    ("XBTUSD", "BTCUSD"),
];

lazy_static! {
    static ref SYMBOL_RE: Regex = Regex::new(r"\b([A-Z]{3,10})(?:\.MG)?\b").expect("symbol pattern");
    static ref TIMEFRAME_RE: Regex = Regex::new(r"\b([MHDW]\d+)\b").expect("timeframe pattern");
    static ref DIRECTION_RE: Regex = Regex::new(r"\b(BUY|LONG|SELL|SHORT)\b").expect("direction pattern");
    static ref ENTRY_RE: Regex = Regex::new(r"@\s*([0-9]+(?:\.[0-9]+)?)").expect("entry pattern");
    static ref NUMBER_RE: Regex = Regex::new(r"\b([0-9]+(?:\.[0-9]+)?)\b").expect("number pattern");
    static ref SL_RE: Regex = Regex::new(r"\bSL\s*=?\s*([0-9]+(?:\.[0-9]+)?)").expect("stop-loss pattern");
    static ref TP_NUMBERED_RE: Regex =
        Regex::new(r"\bTP\d+\s*=?\s*([0-9]+(?:\.[0-9]+)?)").expect("numbered tp pattern");
    static ref TP_BARE_RE: Regex = Regex::new(r"\bTP\s*=?\s*([0-9]+(?:\.[0-9]+)?)").expect("tp pattern");
}

/// Resolve a symbol token through the alias table.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    let token = upper.strip_suffix(".MG").unwrap_or(&upper);
    SYMBOL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == token)
        .map(|(_, symbol)| symbol.to_string())
}

fn first_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn all_numbers(re: &Regex, text: &str) -> Vec<f64> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Extract whatever trade parameters the text contains.
pub fn parse_signal(text: &str) -> ParsedSignal {
    let upper = text.trim().to_uppercase();

    let symbol = SYMBOL_RE
        .captures(&upper)
        .and_then(|c| c.get(1))
        .and_then(|m| normalize_symbol(m.as_str()));

    let timeframe = TIMEFRAME_RE
        .captures(&upper)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let direction = DIRECTION_RE
        .captures(&upper)
        .and_then(|c| c.get(1))
        .and_then(|m| GridSide::parse(m.as_str()));

    // A bare number stands in for a missing `@price`; noisy text can misfire here.
    let entry = first_number(&ENTRY_RE, &upper).or_else(|| first_number(&NUMBER_RE, &upper));
    let stop_loss = first_number(&SL_RE, &upper);

    let mut take_profits = all_numbers(&TP_NUMBERED_RE, &upper);
    if take_profits.is_empty() {
        take_profits = all_numbers(&TP_BARE_RE, &upper);
    }
    take_profits.truncate(MAX_TAKE_PROFITS);

    let parsed = ParsedSignal {
        symbol,
        direction,
        entry,
        stop_loss,
        take_profits,
        timeframe,
        raw: text.to_string(),
    };
    debug!(
        symbol = ?parsed.symbol,
        direction = ?parsed.direction,
        entry = ?parsed.entry,
        stop_loss = ?parsed.stop_loss,
        tps = parsed.take_profits.len(),
        "Parsed signal"
    );
    parsed
}
