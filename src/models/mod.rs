//! Data models for instruments, signals, positions and accounts.

mod instrument;
mod position;
mod side;
mod signal;
mod user;

pub use instrument::InstrumentSpec;
pub use position::Position;
pub use side::GridSide;
pub use signal::ParsedSignal;
pub use user::{Role, User};
