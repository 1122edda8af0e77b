//! Market data clients.

mod price_client;
mod types;

pub use price_client::PriceClient;
