//! Reference price lookup from Yahoo Finance.
//!
//! Used only to pre-fill a price; any failure falls back to manual entry.

use std::time::Duration;

use anyhow::Context;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::ChartResponse;

const YAHOO_CHART_BASE: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("no price source for symbol {0}")]
    UnknownSymbol(String),

    #[error("price request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("price request returned HTTP {0}")]
    Status(StatusCode),

    #[error("no price in response for {0}")]
    NoPrice(String),
}

impl PriceError {
    fn is_transient(&self) -> bool {
        match self {
            PriceError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            PriceError::Status(s) => s.is_server_error() || *s == StatusCode::TOO_MANY_REQUESTS,
            _ => false,
        }
    }
}

/// Yahoo ticker used as a proxy for a trading symbol.
pub fn yahoo_ticker(symbol: &str) -> Option<&'static str> {
    match symbol.trim().to_uppercase().as_str() {
        "XAUUSD" => Some("XAUT-USD"),
        "BTCUSD" => Some("BTC-USD"),
        _ => None,
    }
}

/// Client for the Yahoo chart endpoint.
pub struct PriceClient {
    client: Client,
    base_url: String,
}

impl PriceClient {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_base_url(YAHOO_CHART_BASE.to_string())
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent("lotwise/0.1")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Latest price for `symbol`, retried with exponential backoff on
    /// transient failures.
    pub async fn fetch_reference_price(&self, symbol: &str) -> Result<f64, PriceError> {
        let ticker =
            yahoo_ticker(symbol).ok_or_else(|| PriceError::UnknownSymbol(symbol.to_string()))?;
        let url = format!("{}/{}?range=1d&interval=1d", self.base_url, ticker);

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_elapsed_time(Some(MAX_RETRY_ELAPSED))
            .build();

        let price = retry(policy, || async {
            self.fetch_once(&url, ticker).await.map_err(|e| {
                if e.is_transient() {
                    debug!(ticker, error = %e, "Transient price error, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await?;

        info!(symbol, ticker, price, "Fetched reference price");
        Ok(price)
    }

    async fn fetch_once(&self, url: &str, ticker: &str) -> Result<f64, PriceError> {
        debug!(url = %url, "Fetching reference price");

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PriceError::Status(response.status()));
        }

        let chart: ChartResponse = response.json().await?;
        chart
            .reference_price()
            .ok_or_else(|| PriceError::NoPrice(ticker.to_string()))
    }

    /// Like [`fetch_reference_price`](Self::fetch_reference_price) but logs
    /// the failure and returns `None`.
    pub async fn try_reference_price(&self, symbol: &str) -> Option<f64> {
        match self.fetch_reference_price(symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!(symbol, error = %e, "Reference price unavailable, enter it manually");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_mapping() {
        assert_eq!(yahoo_ticker("XAUUSD"), Some("XAUT-USD"));
        assert_eq!(yahoo_ticker("btcusd"), Some("BTC-USD"));
        assert_eq!(yahoo_ticker("EURUSD"), None);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_permanent() {
        let client = PriceClient::new().unwrap();
        let err = client.fetch_reference_price("EURUSD").await.unwrap_err();
        assert!(matches!(err, PriceError::UnknownSymbol(_)));
        assert!(client.try_reference_price("EURUSD").await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_http_error() {
        // port 9 on localhost is the discard port and normally closed
        let client = PriceClient::with_base_url("http://127.0.0.1:9".to_string()).unwrap();
        let err = client.fetch_once("http://127.0.0.1:9/XAUT-USD", "XAUT-USD").await.unwrap_err();
        assert!(matches!(err, PriceError::Http(_)));
    }
}
