//! Response types for the Yahoo Finance chart endpoint.

use serde::Deserialize;

/// Top-level response from `/v8/finance/chart/{ticker}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<ChartError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartResult {
    pub meta: ChartMeta,
    #[serde(default)]
    pub indicators: Option<Indicators>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub regular_market_price: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<Quote>,
}

/// OHLC arrays; Yahoo pads missing bars with `null`.
#[derive(Debug, Clone, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub close: Vec<Option<f64>>,
}

impl ChartResponse {
    /// Market price from `meta`, else the last non-null close.
    pub fn reference_price(&self) -> Option<f64> {
        let result = self.chart.result.as_ref()?.first()?;
        if let Some(price) = result.meta.regular_market_price.filter(|p| *p > 0.0) {
            return Some(price);
        }
        result
            .indicators
            .as_ref()?
            .quote
            .first()?
            .close
            .iter()
            .rev()
            .flatten()
            .copied()
            .find(|p| *p > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_from_meta() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"XAUT-USD","currency":"USD","regularMarketPrice":4012.5},
            "indicators":{"quote":[{"close":[4001.0]}]}}],"error":null}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.reference_price(), Some(4012.5));
    }

    #[test]
    fn test_price_falls_back_to_last_close() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"BTC-USD"},
            "indicators":{"quote":[{"close":[60000.0, 61000.5, null]}]}}],"error":null}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.reference_price(), Some(61000.5));
    }

    #[test]
    fn test_error_payload() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.reference_price(), None);
        assert_eq!(resp.chart.error.unwrap().code, "Not Found");
    }
}
