use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::debug;

use common::{Candle, Granularity, MarketDataProvider, PriceSeries, ProviderError};

const BASE_URL: &str = "https://api.binance.com";

/// Hard page size of the spot klines endpoint.
const KLINE_PAGE_LIMIT: usize = 1000;

/// Market data provider backed by Binance spot klines.
/// Public endpoint, no request signing needed.
pub struct BinanceProvider {
    http: Client,
}

impl BinanceProvider {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

impl Default for BinanceProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for BinanceProvider {
    async fn fetch_series(
        &self,
        symbol: &str,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PriceSeries, ProviderError> {
        let step_ms = granularity.minutes() as i64 * 60_000;
        let end_ms = end.timestamp_millis();
        let mut cursor = start.timestamp_millis();
        let mut candles = Vec::new();

        // Page through the range; the endpoint caps each response at 1000 rows.
        loop {
            let url = format!(
                "{BASE_URL}/api/v3/klines?symbol={symbol}&interval={}&startTime={cursor}&endTime={end_ms}&limit={KLINE_PAGE_LIMIT}",
                granularity.label()
            );
            let resp = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

            if !status.is_success() {
                // -1121 is Binance's "Invalid symbol" code.
                if body.contains("-1121") || body.to_lowercase().contains("invalid symbol") {
                    return Err(ProviderError::SymbolNotFound(symbol.to_string()));
                }
                return Err(ProviderError::Unavailable(format!("HTTP {status}: {body}")));
            }

            let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(&body)
                .map_err(|e| ProviderError::Unavailable(format!("malformed klines: {e}")))?;
            if rows.is_empty() {
                break;
            }

            let page_len = rows.len();
            let mut last_open_ms = cursor;
            for row in &rows {
                let candle = parse_kline(row)?;
                last_open_ms = candle.ts.timestamp_millis();
                candles.push(candle);
            }

            cursor = last_open_ms + step_ms;
            if page_len < KLINE_PAGE_LIMIT || cursor >= end_ms {
                break;
            }
        }

        if candles.is_empty() {
            return Err(ProviderError::Unavailable(format!(
                "no klines returned for {symbol} {granularity}"
            )));
        }

        debug!(symbol, window = %granularity, bars = candles.len(), "klines fetched");
        Ok(PriceSeries {
            symbol: symbol.to_string(),
            granularity,
            candles,
        })
    }
}

/// One kline row is a mixed array:
/// [open_time_ms, "open", "high", "low", "close", "volume", ...]
fn parse_kline(row: &[serde_json::Value]) -> Result<Candle, ProviderError> {
    let open_ms = row
        .first()
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| ProviderError::Unavailable("kline missing open time".into()))?;
    let ts = DateTime::<Utc>::from_timestamp_millis(open_ms)
        .ok_or_else(|| ProviderError::Unavailable(format!("kline open time out of range: {open_ms}")))?;

    let field = |idx: usize, name: &str| -> Result<f64, ProviderError> {
        row.get(idx)
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| ProviderError::Unavailable(format!("kline missing {name}")))
    };

    Ok(Candle {
        ts,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_kline_row() {
        let row: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1717200000000, "68000.1", "68100.5", "67900.0", "68050.2", "123.45",
                1717200899999, "8399321.2", 1000, "60.1", "4090120.5", "0"]"#,
        )
        .unwrap();
        let candle = parse_kline(&row).unwrap();
        assert_eq!(candle.ts.timestamp_millis(), 1_717_200_000_000);
        assert!((candle.open - 68000.1).abs() < 1e-9);
        assert!((candle.close - 68050.2).abs() < 1e-9);
        assert!((candle.volume - 123.45).abs() < 1e-9);
    }

    #[test]
    fn rejects_a_truncated_row() {
        let row: Vec<serde_json::Value> =
            serde_json::from_str(r#"[1717200000000, "68000.1"]"#).unwrap();
        assert!(parse_kline(&row).is_err());
    }
}
