use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

const CACHE_TTL: Duration = Duration::from_secs(3600);
const QUOTE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/quote";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerInfo {
    pub exists: bool,
    pub cached: bool,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
}

/// Validates tickers against a provider, distinguishing authoritative
/// "doesn't exist" responses (cached as negative) from transient
/// errors (never cached as negative). A flaky provider should never
/// permanently blacklist a real ticker.
pub struct TickerValidator {
    client: reqwest::Client,
    positive: DashMap<String, Instant>,
    negative: DashMap<String, Instant>,
}

impl TickerValidator {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
                .timeout(Duration::from_secs(10))
                .build()
                .expect("building http client"),
            positive: DashMap::new(),
            negative: DashMap::new(),
        }
    }

    fn cache_fresh(entry: &Instant) -> bool {
        entry.elapsed() < CACHE_TTL
    }

    /// Validates a ticker. Transient provider errors resolve to
    /// `exists: true, cached: false` — callers treat that the same as
    /// "accept, validator inconclusive" rather than dropping a
    /// candidate just because the quote provider hiccuped.
    pub async fn validate(&self, ticker: &str) -> TickerInfo {
        let ticker = ticker.to_ascii_uppercase();

        if let Some(entry) = self.positive.get(&ticker) {
            if Self::cache_fresh(&entry) {
                return TickerInfo { exists: true, cached: true, name: None, exchange: None, currency: None };
            }
        }
        if let Some(entry) = self.negative.get(&ticker) {
            if Self::cache_fresh(&entry) {
                return TickerInfo { exists: false, cached: true, name: None, exchange: None, currency: None };
            }
        }

        match self.fetch_authoritative(&ticker).await {
            Ok(Some(info)) => {
                self.positive.insert(ticker, Instant::now());
                TickerInfo { cached: false, ..info }
            }
            Ok(None) => {
                // Provider responded but the symbol genuinely doesn't resolve.
                self.negative.insert(ticker, Instant::now());
                TickerInfo { exists: false, cached: false, name: None, exchange: None, currency: None }
            }
            Err(e) => {
                tracing::warn!(ticker, error = %e, "ticker validation transient error, not caching as invalid");
                TickerInfo { exists: true, cached: false, name: None, exchange: None, currency: None }
            }
        }
    }

    async fn fetch_authoritative(&self, ticker: &str) -> anyhow::Result<Option<TickerInfo>> {
        let url = format!("{QUOTE_URL}?symbols={ticker}");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("provider returned status {}", response.status());
        }
        let json: serde_json::Value = response.json().await?;

        let result = json
            .get("quoteResponse")
            .and_then(|v| v.get("result"))
            .and_then(|v| v.as_array());

        let Some(result) = result else {
            anyhow::bail!("malformed provider response");
        };

        let Some(quote) = result.first() else {
            return Ok(None);
        };

        if !is_valid_quote(quote, ticker) {
            return Ok(None);
        }

        Ok(Some(TickerInfo {
            exists: true,
            cached: false,
            name: quote.get("longName").or_else(|| quote.get("shortName")).and_then(|v| v.as_str()).map(String::from),
            exchange: quote.get("exchange").and_then(|v| v.as_str()).map(String::from),
            currency: quote.get("currency").and_then(|v| v.as_str()).map(String::from),
        }))
    }
}

impl Default for TickerValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Mirrors `_is_valid_info`: requires a name, a current price, and a
/// matching symbol before trusting the provider's quote as proof of
/// existence.
fn is_valid_quote(quote: &serde_json::Value, ticker: &str) -> bool {
    let has_name = quote.get("longName").or_else(|| quote.get("shortName")).is_some();
    let has_price = quote.get("regularMarketPrice").and_then(|v| v.as_f64()).is_some();
    let symbol_matches = quote
        .get("symbol")
        .and_then(|v| v.as_str())
        .map(|s| s.eq_ignore_ascii_case(ticker))
        .unwrap_or(false);
    has_name && has_price && symbol_matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_quote_requires_name_price_and_symbol_match() {
        let quote = serde_json::json!({
            "longName": "Apple Inc.",
            "regularMarketPrice": 150.0,
            "symbol": "AAPL",
        });
        assert!(is_valid_quote(&quote, "AAPL"));
        assert!(!is_valid_quote(&quote, "MSFT"));
    }

    #[test]
    fn missing_price_is_not_valid() {
        let quote = serde_json::json!({ "longName": "Nope Inc.", "symbol": "NOPE" });
        assert!(!is_valid_quote(&quote, "NOPE"));
    }
}

