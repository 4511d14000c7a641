use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const FRESH_TTL: Duration = Duration::from_secs(300);
const STALE_TTL: Duration = Duration::from_secs(3600);
const YAHOO_RATE_LIMIT_DELAY: Duration = Duration::from_millis(3000);
const YAHOO_BLOCK_DURATION: Duration = Duration::from_secs(600);
const LIQUIDITY_THRESHOLD_VOLUME: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub market_price: f64,
    pub execution_price: f64,
    pub spread: f64,
    pub slippage: f64,
    pub market_impact: f64,
    pub volume: Option<i64>,
}

struct PriceCacheEntry {
    price: f64,
    fetched_at: Instant,
}

struct YahooState {
    last_request: Option<Instant>,
    blocked_until: Option<Instant>,
}

/// Multi-tier quote adapter: Yahoo (rate-gated, circuit-broken on 429)
/// then Finnhub then Alpha Vantage, then a stale cache entry as a last
/// resort.
pub struct MarketDataAdapter {
    client: reqwest::Client,
    finnhub_api_key: Option<String>,
    alpha_vantage_api_key: Option<String>,
    cache: DashMap<String, PriceCacheEntry>,
    yahoo: Mutex<YahooState>,
}

impl MarketDataAdapter {
    pub fn new(finnhub_api_key: Option<String>, alpha_vantage_api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
                .timeout(Duration::from_secs(10))
                .build()
                .expect("building http client"),
            finnhub_api_key,
            alpha_vantage_api_key,
            cache: DashMap::new(),
            yahoo: Mutex::new(YahooState { last_request: None, blocked_until: None }),
        }
    }

    /// Current price, trying providers in order and caching the
    /// result. `allow_stale` permits returning a cached price that has
    /// aged past the fresh TTL (up to the stale TTL) if every live
    /// source fails.
    pub async fn current_price(&self, ticker: &str, allow_stale: bool) -> Option<f64> {
        if let Some(entry) = self.cache.get(ticker) {
            let age = entry.fetched_at.elapsed();
            if age < FRESH_TTL {
                return Some(entry.price);
            }
            if allow_stale && age < STALE_TTL {
                tracing::warn!(ticker, age_secs = age.as_secs(), "using stale cached price");
                return Some(entry.price);
            }
        }

        let mut price = self.try_yahoo(ticker).await;
        if price.is_none() {
            price = self.try_finnhub(ticker).await;
        }
        if price.is_none() {
            price = self.try_alpha_vantage(ticker).await;
        }

        match price {
            Some(p) => {
                self.cache.insert(ticker.to_string(), PriceCacheEntry { price: p, fetched_at: Instant::now() });
                tracing::info!(ticker, price = p, "quote resolved");
                Some(p)
            }
            None => {
                if allow_stale {
                    if let Some(entry) = self.cache.get(ticker) {
                        tracing::warn!(ticker, "all providers failed, using stale cache");
                        return Some(entry.price);
                    }
                }
                tracing::error!(ticker, "failed to get price from all sources");
                None
            }
        }
    }

    pub async fn benchmark_price(&self, benchmark_ticker: &str) -> Option<f64> {
        self.current_price(benchmark_ticker, true).await
    }

    async fn try_yahoo(&self, ticker: &str) -> Option<f64> {
        {
            let mut state = self.yahoo.lock().await;
            if let Some(blocked_until) = state.blocked_until {
                if Instant::now() < blocked_until {
                    return None;
                }
                state.blocked_until = None;
            }
            if let Some(last) = state.last_request {
                let elapsed = last.elapsed();
                if elapsed < YAHOO_RATE_LIMIT_DELAY {
                    tokio::time::sleep(YAHOO_RATE_LIMIT_DELAY - elapsed).await;
                }
            }
            state.last_request = Some(Instant::now());
        }

        let url = format!("https://query2.finance.yahoo.com/v8/finance/chart/{ticker}?interval=1m&range=1d");
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(ticker, error = %e, "yahoo finance request failed");
                return None;
            }
        };

        if response.status().as_u16() == 429 {
            let mut state = self.yahoo.lock().await;
            state.blocked_until = Some(Instant::now() + YAHOO_BLOCK_DURATION);
            tracing::warn!(ticker, "yahoo finance blocked (429), switching to alternatives for 10 minutes");
            return None;
        }
        if !response.status().is_success() {
            return None;
        }

        let json: serde_json::Value = response.json().await.ok()?;
        json.get("chart")
            .and_then(|v| v.get("result"))
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|result| result.get("meta"))
            .and_then(|meta| meta.get("regularMarketPrice"))
            .and_then(|v| v.as_f64())
    }

    async fn try_finnhub(&self, ticker: &str) -> Option<f64> {
        let key = self.finnhub_api_key.as_ref()?;
        let url = format!("https://finnhub.io/api/v1/quote?symbol={ticker}&token={key}");
        let response = self.client.get(&url).send().await.ok()?;
        let json: serde_json::Value = response.json().await.ok()?;
        let price = json.get("c").and_then(|v| v.as_f64())?;
        if price > 0.0 {
            tracing::info!(ticker, price, "finnhub provided price");
            Some(price)
        } else {
            None
        }
    }

    async fn try_alpha_vantage(&self, ticker: &str) -> Option<f64> {
        let key = self.alpha_vantage_api_key.as_ref()?;
        let url = format!(
            "https://www.alphavantage.co/query?function=GLOBAL_QUOTE&symbol={ticker}&apikey={key}"
        );
        let response = self.client.get(&url).send().await.ok()?;
        let json: serde_json::Value = response.json().await.ok()?;
        json.get("Global Quote")
            .and_then(|v| v.get("05. price"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok())
    }

    /// Approximate spread: 0.1% of price, matching `get_bid_ask_spread`'s
    /// documented reason for not calling the richer `stock.info`
    /// endpoint (it 429s far more aggressively than the quote endpoint).
    fn approximate_spread(current_price: f64) -> f64 {
        current_price * 0.001
    }

    /// Realistic execution price: market price adjusted for half-spread,
    /// liquidity-based slippage, and a volume-ratio market-impact term.
    /// Mirrors `calculate_realistic_execution_price`.
    pub async fn realistic_execution(&self, ticker: &str, side: Side, position_size: f64) -> Option<Execution> {
        let current_price = self.current_price(ticker, false).await?;
        let volume = self.get_volume(ticker).await;

        let spread = Self::approximate_spread(current_price);

        let market_impact = match volume {
            Some(v) if v > 0 => {
                let position_volume_ratio = position_size / current_price / v as f64;
                if position_volume_ratio > 0.001 {
                    current_price * position_volume_ratio * 0.5
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        let slippage = match volume {
            Some(v) if v > LIQUIDITY_THRESHOLD_VOLUME => current_price * 0.0005,
            _ => current_price * 0.002,
        };

        let execution_price = match side {
            Side::Buy => current_price + spread / 2.0 + slippage + market_impact,
            Side::Sell => current_price - spread / 2.0 - slippage - market_impact,
        };

        Some(Execution { market_price: current_price, execution_price, spread, slippage, market_impact, volume })
    }

    async fn get_volume(&self, ticker: &str) -> Option<i64> {
        let url = format!("https://query2.finance.yahoo.com/v8/finance/chart/{ticker}?interval=1d&range=1d");
        let response = self.client.get(&url).send().await.ok()?;
        let json: serde_json::Value = response.json().await.ok()?;
        json.get("chart")
            .and_then(|v| v.get("result"))
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|result| result.get("meta"))
            .and_then(|meta| meta.get("regularMarketVolume"))
            .and_then(|v| v.as_i64())
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> (usize, usize) {
        let total = self.cache.len();
        let valid = self.cache.iter().filter(|e| e.fetched_at.elapsed() < FRESH_TTL).count();
        (valid, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approximate_spread_is_ten_bps() {
        assert!((MarketDataAdapter::approximate_spread(100.0) - 0.1).abs() < 1e-9);
    }
}
