use anyhow::{Context, Result};
use std::env;

fn env_or<T: std::str::FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{key}: {e}"))
}

/// Portfolio and risk constants shared by the Signal Extractor (sizing
/// hints) and Experiment Manager (admission, monitoring). Defaults
/// match `experiment_manager/config.py`.
#[derive(Debug, Clone)]
pub struct PortfolioSettings {
    pub initial_capital: f64,
    pub min_cash_reserve_percent: f64,
    pub max_position_percent: f64,
    pub min_position_size: f64,
    pub max_concurrent_positions: i64,

    pub daily_loss_limit_percent: f64,
    pub default_stop_loss_percent: f64,
    pub default_take_profit_percent: f64,
    pub trailing_stop_activation_percent: f64,
    pub trailing_stop_distance_percent: f64,

    pub commission_fixed: f64,
    pub commission_percent: f64,
    pub slippage_liquid_percent: f64,
    pub slippage_illiquid_percent: f64,
    pub liquidity_threshold_volume: i64,

    pub base_position_percent: f64,
    pub confidence_factor_min: f64,
    pub confidence_factor_max: f64,
    pub volatility_factor_min: f64,
    pub correlation_factor_min: f64,

    pub position_check_interval_seconds: u64,
    pub portfolio_snapshot_interval_seconds: u64,
    pub price_cache_ttl_seconds: u64,
    pub price_stale_cache_ttl_seconds: u64,

    pub min_hold_hours: f64,
}

impl PortfolioSettings {
    pub fn from_env() -> Result<Self> {
        let s = Self {
            initial_capital: env_or("INITIAL_CAPITAL", "10000")?,
            min_cash_reserve_percent: env_or("MIN_CASH_RESERVE_PERCENT", "10")?,
            max_position_percent: env_or("MAX_POSITION_PERCENT", "10")?,
            min_position_size: env_or("MIN_POSITION_SIZE", "100")?,
            max_concurrent_positions: env_or("MAX_CONCURRENT_POSITIONS", "20")?,

            daily_loss_limit_percent: env_or("DAILY_LOSS_LIMIT_PERCENT", "5")?,
            default_stop_loss_percent: env_or("DEFAULT_STOP_LOSS_PERCENT", "3")?,
            default_take_profit_percent: env_or("DEFAULT_TAKE_PROFIT_PERCENT", "5")?,
            trailing_stop_activation_percent: env_or("TRAILING_STOP_ACTIVATION_PERCENT", "2")?,
            trailing_stop_distance_percent: env_or("TRAILING_STOP_DISTANCE_PERCENT", "1.5")?,

            commission_fixed: env_or("COMMISSION_FIXED", "1.0")?,
            commission_percent: env_or("COMMISSION_PERCENT", "0.1")?,
            slippage_liquid_percent: env_or("SLIPPAGE_LIQUID_PERCENT", "0.05")?,
            slippage_illiquid_percent: env_or("SLIPPAGE_ILLIQUID_PERCENT", "0.2")?,
            liquidity_threshold_volume: env_or("LIQUIDITY_THRESHOLD_VOLUME", "1000000")?,

            base_position_percent: env_or("BASE_POSITION_PERCENT", "2.0")?,
            confidence_factor_min: env_or("CONFIDENCE_FACTOR_MIN", "0.5")?,
            confidence_factor_max: env_or("CONFIDENCE_FACTOR_MAX", "1.5")?,
            volatility_factor_min: env_or("VOLATILITY_FACTOR_MIN", "0.5")?,
            correlation_factor_min: env_or("CORRELATION_FACTOR_MIN", "0.5")?,

            position_check_interval_seconds: env_or("POSITION_CHECK_INTERVAL_SECONDS", "30")?,
            portfolio_snapshot_interval_seconds: env_or("PORTFOLIO_SNAPSHOT_INTERVAL_SECONDS", "300")?,
            price_cache_ttl_seconds: env_or("PRICE_CACHE_TTL_SECONDS", "300")?,
            price_stale_cache_ttl_seconds: env_or("PRICE_STALE_CACHE_TTL_SECONDS", "3600")?,

            min_hold_hours: env_or("MIN_HOLD_HOURS", "2")?,
        };
        s.validate()?;
        Ok(s)
    }

    fn validate(&self) -> Result<()> {
        if self.initial_capital <= 0.0 {
            anyhow::bail!("INITIAL_CAPITAL must be positive");
        }
        if !(0.0..=50.0).contains(&self.min_cash_reserve_percent) {
            anyhow::bail!("MIN_CASH_RESERVE_PERCENT must be between 0 and 50");
        }
        if !(0.0..=50.0).contains(&self.max_position_percent) || self.max_position_percent <= 0.0 {
            anyhow::bail!("MAX_POSITION_PERCENT must be between 0 and 50");
        }
        if !(0.0..=20.0).contains(&self.daily_loss_limit_percent) || self.daily_loss_limit_percent <= 0.0 {
            anyhow::bail!("DAILY_LOSS_LIMIT_PERCENT must be between 0 and 20");
        }
        if !(0.0..=10.0).contains(&self.base_position_percent) || self.base_position_percent <= 0.0 {
            anyhow::bail!("BASE_POSITION_PERCENT must be between 0 and 10");
        }
        Ok(())
    }

    pub fn calculate_commission(&self, position_size: f64) -> f64 {
        let commission_percent = position_size * (self.commission_percent / 100.0);
        self.commission_fixed.max(commission_percent)
    }

    pub fn calculate_slippage(&self, price: f64, volume: Option<i64>) -> f64 {
        let slippage_percent = match volume {
            Some(v) if v < self.liquidity_threshold_volume => self.slippage_illiquid_percent,
            _ => self.slippage_liquid_percent,
        };
        price * (slippage_percent / 100.0)
    }
}

/// News Analyzer process settings.
#[derive(Debug, Clone)]
pub struct NewsAnalyzerSettings {
    pub database_url: String,
    pub finnhub_api_key: Option<String>,
    pub openrouter_api_key: String,
    pub llm_model: String,
    pub llm_temperature: f64,
    pub llm_max_tokens: u32,
    pub llm_timeout_seconds: u64,
    pub significance_threshold: f64,
    pub check_interval_seconds: u64,
    pub skip_news_older_hours: i64,
    pub max_news_per_check: usize,
    /// Escape hatch for tests/manual runs: execute a single ingest cycle and exit
    /// instead of looping forever.
    pub run_once: bool,
}

impl NewsAnalyzerSettings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            finnhub_api_key: env::var("FINNHUB_API_KEY").ok(),
            openrouter_api_key: env::var("OPENROUTER_API_KEY").context("OPENROUTER_API_KEY not set")?,
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "anthropic/claude-3-haiku".to_string()),
            llm_temperature: env_or("LLM_TEMPERATURE", "0.3")?,
            llm_max_tokens: env_or("LLM_MAX_TOKENS", "500")?,
            llm_timeout_seconds: env_or("LLM_TIMEOUT_SECONDS", "30")?,
            significance_threshold: env_or("SIGNIFICANCE_THRESHOLD", "60")?,
            check_interval_seconds: env_or("CHECK_INTERVAL_SECONDS", "5")?,
            skip_news_older_hours: env_or("SKIP_NEWS_OLDER_HOURS", "24")?,
            max_news_per_check: env_or("MAX_NEWS_PER_CHECK", "20")?,
            run_once: env::var("NEWS_ANALYZER_RUN_ONCE").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false),
        })
    }
}

/// Signal Extractor process settings. No `finnhub_api_key` field: this
/// process consumes signals from the store, it never fetches its own
/// news or quotes.
#[derive(Debug, Clone)]
pub struct SignalExtractorSettings {
    pub database_url: String,
    pub openrouter_api_key: String,
    pub llm_model: String,
    pub llm_temperature: f64,
    pub llm_max_tokens: u32,
    pub llm_timeout_seconds: u64,
    pub min_expected_move_percent: f64,
    pub min_confidence: f64,
    pub max_signals_per_news: usize,
}

impl SignalExtractorSettings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            openrouter_api_key: env::var("OPENROUTER_API_KEY").context("OPENROUTER_API_KEY not set")?,
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "anthropic/claude-3-haiku".to_string()),
            llm_temperature: env_or("LLM_TEMPERATURE", "0.4")?,
            llm_max_tokens: env_or("LLM_MAX_TOKENS", "800")?,
            llm_timeout_seconds: env_or("LLM_TIMEOUT_SECONDS", "30")?,
            min_expected_move_percent: env_or("MIN_EXPECTED_MOVE_PERCENT", "1.0")?,
            min_confidence: env_or("MIN_CONFIDENCE", "40")?,
            max_signals_per_news: env_or("MAX_SIGNALS_PER_NEWS", "3")?,
        })
    }
}

/// Experiment Manager process settings.
#[derive(Debug, Clone)]
pub struct ExperimentManagerSettings {
    pub database_url: String,
    pub finnhub_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
    pub portfolio: PortfolioSettings,
}

impl ExperimentManagerSettings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            finnhub_api_key: env::var("FINNHUB_API_KEY").ok(),
            alpha_vantage_api_key: env::var("ALPHA_VANTAGE_API_KEY").ok(),
            portfolio: PortfolioSettings::from_env()?,
        })
    }
}
