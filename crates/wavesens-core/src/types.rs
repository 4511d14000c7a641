use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A news item as ingested by the News Analyzer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NewsItem {
    pub id: i64,
    pub news_id: String,
    pub headline: String,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub significance_score: Option<Decimal>,
    pub reasoning: Option<String>,
    pub is_significant: bool,
    pub processed_by_block2: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
    Short,
    Hold,
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalDirection::Buy => "BUY",
            SignalDirection::Sell => "SELL",
            SignalDirection::Short => "SHORT",
            SignalDirection::Hold => "HOLD",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SignalDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(SignalDirection::Buy),
            "SELL" => Ok(SignalDirection::Sell),
            "SHORT" => Ok(SignalDirection::Short),
            "HOLD" => Ok(SignalDirection::Hold),
            other => Err(format!("unknown signal direction: {other}")),
        }
    }
}

/// Structured market-conditions payload carried on a signal row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConditions {
    pub ticker: String,
    pub expected_move_percent: f64,
    pub default_stop_loss_percent: f64,
    pub default_take_profit_percent: f64,
    pub default_max_hold_hours: f64,
    pub ticker_exists: bool,
    pub ticker_cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TradingSignal {
    pub id: i64,
    pub news_item_id: i64,
    pub signal_type: SignalDirection,
    pub confidence: Decimal,
    pub elliott_wave: i32,
    pub wave_description: String,
    pub reasoning: String,
    pub market_conditions: serde_json::Value,
    pub entry_start: DateTime<Utc>,
    pub entry_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ExperimentStatus {
    Active,
    Closed,
}

/// A single paper-trading position, tracked end to end from open to close.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Experiment {
    pub id: i64,
    pub signal_id: i64,
    pub news_item_id: i64,
    pub ticker: String,
    pub direction: SignalDirection,
    pub entry_time: DateTime<Utc>,
    pub entry_price: Decimal,
    pub position_size: Decimal,
    pub shares: Decimal,
    pub entry_commission: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub max_hold_until: DateTime<Utc>,
    pub benchmark_entry_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<String>,
    pub exit_commission: Option<Decimal>,
    pub gross_pnl: Option<Decimal>,
    pub net_pnl: Option<Decimal>,
    pub return_percent: Option<Decimal>,
    pub hold_duration_minutes: Option<i64>,
    pub benchmark_return_percent: Option<Decimal>,
    pub alpha: Option<Decimal>,
    pub status: ExperimentStatus,
}

/// Append-only ledger row; the latest one is the authoritative cash balance.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PortfolioSnapshot {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub total_value: Decimal,
    pub cash_balance: Decimal,
    pub positions_count: i32,
    pub unrealized_pnl: Decimal,
    pub realized_pnl_today: Decimal,
    pub realized_pnl_total: Decimal,
    pub daily_return: Decimal,
    pub total_return: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLogRow {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub service: String,
}
