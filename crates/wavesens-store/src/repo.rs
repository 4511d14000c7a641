use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{Executor, Row};
use wavesens_core::types::{
    Experiment, ExperimentStatus, LogLevel, NewsItem, PortfolioSnapshot, ServiceLogRow, SignalDirection, TradingSignal,
};

/// A trading signal joined with its news item's headline, the shape
/// `SignalView` in the design notes: the core engine consumes records
/// that already carry both sides of the join rather than re-querying.
#[derive(Debug, Clone)]
pub struct SignalView {
    pub signal: TradingSignal,
    pub headline: String,
}

// ---- News Analyzer ----

pub async fn news_item_exists(pool: &PgPool, news_id: &str) -> sqlx::Result<bool> {
    let row = sqlx::query("SELECT 1 FROM news_items WHERE news_id = $1")
        .bind(news_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_news_item(
    pool: &PgPool,
    news_id: &str,
    headline: &str,
    summary: Option<&str>,
    url: Option<&str>,
    published_at: DateTime<Utc>,
    significance_score: Decimal,
    reasoning: &str,
    is_significant: bool,
) -> sqlx::Result<i64> {
    let row = sqlx::query(
        "INSERT INTO news_items
            (news_id, headline, summary, url, published_at, significance_score, reasoning, is_significant)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (news_id) DO NOTHING
         RETURNING id",
    )
    .bind(news_id)
    .bind(headline)
    .bind(summary)
    .bind(url)
    .bind(published_at)
    .bind(significance_score)
    .bind(reasoning)
    .bind(is_significant)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.get::<i64, _>("id")).unwrap_or_default())
}

// ---- Signal Extractor ----

pub async fn fetch_news_item(pool: &PgPool, id: i64) -> sqlx::Result<Option<NewsItem>> {
    sqlx::query_as::<_, NewsItem>("SELECT * FROM news_items WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Sweeps for significant news rows the Extractor hasn't processed yet
/// — the reconciliation pass run at startup and after a reconnect to
/// catch anything missed while the listener was down.
pub async fn fetch_unprocessed_significant_news(pool: &PgPool) -> sqlx::Result<Vec<NewsItem>> {
    sqlx::query_as::<_, NewsItem>(
        "SELECT * FROM news_items WHERE is_significant = TRUE AND processed_by_block2 = FALSE ORDER BY published_at",
    )
    .fetch_all(pool)
    .await
}

pub async fn mark_news_processed(pool: &PgPool, id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE news_items SET processed_by_block2 = TRUE WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persists a signal and flips `news_items.processed_by_block2` in the
/// same transaction so a crash between the two can never leave a news
/// item marked processed without the signal it was supposed to produce.
#[allow(clippy::too_many_arguments)]
pub async fn insert_signal_and_mark_processed(
    pool: &PgPool,
    news_item_id: i64,
    signal_type: SignalDirection,
    confidence: Decimal,
    elliott_wave: i32,
    wave_description: &str,
    reasoning: &str,
    market_conditions: serde_json::Value,
    entry_start: DateTime<Utc>,
    entry_end: DateTime<Utc>,
) -> sqlx::Result<i64> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        "INSERT INTO trading_signals
            (news_item_id, signal_type, confidence, elliott_wave, wave_description, reasoning, market_conditions, entry_start, entry_end)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING id",
    )
    .bind(news_item_id)
    .bind(signal_type.to_string())
    .bind(confidence)
    .bind(elliott_wave)
    .bind(wave_description)
    .bind(reasoning)
    .bind(market_conditions)
    .bind(entry_start)
    .bind(entry_end)
    .fetch_one(&mut *tx)
    .await?;
    let signal_id: i64 = row.get("id");

    sqlx::query("UPDATE news_items SET processed_by_block2 = TRUE WHERE id = $1")
        .bind(news_item_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(signal_id)
}

// ---- Experiment Manager ----

pub async fn fetch_signal_view(pool: &PgPool, signal_id: i64) -> sqlx::Result<Option<SignalView>> {
    let row = sqlx::query(
        "SELECT s.*, n.headline AS news_headline
         FROM trading_signals s
         JOIN news_items n ON s.news_item_id = n.id
         WHERE s.id = $1",
    )
    .bind(signal_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(SignalView {
        signal: TradingSignal {
            id: row.get("id"),
            news_item_id: row.get("news_item_id"),
            signal_type: row.get::<String, _>("signal_type").parse().unwrap_or(SignalDirection::Hold),
            confidence: row.get("confidence"),
            elliott_wave: row.get("elliott_wave"),
            wave_description: row.get("wave_description"),
            reasoning: row.get("reasoning"),
            market_conditions: row.get("market_conditions"),
            entry_start: row.get("entry_start"),
            entry_end: row.get("entry_end"),
            created_at: row.get("created_at"),
        },
        headline: row.get("news_headline"),
    }))
}

/// Sweeps for signals that have not yet produced an Experiment —
/// enforces at most one Experiment per signal, together with the
/// `signal_id` uniqueness constraint.
pub async fn fetch_unconsumed_signals(pool: &PgPool) -> sqlx::Result<Vec<i64>> {
    let rows = sqlx::query(
        "SELECT s.id FROM trading_signals s
         LEFT JOIN experiments e ON e.signal_id = s.id
         WHERE e.id IS NULL
         ORDER BY s.created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|r| r.get("id")).collect())
}

pub async fn count_active_experiments(pool: &PgPool) -> sqlx::Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM experiments WHERE status = 'active'")
        .fetch_one(pool)
        .await?;
    Ok(row.get("n"))
}

pub async fn get_active_experiments(pool: &PgPool) -> sqlx::Result<Vec<Experiment>> {
    sqlx::query_as::<_, Experiment>("SELECT * FROM experiments WHERE status = 'active' ORDER BY entry_time")
        .fetch_all(pool)
        .await
}

pub async fn get_latest_snapshot(pool: &PgPool) -> sqlx::Result<Option<PortfolioSnapshot>> {
    sqlx::query_as::<_, PortfolioSnapshot>(
        "SELECT * FROM portfolio_snapshots ORDER BY timestamp DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await
}

/// Seeds the ledger if no snapshot exists yet.
pub async fn create_initial_snapshot_if_missing(pool: &PgPool, initial_capital: Decimal) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO portfolio_snapshots (total_value, cash_balance, positions_count)
         SELECT $1, $1, 0
         WHERE NOT EXISTS (SELECT 1 FROM portfolio_snapshots)",
    )
    .bind(initial_capital)
    .execute(pool)
    .await?;
    Ok(())
}

/// The ledger row's mutable totals. `portfolio_snapshots` is
/// append-only: every ledger-affecting event (position open, position
/// close, the periodic snapshot tick) inserts a fresh row computed
/// from the previous one rather than mutating it, so the row at any
/// given `timestamp` always reflects what the portfolio actually
/// looked like at that instant.
#[derive(Debug, Clone)]
pub struct SnapshotTotals {
    pub total_value: Decimal,
    pub cash_balance: Decimal,
    pub positions_count: i32,
    pub unrealized_pnl: Decimal,
    pub realized_pnl_today: Decimal,
    pub realized_pnl_total: Decimal,
    pub daily_return: Decimal,
    pub total_return: Decimal,
}

async fn insert_snapshot_row<'c, E>(executor: E, totals: &SnapshotTotals) -> sqlx::Result<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "INSERT INTO portfolio_snapshots
            (total_value, cash_balance, positions_count, unrealized_pnl, realized_pnl_today,
             realized_pnl_total, daily_return, total_return)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
    )
    .bind(totals.total_value)
    .bind(totals.cash_balance)
    .bind(totals.positions_count)
    .bind(totals.unrealized_pnl)
    .bind(totals.realized_pnl_today)
    .bind(totals.realized_pnl_total)
    .bind(totals.daily_return)
    .bind(totals.total_return)
    .execute(executor)
    .await?;
    Ok(())
}

fn compute_returns(initial_capital: Decimal, realized_pnl_today: Decimal, total_value: Decimal) -> (Decimal, Decimal) {
    if initial_capital.is_zero() {
        return (Decimal::ZERO, Decimal::ZERO);
    }
    let hundred = Decimal::from(100);
    let daily_return = realized_pnl_today / initial_capital * hundred;
    let total_return = (total_value - initial_capital) / initial_capital * hundred;
    (daily_return, total_return)
}

/// Opens a position and appends a fresh ledger row reflecting the
/// post-open totals, all in one transaction. `SELECT ... FOR UPDATE`
/// on the latest snapshot row serializes this against any concurrent
/// `enter_position`/`exit_position` call so two opens can never both
/// read the same stale cash balance. `other_positions_*` are the
/// caller's pre-priced view of every *other* active position, since
/// this one isn't in `experiments` until the insert below commits.
#[allow(clippy::too_many_arguments)]
pub async fn enter_position(
    pool: &PgPool,
    signal_id: i64,
    news_item_id: i64,
    ticker: &str,
    direction: SignalDirection,
    entry_time: DateTime<Utc>,
    entry_price: Decimal,
    position_size: Decimal,
    shares: Decimal,
    entry_commission: Decimal,
    stop_loss_price: Decimal,
    take_profit_price: Decimal,
    max_hold_until: DateTime<Utc>,
    benchmark_entry_price: Option<Decimal>,
    other_positions_value: Decimal,
    other_positions_unrealized: Decimal,
    other_positions_count: i32,
    initial_capital: Decimal,
) -> sqlx::Result<i64> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        "INSERT INTO experiments
            (signal_id, news_item_id, ticker, direction, entry_time, entry_price, position_size,
             shares, entry_commission, stop_loss_price, take_profit_price, max_hold_until,
             benchmark_entry_price, status)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,'active')
         ON CONFLICT (signal_id) DO NOTHING
         RETURNING id",
    )
    .bind(signal_id)
    .bind(news_item_id)
    .bind(ticker)
    .bind(direction.to_string())
    .bind(entry_time)
    .bind(entry_price)
    .bind(position_size)
    .bind(shares)
    .bind(entry_commission)
    .bind(stop_loss_price)
    .bind(take_profit_price)
    .bind(max_hold_until)
    .bind(benchmark_entry_price)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(0);
    };
    let experiment_id: i64 = row.get("id");

    let latest = sqlx::query_as::<_, PortfolioSnapshot>(
        "SELECT * FROM portfolio_snapshots ORDER BY timestamp DESC LIMIT 1 FOR UPDATE",
    )
    .fetch_one(&mut *tx)
    .await?;

    let debit = position_size + entry_commission;
    let cash_balance = latest.cash_balance - debit;
    let total_value = cash_balance + other_positions_value + position_size;
    let (daily_return, total_return) = compute_returns(initial_capital, latest.realized_pnl_today, total_value);

    insert_snapshot_row(
        &mut *tx,
        &SnapshotTotals {
            total_value,
            cash_balance,
            positions_count: other_positions_count + 1,
            unrealized_pnl: other_positions_unrealized,
            realized_pnl_today: latest.realized_pnl_today,
            realized_pnl_total: latest.realized_pnl_total,
            daily_return,
            total_return,
        },
    )
    .await?;

    tx.commit().await?;
    Ok(experiment_id)
}

pub async fn update_trailing_stop(pool: &PgPool, experiment_id: i64, new_stop: Decimal) -> sqlx::Result<()> {
    sqlx::query("UPDATE experiments SET stop_loss_price = $1 WHERE id = $2")
        .bind(new_stop)
        .bind(experiment_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Closes a position: stamps exit fields, then appends a fresh ledger
/// row reflecting the post-close totals, all inside one transaction.
/// Same row-locking contract as `enter_position`. `other_positions_*`
/// describes every active position besides this one — priced by the
/// caller before this one's status flips to `closed`.
#[allow(clippy::too_many_arguments)]
pub async fn exit_position(
    pool: &PgPool,
    experiment_id: i64,
    exit_time: DateTime<Utc>,
    exit_price: Decimal,
    exit_reason: &str,
    exit_commission: Decimal,
    gross_pnl: Decimal,
    net_pnl: Decimal,
    return_percent: Decimal,
    hold_duration_minutes: i64,
    benchmark_return_percent: Option<Decimal>,
    alpha: Option<Decimal>,
    proceeds: Decimal,
    other_positions_value: Decimal,
    other_positions_unrealized: Decimal,
    other_positions_count: i32,
    initial_capital: Decimal,
) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE experiments SET
            exit_time = $1, exit_price = $2, exit_reason = $3, exit_commission = $4,
            gross_pnl = $5, net_pnl = $6, return_percent = $7, hold_duration_minutes = $8,
            benchmark_return_percent = $9, alpha = $10, status = 'closed'
         WHERE id = $11",
    )
    .bind(exit_time)
    .bind(exit_price)
    .bind(exit_reason)
    .bind(exit_commission)
    .bind(gross_pnl)
    .bind(net_pnl)
    .bind(return_percent)
    .bind(hold_duration_minutes)
    .bind(benchmark_return_percent)
    .bind(alpha)
    .bind(experiment_id)
    .execute(&mut *tx)
    .await?;

    let latest = sqlx::query_as::<_, PortfolioSnapshot>(
        "SELECT * FROM portfolio_snapshots ORDER BY timestamp DESC LIMIT 1 FOR UPDATE",
    )
    .fetch_one(&mut *tx)
    .await?;

    let cash_balance = latest.cash_balance + proceeds;
    let realized_pnl_today = latest.realized_pnl_today + net_pnl;
    let realized_pnl_total = latest.realized_pnl_total + net_pnl;
    let total_value = cash_balance + other_positions_value;
    let (daily_return, total_return) = compute_returns(initial_capital, realized_pnl_today, total_value);

    insert_snapshot_row(
        &mut *tx,
        &SnapshotTotals {
            total_value,
            cash_balance,
            positions_count: other_positions_count,
            unrealized_pnl: other_positions_unrealized,
            realized_pnl_today,
            realized_pnl_total,
            daily_return,
            total_return,
        },
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Appends a fresh ledger row carrying `totals` — used by the periodic
/// snapshot tick, which doesn't mutate cash and so needs no row lock.
pub async fn insert_snapshot(pool: &PgPool, totals: &SnapshotTotals) -> sqlx::Result<()> {
    insert_snapshot_row(pool, totals).await
}

pub async fn insert_service_log(pool: &PgPool, level: LogLevel, message: &str, service: &str) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO service_logs (level, message, service) VALUES ($1, $2, $3)")
        .bind(level.to_string())
        .bind(message)
        .bind(service)
        .execute(pool)
        .await?;
    Ok(())
}

/// Reads back the most recent service log entries, newest first.
pub async fn fetch_recent_service_logs(pool: &PgPool, limit: i64) -> sqlx::Result<Vec<ServiceLogRow>> {
    let rows = sqlx::query("SELECT timestamp, level, message, service FROM service_logs ORDER BY timestamp DESC LIMIT $1")
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let level: String = r.get("level");
            ServiceLogRow {
                timestamp: r.get("timestamp"),
                level: level.parse().unwrap_or(LogLevel::Info),
                message: r.get("message"),
                service: r.get("service"),
            }
        })
        .collect())
}

pub fn experiment_status_str(status: ExperimentStatus) -> &'static str {
    match status {
        ExperimentStatus::Active => "active",
        ExperimentStatus::Closed => "closed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a live Postgres instance; exercised in CI with DATABASE_URL set"]
    async fn service_log_round_trips_through_typed_level() {
        let database_url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&database_url).await.unwrap();

        insert_service_log(&pool, LogLevel::Warn, "round trip check", "repo-tests").await.unwrap();
        let recent = fetch_recent_service_logs(&pool, 1).await.unwrap();

        assert_eq!(recent[0].level, LogLevel::Warn);
        assert_eq!(recent[0].message, "round trip check");
        assert_eq!(recent[0].service, "repo-tests");
    }
}
