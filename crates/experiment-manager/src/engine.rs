use anyhow::Result;
use chrono::Utc;
use market_data::{MarketDataAdapter, Side};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use wavesens_core::config::PortfolioSettings;
use wavesens_core::types::{LogLevel, MarketConditions, SignalDirection};
use wavesens_store::repo;

use crate::admission::{admission_check, calculate_exit, compute_position_size, decide_exit_reason, update_trailing_stop};
use crate::hold_window::adjust_max_hold_until;

const BENCHMARK_TICKER: &str = "SPY";

fn entry_side(direction: SignalDirection) -> Side {
    match direction {
        SignalDirection::Short => Side::Sell,
        _ => Side::Buy,
    }
}

fn exit_side(direction: SignalDirection) -> Side {
    match direction {
        SignalDirection::Short => Side::Buy,
        _ => Side::Sell,
    }
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or_default()
}

fn to_decimal(f: f64) -> Decimal {
    Decimal::from_f64(f).unwrap_or_default()
}

async fn current_totals(pool: &PgPool) -> Result<(f64, f64)> {
    let snapshot = repo::get_latest_snapshot(pool).await?;
    let (cash, total) = match snapshot {
        Some(s) => (to_f64(s.cash_balance), to_f64(s.total_value)),
        None => (0.0, 0.0),
    };
    Ok((cash, total))
}

/// Prices every active position except `exclude_id` (the one being
/// opened or closed right now, which is mid-transition in
/// `experiments` and must not double-count itself in the ledger row
/// the caller is about to append).
async fn price_other_positions(pool: &PgPool, market: &MarketDataAdapter, exclude_id: Option<i64>) -> Result<(f64, f64, i32)> {
    let mut value = 0.0;
    let mut unrealized = 0.0;
    let mut count = 0;
    for experiment in repo::get_active_experiments(pool).await? {
        if Some(experiment.id) == exclude_id {
            continue;
        }
        count += 1;
        let Some(price) = market.current_price(&experiment.ticker, true).await else { continue };
        let shares = to_f64(experiment.shares);
        value += shares * price;
        unrealized += shares * (price - to_f64(experiment.entry_price));
    }
    Ok((value, unrealized, count))
}

/// Reacts to a new-signal notification: entry window check, sizing,
/// admission, execution pricing, and the transactional open.
pub async fn on_new_signal(pool: &PgPool, market: &MarketDataAdapter, portfolio: &PortfolioSettings, signal_id: i64) -> Result<()> {
    let Some(view) = repo::fetch_signal_view(pool, signal_id).await? else {
        return Ok(());
    };
    let signal = &view.signal;

    let now = Utc::now();
    if now < signal.entry_start || now > signal.entry_end {
        tracing::info!(signal_id, "entry window closed, skipping signal");
        return Ok(());
    }

    let market_conditions: Option<MarketConditions> = serde_json::from_value(signal.market_conditions.clone()).ok();
    let ticker = market_conditions.as_ref().map(|m| m.ticker.clone()).unwrap_or_default();
    if ticker.is_empty() {
        tracing::warn!(signal_id, "signal has no ticker, skipping");
        return Ok(());
    }

    let (cash, total_value) = current_totals(pool).await?;
    if total_value <= 0.0 {
        tracing::warn!("no portfolio snapshot yet, skipping signal intake");
        return Ok(());
    }

    let confidence_percent = to_f64(signal.confidence) * 100.0;
    let size = compute_position_size(total_value, cash, confidence_percent, 1.0, 1.0, portfolio);

    let active_count = repo::count_active_experiments(pool).await?;
    let commission = portfolio.calculate_commission(size);
    let daily_loss_breached = is_daily_loss_breached(pool, portfolio).await?;

    if let Err(reason) = admission_check(cash, total_value, active_count, size, commission, daily_loss_breached, portfolio) {
        tracing::info!(signal_id, ticker = %ticker, reason = %reason, "admission refused");
        return Ok(());
    }

    let Some(execution) = market.realistic_execution(&ticker, entry_side(signal.signal_type), size).await else {
        tracing::warn!(signal_id, ticker = %ticker, "no execution price available, skipping");
        return Ok(());
    };

    let shares = size / execution.execution_price;
    let default_stop_pct = market_conditions.as_ref().map(|m| m.default_stop_loss_percent).unwrap_or(portfolio.default_stop_loss_percent);
    let default_take_pct = market_conditions.as_ref().map(|m| m.default_take_profit_percent).unwrap_or(portfolio.default_take_profit_percent);
    let default_hold_hours = market_conditions.as_ref().map(|m| m.default_max_hold_hours).unwrap_or(portfolio.min_hold_hours);

    let stop_loss_price = execution.execution_price * (1.0 - default_stop_pct / 100.0);
    let take_profit_price = execution.execution_price * (1.0 + default_take_pct / 100.0);

    let Some(max_hold_until) = adjust_max_hold_until(now, default_hold_hours, portfolio.min_hold_hours) else {
        tracing::info!(signal_id, ticker = %ticker, "remaining market window too short, refusing to open");
        return Ok(());
    };

    let benchmark_entry_price = market.current_price(BENCHMARK_TICKER, true).await;
    let (other_value, other_unrealized, other_count) = price_other_positions(pool, market, None).await?;

    let experiment_id = repo::enter_position(
        pool,
        signal.id,
        signal.news_item_id,
        &ticker,
        signal.signal_type,
        now,
        to_decimal(execution.execution_price),
        to_decimal(size),
        to_decimal(shares),
        to_decimal(commission),
        to_decimal(stop_loss_price),
        to_decimal(take_profit_price),
        max_hold_until,
        benchmark_entry_price.map(to_decimal),
        to_decimal(other_value),
        to_decimal(other_unrealized),
        other_count,
        to_decimal(portfolio.initial_capital),
    )
    .await?;

    if experiment_id == 0 {
        tracing::info!(signal_id, "signal already consumed, no-op");
        return Ok(());
    }

    tracing::info!(
        experiment_id,
        ticker = %ticker,
        direction = %signal.signal_type,
        shares,
        price = execution.execution_price,
        "opened position",
    );
    let message = format!("opened {} {ticker} x{shares:.4} @ {:.2} (experiment {experiment_id})", signal.signal_type, execution.execution_price);
    repo::insert_service_log(pool, LogLevel::Info, &message, "experiment-manager").await.ok();

    Ok(())
}

async fn is_daily_loss_breached(pool: &PgPool, portfolio: &PortfolioSettings) -> Result<bool> {
    let Some(snapshot) = repo::get_latest_snapshot(pool).await? else { return Ok(false) };
    let total_value = to_f64(snapshot.total_value);
    if total_value <= 0.0 {
        return Ok(false);
    }
    let realized_today = to_f64(snapshot.realized_pnl_today);
    Ok((realized_today.abs() / total_value) * 100.0 >= portfolio.daily_loss_limit_percent)
}

/// Position-monitor pass: circuit-breaker first, then per-position
/// stop/take-profit/trailing-stop/time-expiry checks.
pub async fn monitor_cycle(pool: &PgPool, market: &MarketDataAdapter, portfolio: &PortfolioSettings) -> Result<()> {
    if is_daily_loss_breached(pool, portfolio).await? {
        let active = repo::get_active_experiments(pool).await?;
        if !active.is_empty() {
            tracing::warn!(count = active.len(), "daily loss limit breached, closing all active positions");
            for experiment in active {
                close_position(pool, market, portfolio, &experiment, "daily_loss_limit").await?;
            }
        }
        return Ok(());
    }

    let now = Utc::now();
    for experiment in repo::get_active_experiments(pool).await? {
        if experiment.max_hold_until < now {
            close_position(pool, market, portfolio, &experiment, "max_hold_time_exceeded").await?;
            continue;
        }

        let Some(current_price) = market.current_price(&experiment.ticker, false).await else {
            tracing::debug!(ticker = %experiment.ticker, "no current price, skipping this cycle");
            continue;
        };

        let entry_price = to_f64(experiment.entry_price);
        let stop_loss = to_f64(experiment.stop_loss_price);
        let take_profit = to_f64(experiment.take_profit_price);

        if let Some(reason) = decide_exit_reason(current_price, stop_loss, take_profit) {
            close_position(pool, market, portfolio, &experiment, reason).await?;
            continue;
        }

        let new_stop = update_trailing_stop(stop_loss, current_price, entry_price, portfolio.trailing_stop_activation_percent, portfolio.trailing_stop_distance_percent);
        if new_stop > stop_loss {
            repo::update_trailing_stop(pool, experiment.id, to_decimal(new_stop)).await?;
        }
    }

    Ok(())
}

async fn close_position(pool: &PgPool, market: &MarketDataAdapter, portfolio: &PortfolioSettings, experiment: &wavesens_core::types::Experiment, reason: &str) -> Result<()> {
    let quoted_price = market.current_price(&experiment.ticker, true).await.unwrap_or(to_f64(experiment.entry_price));
    let execution = market.realistic_execution(&experiment.ticker, exit_side(experiment.direction), to_f64(experiment.position_size)).await;
    let exit_price = execution.map(|e| e.execution_price).unwrap_or(quoted_price);

    let shares = to_f64(experiment.shares);
    let exit_commission = portfolio.calculate_commission(shares * exit_price);
    let accounting = calculate_exit(to_f64(experiment.entry_price), shares, to_f64(experiment.entry_commission), to_f64(experiment.position_size), exit_price, exit_commission);

    let now = Utc::now();
    let hold_duration_minutes = (now - experiment.entry_time).num_minutes();

    let (benchmark_return_percent, alpha) = match experiment.benchmark_entry_price {
        Some(entry) => match market.current_price(BENCHMARK_TICKER, true).await {
            Some(exit) => {
                let entry = to_f64(entry);
                let benchmark_return = (exit / entry - 1.0) * 100.0;
                (Some(benchmark_return), Some(accounting.return_percent - benchmark_return))
            }
            None => (None, None),
        },
        None => (None, None),
    };

    let (other_value, other_unrealized, other_count) = price_other_positions(pool, market, Some(experiment.id)).await?;

    repo::exit_position(
        pool,
        experiment.id,
        now,
        to_decimal(exit_price),
        reason,
        to_decimal(exit_commission),
        to_decimal(accounting.gross_pnl),
        to_decimal(accounting.net_pnl),
        to_decimal(accounting.return_percent),
        hold_duration_minutes,
        benchmark_return_percent.map(to_decimal),
        alpha.map(to_decimal),
        to_decimal(accounting.proceeds),
        to_decimal(other_value),
        to_decimal(other_unrealized),
        other_count,
        to_decimal(portfolio.initial_capital),
    )
    .await?;

    tracing::info!(
        experiment_id = experiment.id,
        ticker = %experiment.ticker,
        reason,
        exit_price,
        net_pnl = accounting.net_pnl,
        "closed position",
    );
    let message = format!("closed {} ({reason}) @ {exit_price:.2}, net_pnl={:.2} (experiment {})", experiment.ticker, accounting.net_pnl, experiment.id);
    repo::insert_service_log(pool, LogLevel::Info, &message, "experiment-manager").await.ok();

    Ok(())
}

/// Every `PORTFOLIO_SNAPSHOT_INTERVAL` seconds: price every active
/// position, append a new ledger row, and reset the daily counter at
/// the start of a new Eastern trading day.
pub async fn snapshot_cycle(pool: &PgPool, market: &MarketDataAdapter, portfolio: &PortfolioSettings, last_reset_day: &mut Option<chrono::DateTime<Utc>>) -> Result<()> {
    let now = Utc::now();
    let new_trading_day = match *last_reset_day {
        Some(last) => !wavesens_core::market_hours::same_eastern_day(last, now),
        None => false,
    };
    *last_reset_day = Some(now);

    let Some(latest) = repo::get_latest_snapshot(pool).await? else { return Ok(()) };
    let active = repo::get_active_experiments(pool).await?;

    let mut unrealized_pnl = 0.0;
    let mut positions_value = 0.0;
    for experiment in &active {
        let Some(price) = market.current_price(&experiment.ticker, true).await else { continue };
        let shares = to_f64(experiment.shares);
        positions_value += shares * price;
        unrealized_pnl += shares * (price - to_f64(experiment.entry_price));
    }

    let cash_balance = to_f64(latest.cash_balance);
    let total_value = cash_balance + positions_value;
    let realized_pnl_today = if new_trading_day { Decimal::ZERO } else { latest.realized_pnl_today };
    let daily_return = if portfolio.initial_capital > 0.0 { to_f64(realized_pnl_today) / portfolio.initial_capital * 100.0 } else { 0.0 };
    let total_return = if portfolio.initial_capital > 0.0 { (total_value - portfolio.initial_capital) / portfolio.initial_capital * 100.0 } else { 0.0 };

    repo::insert_snapshot(
        pool,
        &repo::SnapshotTotals {
            total_value: to_decimal(total_value),
            cash_balance: to_decimal(cash_balance),
            positions_count: active.len() as i32,
            unrealized_pnl: to_decimal(unrealized_pnl),
            realized_pnl_today,
            realized_pnl_total: latest.realized_pnl_total,
            daily_return: to_decimal(daily_return),
            total_return: to_decimal(total_return),
        },
    )
    .await?;

    tracing::debug!(total_value, cash_balance, positions = active.len(), "snapshot recorded");
    Ok(())
}
