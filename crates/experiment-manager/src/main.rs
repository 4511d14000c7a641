mod admission;
mod engine;
mod hold_window;

use std::sync::Arc;

use anyhow::Result;
use market_data::MarketDataAdapter;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use wavesens_core::config::PortfolioSettings;
use wavesens_core::types::LogLevel;
use wavesens_store::{Listener, Store};

#[tokio::main]
async fn main() -> Result<()> {
    wavesens_core::logging::init_tracing();
    tracing::info!("Starting Experiment Manager");

    let config = wavesens_core::config::ExperimentManagerSettings::from_env()?;
    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;

    let initial_capital = rust_decimal::Decimal::try_from(config.portfolio.initial_capital).unwrap_or_default();
    wavesens_store::repo::create_initial_snapshot_if_missing(store.pool(), initial_capital).await?;

    let market = Arc::new(MarketDataAdapter::new(config.finnhub_api_key.clone(), config.alpha_vantage_api_key.clone()));
    let database_url = config.database_url.clone();
    let portfolio = config.portfolio;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let signal_intake = tokio::spawn(run_signal_intake(
        store.clone(),
        database_url,
        market.clone(),
        portfolio.clone(),
        shutdown_rx.clone(),
    ));
    let monitor = tokio::spawn(run_monitor_loop(store.clone(), market.clone(), portfolio.clone(), shutdown_rx.clone()));
    let snapshot = tokio::spawn(run_snapshot_loop(store, market, portfolio, shutdown_rx));

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
    }
    tracing::info!("shutting down gracefully");
    shutdown_tx.send(true).ok();

    let _ = tokio::join!(signal_intake, monitor, snapshot);
    Ok(())
}

async fn run_signal_intake(
    store: Store,
    database_url: String,
    market: Arc<MarketDataAdapter>,
    portfolio: PortfolioSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    for signal_id in wavesens_store::repo::fetch_unconsumed_signals(store.pool()).await.unwrap_or_default() {
        if let Err(e) = engine::on_new_signal(store.pool(), &market, &portfolio, signal_id).await {
            tracing::error!(error = %e, signal_id, "failed processing swept signal");
        }
    }

    let mut listener = match Listener::connect(&database_url, "new_trading_signals").await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, "failed to start signal listener");
            return;
        }
    };

    loop {
        tokio::select! {
            notification = listener.recv() => {
                let signal_id: i64 = match notification.and_then(|payload| payload.parse().map_err(|e| anyhow::anyhow!("bad payload: {e}"))) {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::warn!(error = %e, "discarding malformed notification");
                        continue;
                    }
                };

                if listener.just_reconnected() {
                    for pending in wavesens_store::repo::fetch_unconsumed_signals(store.pool()).await.unwrap_or_default() {
                        if let Err(e) = engine::on_new_signal(store.pool(), &market, &portfolio, pending).await {
                            tracing::error!(error = %e, signal_id = pending, "failed processing swept signal after reconnect");
                        }
                    }
                }

                if let Err(e) = engine::on_new_signal(store.pool(), &market, &portfolio, signal_id).await {
                    tracing::error!(error = %e, signal_id, "failed processing signal");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn run_monitor_loop(store: Store, market: Arc<MarketDataAdapter>, portfolio: PortfolioSettings, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(Duration::from_secs(portfolio.position_check_interval_seconds));
    let mut stats_timer = interval(Duration::from_secs(60 * 60));
    stats_timer.tick().await;
    let started_at = chrono::Utc::now();
    let mut checks: u64 = 0;
    let mut errors: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                checks += 1;
                if let Err(e) = engine::monitor_cycle(store.pool(), &market, &portfolio).await {
                    errors += 1;
                    tracing::error!(error = %e, "monitor cycle failed");
                    wavesens_store::repo::insert_service_log(store.pool(), LogLevel::Error, &format!("monitor cycle failed: {e}"), "experiment-manager").await.ok();
                }
            }
            _ = stats_timer.tick() => {
                let (fresh, total) = market.cache_stats();
                tracing::info!(
                    checks,
                    errors,
                    cache_fresh = fresh,
                    cache_total = total,
                    uptime_minutes = (chrono::Utc::now() - started_at).num_minutes(),
                    "hourly stats",
                );
                let summary = format!(
                    "checks={checks} errors={errors} cache_fresh={fresh} cache_total={total} uptime_min={}",
                    (chrono::Utc::now() - started_at).num_minutes(),
                );
                wavesens_store::repo::insert_service_log(store.pool(), LogLevel::Info, &summary, "experiment-manager").await.ok();
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn run_snapshot_loop(store: Store, market: Arc<MarketDataAdapter>, portfolio: PortfolioSettings, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(Duration::from_secs(portfolio.portfolio_snapshot_interval_seconds));
    let mut last_reset_day = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = engine::snapshot_cycle(store.pool(), &market, &portfolio, &mut last_reset_day).await {
                    tracing::error!(error = %e, "snapshot cycle failed");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
