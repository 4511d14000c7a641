mod prompts;

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use llm_client::LlmClient;
use rust_decimal::Decimal;
use ticker_validator::TickerValidator;
use tokio::signal::unix::SignalKind;
use wavesens_core::config::SignalExtractorSettings;
use wavesens_core::market_hours::{
    fallback_wave_for_age, market_status_at, next_market_open, wave_status_table, WAVE_BOUNDS_MINUTES,
};
use wavesens_core::types::{LogLevel, MarketConditions, NewsItem, SignalDirection};
use wavesens_store::{Listener, Store};

#[derive(Default)]
struct ExtractorStats {
    news_processed: u64,
    signals_generated: u64,
    errors: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    wavesens_core::logging::init_tracing();
    tracing::info!("Starting Signal Extractor");

    let config = SignalExtractorSettings::from_env()?;
    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;

    let llm = LlmClient::new(config.openrouter_api_key.clone(), config.llm_model.clone());
    let validator = TickerValidator::new();
    let mut stats = ExtractorStats::default();
    let started_at = Utc::now();

    // Sweep for significant news missed before this process started.
    for item in wavesens_store::repo::fetch_unprocessed_significant_news(store.pool()).await? {
        match process_news_item(&store, &llm, &validator, &config, item).await {
            Ok(signals) => {
                stats.news_processed += 1;
                stats.signals_generated += signals as u64;
            }
            Err(e) => {
                stats.errors += 1;
                tracing::error!(error = %e, "failed processing swept news item");
                wavesens_store::repo::insert_service_log(store.pool(), LogLevel::Error, &format!("failed processing swept news item: {e}"), "signal-extractor").await.ok();
            }
        }
    }

    let mut listener = Listener::connect(&config.database_url, "new_significant_news").await?;
    let mut stats_timer = tokio::time::interval(Duration::from_secs(60 * 60));
    stats_timer.tick().await; // first tick fires immediately; consume it so the cadence starts an hour out

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            notification = listener.recv() => {
                let news_id: i64 = match notification.and_then(|payload| payload.parse().map_err(|e| anyhow::anyhow!("bad payload: {e}"))) {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::warn!(error = %e, "discarding malformed notification");
                        continue;
                    }
                };

                if listener.just_reconnected() {
                    for item in wavesens_store::repo::fetch_unprocessed_significant_news(store.pool()).await.unwrap_or_default() {
                        match process_news_item(&store, &llm, &validator, &config, item).await {
                            Ok(signals) => {
                                stats.news_processed += 1;
                                stats.signals_generated += signals as u64;
                            }
                            Err(e) => {
                                stats.errors += 1;
                                tracing::error!(error = %e, "failed processing swept news item after reconnect");
                            }
                        }
                    }
                }

                let Ok(Some(item)) = wavesens_store::repo::fetch_news_item(store.pool(), news_id).await else {
                    continue;
                };
                match process_news_item(&store, &llm, &validator, &config, item).await {
                    Ok(signals) => {
                        stats.news_processed += 1;
                        stats.signals_generated += signals as u64;
                    }
                    Err(e) => {
                        stats.errors += 1;
                        tracing::error!(error = %e, news_id, "failed processing news item");
                    }
                }
            }
            _ = stats_timer.tick() => {
                tracing::info!(
                    news_processed = stats.news_processed,
                    signals_generated = stats.signals_generated,
                    errors = stats.errors,
                    uptime_minutes = (Utc::now() - started_at).num_minutes(),
                    "hourly stats",
                );
                let summary = format!(
                    "news_processed={} signals_generated={} errors={} uptime_min={}",
                    stats.news_processed, stats.signals_generated, stats.errors, (Utc::now() - started_at).num_minutes(),
                );
                wavesens_store::repo::insert_service_log(store.pool(), LogLevel::Info, &summary, "signal-extractor").await.ok();
            }
            _ = &mut shutdown => {
                tracing::info!("shutting down gracefully");
                break;
            }
        }
    }

    Ok(())
}

async fn process_news_item(
    store: &Store,
    llm: &LlmClient,
    validator: &TickerValidator,
    config: &SignalExtractorSettings,
    item: NewsItem,
) -> Result<usize> {
    if !item.is_significant || item.processed_by_block2 {
        return Ok(0);
    }

    let age_minutes = (Utc::now() - item.published_at).num_minutes();
    let market_status = market_status_at(Utc::now());
    let wave_table = wave_status_table(age_minutes);

    // Waves still pending require a live market to react in; if the
    // market is closed and most waves haven't been missed yet, defer
    // this item until the next open rather than score it against a
    // schedule that hasn't started ticking.
    if !market_status.is_open() && age_minutes < WAVE_BOUNDS_MINUTES[4].1 {
        let reopen = next_market_open(Utc::now());
        tracing::info!(news_id = item.id, reopen = %reopen, "market closed, deferring news item");
        wavesens_store::repo::mark_news_processed(store.pool(), item.id).await?;
        return Ok(0);
    }

    let wave_prompt = prompts::wave_analysis_prompt(&item.headline, item.summary.as_deref(), age_minutes, market_status.as_str(), &wave_table);
    let timeout = Duration::from_secs(config.llm_timeout_seconds);

    let wave_analysis = match llm.complete(&wave_prompt, config.llm_max_tokens, config.llm_temperature as f32, timeout).await {
        Ok(raw) => prompts::parse_wave_analysis(&raw),
        Err(e) => {
            tracing::warn!(error = %e, news_id = item.id, "wave analysis LLM call failed");
            None
        }
    };

    let (optimal_wave, news_type) = match &wave_analysis {
        Some(analysis) => {
            tracing::debug!(news_id = item.id, wave = analysis.optimal_wave, impact = %analysis.impact, reasoning = %analysis.reasoning, "wave analysis");
            (analysis.optimal_wave, analysis.news_type.clone())
        }
        None => (fallback_wave_for_age(age_minutes), "unknown".to_string()),
    };
    let wave_bounds = WAVE_BOUNDS_MINUTES[optimal_wave];

    let signal_prompt = prompts::signal_generation_prompt(&item.headline, item.summary.as_deref(), optimal_wave, wave_bounds, &news_type, config.max_signals_per_news);
    let candidates = match llm.complete(&signal_prompt, config.llm_max_tokens, config.llm_temperature as f32, timeout).await {
        Ok(raw) => prompts::parse_signal_candidates(&raw),
        Err(e) => {
            tracing::warn!(error = %e, news_id = item.id, "signal generation LLM call failed");
            Vec::new()
        }
    };

    let entry_start = item.published_at + chrono::Duration::minutes(wave_bounds.0);
    let entry_end = item.published_at + chrono::Duration::minutes(wave_bounds.1);
    let mut signals_persisted = 0usize;

    for candidate in candidates.into_iter().take(config.max_signals_per_news) {
        if candidate.expected_move_percent < config.min_expected_move_percent {
            continue;
        }
        if candidate.confidence < config.min_confidence {
            continue;
        }
        let Ok(direction) = SignalDirection::from_str(&candidate.action) else {
            continue;
        };

        let ticker_info = validator.validate(&candidate.ticker).await;
        if !ticker_info.exists {
            tracing::info!(ticker = %candidate.ticker, "ticker authoritatively invalid, dropping candidate");
            continue;
        }

        let market_conditions = serde_json::to_value(MarketConditions {
            ticker: candidate.ticker.clone(),
            expected_move_percent: candidate.expected_move_percent,
            default_stop_loss_percent: 3.0,
            default_take_profit_percent: 5.0,
            default_max_hold_hours: (wave_bounds.1 - wave_bounds.0) as f64 / 60.0,
            ticker_exists: ticker_info.exists,
            ticker_cached: ticker_info.cached,
        })
        .expect("MarketConditions always serializes");

        let confidence = Decimal::try_from(candidate.confidence / 100.0).unwrap_or_default();
        let wave_description = format!("{news_type} / {}", candidate.reasoning);

        let signal_id = wavesens_store::repo::insert_signal_and_mark_processed(
            store.pool(),
            item.id,
            direction,
            confidence,
            optimal_wave as i32,
            &wave_description,
            &candidate.reasoning,
            market_conditions,
            entry_start,
            entry_end,
        )
        .await?;

        tracing::info!(signal_id, ticker = %candidate.ticker, wave = optimal_wave, "signal persisted");
        let message = format!("signal {signal_id} for {} on wave {optimal_wave}: {} {}", candidate.ticker, direction, candidate.reasoning);
        wavesens_store::repo::insert_service_log(store.pool(), LogLevel::Info, &message, "signal-extractor").await.ok();
        signals_persisted += 1;
    }

    wavesens_store::repo::mark_news_processed(store.pool(), item.id).await.ok();
    Ok(signals_persisted)
}
