mod news_feed;
mod scoring;

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use llm_client::LlmClient;
use news_feed::NewsFeedClient;
use rust_decimal::Decimal;
use tokio::signal::unix::SignalKind;
use tokio::time;
use wavesens_core::config::NewsAnalyzerSettings;
use wavesens_core::market_hours::market_status_at;
use wavesens_core::types::LogLevel;
use wavesens_store::Store;

#[derive(Default)]
struct CycleStats {
    checks: u64,
    processed: u64,
    significant: u64,
    errors: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    wavesens_core::logging::init_tracing();
    tracing::info!("Starting News Analyzer");

    let config = NewsAnalyzerSettings::from_env()?;
    tracing::info!(threshold = config.significance_threshold, interval_s = config.check_interval_seconds, "configuration loaded");

    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;
    tracing::info!("store ready");

    let feed = NewsFeedClient::new(config.finnhub_api_key.clone());
    let llm = LlmClient::new(config.openrouter_api_key.clone(), config.llm_model.clone());

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    };
    tokio::pin!(shutdown);

    let mut stats = CycleStats::default();
    let started_at = Utc::now();
    let mut last_stats_log = Utc::now();

    if config.run_once {
        if let Err(e) = ingest_cycle(&store, &feed, &llm, &config, &mut stats).await {
            tracing::error!(error = %e, "ingest cycle failed");
        }
        return Ok(());
    }

    loop {
        let market_open = market_status_at(Utc::now()).is_open();
        let sleep_for = if market_open {
            Duration::from_secs(config.check_interval_seconds)
        } else if Utc::now().with_timezone(&chrono_tz::US::Eastern).format("%u").to_string().parse::<u32>().unwrap_or(1) >= 6 {
            Duration::from_secs(60 * 60)
        } else {
            Duration::from_secs(30 * 60)
        };

        tokio::select! {
            _ = time::sleep(sleep_for) => {
                if market_open {
                    if let Err(e) = ingest_cycle(&store, &feed, &llm, &config, &mut stats).await {
                        tracing::error!(error = %e, "ingest cycle failed");
                        stats.errors += 1;
                        wavesens_store::repo::insert_service_log(store.pool(), LogLevel::Error, &format!("ingest cycle failed: {e}"), "news-analyzer").await.ok();
                    }
                } else {
                    tracing::info!("market closed, sleeping");
                }

                if (Utc::now() - last_stats_log).num_minutes() >= 60 {
                    tracing::info!(
                        checks = stats.checks,
                        processed = stats.processed,
                        significant = stats.significant,
                        errors = stats.errors,
                        uptime_minutes = (Utc::now() - started_at).num_minutes(),
                        "hourly stats",
                    );
                    let summary = format!(
                        "checks={} processed={} significant={} errors={} uptime_min={}",
                        stats.checks, stats.processed, stats.significant, stats.errors, (Utc::now() - started_at).num_minutes(),
                    );
                    wavesens_store::repo::insert_service_log(store.pool(), LogLevel::Info, &summary, "news-analyzer").await.ok();
                    last_stats_log = Utc::now();
                }
            }
            _ = &mut shutdown => {
                tracing::info!("shutting down gracefully");
                break;
            }
        }
    }

    Ok(())
}

async fn ingest_cycle(
    store: &Store,
    feed: &NewsFeedClient,
    llm: &LlmClient,
    config: &NewsAnalyzerSettings,
    stats: &mut CycleStats,
) -> Result<()> {
    stats.checks += 1;

    let items = match feed.fetch_latest(config.max_news_per_check).await {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(error = %e, "news feed fetch failed, continuing");
            stats.errors += 1;
            return Ok(());
        }
    };

    for item in items {
        let age = Utc::now() - item.published_at;
        if age.num_hours() > config.skip_news_older_hours {
            continue;
        }
        if wavesens_store::repo::news_item_exists(store.pool(), &item.external_id).await? {
            continue;
        }

        let prompt = scoring::build_prompt(&item.headline, item.summary.as_deref());
        let timeout = Duration::from_secs(config.llm_timeout_seconds);

        let (score, reasoning) = match llm.complete(&prompt, config.llm_max_tokens, config.llm_temperature as f32, timeout).await {
            Ok(raw) => {
                let result = scoring::parse_response(&raw);
                (result.score, result.reasoning)
            }
            Err(e) => {
                tracing::warn!(error = %e, news_id = %item.external_id, "LLM scoring failed, recording as non-significant");
                stats.errors += 1;
                (0.0, format!("error: {e}"))
            }
        };

        let is_significant = score >= config.significance_threshold;
        let score_decimal = Decimal::try_from(score).unwrap_or_default();

        wavesens_store::repo::insert_news_item(
            store.pool(),
            &item.external_id,
            &item.headline,
            item.summary.as_deref(),
            item.url.as_deref(),
            item.published_at,
            score_decimal,
            &reasoning,
            is_significant,
        )
        .await?;

        stats.processed += 1;
        if is_significant {
            stats.significant += 1;
            tracing::info!(news_id = %item.external_id, score, "significant news item persisted");
            let message = format!("significant news {} scored {score}: {}", item.external_id, item.headline);
            wavesens_store::repo::insert_service_log(store.pool(), LogLevel::Info, &message, "news-analyzer").await.ok();
        }
    }

    Ok(())
}
