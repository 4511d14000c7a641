use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgListener;

/// A LISTEN connection that reconnects on error instead of giving up,
/// mirroring `listen_for_notifications`/`listen_for_signals` in the
/// Python originals: on any error, sleep 5s, reconnect, resume.
///
/// Delivery is at-least-once and notifications can be lost across a
/// reconnect, so every caller must sweep for missed rows itself right
/// after `Listener::connect` and again after every `recv` that returns
/// via the reconnect path (`Listener::just_reconnected`).
pub struct Listener {
    database_url: String,
    channel: &'static str,
    inner: PgListener,
    just_reconnected: bool,
}

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

impl Listener {
    pub async fn connect(database_url: &str, channel: &'static str) -> Result<Self> {
        let mut inner = PgListener::connect(database_url).await.context("connecting listener")?;
        inner.listen(channel).await.context("LISTEN")?;
        tracing::info!(channel, "listening for notifications");
        Ok(Self {
            database_url: database_url.to_string(),
            channel,
            inner,
            just_reconnected: false,
        })
    }

    /// True immediately after `recv` has reconnected — the caller
    /// should run its sweep query before processing the payload.
    pub fn just_reconnected(&self) -> bool {
        self.just_reconnected
    }

    /// Blocks for the next notification payload, transparently
    /// reconnecting (with the 5s delay the originals use) on any
    /// connection error.
    pub async fn recv(&mut self) -> Result<String> {
        self.just_reconnected = false;
        loop {
            match self.inner.recv().await {
                Ok(notification) => return Ok(notification.payload().to_string()),
                Err(e) => {
                    tracing::error!(channel = self.channel, error = %e, "listener error, reconnecting");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    match PgListener::connect(&self.database_url).await {
                        Ok(mut fresh) => {
                            if fresh.listen(self.channel).await.is_ok() {
                                self.inner = fresh;
                                self.just_reconnected = true;
                                tracing::info!(channel = self.channel, "listener reconnected");
                            }
                        }
                        Err(e) => {
                            tracing::error!(channel = self.channel, error = %e, "reconnect failed, retrying");
                        }
                    }
                }
            }
        }
    }
}
