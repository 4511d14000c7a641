use anyhow::{Context, Result};
use sqlx::postgres::{PgPoolOptions, PgPool};

use crate::schema::{CREATE_NOTIFY_FUNCTIONS, CREATE_TABLES};

/// Owns the shared connection pool. Mirrors `PortfolioDb` in shape
/// (a thin wrapper over a pool with a `migrate`/`init_schema` step and
/// a `pool()` accessor) but targets Postgres, since the store must
/// support LISTEN/NOTIFY.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connecting to store")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates every table, index, notify function and trigger if
    /// missing. Safe to call on every process startup.
    pub async fn migrate(&self) -> Result<()> {
        for statement in CREATE_TABLES.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await.context("running schema statement")?;
        }
        sqlx::query(CREATE_NOTIFY_FUNCTIONS)
            .execute(&self.pool)
            .await
            .context("installing notify triggers")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a live Postgres instance; exercised in CI with DATABASE_URL set"]
    async fn migrate_is_idempotent() {
        let database_url = std::env::var("DATABASE_URL").unwrap();
        let store = Store::connect(&database_url).await.unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
    }
}
