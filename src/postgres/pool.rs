use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};

use crate::context::Context;
use crate::error::StoreError;
use crate::handle::{StoreHandle, StoreTransaction};
use crate::results::{DbRow, ExecSummary, ResultSet};
use crate::types::RowValues;

use super::config::{Credentials, PoolConfig, PoolSettings, STARTUP_TIMEOUT};
use super::manager::PgManager;
use super::query::{execute_on_client, query_on_client, run_with_server_cancel};
use super::transaction::PgTransaction;

// Waiting for a free connection is bounded by the caller's context, not by the pool.
const CHECKOUT_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Connection counts reported by the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Physical connections currently open
    pub connections: u32,
    /// Open connections not checked out by anyone
    pub idle_connections: u32,
}

/// The shared Postgres pool behind the [`StoreHandle`] interface.
///
/// Clones share one pool. Construct it once at startup with [`PgStore::open`] and pass it to
/// every repository.
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<Mutex<Option<Pool<PgManager>>>>,
    settings: Arc<PoolSettings>,
}

// Manual Debug implementation because bb8's pool does not expose its manager
impl fmt::Debug for PgStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgStore")
            .field("settings", &self.settings)
            .field("status", &self.state())
            .finish()
    }
}

impl PgStore {
    /// Open the pool for the given credentials and verify the store is reachable.
    ///
    /// # Errors
    /// Every error is a fatal startup error: `ConfigError` for a malformed URL,
    /// `StartupTimeout` when construction plus verification exceed ten seconds, and
    /// `ConnectionError` when the liveness check cannot be completed.
    pub async fn open(credentials: &Credentials) -> Result<Self, StoreError> {
        Self::open_url(&credentials.connection_url()).await
    }

    /// Same as [`PgStore::open`] for an already assembled connection URL.
    ///
    /// # Errors
    /// See [`PgStore::open`].
    pub async fn open_url(url: &str) -> Result<Self, StoreError> {
        Self::open_with_config(PoolConfig::from_url(url)?, STARTUP_TIMEOUT).await
    }

    /// Build the pool from `config` and verify it, all within `startup_timeout`.
    ///
    /// # Errors
    /// See [`PgStore::open`].
    pub async fn open_with_config(
        config: PoolConfig,
        startup_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let result = tokio::time::timeout(startup_timeout, Self::build_and_verify(config))
            .await
            .unwrap_or(Err(StoreError::StartupTimeout(startup_timeout)));

        if let Err(e) = &result {
            tracing::error!(error = %e, "failed to open database pool");
        }
        result
    }

    async fn build_and_verify(config: PoolConfig) -> Result<Self, StoreError> {
        let PoolConfig {
            pg_config,
            settings,
        } = config;
        let manager = PgManager::new(pg_config, Arc::clone(&settings.after_connect));

        // No min_idle: the builder opens nothing, the verified connection below is the first.
        let pool = Pool::builder()
            .max_size(settings.max_connections)
            .max_lifetime(Some(settings.max_lifetime))
            .idle_timeout(Some(settings.max_idle_time))
            .reaper_rate(settings.health_check_period)
            .connection_timeout(CHECKOUT_WAIT)
            .test_on_check_out(true)
            .retry_connection(false)
            .build(manager)
            .await
            .map_err(|e| {
                StoreError::ConnectionError(format!("failed to create postgres pool: {e}"))
            })?;

        Self::verify(&pool).await?;

        tracing::info!(
            max_connections = settings.max_connections,
            max_lifetime = ?settings.max_lifetime,
            max_idle_time = ?settings.max_idle_time,
            health_check_period = ?settings.health_check_period,
            "database pool ready"
        );

        Ok(PgStore {
            pool: Arc::new(Mutex::new(Some(pool))),
            settings: Arc::new(settings),
        })
    }

    /// Open one physical connection outside the pool, ping it, and only then hand it to the
    /// pool as its first idle connection.
    ///
    /// Connecting directly surfaces the driver error ("connection refused", bad password)
    /// instead of a checkout that waits for a connection that never comes.
    async fn verify(pool: &Pool<PgManager>) -> Result<(), StoreError> {
        let conn = pool.dedicated_connection().await.map_err(|e| {
            tracing::warn!(error = %e, "startup connect failed");
            StoreError::ConnectionError(format!("could not connect to database: {e}"))
        })?;

        if let Err(e) = conn.simple_query("SELECT 1").await {
            tracing::warn!(error = %e, "startup ping failed");
            // Closes the connection; it never reaches the pool.
            drop(conn);
            return Err(StoreError::ConnectionError(format!(
                "could not ping database: {e}"
            )));
        }

        pool.add(conn).map_err(|_| {
            StoreError::ConnectionError("pool refused the verified connection".into())
        })
    }

    #[must_use]
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Connection counts, or all zeros once the store is closed.
    #[must_use]
    pub fn state(&self) -> PoolStatus {
        self.lock_pool()
            .as_ref()
            .map(|pool| {
                let state = pool.state();
                PoolStatus {
                    connections: state.connections,
                    idle_connections: state.idle_connections,
                }
            })
            .unwrap_or_default()
    }

    fn lock_pool(&self) -> MutexGuard<'_, Option<Pool<PgManager>>> {
        match self.pool.lock() {
            Ok(guard) => guard,
            // The guarded value is a plain Option; recover it.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn pool(&self) -> Result<Pool<PgManager>, StoreError> {
        self.lock_pool().clone().ok_or(StoreError::PoolClosed)
    }

    async fn checkout(&self) -> Result<PooledConnection<'static, PgManager>, StoreError> {
        let pool = self.pool()?;
        Ok(pool.get_owned().await?)
    }
}

#[async_trait]
impl StoreHandle for PgStore {
    async fn execute(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecSummary, StoreError> {
        let conn = ctx.run(self.checkout()).await?;
        run_with_server_cancel(ctx, &conn, execute_on_client(&conn, sql, params)).await
    }

    async fn query(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, StoreError> {
        let conn = ctx.run(self.checkout()).await?;
        run_with_server_cancel(ctx, &conn, query_on_client(&conn, sql, params)).await
    }

    async fn query_row(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<DbRow, StoreError> {
        self.query(ctx, sql, params)
            .await?
            .into_first()
            .ok_or(StoreError::NoRows)
    }

    async fn begin(&self, ctx: &Context) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = ctx
            .run(async {
                let conn = self.checkout().await?;
                PgTransaction::begin(conn).await
            })
            .await?;
        Ok(Box::new(tx))
    }

    async fn close(&self) {
        if self.lock_pool().take().is_some() {
            tracing::info!("database pool closed");
        }
    }
}
