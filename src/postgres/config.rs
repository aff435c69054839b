use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_postgres::Client;
use tokio_postgres::types::Type;

use crate::error::StoreError;

/// Upper bound on physical connections held by the pool.
pub const MAX_CONNECTIONS: u32 = 10;
/// A physical connection is closed once it has been open this long.
pub const MAX_CONN_LIFETIME: Duration = Duration::from_secs(60 * 60);
/// An idle physical connection is closed after this long without use.
pub const MAX_CONN_IDLE_TIME: Duration = Duration::from_secs(30 * 60);
/// How often the pool sweeps for expired or idle connections.
pub const HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(60);
/// Bound on pool construction plus the startup liveness check.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

// Userinfo, path and query components keep only unreserved characters literal.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Runs once on every newly established physical connection, before any caller can borrow it.
#[async_trait]
pub trait AfterConnect: Send + Sync + 'static {
    /// # Errors
    /// A failing hook fails that connection attempt.
    async fn after_connect(&self, client: &Client) -> Result<(), tokio_postgres::Error>;
}

/// Default post-connect hook: checks that the server accepts a `uuid` parameter before the
/// connection is handed out. The codec itself is built into the client, nothing is cached.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisterTypeCodecs;

#[async_trait]
impl AfterConnect for RegisterTypeCodecs {
    async fn after_connect(&self, client: &Client) -> Result<(), tokio_postgres::Error> {
        let stmt = client
            .prepare_typed("SELECT $1::uuid", &[Type::UUID])
            .await?;
        tracing::debug!(params = ?stmt.params(), "server accepts uuid parameters");
        Ok(())
    }
}

/// Pool tuning plus the post-connect hook. Built once at startup and never mutated.
#[derive(Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub max_lifetime: Duration,
    pub max_idle_time: Duration,
    pub health_check_period: Duration,
    pub after_connect: Arc<dyn AfterConnect>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: MAX_CONNECTIONS,
            max_lifetime: MAX_CONN_LIFETIME,
            max_idle_time: MAX_CONN_IDLE_TIME,
            health_check_period: HEALTH_CHECK_PERIOD,
            after_connect: Arc::new(RegisterTypeCodecs),
        }
    }
}

impl PoolSettings {
    /// Replace the post-connect hook, keeping the fixed tuning constants.
    #[must_use]
    pub fn with_after_connect(mut self, hook: Arc<dyn AfterConnect>) -> Self {
        self.after_connect = hook;
        self
    }
}

// Manual Debug implementation because the hook is a trait object
impl fmt::Debug for PoolSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSettings")
            .field("max_connections", &self.max_connections)
            .field("max_lifetime", &self.max_lifetime)
            .field("max_idle_time", &self.max_idle_time)
            .field("health_check_period", &self.health_check_period)
            .field("after_connect", &"<hook>")
            .finish()
    }
}

/// A parsed connection target together with the pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub pg_config: tokio_postgres::Config,
    pub settings: PoolSettings,
}

impl PoolConfig {
    /// Parse a connection URL. The pool settings are the fixed constants whatever the URL says.
    ///
    /// # Errors
    /// Returns `StoreError::ConfigError` for a malformed URL.
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        let pg_config = tokio_postgres::Config::from_str(url).map_err(|e| {
            tracing::error!(error = %e, "failed to parse database url");
            StoreError::ConfigError(format!("invalid connection url: {e}"))
        })?;

        Ok(Self {
            pg_config,
            settings: PoolSettings::default(),
        })
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PoolSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// The five connection components plus the schema used as the default search path.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub host: String,
    pub database: String,
    pub port: u16,
    pub schema: String,
}

impl Credentials {
    /// Assemble the connection URL.
    ///
    /// TLS is disabled (`sslmode=disable`) and `schema` becomes the session `search_path`.
    /// Every component is percent-encoded, so passwords may contain `@`, `#` or `/`.
    #[must_use]
    pub fn connection_url(&self) -> String {
        let search_path = format!("-c search_path={}", self.schema);
        format!(
            "postgres://{user}:{pass}@{host}:{port}/{db}?sslmode=disable&options={opts}",
            user = utf8_percent_encode(&self.username, COMPONENT),
            pass = utf8_percent_encode(&self.password, COMPONENT),
            host = self.host,
            port = self.port,
            db = utf8_percent_encode(&self.database, COMPONENT),
            opts = utf8_percent_encode(&search_path, COMPONENT),
        )
    }
}

// Keeps the password out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("port", &self.port)
            .field("schema", &self.schema)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(password: &str) -> Credentials {
        Credentials {
            username: "app".into(),
            password: password.into(),
            host: "db.internal".into(),
            database: "myport".into(),
            port: 5432,
            schema: "asset".into(),
        }
    }

    #[test]
    fn settings_match_constants_for_any_url() {
        for url in [
            "postgres://a:b@localhost:5432/x",
            "postgres://a:b@otherhost:6543/y?sslmode=disable&connect_timeout=3",
            "host=localhost user=a dbname=z",
        ] {
            let cfg = PoolConfig::from_url(url).expect("valid url");
            assert_eq!(cfg.settings.max_connections, 10);
            assert_eq!(cfg.settings.max_lifetime, Duration::from_secs(3600));
            assert_eq!(cfg.settings.max_idle_time, Duration::from_secs(1800));
            assert_eq!(cfg.settings.health_check_period, Duration::from_secs(60));
        }
    }

    #[test]
    fn malformed_url_fails_fast() {
        let err = PoolConfig::from_url("postgres://user@host:notaport/db").unwrap_err();
        assert!(matches!(err, StoreError::ConfigError(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn url_carries_schema_and_disables_tls() {
        let cfg = PoolConfig::from_url(&creds("secret").connection_url()).expect("valid url");
        let pg = &cfg.pg_config;
        assert_eq!(pg.get_user(), Some("app"));
        assert_eq!(pg.get_dbname(), Some("myport"));
        assert_eq!(pg.get_ports(), &[5432]);
        assert_eq!(pg.get_options(), Some("-c search_path=asset"));
        assert_eq!(pg.get_ssl_mode(), tokio_postgres::config::SslMode::Disable);
    }

    #[test]
    fn reserved_characters_in_password_survive() {
        let cfg = PoolConfig::from_url(&creds("p@ss#w/rd").connection_url()).expect("valid url");
        assert_eq!(cfg.pg_config.get_password(), Some("p@ss#w/rd".as_bytes()));
    }

    #[test]
    fn debug_redacts_password() {
        let printed = format!("{:?}", creds("hunter2"));
        assert!(!printed.contains("hunter2"));
    }
}
