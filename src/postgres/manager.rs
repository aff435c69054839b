use std::future::Future;
use std::sync::Arc;

use bb8::ManageConnection;
use tokio_postgres::{Client, NoTls};

use super::config::AfterConnect;

/// bb8 manager for Postgres clients.
///
/// `connect` is the only place physical connections are opened, so the post-connect hook runs
/// exactly once per physical connection no matter how often it is checked out afterwards.
pub struct PgManager {
    config: tokio_postgres::Config,
    after_connect: Arc<dyn AfterConnect>,
}

impl PgManager {
    #[must_use]
    pub fn new(config: tokio_postgres::Config, after_connect: Arc<dyn AfterConnect>) -> Self {
        Self {
            config,
            after_connect,
        }
    }
}

impl ManageConnection for PgManager {
    type Connection = Client;
    type Error = tokio_postgres::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let cfg = self.config.clone();
        let hook = Arc::clone(&self.after_connect);
        async move {
            tracing::debug!(
                hosts = ?cfg.get_hosts(),
                db = ?cfg.get_dbname(),
                user = ?cfg.get_user(),
                "opening physical connection"
            );
            let (client, connection) = cfg.connect(NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::warn!(error = %e, "postgres connection closed with error");
                }
            });
            hook.after_connect(&client).await?;
            tracing::debug!("physical connection established");
            Ok(client)
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.simple_query("SELECT 1").await.map(|_| ()) }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}
