use postgresql_embedded::PostgreSQL;

use crate::context::Context;
use crate::error::StoreError;
use crate::handle::StoreHandle;
use crate::postgres::Credentials;

/// Schema and table the repositories expect.
pub const STOCK_BOOKS_DDL: &str = "CREATE TABLE IF NOT EXISTS stock_books (
    id BIGSERIAL PRIMARY KEY,
    side TEXT NOT NULL,
    symbol TEXT NOT NULL,
    title TEXT NOT NULL,
    industry TEXT NOT NULL,
    sub_industry TEXT NOT NULL,
    market TEXT NOT NULL,
    amount NUMERIC(20, 8) NOT NULL,
    price NUMERIC(20, 8) NOT NULL,
    currency TEXT NOT NULL,
    created_by TEXT NOT NULL,
    updated_by TEXT NOT NULL,
    UNIQUE (symbol, side, created_by, amount, price)
)";

/// Represents a running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    /// Credentials for the test database, schema included
    pub credentials: Credentials,
}

/// Start an embedded `PostgreSQL` server and create `db_name` on it.
///
/// # Errors
/// Returns an error if the server cannot be set up or started, or the database cannot be
/// created.
pub async fn start_embedded_postgres(
    db_name: &str,
    schema: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error + Send + Sync>> {
    let mut postgresql = PostgreSQL::default();

    // Setup PostgreSQL binaries (bundled, so no download conflicts)
    postgresql.setup().await?;
    postgresql.start().await?;
    postgresql.create_database(db_name).await?;

    let settings = postgresql.settings();
    let credentials = Credentials {
        username: settings.username.clone(),
        password: settings.password.clone(),
        host: settings.host.clone(),
        database: db_name.to_string(),
        port: settings.port,
        schema: schema.to_string(),
    };
    tracing::info!(port = credentials.port, db = db_name, "embedded postgres started");

    Ok(EmbeddedPostgres {
        postgresql,
        credentials,
    })
}

impl EmbeddedPostgres {
    /// Stop the server; errors on shutdown are ignored.
    pub async fn stop(self) {
        let _ = self.postgresql.stop().await;
    }
}

/// Create the schema named in the credentials and the `stock_books` table inside it.
///
/// # Errors
/// Returns the store error from either DDL statement.
pub async fn create_stock_books(
    db: &dyn StoreHandle,
    credentials: &Credentials,
) -> Result<(), StoreError> {
    let ctx = Context::background();
    let create_schema = format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", credentials.schema);
    db.execute(&ctx, &create_schema, &[]).await?;
    db.execute(&ctx, STOCK_BOOKS_DDL, &[]).await?;
    Ok(())
}
