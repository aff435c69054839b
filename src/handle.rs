//! The narrow capability interface repositories are written against.
//!
//! Nothing above this module sees a pool, a checkout, or a driver type. The Postgres store
//! ([`crate::postgres::PgStore`]) implements these traits, and so does the recording test
//! double in `test_utils`.

use async_trait::async_trait;

use crate::context::Context;
use crate::error::StoreError;
use crate::results::{DbRow, ExecSummary, ResultSet};
use crate::types::RowValues;

/// Statement execution against a shared store.
///
/// Implementations must be safe to call concurrently from many tasks without external locking.
#[async_trait]
pub trait StoreHandle: Send + Sync {
    /// Execute a statement and report how many rows it affected.
    ///
    /// # Errors
    /// Returns the store's error unchanged, or a cancellation-kind error if `ctx` fires first.
    async fn execute(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecSummary, StoreError>;

    /// Run a statement and collect every returned row.
    ///
    /// # Errors
    /// Returns the store's error unchanged, or a cancellation-kind error if `ctx` fires first.
    async fn query(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, StoreError>;

    /// Run a statement and return its first row.
    ///
    /// # Errors
    /// Returns `StoreError::NoRows` when the statement produced no rows.
    async fn query_row(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<DbRow, StoreError>;

    /// Begin a transaction that holds one connection until commit or rollback.
    ///
    /// # Errors
    /// Returns an error if no connection can be obtained or `BEGIN` fails.
    async fn begin(&self, ctx: &Context) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Stop handing out connections. Calls made after `close` fail with `StoreError::PoolClosed`.
    async fn close(&self);
}

/// An open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn execute(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecSummary, StoreError>;

    async fn query(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, StoreError>;

    async fn query_row(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<DbRow, StoreError> {
        self.query(ctx, sql, params)
            .await?
            .into_first()
            .ok_or(StoreError::NoRows)
    }

    async fn commit(self: Box<Self>, ctx: &Context) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>, ctx: &Context) -> Result<(), StoreError>;
}
