use async_trait::async_trait;
use bb8::PooledConnection;
use tokio::runtime::Handle;

use crate::context::Context;
use crate::error::StoreError;
use crate::handle::StoreTransaction;
use crate::results::{ExecSummary, ResultSet};
use crate::types::RowValues;

use super::manager::PgManager;
use super::query::{execute_on_client, query_on_client, run_with_server_cancel};

/// A transaction on one checked-out connection, driven by explicit BEGIN/COMMIT/ROLLBACK.
pub struct PgTransaction {
    conn: Option<PooledConnection<'static, PgManager>>,
    /// True while the transaction is open and must be rolled back if dropped.
    needs_rollback: bool,
    /// Set when a statement was cancelled mid-flight; the server has aborted the transaction.
    interrupted: bool,
}

impl PgTransaction {
    /// Issue `BEGIN` on `conn` and take ownership of it until the transaction ends.
    ///
    /// The wrapper exists before `BEGIN` is sent, so dropping this future mid-round-trip
    /// still rolls back before the connection is reused.
    ///
    /// # Errors
    /// Returns `StoreError::PostgresError` if `BEGIN` fails; the connection goes back to the
    /// pool.
    pub(crate) async fn begin(
        conn: PooledConnection<'static, PgManager>,
    ) -> Result<Self, StoreError> {
        let tx = Self {
            conn: Some(conn),
            needs_rollback: true,
            interrupted: false,
        };
        tx.conn()?.simple_query("BEGIN").await?;
        Ok(tx)
    }

    fn conn(&self) -> Result<&PooledConnection<'static, PgManager>, StoreError> {
        self.conn.as_ref().ok_or_else(|| {
            StoreError::ExecutionError("postgres connection already taken".into())
        })
    }

    fn note_interruption<T>(&mut self, result: &Result<T, StoreError>) {
        if matches!(
            result,
            Err(StoreError::Cancelled | StoreError::DeadlineExceeded)
        ) {
            self.interrupted = true;
        }
    }

    async fn finish(mut self: Box<Self>, sql: &str) -> Result<(), StoreError> {
        let conn = self.conn.take().ok_or_else(|| {
            StoreError::ExecutionError("postgres connection already taken".into())
        })?;
        let outcome = conn.simple_query(sql).await;
        if outcome.is_err() {
            // Best-effort rollback before the connection returns to the pool.
            let _ = conn.simple_query("ROLLBACK").await;
        }
        self.needs_rollback = false;
        outcome?;
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn execute(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecSummary, StoreError> {
        let conn = self.conn()?;
        let result = run_with_server_cancel(ctx, conn, execute_on_client(conn, sql, params)).await;
        self.note_interruption(&result);
        result
    }

    async fn query(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, StoreError> {
        let conn = self.conn()?;
        let result = run_with_server_cancel(ctx, conn, query_on_client(conn, sql, params)).await;
        self.note_interruption(&result);
        result
    }

    // COMMIT and ROLLBACK run to completion once started; interrupting them would hand a
    // connection with an unknown transaction state back to the pool.
    async fn commit(self: Box<Self>, ctx: &Context) -> Result<(), StoreError> {
        // An aborted transaction answers COMMIT with a silent ROLLBACK.
        if ctx.is_cancelled() || self.interrupted {
            self.finish("ROLLBACK").await?;
            return Err(StoreError::Cancelled);
        }
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>, _ctx: &Context) -> Result<(), StoreError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if self.needs_rollback
            && let Some(conn) = self.conn.take()
            && let Ok(handle) = Handle::try_current()
        {
            handle.spawn(async move {
                let _ = conn.simple_query("ROLLBACK").await;
            });
        }
    }
}
