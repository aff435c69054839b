use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::context::Context;
use crate::error::StoreError;
use crate::handle::{StoreHandle, StoreTransaction};
use crate::results::{DbRow, ExecSummary, ResultSet};
use crate::types::RowValues;

/// Which capability was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Execute,
    Query,
    QueryRow,
    Begin,
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub sql: String,
    pub params: Vec<RowValues>,
}

/// A canned reply, consumed in FIFO order by statement calls.
#[derive(Debug)]
pub enum Canned {
    Exec(ExecSummary),
    Rows(ResultSet),
    Error(StoreError),
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<RecordedCall>,
    replies: VecDeque<Canned>,
    closed: bool,
}

/// Store substitute that records every call and answers from a queue of canned replies.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandle {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push_exec(&self, rows_affected: u64) {
        self.lock()
            .replies
            .push_back(Canned::Exec(ExecSummary::new(rows_affected)));
    }

    pub fn push_rows(&self, rows: ResultSet) {
        self.lock().replies.push_back(Canned::Rows(rows));
    }

    pub fn push_error(&self, err: StoreError) {
        self.lock().replies.push_back(Canned::Error(err));
    }

    /// Every call recorded so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn record(&self, kind: CallKind, sql: &str, params: &[RowValues]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(StoreError::PoolClosed);
        }
        inner.calls.push(RecordedCall {
            kind,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        Ok(())
    }

    fn next_reply(&self) -> Result<Canned, StoreError> {
        self.lock()
            .replies
            .pop_front()
            .ok_or_else(|| StoreError::ExecutionError("no canned reply queued".into()))
    }

    fn exec_reply(&self) -> Result<ExecSummary, StoreError> {
        match self.next_reply()? {
            Canned::Exec(summary) => Ok(summary),
            Canned::Rows(rs) => Ok(ExecSummary::new(rs.rows_affected)),
            Canned::Error(e) => Err(e),
        }
    }

    fn rows_reply(&self) -> Result<ResultSet, StoreError> {
        match self.next_reply()? {
            Canned::Rows(rs) => Ok(rs),
            Canned::Exec(_) => Err(StoreError::ExecutionError(
                "canned exec reply used for a query".into(),
            )),
            Canned::Error(e) => Err(e),
        }
    }
}

#[async_trait]
impl StoreHandle for RecordingHandle {
    async fn execute(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecSummary, StoreError> {
        ctx.run(async {
            self.record(CallKind::Execute, sql, params)?;
            self.exec_reply()
        })
        .await
    }

    async fn query(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, StoreError> {
        ctx.run(async {
            self.record(CallKind::Query, sql, params)?;
            self.rows_reply()
        })
        .await
    }

    async fn query_row(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<DbRow, StoreError> {
        ctx.run(async {
            self.record(CallKind::QueryRow, sql, params)?;
            self.rows_reply()?.into_first().ok_or(StoreError::NoRows)
        })
        .await
    }

    async fn begin(&self, ctx: &Context) -> Result<Box<dyn StoreTransaction>, StoreError> {
        ctx.run(async {
            self.record(CallKind::Begin, "BEGIN", &[])?;
            Ok(Box::new(RecordingTransaction {
                handle: self.clone(),
            }) as Box<dyn StoreTransaction>)
        })
        .await
    }

    async fn close(&self) {
        let mut inner = self.lock();
        inner.calls.push(RecordedCall {
            kind: CallKind::Close,
            sql: String::new(),
            params: Vec::new(),
        });
        inner.closed = true;
    }
}

/// Transaction half of [`RecordingHandle`]; records into the same call log.
pub struct RecordingTransaction {
    handle: RecordingHandle,
}

#[async_trait]
impl StoreTransaction for RecordingTransaction {
    async fn execute(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecSummary, StoreError> {
        self.handle.execute(ctx, sql, params).await
    }

    async fn query(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, StoreError> {
        self.handle.query(ctx, sql, params).await
    }

    async fn commit(self: Box<Self>, _ctx: &Context) -> Result<(), StoreError> {
        self.handle.record(CallKind::Commit, "COMMIT", &[])
    }

    async fn rollback(self: Box<Self>, _ctx: &Context) -> Result<(), StoreError> {
        self.handle.record(CallKind::Rollback, "ROLLBACK", &[])
    }
}
