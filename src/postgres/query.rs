use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use futures_util::TryStreamExt;
use rust_decimal::Decimal;
use tokio_postgres::{Client, NoTls, Row, Statement};
use uuid::Uuid;

use crate::context::Context;
use crate::error::StoreError;
use crate::results::{ExecSummary, ResultSet};
use crate::types::RowValues;

use super::params::Params;

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `StoreError` if the column cannot be decoded.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, StoreError> {
    let type_info = row.columns()[idx].type_();

    let value = match type_info.name() {
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(|v| RowValues::Int(i64::from(v))),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(|v| RowValues::Int(i64::from(v))),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(RowValues::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| RowValues::Float(f64::from(v))),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(RowValues::Float),
        "numeric" => row.try_get::<_, Option<Decimal>>(idx)?.map(RowValues::Decimal),
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(RowValues::Bool),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(RowValues::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| RowValues::Timestamp(v.naive_utc())),
        "uuid" => row.try_get::<_, Option<Uuid>>(idx)?.map(RowValues::Uuid),
        "text" | "varchar" | "bpchar" | "name" => {
            row.try_get::<_, Option<String>>(idx)?.map(RowValues::Text)
        }
        other => {
            return Err(StoreError::ExecutionError(format!(
                "unsupported column type {other} for column {}",
                row.columns()[idx].name()
            )));
        }
    };

    Ok(value.unwrap_or(RowValues::Null))
}

/// Build a result set using statement metadata for column names.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn build_result_set_from_statement(
    stmt: &Statement,
    rows: &[Row],
) -> Result<ResultSet, StoreError> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let column_count = column_names.len();

    let mut result_set = ResultSet::with_columns(column_names, rows.len());
    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Run a statement on a client and collect its rows.
///
/// `rows_affected` comes from the command tag when the server sends one, so an
/// `INSERT ... RETURNING` reports the number of rows written.
///
/// # Errors
/// Returns errors from preparation, execution, or value extraction.
pub async fn query_on_client(
    client: &Client,
    query: &str,
    params: &[RowValues],
) -> Result<ResultSet, StoreError> {
    let stmt = client.prepare(query).await?;
    let converted = Params::convert(params);
    let stream = client
        .query_raw(&stmt, converted.as_refs().iter().copied())
        .await?;
    futures_util::pin_mut!(stream);

    let mut rows = Vec::new();
    while let Some(row) = stream.try_next().await? {
        rows.push(row);
    }

    let mut result_set = build_result_set_from_statement(&stmt, &rows)?;
    if let Some(affected) = stream.rows_affected() {
        result_set.rows_affected = affected;
    }
    Ok(result_set)
}

/// Execute a statement on a client without managing transactions.
///
/// # Errors
/// Returns errors from parameter binding or execution.
pub async fn execute_on_client(
    client: &Client,
    query: &str,
    params: &[RowValues],
) -> Result<ExecSummary, StoreError> {
    let converted = Params::convert(params);
    let rows = client.execute(query, converted.as_refs()).await?;
    Ok(ExecSummary::new(rows))
}

const CANCEL_REQUEST_WAIT: Duration = Duration::from_secs(2);

/// Run `fut` (a statement on `client`) under `ctx`, asking the server to cancel the statement
/// when the context fires first.
///
/// Dropping the future only stops the client side; without the cancel request the backend
/// keeps executing and the connection goes back to the pool still busy.
///
/// # Errors
/// Returns `StoreError::Cancelled` / `StoreError::DeadlineExceeded` when the context fires,
/// otherwise whatever `fut` returns.
pub async fn run_with_server_cancel<F, T>(
    ctx: &Context,
    client: &Client,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    if ctx.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    let cancel = client.cancel_token();
    let result = ctx.run(fut).await;

    if matches!(
        result,
        Err(StoreError::Cancelled | StoreError::DeadlineExceeded)
    ) {
        match tokio::time::timeout(CANCEL_REQUEST_WAIT, cancel.cancel_query(NoTls)).await {
            Ok(Ok(())) => tracing::debug!("sent cancel request for interrupted statement"),
            Ok(Err(e)) => tracing::warn!(error = %e, "cancel request failed"),
            Err(_) => tracing::warn!("cancel request timed out"),
        }
    }
    result
}
