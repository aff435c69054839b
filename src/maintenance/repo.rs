use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::StoreError;
use crate::handle::StoreHandle;
use crate::types::RowValues;

use super::entity::{InsertStockInput, InsertStockOutput};

const INSERT_STOCK: &str = "INSERT INTO stock_books
    (side, symbol, title, industry, sub_industry, market, amount, price, currency, created_by, updated_by)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    RETURNING id";

#[async_trait]
pub trait MaintenanceRepo: Send + Sync {
    /// Record one stock entry and return its generated id.
    ///
    /// # Errors
    /// Store failures are returned as-is under the `insert stock` context.
    /// `StoreError::NoRowsAffected` when the store accepted the statement but wrote nothing.
    async fn insert_stock(
        &self,
        ctx: &Context,
        input: InsertStockInput,
    ) -> Result<InsertStockOutput, StoreError>;
}

/// [`MaintenanceRepo`] over any [`StoreHandle`].
pub struct RepoDb {
    db: Arc<dyn StoreHandle>,
}

impl RepoDb {
    #[must_use]
    pub fn new(db: Arc<dyn StoreHandle>) -> Self {
        Self { db }
    }
}

fn insert_stock_params(input: InsertStockInput) -> Vec<RowValues> {
    vec![
        RowValues::Text(input.side),
        RowValues::Text(input.symbol),
        RowValues::Text(input.title),
        RowValues::Text(input.industry),
        RowValues::Text(input.sub_industry),
        RowValues::Text(input.market),
        RowValues::Decimal(input.amount),
        RowValues::Decimal(input.price),
        RowValues::Text(input.currency),
        RowValues::Text(input.created_by),
        RowValues::Text(input.updated_by),
    ]
}

#[async_trait]
impl MaintenanceRepo for RepoDb {
    async fn insert_stock(
        &self,
        ctx: &Context,
        input: InsertStockInput,
    ) -> Result<InsertStockOutput, StoreError> {
        const OP: &str = "insert stock";

        let params = insert_stock_params(input);
        let rs = self
            .db
            .query(ctx, INSERT_STOCK, &params)
            .await
            .map_err(|e| e.within(OP))?;

        if rs.rows_affected == 0 {
            return Err(StoreError::NoRowsAffected.within(OP));
        }

        let id = rs
            .first()
            .and_then(|row| row.get("id"))
            .and_then(RowValues::as_int)
            .ok_or_else(|| {
                StoreError::ExecutionError("insert returned no generated id".into()).within(OP)
            })?;

        tracing::debug!(id, "stock entry recorded");
        Ok(InsertStockOutput { id })
    }
}
