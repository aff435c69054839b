use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::context::Context;
use crate::error::StoreError;
use crate::handle::StoreHandle;
use crate::results::DbRow;
use crate::types::RowValues;

use super::entity::{AssetGoldOutput, Stock};

/// Market code under which gold holdings are booked in `stock_books`.
pub const GOLD_MARKET: &str = "GOLD";

// Sells reduce a position, every other side adds to it.
const GOLD_HOLDING: &str = "SELECT
    COALESCE(SUM(CASE WHEN LOWER(side) = 'sell' THEN -amount ELSE amount END), 0) AS amount,
    (ARRAY_AGG(price ORDER BY id DESC))[1] AS price,
    (ARRAY_AGG(currency ORDER BY id DESC))[1] AS currency
    FROM stock_books
    WHERE market = $1";

const STOCK_POSITIONS: &str = "SELECT
    symbol,
    SUM(CASE WHEN LOWER(side) = 'sell' THEN -amount ELSE amount END) AS quantity,
    (ARRAY_AGG(price ORDER BY id DESC))[1] AS price
    FROM stock_books
    WHERE market <> $1
    GROUP BY symbol
    HAVING SUM(CASE WHEN LOWER(side) = 'sell' THEN -amount ELSE amount END) <> 0
    ORDER BY symbol";

#[async_trait]
pub trait InquiryRepo: Send + Sync {
    /// Net gold holding, or `None` when no gold entry was ever booked.
    ///
    /// # Errors
    /// Store failures under the `inquiry asset gold` context.
    async fn asset_gold(&self, ctx: &Context) -> Result<Option<AssetGoldOutput>, StoreError>;

    /// Open stock positions, ordered by symbol.
    ///
    /// # Errors
    /// Store failures under the `inquiry stocks` context.
    async fn stocks(&self, ctx: &Context) -> Result<Vec<Stock>, StoreError>;
}

pub struct InquiryRepoDb {
    db: Arc<dyn StoreHandle>,
}

impl InquiryRepoDb {
    #[must_use]
    pub fn new(db: Arc<dyn StoreHandle>) -> Self {
        Self { db }
    }
}

fn decimal_column(row: &DbRow, column: &str) -> Result<Decimal, StoreError> {
    row.get(column)
        .and_then(RowValues::as_decimal)
        .ok_or_else(|| StoreError::ExecutionError(format!("column {column} is not numeric")))
}

fn text_column(row: &DbRow, column: &str) -> Result<String, StoreError> {
    row.get(column)
        .and_then(RowValues::as_text)
        .map(str::to_string)
        .ok_or_else(|| StoreError::ExecutionError(format!("column {column} is not text")))
}

#[async_trait]
impl InquiryRepo for InquiryRepoDb {
    async fn asset_gold(&self, ctx: &Context) -> Result<Option<AssetGoldOutput>, StoreError> {
        const OP: &str = "inquiry asset gold";

        let row = self
            .db
            .query_row(ctx, GOLD_HOLDING, &[RowValues::from(GOLD_MARKET)])
            .await
            .map_err(|e| e.within(OP))?;

        // The aggregate always yields one row; a NULL currency means nothing was booked.
        if row.get("currency").is_none_or(RowValues::is_null) {
            return Ok(None);
        }

        let gold = AssetGoldOutput {
            amount: decimal_column(&row, "amount").map_err(|e| e.within(OP))?,
            price: decimal_column(&row, "price").map_err(|e| e.within(OP))?,
            currency: text_column(&row, "currency").map_err(|e| e.within(OP))?,
        };
        Ok(Some(gold))
    }

    async fn stocks(&self, ctx: &Context) -> Result<Vec<Stock>, StoreError> {
        const OP: &str = "inquiry stocks";

        let rs = self
            .db
            .query(ctx, STOCK_POSITIONS, &[RowValues::from(GOLD_MARKET)])
            .await
            .map_err(|e| e.within(OP))?;

        rs.results
            .iter()
            .map(|row| {
                Ok(Stock {
                    symbol: text_column(row, "symbol")?,
                    quantity: decimal_column(row, "quantity")?,
                    price: decimal_column(row, "price")?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()
            .map_err(|e| e.within(OP))
    }
}
