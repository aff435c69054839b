use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One `stock_books` entry to record. Fields are stored as given; validation happens upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertStockInput {
    pub side: String,
    pub symbol: String,
    pub title: String,
    pub industry: String,
    pub sub_industry: String,
    pub market: String,
    pub amount: Decimal,
    pub price: Decimal,
    pub currency: String,
    pub created_by: String,
    pub updated_by: String,
}

/// Identifier the store generated for the inserted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertStockOutput {
    pub id: i64,
}
