use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Net gold holding with the most recently recorded price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetGoldOutput {
    pub amount: Decimal,
    pub price: Decimal,
    pub currency: String,
}

/// Net position in one symbol with the most recently recorded price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
}
