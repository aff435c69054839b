//! Asset inquiry: read-model projections over the `stock_books` ledger.

pub mod entity;
pub mod repo;
pub mod service;

pub use entity::{AssetGoldOutput, Stock};
pub use repo::{GOLD_MARKET, InquiryRepo, InquiryRepoDb};
pub use service::{AssetInquiryService, Service};
