//! Convenient imports for common functionality.

pub use crate::context::Context;
pub use crate::error::StoreError;
pub use crate::handle::{StoreHandle, StoreTransaction};
pub use crate::inquiry::{AssetGoldOutput, AssetInquiryService, InquiryRepo, InquiryRepoDb, Service, Stock};
pub use crate::maintenance::{InsertStockInput, InsertStockOutput, MaintenanceRepo, RepoDb};
pub use crate::postgres::{Credentials, PgStore, PoolConfig, PoolSettings, PoolStatus};
pub use crate::results::{DbRow, ExecSummary, ResultSet};
pub use crate::types::RowValues;
