//! Asset maintenance: writes to the `stock_books` ledger.

pub mod entity;
pub mod repo;

pub use entity::{InsertStockInput, InsertStockOutput};
pub use repo::{MaintenanceRepo, RepoDb};
