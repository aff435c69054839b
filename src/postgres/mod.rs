// PostgreSQL module - the concrete store behind the capability interface
//
// - config: tuning constants, credentials -> URL, post-connect hook
// - manager: bb8 connection manager (physical connect, hook, validation)
// - pool: pool construction, startup verification, `StoreHandle` impl
// - params / query: value binding and row extraction
// - transaction: explicit BEGIN/COMMIT wrapper

pub mod config;
pub mod manager;
pub mod params;
pub mod pool;
pub mod query;
pub mod transaction;

pub use config::{AfterConnect, Credentials, PoolConfig, PoolSettings, RegisterTypeCodecs};
pub use manager::PgManager;
pub use pool::{PgStore, PoolStatus};
pub use transaction::PgTransaction;
