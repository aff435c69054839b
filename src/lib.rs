//! Pooled PostgreSQL access and asset repositories for a portfolio tracker.
//!
//! [`postgres::PgStore`] owns the connection pool and implements the narrow
//! [`handle::StoreHandle`] interface. Repositories and services depend on that interface
//! only, so the recording double in `test_utils` can stand in for the whole store.

pub mod context;
pub mod error;
pub mod handle;
pub mod inquiry;
pub mod maintenance;
pub mod postgres;
pub mod prelude;
pub mod results;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use context::Context;
pub use error::StoreError;
pub use handle::{StoreHandle, StoreTransaction};
pub use postgres::{Credentials, PgStore};
