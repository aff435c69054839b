/// Recording substitute for [`crate::handle::StoreHandle`]
pub mod recording;

/// Embedded `PostgreSQL` for integration tests
#[cfg(feature = "test-utils")]
pub mod postgres;

pub use recording::{CallKind, Canned, RecordedCall, RecordingHandle};
