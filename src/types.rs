//! Re-exported types from external crates for convenience.
//!
//! These types are commonly used in this SDK and are re-exported here
//! so users don't need to add these dependencies to their `Cargo.toml`.

/// Date and time types for message timestamps.
pub use chrono::{DateTime, Utc};
/// Arbitrary JSON payloads attached to some messages.
pub use serde_json::Value;
/// Correlation identifiers for outbound messages.
pub use uuid::Uuid;
