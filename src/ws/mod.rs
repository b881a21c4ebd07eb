//! Core connection infrastructure.
//!
//! This module provides generic connection management that can be specialized for different
//! real-time services using traits and the strategy pattern.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: Generic connection handler with reconnection, replay and dispatch
//! - [`SubscriberRegistry`]: Ordered per-key and wildcard handler lists
//! - [`ReconnectPolicy`]: Pure attempt-number to delay schedule
//! - [`MessageParser`]: Trait for parsing incoming text frames
//! - [`Transport`]: Trait for opening the underlying connection
//!
//! # Example
//!
//! ```ignore
//! // Define your message type
//! #[derive(Debug, Deserialize)]
//! struct MyMessage { kind: String }
//!
//! impl Routable for MyMessage {
//!     type Key = String;
//!     fn route_key(&self) -> String { self.kind.clone() }
//! }
//!
//! let connection = ConnectionManager::new(options, MyParser)?;
//! let _handle = connection.on(Selector::Wildcard, |message: &MyMessage| println!("{message:?}"));
//! connection.connect().await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod registry;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;
pub mod transport;

pub use config::{ConnectionOptions, ReconnectConfig, ReconnectPolicy};
pub use connection::{ConnectionManager, ConnectionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use error::{DecodeError, DecodeReason};
pub use registry::{Routable, Selector, SubscriberRegistry, Unsubscribe};
pub use traits::*;
pub use transport::WebSocketTransport;
