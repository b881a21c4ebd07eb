#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! Real-time notification client.
//!
//! This module speaks the notification protocol on top of the generic [`crate::ws`]
//! infrastructure: JSON text frames discriminated by a `type` field, job and repository
//! subscriptions that survive reconnects, and handler dispatch by message type.
//!
//! # Example
//!
//! ```rust, no_run
//! use notify_client_sdk::notify::{Client, Message, MessageType};
//! use notify_client_sdk::ws::{ConnectionOptions, Selector};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = ConnectionOptions::builder()
//!         .endpoint("wss://notify.example.com/ws")
//!         .scope("org-42")
//!         .build();
//!     let client = Client::new(options)?;
//!
//!     let _all = client.on(Selector::Wildcard, |message: &Message| {
//!         println!("{}: {message:?}", message.message_type());
//!     });
//!     let _state = client.on_connection_state_change(|state| println!("state: {state}"));
//!
//!     client.connect().await?;
//!     client.subscribe_to_repo("repo-1")?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     client.disconnect();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
#[cfg(feature = "heartbeats")]
pub mod keepalive;
pub mod types;

// Re-export commonly used types
pub use client::Client;
pub use codec::{NotificationCodec, decode, encode};
#[cfg(feature = "heartbeats")]
pub use keepalive::KeepAlive;
pub use types::request::SubscriptionRequest;
pub use types::response::{
    Chat, ChatResponse, Connected, ErrorMessage, JobProgress, JobStatus, Message, MessageType,
    Meta, Notification, NotificationLevel, RepoStatus, Status, StreamChunk, StreamEnd,
    StreamStart, SyncEvent,
};

pub use crate::ws::DecodeError;
