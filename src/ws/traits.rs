//! Core traits for generic WebSocket infrastructure.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};
use url::Url;

use super::error::DecodeError;
use crate::Result;
use crate::error::Error;

/// One inbound event read from the transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A UTF-8 text frame
    Text(String),
    /// The peer closed the connection, with its close reason if one was given
    Close(Option<String>),
}

/// Outbound half of an open transport.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound half of an open transport. The stream ending means the connection is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// Minimal bidirectional text-frame channel the connection manager depends on.
///
/// The default implementation is [`super::transport::WebSocketTransport`]; tests and
/// alternative runtimes can plug in anything that yields a sink/stream pair.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new connection to `url`.
    ///
    /// Handshake rejections should be reported as
    /// [`super::WsError::AuthenticationFailed`] so that `stop_on_auth_failure` can see them.
    async fn open(&self, url: &Url) -> Result<(FrameSink, FrameStream)>;
}

/// Message parser trait for converting raw text frames to messages.
///
/// # Example
///
/// ```ignore
/// pub struct SimpleParser;
///
/// impl MessageParser<MyMessage> for SimpleParser {
///     fn parse(&self, text: &str) -> Result<MyMessage, DecodeError> {
///         serde_json::from_str(text).map_err(|e| DecodeError::malformed(text, &e))
///     }
/// }
/// ```
pub trait MessageParser<M>: Send + Sync + 'static {
    /// Parse one text frame into exactly one message, or explain why it does not match.
    fn parse(&self, text: &str) -> std::result::Result<M, DecodeError>;
}
