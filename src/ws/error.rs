#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

use super::registry::Routable;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// The server rejected the handshake as unauthorized or forbidden
    AuthenticationFailed {
        /// HTTP status returned by the handshake
        status: u16,
    },
    /// WebSocket connection was closed
    ConnectionClosed,
    /// Operation requires an open connection
    NotConnected,
    /// Operation timed out
    Timeout,
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::AuthenticationFailed { status } => {
                write!(f, "WebSocket authentication failed with status {status}")
            }
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::NotConnected => write!(f, "WebSocket is not connected"),
            Self::Timeout => write!(f, "WebSocket operation timed out"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl WsError {
    /// Whether this error is a handshake rejection by the server.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as TungsteniteError;

        if let TungsteniteError::Http(response) = &e
            && let Some(rejection) = handshake_rejection(response.status().as_u16())
        {
            return crate::error::Error::with_source(crate::error::Kind::WebSocket, rejection);
        }

        let ws = match e {
            TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed => {
                WsError::ConnectionClosed
            }
            other => WsError::Connection(other),
        };

        crate::error::Error::with_source(crate::error::Kind::WebSocket, ws)
    }
}

/// A text frame that does not match any known message shape.
///
/// Carries the offending raw text so it can be logged or inspected by decode-error listeners.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// The frame exactly as received
    pub raw: String,
    /// Why the frame was rejected
    pub reason: DecodeReason,
}

/// Why a frame failed to decode.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeReason {
    /// Not JSON, or JSON that is not an object
    Malformed(String),
    /// The object has no string discriminator field
    MissingType,
    /// The discriminator names no known variant
    UnknownType(String),
    /// A field required by the variant is absent or has the wrong type
    InvalidField {
        /// Dotted path of the offending field
        path: String,
        /// Underlying deserializer message
        message: String,
    },
}

impl DecodeError {
    #[must_use]
    pub fn new<S: Into<String>>(raw: S, reason: DecodeReason) -> Self {
        Self {
            raw: raw.into(),
            reason,
        }
    }

    /// Shorthand for a frame that could not be parsed at all.
    #[must_use]
    pub fn malformed<E: fmt::Display>(raw: &str, error: &E) -> Self {
        Self::new(raw, DecodeReason::Malformed(error.to_string()))
    }
}

impl fmt::Display for DecodeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed frame: {reason}"),
            Self::MissingType => write!(f, "missing message type"),
            Self::UnknownType(kind) => write!(f, "unknown message type {kind:?}"),
            Self::InvalidField { path, message } => {
                write!(f, "invalid field `{path}`: {message}")
            }
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to decode frame ({}): {}", self.reason, self.raw)
    }
}

impl StdError for DecodeError {}

impl From<DecodeError> for crate::error::Error {
    fn from(e: DecodeError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Decode, e)
    }
}

impl Routable for DecodeError {
    type Key = ();

    fn route_key(&self) {}
}

/// Classify a failed handshake status, returning an auth failure for 401 and 403.
fn handshake_rejection(status: u16) -> Option<WsError> {
    matches!(status, 401 | 403).then_some(WsError::AuthenticationFailed { status })
}
