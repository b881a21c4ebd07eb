use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{DateTime, Utc, Value};
use crate::ws::Routable;

/// Every message exchanged over the notification channel.
///
/// Frames are JSON objects discriminated by their `type` field.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Progress of a long-running job
    JobProgress(JobProgress),
    /// Repository status change
    RepoStatus(RepoStatus),
    /// User-facing notification
    Notification(Notification),
    /// Repository synchronization event
    SyncEvent(SyncEvent),
    /// Chat message
    Chat(Chat),
    /// Reply to a chat message
    ChatResponse(ChatResponse),
    /// Start of a streamed reply
    StreamStart(StreamStart),
    /// One chunk of a streamed reply
    StreamChunk(StreamChunk),
    /// End of a streamed reply
    StreamEnd(StreamEnd),
    /// Server-side error report
    Error(ErrorMessage),
    /// Liveness probe
    Ping(Meta),
    /// Answer to a liveness probe
    Pong(Meta),
    /// Sent by the server once the session is established
    Connected(Connected),
    /// Generic status report
    Status(Status),
}

impl Message {
    /// The discriminator of this message.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::JobProgress(_) => MessageType::JobProgress,
            Self::RepoStatus(_) => MessageType::RepoStatus,
            Self::Notification(_) => MessageType::Notification,
            Self::SyncEvent(_) => MessageType::SyncEvent,
            Self::Chat(_) => MessageType::Chat,
            Self::ChatResponse(_) => MessageType::ChatResponse,
            Self::StreamStart(_) => MessageType::StreamStart,
            Self::StreamChunk(_) => MessageType::StreamChunk,
            Self::StreamEnd(_) => MessageType::StreamEnd,
            Self::Error(_) => MessageType::Error,
            Self::Ping(_) => MessageType::Ping,
            Self::Pong(_) => MessageType::Pong,
            Self::Connected(_) => MessageType::Connected,
            Self::Status(_) => MessageType::Status,
        }
    }

    /// The common envelope carried by every variant.
    #[must_use]
    pub const fn meta(&self) -> &Meta {
        match self {
            Self::JobProgress(m) => &m.meta,
            Self::RepoStatus(m) => &m.meta,
            Self::Notification(m) => &m.meta,
            Self::SyncEvent(m) => &m.meta,
            Self::Chat(m) => &m.meta,
            Self::ChatResponse(m) => &m.meta,
            Self::StreamStart(m) => &m.meta,
            Self::StreamChunk(m) => &m.meta,
            Self::StreamEnd(m) => &m.meta,
            Self::Error(m) => &m.meta,
            Self::Ping(meta) | Self::Pong(meta) => meta,
            Self::Connected(m) => &m.meta,
            Self::Status(m) => &m.meta,
        }
    }
}

impl Routable for Message {
    type Key = MessageType;

    fn route_key(&self) -> MessageType {
        self.message_type()
    }
}

/// Fieldless discriminator of [`Message`], displayed as its wire name.
#[non_exhaustive]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    JobProgress,
    RepoStatus,
    Notification,
    SyncEvent,
    Chat,
    ChatResponse,
    StreamStart,
    StreamChunk,
    StreamEnd,
    Error,
    Ping,
    Pong,
    Connected,
    Status,
}

impl MessageType {
    /// Every known message type, in declaration order.
    pub const ALL: [Self; 14] = [
        Self::JobProgress,
        Self::RepoStatus,
        Self::Notification,
        Self::SyncEvent,
        Self::Chat,
        Self::ChatResponse,
        Self::StreamStart,
        Self::StreamChunk,
        Self::StreamEnd,
        Self::Error,
        Self::Ping,
        Self::Pong,
        Self::Connected,
        Self::Status,
    ];
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_ref() == s)
            .ok_or_else(|| Error::validation(format!("unknown message type {s:?}")))
    }
}

/// Envelope fields shared by every message.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
pub struct Meta {
    /// Correlation identifier
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// When the message was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Session the message belongs to
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Lifecycle status of a job.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
    /// Unknown job status from the server (captures the raw value for debugging).
    #[serde(untagged)]
    Unknown(String),
}

impl JobStatus {
    /// Whether the job will make no further progress.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Progress report for a job.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct JobProgress {
    #[builder(default)]
    #[serde(flatten)]
    pub meta: Meta,
    #[builder(into)]
    pub job_id: String,
    pub status: JobStatus,
    /// Completion percentage
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_processed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_files: Option<u64>,
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct RepoStatus {
    #[builder(default)]
    #[serde(flatten)]
    pub meta: Meta,
    #[builder(into)]
    pub repo_id: String,
    #[builder(into)]
    pub status: String,
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Severity of a [`Notification`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
    /// Unknown level from the server (captures the raw value for debugging).
    #[serde(untagged)]
    Unknown(String),
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Notification {
    #[builder(default)]
    #[serde(flatten)]
    pub meta: Meta,
    #[builder(into)]
    pub title: String,
    #[builder(into)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<NotificationLevel>,
    /// Arbitrary attached payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct SyncEvent {
    #[builder(default)]
    #[serde(flatten)]
    pub meta: Meta,
    #[builder(into)]
    pub repo_id: String,
    /// Event name, e.g. `started` or `file_indexed`
    #[builder(into)]
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Chat {
    #[builder(default)]
    #[serde(flatten)]
    pub meta: Meta,
    #[builder(into)]
    pub content: String,
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct ChatResponse {
    #[builder(default)]
    #[serde(flatten)]
    pub meta: Meta,
    #[builder(into)]
    pub content: String,
    /// Whether this is the final part of the reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct StreamStart {
    #[builder(default)]
    #[serde(flatten)]
    pub meta: Meta,
    #[builder(into)]
    pub stream_id: String,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct StreamChunk {
    #[builder(default)]
    #[serde(flatten)]
    pub meta: Meta,
    #[builder(into)]
    pub stream_id: String,
    #[builder(into)]
    pub content: String,
    /// Position of the chunk within its stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct StreamEnd {
    #[builder(default)]
    #[serde(flatten)]
    pub meta: Meta,
    #[builder(into)]
    pub stream_id: String,
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error reported by the server.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct ErrorMessage {
    #[builder(default)]
    #[serde(flatten)]
    pub meta: Meta,
    #[builder(into)]
    pub message: String,
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Connected {
    #[builder(default)]
    #[serde(flatten)]
    pub meta: Meta,
    /// Identifier the server assigned to this client
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Status {
    #[builder(default)]
    #[serde(flatten)]
    pub meta: Meta,
    #[builder(into)]
    pub status: String,
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
