//! Conversion between text frames and [`Message`]s.
//!
//! Decoding happens in two steps. The `type` discriminator is peeked first without building the
//! message, so an unknown or missing type is reported as such instead of as a generic shape
//! mismatch. The payload of the recognised variant is then deserialized while tracking the path
//! of the field that failed, if any.

use std::fmt;

use serde::Deserializer as _;
use serde::de::{DeserializeOwned, IgnoredAny, MapAccess, Visitor};
use serde_json::{Deserializer, Value};

use super::types::response::{
    Chat, ChatResponse, Connected, ErrorMessage, JobProgress, Message, MessageType, Meta,
    Notification, RepoStatus, Status, StreamChunk, StreamEnd, StreamStart, SyncEvent,
};
use crate::Result;
use crate::ws::{DecodeError, DecodeReason, MessageParser};

/// Name of the discriminator field.
const TYPE_FIELD: &str = "type";

/// Result of peeking at the discriminator without full deserialization.
enum Discriminator {
    /// No `type` field at all
    Missing,
    /// A `type` field that is not a string
    NotString,
    /// The raw `type` value
    Present(String),
}

/// Extracts the `type` field from a JSON object, skipping every other value.
fn peek_discriminator(raw: &str) -> std::result::Result<Discriminator, serde_json::Error> {
    struct DiscriminatorPeeker;

    impl<'de> Visitor<'de> for DiscriminatorPeeker {
        type Value = Discriminator;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a JSON object")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut discriminator = Discriminator::Missing;
            while let Some(key) = map.next_key::<String>()? {
                if key == TYPE_FIELD {
                    discriminator = match map.next_value::<Value>()? {
                        Value::String(kind) => Discriminator::Present(kind),
                        _ => Discriminator::NotString,
                    };
                } else {
                    map.next_value::<IgnoredAny>()?;
                }
            }
            Ok(discriminator)
        }
    }

    let mut de = Deserializer::from_str(raw);
    let discriminator = de.deserialize_map(DiscriminatorPeeker)?;
    de.end()?;
    Ok(discriminator)
}

/// Deserialize one variant payload, reporting the path of the offending field on failure.
fn payload<T: DeserializeOwned>(raw: &str) -> std::result::Result<T, DecodeError> {
    let mut de = Deserializer::from_str(raw);
    serde_path_to_error::deserialize(&mut de).map_err(|e| {
        let path = e.path().to_string();
        DecodeError::new(
            raw,
            DecodeReason::InvalidField {
                path,
                message: e.into_inner().to_string(),
            },
        )
    })
}

/// Parse one text frame into exactly one [`Message`].
///
/// Never panics. The returned error carries the raw frame.
pub fn decode(raw: &str) -> std::result::Result<Message, DecodeError> {
    let kind = match peek_discriminator(raw) {
        Ok(Discriminator::Present(kind)) => kind,
        Ok(Discriminator::Missing | Discriminator::NotString) => {
            return Err(DecodeError::new(raw, DecodeReason::MissingType));
        }
        Err(e) => return Err(DecodeError::malformed(raw, &e)),
    };

    let Ok(kind) = kind.parse::<MessageType>() else {
        return Err(DecodeError::new(raw, DecodeReason::UnknownType(kind)));
    };

    let message = match kind {
        MessageType::JobProgress => Message::JobProgress(payload::<JobProgress>(raw)?),
        MessageType::RepoStatus => Message::RepoStatus(payload::<RepoStatus>(raw)?),
        MessageType::Notification => Message::Notification(payload::<Notification>(raw)?),
        MessageType::SyncEvent => Message::SyncEvent(payload::<SyncEvent>(raw)?),
        MessageType::Chat => Message::Chat(payload::<Chat>(raw)?),
        MessageType::ChatResponse => Message::ChatResponse(payload::<ChatResponse>(raw)?),
        MessageType::StreamStart => Message::StreamStart(payload::<StreamStart>(raw)?),
        MessageType::StreamChunk => Message::StreamChunk(payload::<StreamChunk>(raw)?),
        MessageType::StreamEnd => Message::StreamEnd(payload::<StreamEnd>(raw)?),
        MessageType::Error => Message::Error(payload::<ErrorMessage>(raw)?),
        MessageType::Ping => Message::Ping(payload::<Meta>(raw)?),
        MessageType::Pong => Message::Pong(payload::<Meta>(raw)?),
        MessageType::Connected => Message::Connected(payload::<Connected>(raw)?),
        MessageType::Status => Message::Status(payload::<Status>(raw)?),
    };

    Ok(message)
}

/// Serialize a [`Message`] into a text frame. Lossless for every field present: numbers are
/// `f64` and are written in their shortest round-tripping form.
pub fn encode(message: &Message) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// [`MessageParser`] for the notification protocol.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationCodec;

impl MessageParser<Message> for NotificationCodec {
    fn parse(&self, text: &str) -> std::result::Result<Message, DecodeError> {
        decode(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::notify::types::response::{JobStatus, NotificationLevel};
    use crate::types::{DateTime, Utc};

    fn reason(raw: &str) -> DecodeReason {
        decode(raw).unwrap_err().reason
    }

    #[test]
    fn decode_job_progress_frame() {
        let raw = r#"{"type":"job_progress","job_id":"j1","status":"processing","progress":42}"#;

        let Message::JobProgress(job) = decode(raw).unwrap() else {
            panic!("Expected JobProgress message");
        };
        assert_eq!(job.job_id, "j1");
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, 42.0);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = r#"{"type":"bogus","x":1}"#;

        let err = decode(raw).unwrap_err();
        assert_eq!(err.reason, DecodeReason::UnknownType("bogus".to_owned()));
        assert_eq!(err.raw, raw);
    }

    #[test]
    fn missing_or_non_string_type_is_rejected() {
        assert_eq!(reason(r#"{"job_id":"j1"}"#), DecodeReason::MissingType);
        assert_eq!(reason(r#"{"type":7}"#), DecodeReason::MissingType);
        assert_eq!(reason(r#"{"type":null}"#), DecodeReason::MissingType);
    }

    #[test]
    fn mistyped_field_reports_its_path() {
        let raw = r#"{"type":"job_progress","job_id":"j1","status":"queued","progress":"lots"}"#;

        let DecodeReason::InvalidField { path, .. } = reason(raw) else {
            panic!("Expected InvalidField");
        };
        assert_eq!(path, "progress");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let raw = r#"{"type":"repo_status","status":"ready"}"#;

        let DecodeReason::InvalidField { message, .. } = reason(raw) else {
            panic!("Expected InvalidField");
        };
        assert!(message.contains("repo_id"), "{message}");
    }

    #[test]
    fn non_json_and_non_objects_are_malformed() {
        for raw in ["", "{", "not json", "null", "[1,2]", "42", r#"{"type":"ping"} trailing"#] {
            assert!(
                matches!(reason(raw), DecodeReason::Malformed(_)),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn type_anywhere_in_object_is_found() {
        let raw = r#"{"stream_id":"s1","content":"hi","index":3,"type":"stream_chunk"}"#;

        let message = decode(raw).unwrap();
        assert_eq!(message.message_type(), MessageType::StreamChunk);
    }

    #[test]
    fn envelope_fields_are_decoded() {
        let raw = r#"{"type":"pong","id":"abc","session_id":"s-1","timestamp":"2026-01-02T03:04:05Z"}"#;

        let meta = decode(raw).unwrap().meta().clone();
        assert_eq!(meta.id.as_deref(), Some("abc"));
        assert_eq!(meta.session_id.as_deref(), Some("s-1"));
        assert_eq!(
            meta.timestamp,
            Some("2026-01-02T03:04:05Z".parse::<DateTime<Utc>>().unwrap())
        );
    }

    #[test]
    fn decode_inverts_encode_for_every_variant() {
        let meta = Meta::builder()
            .id("m-1")
            .timestamp("2026-10-17T08:30:00Z".parse().unwrap())
            .session_id("s-9")
            .build();

        let messages = vec![
            Message::JobProgress(
                JobProgress::builder()
                    .meta(meta.clone())
                    .job_id("j1")
                    .status(JobStatus::Unknown("paused".to_owned()))
                    .progress(12.5)
                    .files_processed(3)
                    .total_files(8)
                    .message("indexing")
                    .error("none")
                    .build(),
            ),
            Message::JobProgress(
                JobProgress::builder()
                    .job_id("j2")
                    .status(JobStatus::Processing)
                    .progress(std::f64::consts::E)
                    .build(),
            ),
            Message::JobProgress(
                JobProgress::builder()
                    .job_id("j3")
                    .status(JobStatus::Queued)
                    .progress(1e-7)
                    .build(),
            ),
            Message::RepoStatus(
                RepoStatus::builder()
                    .repo_id("r1")
                    .status("ready")
                    .message("ok")
                    .build(),
            ),
            Message::Notification(
                Notification::builder()
                    .title("t")
                    .message("m")
                    .level(NotificationLevel::Warning)
                    .data(json!({ "nested": [1, 2, { "k": null }] }))
                    .build(),
            ),
            Message::SyncEvent(
                SyncEvent::builder()
                    .repo_id("r1")
                    .event("file_indexed")
                    .data(json!({ "path": "src/lib.rs" }))
                    .build(),
            ),
            Message::Chat(Chat::builder().content("hello").role("user").build()),
            Message::ChatResponse(ChatResponse::builder().content("hi").done(true).build()),
            Message::StreamStart(StreamStart::builder().stream_id("s").build()),
            Message::StreamChunk(
                StreamChunk::builder()
                    .stream_id("s")
                    .content("part")
                    .index(0)
                    .build(),
            ),
            Message::StreamEnd(StreamEnd::builder().stream_id("s").reason("done").build()),
            Message::Error(ErrorMessage::builder().message("boom").code("E42").build()),
            Message::Ping(meta.clone()),
            Message::Pong(Meta::default()),
            Message::Connected(Connected::builder().client_id("c-1").build()),
            Message::Status(Status::builder().meta(meta).status("idle").build()),
        ];

        let mut covered: Vec<_> = messages.iter().map(Message::message_type).collect();
        covered.dedup();
        assert_eq!(covered, MessageType::ALL);

        for message in messages {
            let frame = encode(&message).unwrap();
            assert_eq!(decode(&frame).unwrap(), message, "frame: {frame}");
        }
    }

    #[test]
    fn codec_parser_matches_decode() {
        let raw = r#"{"type":"connected"}"#;

        assert_eq!(NotificationCodec.parse(raw).unwrap(), decode(raw).unwrap());
    }
}
