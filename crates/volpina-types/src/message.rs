//! Message record and append request types for Volpina.
//!
//! `MessageRecord` is the persisted entity. `AppendMessageRequest` is the
//! loosely shaped payload accepted at the service boundary; `validate` turns it
//! into a `NewMessage` the store can insert without further checks.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use std::fmt;
use std::str::FromStr;

use crate::error::MessageError;

/// Store-assigned message identifier.
///
/// Monotonically increasing and never reused once a row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(MessageId)
            .map_err(|_| format!("invalid message id: '{s}'"))
    }
}

/// A persisted chat message.
///
/// Serialized in camelCase (`conversationId`, `isSaved`) for API consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub conversation_id: String,
    pub text: String,
    /// Caller-supplied logical time. Used for retention ranking, not validated
    /// against the wall clock.
    pub timestamp: i64,
    /// Author identifier; `None` when the caller gave no sender.
    pub sender: Option<String>,
    /// Saved messages are exempt from count-based pruning.
    pub is_saved: bool,
    /// Free-form key/value document. Empty object when none was supplied.
    pub metadata: Map<String, Value>,
}

/// A validated message ready to be appended to a conversation.
///
/// Built by [`AppendMessageRequest::validate`]; stores insert it as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub conversation_id: String,
    pub text: String,
    pub timestamp: i64,
    pub sender: Option<String>,
    pub is_saved: bool,
    pub metadata: Map<String, Value>,
}

/// Timestamp as sent by a client: epoch milliseconds, or a string holding
/// either an integer or an RFC 3339 datetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampInput {
    Millis(i64),
    Text(String),
}

impl TimestampInput {
    /// Resolve to epoch milliseconds.
    pub fn to_millis(&self) -> Result<i64, MessageError> {
        match self {
            TimestampInput::Millis(ms) => Ok(*ms),
            TimestampInput::Text(raw) => {
                let raw = raw.trim();
                if raw.is_empty() {
                    return Err(missing_field("timestamp"));
                }
                if let Ok(ms) = raw.parse::<i64>() {
                    return Ok(ms);
                }
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.timestamp_millis())
                    .map_err(|_| {
                        MessageError::Validation(format!(
                            "timestamp must be epoch milliseconds or RFC 3339, got '{raw}'"
                        ))
                    })
            }
        }
    }
}

/// Request payload for appending a message.
///
/// Every field is optional at the boundary so that a missing value becomes a
/// validation error rather than a deserialization failure. Defaults:
/// `sender` absent, `is_saved` false, `metadata` empty object.
///
/// Accepts the legacy spellings `conv_id` and `isSave`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendMessageRequest {
    #[serde(default, alias = "conv_id")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub timestamp: Option<TimestampInput>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default, alias = "isSave")]
    pub is_saved: Option<bool>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl AppendMessageRequest {
    /// Request with the three required fields set, timestamp in epoch milliseconds.
    pub fn new(conversation_id: impl Into<String>, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            text: Some(text.into()),
            timestamp: Some(TimestampInput::Millis(timestamp)),
            ..Self::default()
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn saved(mut self) -> Self {
        self.is_saved = Some(true);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check required fields and apply defaults.
    ///
    /// - `conversationId` and `text` must be present and not blank.
    /// - `timestamp` must be present and resolvable to epoch milliseconds.
    /// - A blank `sender` is treated as absent.
    /// - `metadata` must be a JSON object when present; `null` means empty.
    pub fn validate(self) -> Result<NewMessage, MessageError> {
        let conversation_id = required_text(self.conversation_id, "conversationId")?;
        let text = required_text(self.text, "text")?;
        let timestamp = self
            .timestamp
            .ok_or_else(|| missing_field("timestamp"))?
            .to_millis()?;

        let sender = self.sender.filter(|s| !s.trim().is_empty());

        let metadata = match self.metadata {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(MessageError::Validation(
                    "metadata must be a JSON object".to_string(),
                ));
            }
        };

        Ok(NewMessage {
            conversation_id,
            text,
            timestamp,
            sender,
            is_saved: self.is_saved.unwrap_or(false),
            metadata,
        })
    }
}

fn required_text(value: Option<String>, field: &str) -> Result<String, MessageError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(missing_field(field)),
    }
}

fn missing_field(field: &str) -> MessageError {
    MessageError::Validation(format!("missing required field: {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_id_parse_and_display() {
        let id: MessageId = "17".parse().unwrap();
        assert_eq!(id, MessageId(17));
        assert_eq!(id.to_string(), "17");
        assert!("abc".parse::<MessageId>().is_err());
    }

    #[test]
    fn test_validate_applies_defaults() {
        let msg = AppendMessageRequest::new("c1", "hello", 1_000)
            .validate()
            .unwrap();
        assert_eq!(msg.conversation_id, "c1");
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.timestamp, 1_000);
        assert_eq!(msg.sender, None);
        assert!(!msg.is_saved);
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let cases = [
            AppendMessageRequest {
                conversation_id: None,
                ..AppendMessageRequest::new("c1", "hi", 1)
            },
            AppendMessageRequest::new("", "hi", 1),
            AppendMessageRequest::new("c1", "   ", 1),
            AppendMessageRequest {
                timestamp: None,
                ..AppendMessageRequest::new("c1", "hi", 1)
            },
            AppendMessageRequest {
                timestamp: Some(TimestampInput::Text(String::new())),
                ..AppendMessageRequest::new("c1", "hi", 1)
            },
        ];

        for request in cases {
            let err = request.validate().unwrap_err();
            assert!(matches!(err, MessageError::Validation(_)), "got {err:?}");
        }
    }

    #[test]
    fn test_blank_sender_is_absent() {
        let msg = AppendMessageRequest::new("c1", "hi", 1)
            .with_sender("  ")
            .validate()
            .unwrap();
        assert_eq!(msg.sender, None);

        let msg = AppendMessageRequest::new("c1", "hi", 1)
            .with_sender("alice")
            .validate()
            .unwrap();
        assert_eq!(msg.sender.as_deref(), Some("alice"));
    }

    #[test]
    fn test_metadata_must_be_object() {
        let msg = AppendMessageRequest::new("c1", "hi", 1)
            .with_metadata(json!({"lang": "fr"}))
            .validate()
            .unwrap();
        assert_eq!(msg.metadata.get("lang"), Some(&json!("fr")));

        let msg = AppendMessageRequest::new("c1", "hi", 1)
            .with_metadata(Value::Null)
            .validate()
            .unwrap();
        assert!(msg.metadata.is_empty());

        let err = AppendMessageRequest::new("c1", "hi", 1)
            .with_metadata(json!([1, 2]))
            .validate()
            .unwrap_err();
        assert!(matches!(err, MessageError::Validation(_)));
    }

    #[test]
    fn test_timestamp_text_forms() {
        let numeric = TimestampInput::Text("1700000000000".to_string());
        assert_eq!(numeric.to_millis().unwrap(), 1_700_000_000_000);

        let rfc = TimestampInput::Text("1970-01-01T00:00:01Z".to_string());
        assert_eq!(rfc.to_millis().unwrap(), 1_000);

        let bad = TimestampInput::Text("yesterday".to_string());
        assert!(bad.to_millis().is_err());
    }

    #[test]
    fn test_request_deserialize_camel_case() {
        let request: AppendMessageRequest = serde_json::from_value(json!({
            "conversationId": "c1",
            "text": "hello",
            "timestamp": 42,
            "sender": "bob",
            "isSaved": true,
            "metadata": {"k": "v"}
        }))
        .unwrap();

        let msg = request.validate().unwrap();
        assert_eq!(msg.conversation_id, "c1");
        assert_eq!(msg.timestamp, 42);
        assert_eq!(msg.sender.as_deref(), Some("bob"));
        assert!(msg.is_saved);
    }

    #[test]
    fn test_request_deserialize_legacy_aliases() {
        let request: AppendMessageRequest = serde_json::from_value(json!({
            "conv_id": "legacy",
            "text": "hello",
            "timestamp": "2024-05-01T12:00:00+02:00",
            "isSave": true
        }))
        .unwrap();

        let msg = request.validate().unwrap();
        assert_eq!(msg.conversation_id, "legacy");
        assert!(msg.is_saved);
        assert_eq!(msg.timestamp, 1_714_557_600_000);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = MessageRecord {
            id: MessageId(3),
            conversation_id: "c1".to_string(),
            text: "hi".to_string(),
            timestamp: 10,
            sender: None,
            is_saved: false,
            metadata: Map::new(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], json!(3));
        assert_eq!(json["conversationId"], json!("c1"));
        assert_eq!(json["isSaved"], json!(false));
        assert_eq!(json["sender"], Value::Null);
        assert_eq!(json["metadata"], json!({}));
    }
}
