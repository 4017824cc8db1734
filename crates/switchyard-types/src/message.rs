//! Immutable messages, their headers and the builder that derives new ones.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::media_type::MediaType;
use crate::value::Value;

/// Well-known header names.
pub mod header {
    pub const ID: &str = "id";
    pub const TIMESTAMP: &str = "timestamp";
    pub const CONTENT_TYPE: &str = "contentType";
    pub const REPLY_CHANNEL: &str = "replyChannel";
    pub const ERROR_CHANNEL: &str = "errorChannel";
    pub const CORRELATION_ID: &str = "correlationId";
    pub const PARENT_ID: &str = "parentId";
    pub const RETRY_ATTEMPT: &str = "retryAttempt";
    pub const EXCEPTION_MESSAGE: &str = "exceptionMessage";
}

// ---------------------------------------------------------------------------
// MessageHeaders
// ---------------------------------------------------------------------------

/// Header mapping of a message. Values are plain JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHeaders(BTreeMap<String, serde_json::Value>);

impl MessageHeaders {
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(serde_json::Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn message_id(&self) -> Option<Uuid> {
        self.get_str(header::ID).and_then(|id| Uuid::parse_str(id).ok())
    }

    /// Parsed `contentType` header; an unparsable value counts as absent.
    pub fn content_type(&self) -> Option<MediaType> {
        self.get_str(header::CONTENT_TYPE)
            .and_then(|raw| raw.parse().ok())
    }

    pub fn reply_channel(&self) -> Option<&str> {
        self.get_str(header::REPLY_CHANNEL)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.0.clone().into_iter().collect())
    }
}

impl FromIterator<(String, serde_json::Value)> for MessageHeaders {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
struct MessageInner {
    payload: Value,
    headers: MessageHeaders,
}

/// An immutable payload plus headers.
///
/// Cloning is cheap and shares the underlying data. A message always carries
/// an `id` and a `timestamp` header; use [`MessageBuilder`] to derive a
/// modified copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    inner: Arc<MessageInner>,
}

impl Message {
    pub fn payload(&self) -> &Value {
        &self.inner.payload
    }

    pub fn headers(&self) -> &MessageHeaders {
        &self.inner.headers
    }

    pub fn id(&self) -> Option<Uuid> {
        self.inner.headers.message_id()
    }

    pub fn content_type(&self) -> Option<MediaType> {
        self.inner.headers.content_type()
    }
}

// ---------------------------------------------------------------------------
// MessageBuilder
// ---------------------------------------------------------------------------

/// Builder for new messages and for copies of existing ones.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    payload: Value,
    headers: BTreeMap<String, serde_json::Value>,
}

impl MessageBuilder {
    pub fn with_payload(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Start from an existing message. Every header is copied except `id` and
    /// `timestamp`, which the built message gets fresh.
    pub fn from_message(message: &Message) -> Self {
        let headers = message
            .headers()
            .iter()
            .filter(|(name, _)| name.as_str() != header::ID && name.as_str() != header::TIMESTAMP)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Self {
            payload: message.payload().clone(),
            headers,
        }
    }

    pub fn set_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn set_header(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn set_header_if_absent(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.headers.entry(name.into()).or_insert_with(|| value.into());
        self
    }

    pub fn set_headers<I, K>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        for (name, value) in headers {
            self.headers.insert(name.into(), value);
        }
        self
    }

    pub fn remove_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    pub fn set_content_type(self, media_type: &MediaType) -> Self {
        self.set_header(header::CONTENT_TYPE, media_type.to_string())
    }

    pub fn set_reply_channel(self, channel: impl Into<String>) -> Self {
        self.set_header(header::REPLY_CHANNEL, channel.into())
    }

    pub fn build(self) -> Message {
        let mut headers = self.headers;
        headers
            .entry(header::ID.to_string())
            .or_insert_with(|| Uuid::now_v7().to_string().into());
        headers
            .entry(header::TIMESTAMP.to_string())
            .or_insert_with(|| Utc::now().timestamp_millis().into());

        Message {
            inner: Arc::new(MessageInner {
                payload: self.payload,
                headers: MessageHeaders(headers),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn built_message_always_has_id_and_timestamp() {
        let message = MessageBuilder::with_payload("some").build();
        assert!(message.id().is_some());
        assert!(message.headers().get(header::TIMESTAMP).is_some());
        assert_eq!(message.payload().as_str(), Some("some"));
    }

    #[test]
    fn from_message_copies_headers_but_regenerates_id() {
        let original = MessageBuilder::with_payload("a")
            .set_header("token", "123")
            .set_reply_channel("replies")
            .build();

        let copy = MessageBuilder::from_message(&original)
            .set_payload("b")
            .build();

        assert_eq!(copy.headers().get_str("token"), Some("123"));
        assert_eq!(copy.headers().reply_channel(), Some("replies"));
        assert_ne!(copy.id(), original.id());
        assert_eq!(original.payload().as_str(), Some("a"));
        assert_eq!(copy.payload().as_str(), Some("b"));
    }

    #[test]
    fn set_header_if_absent_keeps_existing_value() {
        let message = MessageBuilder::with_payload(1)
            .set_header("kind", "first")
            .set_header_if_absent("kind", "second")
            .set_header_if_absent("other", json!(2))
            .build();

        assert_eq!(message.headers().get_str("kind"), Some("first"));
        assert_eq!(message.headers().get("other"), Some(&json!(2)));
    }

    #[test]
    fn content_type_round_trips_through_header() {
        let media_type = MediaType::application_json();
        let message = MessageBuilder::with_payload("{}")
            .set_content_type(&media_type)
            .build();

        assert_eq!(message.content_type(), Some(media_type));
        assert_eq!(
            message.headers().get_str(header::CONTENT_TYPE),
            Some("application/json")
        );
    }

    #[test]
    fn headers_render_as_json_object() {
        let message = MessageBuilder::with_payload(Value::Null)
            .set_header("token", "abc")
            .remove_header("missing")
            .build();

        let json = message.headers().to_json();
        assert_eq!(json["token"], json!("abc"));
        assert!(json.get(header::ID).is_some());
    }
}
