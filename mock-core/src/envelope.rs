//! The single envelope shape used for all cross-context traffic.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::model::{MockRule, RequestLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Request log entry, partial or complete. Never answered.
    Log,
    /// Mock lookup. The answer reuses the query's id and type.
    Query,
    /// Rule collection changed; drop caches and reindex.
    UpdateStore,
    /// A page context (re)activated.
    Init,
}

/// Which context a frame comes from or is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextTag {
    /// In-page interception agent
    Agent,
    /// Privileged relay with storage access
    Relay,
    /// Inspector panel
    Panel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id; `None` when no answer is expected
    pub id: Option<u64>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub from: ContextTag,
    pub to: ContextTag,
    #[serde(default)]
    pub message: Value,
}

/// Relay's answer to a `QUERY`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_response: Option<MockRule>,
}

/// Payload of `INIT`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInit {
    pub host: String,
}

impl Envelope {
    pub fn new(kind: MessageType, from: ContextTag, to: ContextTag, message: Value) -> Self {
        Self {
            id: None,
            kind,
            from,
            to,
            message,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Log entry envelope. Serialising a `RequestLog` cannot fail.
    pub fn log(from: ContextTag, to: ContextTag, entry: &RequestLog) -> Self {
        Self::new(MessageType::Log, from, to, to_value(entry))
    }

    pub fn query(id: u64, entry: &RequestLog) -> Self {
        Self::new(MessageType::Query, ContextTag::Agent, ContextTag::Relay, to_value(entry)).with_id(id)
    }

    pub fn reply(id: u64, reply: &QueryReply) -> Self {
        Self::new(MessageType::Query, ContextTag::Relay, ContextTag::Agent, to_value(reply)).with_id(id)
    }

    pub fn update_store() -> Self {
        Self::new(MessageType::UpdateStore, ContextTag::Panel, ContextTag::Relay, Value::Null)
    }

    pub fn init(host: &str) -> Self {
        Self::new(
            MessageType::Init,
            ContextTag::Relay,
            ContextTag::Panel,
            to_value(&PageInit { host: host.to_string() }),
        )
    }

    /// Recognise an inbound frame. Anything that does not carry the envelope
    /// shape is discarded.
    pub fn decode(frame: Value) -> Option<Self> {
        match serde_json::from_value(frame) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                debug!("Discarding unrecognised frame: {}", e);
                None
            }
        }
    }

    /// Typed view of the payload. Failing to parse is the caller's cue to drop
    /// the message.
    pub fn payload<T: DeserializeOwned>(&self) -> Option<T> {
        T::deserialize(&self.message)
            .map_err(|e| debug!("Discarding {:?} payload: {}", self.kind, e))
            .ok()
    }
}

fn to_value<T: Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}
