// ABOUTME: Event types delivered by a platform connection's listen stream.
// ABOUTME: Classifies events into message, reply, platform-event and passthrough kinds.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The `type` field of an inbound platform event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// A plain chat message
    Message,
    /// A chat message sent as a reply to another message
    MessageReply,
    /// A thread/platform event (member joined, title changed, ...)
    Event,
    /// Anything else the platform delivers (typing, read receipts, presence)
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::MessageReply => "message_reply",
            Self::Event => "event",
            Self::Other(other) => other,
        }
    }

    /// Message-class events are routed to command handlers.
    pub fn is_message(&self) -> bool {
        matches!(self, Self::Message | Self::MessageReply)
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "message" => Self::Message,
            "message_reply" => Self::MessageReply,
            "event" => Self::Event,
            _ => Self::Other(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound event from a platform connection.
///
/// Field names follow the platform's wire format. Fields this crate does not
/// model are kept in `extra` so handlers can still reach them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Conversation the event belongs to; replies go here
    #[serde(rename = "threadID", default)]
    pub thread_id: String,
    #[serde(rename = "senderID", default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(rename = "messageID", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Sub-type of an `event` (e.g. "log:subscribe")
    #[serde(
        rename = "logMessageType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub log_message_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlatformEvent {
    pub fn new(kind: EventKind, thread_id: impl Into<String>) -> Self {
        Self {
            kind,
            thread_id: thread_id.into(),
            sender_id: None,
            message_id: None,
            body: None,
            log_message_type: None,
            extra: Map::new(),
        }
    }

    /// A chat message from `sender_id` in `thread_id`.
    pub fn message(
        thread_id: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::new(EventKind::Message, thread_id)
            .with_sender(sender_id)
            .with_body(body)
    }

    /// A thread event such as a member joining (`log:subscribe`).
    pub fn event(thread_id: impl Into<String>, log_message_type: impl Into<String>) -> Self {
        let mut event = Self::new(EventKind::Event, thread_id);
        event.log_message_type = Some(log_message_type.into());
        event
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    /// Message body, or "" when the event carries none.
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}
