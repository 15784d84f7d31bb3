//! Message domain types.
//!
//! A [`StoredMessage`] is the single record kept per turn. It carries two
//! texts: `display_text` (what the user typed or the model answered) and
//! `processed_text` (what was actually sent, context included). Callers never
//! see a `StoredMessage` directly; they get a [`ChatMessage`] projection of
//! one view or the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attachment::MessageContext;
use crate::envelope::PromptContextEnvelope;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sender {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "system")]
    System,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Ai => write!(f, "AI"),
            Sender::System => write!(f, "system"),
        }
    }
}

/// A retrieval source cited by an AI message. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub path: String,
    #[serde(default)]
    pub score: f32,
}

/// Generate a message id: epoch millis plus a random suffix.
pub fn generate_message_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("msg-{}-{}", Utc::now().timestamp_millis(), &suffix[..12])
}

/// The record held by the message store, one per turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,

    /// Verbatim user/AI text.
    pub display_text: String,

    /// Text actually sent to the model, rendered context included.
    pub processed_text: String,

    pub sender: Sender,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MessageContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_envelope: Option<PromptContextEnvelope>,

    pub is_visible: bool,

    /// Set when a user edit left `processed_text` out of date.
    #[serde(default)]
    pub needs_context_reprocess: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,

    /// Multimodal content parts (images etc.), opaque to this crate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<serde_json::Value>,

    #[serde(default)]
    pub is_error_message: bool,
}

impl StoredMessage {
    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }

    /// Display-facing projection: `message` is the display text and nothing
    /// model-facing is exposed.
    pub fn to_display(&self) -> ChatMessage {
        ChatMessage {
            id: Some(self.id.clone()),
            message: self.display_text.clone(),
            sender: self.sender,
            timestamp: Some(self.timestamp),
            is_visible: self.is_visible,
            context: self.context.clone(),
            context_envelope: None,
            sources: self.sources.clone(),
            content: self.content.clone(),
            is_error_message: self.is_error_message,
        }
    }

    /// Model-facing projection: `message` is the processed text, the
    /// envelope is attached and the message is marked not visible.
    pub fn to_llm(&self) -> ChatMessage {
        ChatMessage {
            id: Some(self.id.clone()),
            message: self.processed_text.clone(),
            sender: self.sender,
            timestamp: Some(self.timestamp),
            is_visible: false,
            context: self.context.clone(),
            context_envelope: self.context_envelope.clone(),
            sources: self.sources.clone(),
            content: self.content.clone(),
            is_error_message: self.is_error_message,
        }
    }
}

/// The message shape handed to callers (UI, persistence, model adapter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub message: String,

    pub sender: Sender,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default = "default_true")]
    pub is_visible: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MessageContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_envelope: Option<PromptContextEnvelope>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<serde_json::Value>,

    #[serde(default)]
    pub is_error_message: bool,
}

fn default_true() -> bool {
    true
}

/// A fully-formed message handed to the store, e.g. reloaded from disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    /// Kept when present and non-empty, generated otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub display_text: String,

    /// Defaults to `display_text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_text: Option<String>,

    pub sender: Option<Sender>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MessageContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_envelope: Option<PromptContextEnvelope>,

    /// Only an explicit `false` hides the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<serde_json::Value>,

    #[serde(default)]
    pub is_error_message: bool,
}

impl NewMessage {
    pub fn new(display_text: impl Into<String>, sender: Sender) -> Self {
        Self {
            display_text: display_text.into(),
            sender: Some(sender),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.is_visible = Some(false);
        self
    }
}

impl From<ChatMessage> for NewMessage {
    /// Rehydrate from a persisted chat message. The persisted text becomes
    /// both views; the envelope is kept so later turns can deduplicate.
    fn from(msg: ChatMessage) -> Self {
        Self {
            id: msg.id,
            display_text: msg.message,
            processed_text: None,
            sender: Some(msg.sender),
            timestamp: msg.timestamp,
            context: msg.context,
            context_envelope: msg.context_envelope,
            is_visible: Some(msg.is_visible),
            sources: msg.sources,
            content: msg.content,
            is_error_message: msg.is_error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(display: &str, processed: &str) -> StoredMessage {
        StoredMessage {
            id: generate_message_id(),
            display_text: display.into(),
            processed_text: processed.into(),
            sender: Sender::User,
            timestamp: Utc::now(),
            context: None,
            context_envelope: Some(PromptContextEnvelope::new("x")),
            is_visible: true,
            needs_context_reprocess: false,
            sources: vec![],
            content: vec![],
            is_error_message: false,
        }
    }

    #[test]
    fn generated_ids_are_prefixed_and_distinct() {
        let a = generate_message_id();
        let b = generate_message_id();
        assert!(a.starts_with("msg-"));
        assert_ne!(a, b);
    }

    #[test]
    fn display_projection_hides_processed_text() {
        let msg = stored("Hello", "Hello\n\n<note_context>secret</note_context>");
        let view = msg.to_display();
        assert_eq!(view.message, "Hello");
        assert!(view.context_envelope.is_none());
        assert!(view.is_visible);
    }

    #[test]
    fn llm_projection_exposes_processed_text() {
        let msg = stored("Hello", "Hello with context");
        let view = msg.to_llm();
        assert_eq!(view.message, "Hello with context");
        assert!(view.context_envelope.is_some());
        assert!(!view.is_visible);
    }

    #[test]
    fn sender_serializes_as_tag() {
        assert_eq!(serde_json::to_string(&Sender::Ai).unwrap(), "\"AI\"");
        assert_eq!(serde_json::to_string(&Sender::User).unwrap(), "\"user\"");
    }

    #[test]
    fn chat_message_visibility_defaults_true() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"message":"hi","sender":"user"}"#).unwrap();
        assert!(msg.is_visible);
        let new_msg = NewMessage::from(msg);
        assert_eq!(new_msg.is_visible, Some(true));
        assert!(new_msg.processed_text.is_none());
    }
}
