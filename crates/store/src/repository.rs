//! Dual-view message repository: the single source of truth for one
//! conversation.
//!
//! Every turn is stored exactly once. The display view and the LLM view are
//! projections computed on read, so there is never a second array to keep in
//! sync.

use chrono::Utc;
use contextweave_core::{
    ChatMessage, MessageContext, NewMessage, PromptContextEnvelope, Sender, StoredMessage, WebTab,
    generate_message_id,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Message counts for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub total_messages: usize,
    pub visible_messages: usize,
    pub user_messages: usize,
    pub ai_messages: usize,
}

/// In-memory store of one conversation's messages, in send order.
#[derive(Debug, Clone, Default)]
pub struct MessageRepository {
    messages: Vec<StoredMessage>,
}

impl MessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut StoredMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = generate_message_id();
            if !self.contains(&id) {
                return id;
            }
        }
    }

    /// Add a new message and return its generated id.
    pub fn add_message(
        &mut self,
        display_text: impl Into<String>,
        processed_text: impl Into<String>,
        sender: Sender,
        context: Option<MessageContext>,
    ) -> String {
        let id = self.fresh_id();
        self.messages.push(StoredMessage {
            id: id.clone(),
            display_text: display_text.into(),
            processed_text: processed_text.into(),
            sender,
            timestamp: Utc::now(),
            context,
            context_envelope: None,
            is_visible: true,
            needs_context_reprocess: false,
            sources: Vec::new(),
            content: Vec::new(),
            is_error_message: false,
        });
        debug!(message_id = %id, %sender, "Message added");
        id
    }

    /// Add a fully-formed message, e.g. one reloaded from persistence.
    ///
    /// A supplied id is kept unless it is empty or already taken.
    pub fn add_full_message(&mut self, message: NewMessage) -> String {
        let id = match message.id {
            Some(id) if !id.is_empty() && !self.contains(&id) => id,
            Some(id) if !id.is_empty() => {
                let fresh = self.fresh_id();
                warn!(duplicate = %id, replacement = %fresh, "Message id already in use");
                fresh
            }
            _ => self.fresh_id(),
        };

        let processed_text = message
            .processed_text
            .unwrap_or_else(|| message.display_text.clone());

        self.messages.push(StoredMessage {
            id: id.clone(),
            display_text: message.display_text,
            processed_text,
            sender: message.sender.unwrap_or(Sender::User),
            timestamp: message.timestamp.unwrap_or_else(Utc::now),
            context: message.context,
            context_envelope: message.context_envelope,
            is_visible: message.is_visible != Some(false),
            needs_context_reprocess: false,
            sources: message.sources,
            content: message.content,
            is_error_message: message.is_error_message,
        });
        id
    }

    /// Rehydrate from persisted chat messages, returning their ids in order.
    pub fn load_from_chat_messages(
        &mut self,
        messages: impl IntoIterator<Item = ChatMessage>,
    ) -> Vec<String> {
        messages
            .into_iter()
            .map(|m| self.add_full_message(NewMessage::from(m)))
            .collect()
    }

    /// Replace a message's display text.
    ///
    /// User messages keep their processed text and are flagged for context
    /// reprocessing; AI messages have both texts replaced.
    pub fn edit_message(&mut self, id: &str, new_display_text: &str) -> bool {
        let Some(message) = self.find_mut(id) else {
            return false;
        };

        if message.display_text == new_display_text {
            return true;
        }

        message.display_text = new_display_text.to_string();
        match message.sender {
            Sender::User => message.needs_context_reprocess = true,
            Sender::Ai | Sender::System => {
                message.processed_text = new_display_text.to_string();
            }
        }
        debug!(message_id = %id, "Message edited");
        true
    }

    /// Set the model-facing text and, when given, the context envelope.
    pub fn update_processed_text(
        &mut self,
        id: &str,
        processed_text: impl Into<String>,
        envelope: Option<PromptContextEnvelope>,
    ) -> bool {
        let Some(message) = self.find_mut(id) else {
            return false;
        };

        message.processed_text = processed_text.into();
        if envelope.is_some() {
            message.context_envelope = envelope;
        }
        message.needs_context_reprocess = false;
        true
    }

    /// Replace the frozen browser-tab snapshot of a message's context.
    pub fn update_web_tabs(&mut self, id: &str, web_tabs: Vec<WebTab>) -> bool {
        let Some(message) = self.find_mut(id) else {
            return false;
        };
        message.context.get_or_insert_with(MessageContext::default).web_tabs = web_tabs;
        true
    }

    pub fn delete_message(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() < before
    }

    /// Keep messages `0..=index`, dropping everything after.
    pub fn truncate_after(&mut self, index: usize) {
        self.messages.truncate(index.saturating_add(1));
    }

    /// Keep messages up to and including `id`. Unknown ids leave the store
    /// untouched and return `false`.
    pub fn truncate_after_message_id(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(index) => {
                self.truncate_after(index);
                debug!(message_id = %id, remaining = self.messages.len(), "Truncated conversation");
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Visible messages as the user sees them.
    pub fn display_messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.is_visible)
            .map(StoredMessage::to_display)
            .collect()
    }

    /// Every message as the model sees it, including hidden ones.
    pub fn llm_messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(StoredMessage::to_llm).collect()
    }

    pub fn llm_message(&self, id: &str) -> Option<ChatMessage> {
        self.stored(id).map(StoredMessage::to_llm)
    }

    pub fn message(&self, id: &str) -> Option<ChatMessage> {
        self.stored(id).map(StoredMessage::to_display)
    }

    pub fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            total_messages: self.messages.len(),
            visible_messages: self.messages.iter().filter(|m| m.is_visible).count(),
            user_messages: self
                .messages
                .iter()
                .filter(|m| m.sender == Sender::User)
                .count(),
            ai_messages: self
                .messages
                .iter()
                .filter(|m| m.sender == Sender::Ai)
                .count(),
        }
    }

    pub fn stored(&self, id: &str) -> Option<&StoredMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn stored_messages(&self) -> &[StoredMessage] {
        &self.messages
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// User messages sent before `id`, oldest first. When `id` is not in the
    /// store every user message counts as prior.
    pub fn prior_user_messages(&self, id: &str) -> Vec<&StoredMessage> {
        let end = self.position(id).unwrap_or(self.messages.len());
        self.messages[..end].iter().filter(|m| m.is_user()).collect()
    }
}
