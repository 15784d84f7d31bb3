//! Conversation registry: one [`MessageRepository`] per conversation.
//!
//! Owned by the orchestrating layer (e.g. one entry per project). Stores never
//! share state, so separate conversations can be processed concurrently by
//! moving their repositories to separate tasks.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::MessageRepository;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps conversation ids to their message stores.
#[derive(Debug, Default)]
pub struct ConversationRegistry {
    stores: HashMap<ConversationId, MessageRepository>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store for `id`, created empty on first use.
    pub fn get_or_create(&mut self, id: &ConversationId) -> &mut MessageRepository {
        self.stores.entry(id.clone()).or_default()
    }

    pub fn get(&self, id: &ConversationId) -> Option<&MessageRepository> {
        self.stores.get(id)
    }

    pub fn get_mut(&mut self, id: &ConversationId) -> Option<&mut MessageRepository> {
        self.stores.get_mut(id)
    }

    /// Detach a conversation's store, e.g. when a project is closed.
    pub fn remove(&mut self, id: &ConversationId) -> Option<MessageRepository> {
        self.stores.remove(id)
    }

    pub fn conversation_ids(&self) -> impl Iterator<Item = &ConversationId> {
        self.stores.keys()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextweave_core::Sender;

    #[test]
    fn conversations_are_isolated() {
        let mut registry = ConversationRegistry::new();
        let alpha = ConversationId::from("project-alpha");
        let beta = ConversationId::from("project-beta");

        registry
            .get_or_create(&alpha)
            .add_message("alpha question", "alpha question", Sender::User, None);
        registry.get_or_create(&beta);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&alpha).unwrap().len(), 1);
        assert!(registry.get(&beta).unwrap().is_empty());
    }

    #[test]
    fn get_or_create_reuses_store() {
        let mut registry = ConversationRegistry::new();
        let id = ConversationId::new();
        registry
            .get_or_create(&id)
            .add_message("one", "one", Sender::User, None);
        registry
            .get_or_create(&id)
            .add_message("two", "two", Sender::User, None);
        assert_eq!(registry.get(&id).unwrap().len(), 2);
    }

    #[test]
    fn remove_detaches_store() {
        let mut registry = ConversationRegistry::new();
        let id = ConversationId::from("c1");
        registry.get_or_create(&id);
        assert!(registry.remove(&id).is_some());
        assert!(registry.get_mut(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn conversation_id_serializes_as_string() {
        let id = ConversationId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        assert_eq!(id.to_string(), "abc");
    }
}
