//! In-memory conversation store

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::{ConversationStore, StoreError, StoredMessage, validate_key};
use crate::domain::{Role, Turn};

/// Conversation store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<(String, String), Vec<StoredMessage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn load_history(&self, user_id: &str, conversation_id: &str) -> Result<Vec<Turn>, StoreError> {
        debug!(%user_id, %conversation_id, "MemoryStore::load_history: called");
        let conversations = self.conversations.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(conversations
            .get(&(user_id.to_string(), conversation_id.to_string()))
            .map(|messages| messages.iter().map(StoredMessage::to_turn).collect())
            .unwrap_or_default())
    }

    async fn append_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        debug!(%user_id, %conversation_id, %role, "MemoryStore::append_message: called");
        validate_key("user id", user_id)?;
        validate_key("conversation id", conversation_id)?;
        self.conversations
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .entry((user_id.to_string(), conversation_id.to_string()))
            .or_default()
            .push(StoredMessage::new(role, content));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_load() {
        let store = MemoryStore::new();
        store.append_message("alice", "rome", Role::User, "3 days in Rome").await.unwrap();
        store.append_message("alice", "rome", Role::Assistant, "Day 1...").await.unwrap();

        let history = store.load_history("alice", "rome").await.unwrap();
        assert_eq!(history, vec![Turn::user("3 days in Rome"), Turn::assistant("Day 1...")]);
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let store = MemoryStore::new();
        store.append_message("alice", "rome", Role::User, "a").await.unwrap();
        store.append_message("bob", "rome", Role::User, "b").await.unwrap();

        assert_eq!(store.load_history("alice", "rome").await.unwrap().len(), 1);
        assert!(store.load_history("alice", "paris").await.unwrap().is_empty());
    }
}
