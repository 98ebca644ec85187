//! Conversation persistence
//!
//! Conversations are keyed by an opaque `(user_id, conversation_id)` pair.
//! The pipeline itself never touches the store: callers load history before a
//! run and append the exchange afterwards.

mod jsonl;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Role, Turn};

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

/// Errors from a conversation store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid {what} '{key}': use letters, digits, '-', '_' or '.'")]
    InvalidKey { what: &'static str, key: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store state poisoned")]
    Poisoned,
}

/// One persisted message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_turn(&self) -> Turn {
        Turn::new(self.role, self.content.clone())
    }
}

/// Storage of conversation history between runs
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// All turns of a conversation, oldest first; empty if it does not exist
    async fn load_history(&self, user_id: &str, conversation_id: &str) -> Result<Vec<Turn>, StoreError>;

    async fn append_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError>;
}

/// Keys become path components, so keep them to a safe alphabet
pub(crate) fn validate_key(what: &'static str, key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey {
            what,
            key: key.to_string(),
        })
    }
}
