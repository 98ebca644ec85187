//! JSONL-backed conversation store
//!
//! Layout: `{root}/{user_id}/{conversation_id}.jsonl`, one [`StoredMessage`]
//! per line, appended in order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{ConversationStore, StoreError, StoredMessage, validate_key};
use crate::domain::{Role, Turn};

pub struct JsonlStore {
    root: PathBuf,
}

impl JsonlStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        debug!(?root, "JsonlStore::new: called");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, user_id: &str, conversation_id: &str) -> Result<PathBuf, StoreError> {
        validate_key("user id", user_id)?;
        validate_key("conversation id", conversation_id)?;
        Ok(self.root.join(user_id).join(format!("{}.jsonl", conversation_id)))
    }

    /// All messages of a conversation, with timestamps
    ///
    /// Lines that fail to parse are skipped with a warning.
    pub async fn load_messages(&self, user_id: &str, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let path = self.path_for(user_id, conversation_id)?;
        debug!(?path, "JsonlStore::load_messages: called");

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "JsonlStore::load_messages: no such conversation");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut messages = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredMessage>(line) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(?path, line = idx + 1, error = %e, "Skipping unreadable message"),
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl ConversationStore for JsonlStore {
    async fn load_history(&self, user_id: &str, conversation_id: &str) -> Result<Vec<Turn>, StoreError> {
        let messages = self.load_messages(user_id, conversation_id).await?;
        Ok(messages.iter().map(StoredMessage::to_turn).collect())
    }

    async fn append_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let path = self.path_for(user_id, conversation_id)?;
        debug!(?path, %role, content_len = content.len(), "JsonlStore::append_message: called");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(&StoredMessage::new(role, content))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
