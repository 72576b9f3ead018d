//! Conversation store
//!
//! Bounded per-conversation message history. Appends within one
//! conversation are serialized through a per-id lock so concurrent turns
//! cannot interleave; conversations never contend with each other.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;
use vantage_llm::Message;

/// How many messages a conversation keeps; older entries are trimmed
pub const MAX_CONTEXT_MESSAGES: usize = 20;

/// The bounded recent history of one multi-turn interaction
#[derive(Debug, Clone)]
pub struct ConversationContext {
    /// Conversation id
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Messages, oldest first, capped at the store's limit
    pub messages: Vec<Message>,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation last changed
    pub updated_at: DateTime<Utc>,
}

impl ConversationContext {
    fn new(id: String, user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn push(&mut self, message: Message, cap: usize) {
        self.messages.push(message);
        if self.messages.len() > cap {
            let excess = self.messages.len() - cap;
            self.messages.drain(..excess);
        }
        self.updated_at = Utc::now();
    }
}

/// In-memory store of active conversations
#[derive(Debug)]
pub struct ConversationStore {
    conversations: DashMap<String, Arc<Mutex<ConversationContext>>>,
    cap: usize,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Create a store with the default message cap
    #[must_use]
    pub fn new() -> Self {
        Self::with_cap(MAX_CONTEXT_MESSAGES)
    }

    /// Create a store with a custom message cap
    #[must_use]
    pub fn with_cap(cap: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            cap,
        }
    }

    /// Start a conversation for a user, optionally seeding it with context.
    ///
    /// Returns the new conversation id.
    pub fn create(&self, user_id: &str, initial_context: Option<&str>) -> String {
        let id = Uuid::new_v4().to_string();
        let mut context = ConversationContext::new(id.clone(), user_id);
        if let Some(initial) = initial_context {
            context.push(Message::system(initial), self.cap);
        }
        debug!(conversation = %id, user = %user_id, "Conversation created");
        self.conversations
            .insert(id.clone(), Arc::new(Mutex::new(context)));
        id
    }

    /// Whether a conversation exists
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.conversations.contains_key(id)
    }

    /// Number of active conversations
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether the store holds no conversations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// A copy of a conversation's current state
    pub async fn snapshot(&self, id: &str) -> Result<ConversationContext> {
        let entry = self.entry(id)?;
        let context = entry.lock().await;
        Ok(context.clone())
    }

    /// A copy of a conversation's messages, oldest first
    pub async fn history(&self, id: &str) -> Result<Vec<Message>> {
        let entry = self.entry(id)?;
        let context = entry.lock().await;
        Ok(context.messages.clone())
    }

    /// Append one message, trimming the oldest past the cap
    pub async fn append(&self, id: &str, message: Message) -> Result<()> {
        let entry = self.entry(id)?;
        let mut context = entry.lock().await;
        context.push(message, self.cap);
        Ok(())
    }

    /// Append a user turn and its reply under one lock, so concurrent
    /// exchanges on the same conversation never interleave
    pub async fn append_exchange(&self, id: &str, user: Message, assistant: Message) -> Result<()> {
        let entry = self.entry(id)?;
        let mut context = entry.lock().await;
        context.push(user, self.cap);
        context.push(assistant, self.cap);
        Ok(())
    }

    /// Drop a conversation's history, keeping the conversation itself
    pub async fn clear(&self, id: &str) -> Result<()> {
        let entry = self.entry(id)?;
        let mut context = entry.lock().await;
        context.messages.clear();
        context.updated_at = Utc::now();
        Ok(())
    }

    /// Delete a conversation entirely, returning whether it existed
    pub fn remove(&self, id: &str) -> bool {
        self.conversations.remove(id).is_some()
    }

    // Clones the Arc out of the map so the per-conversation lock is never
    // held while a map shard is.
    fn entry(&self, id: &str) -> Result<Arc<Mutex<ConversationContext>>> {
        self.conversations
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| CoreError::ConversationNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_llm::MessageRole;

    #[tokio::test]
    async fn test_create_and_append() {
        let store = ConversationStore::new();
        let id = store.create("user-1", None);
        assert!(store.contains(&id));

        store.append(&id, Message::user("hello")).await.unwrap();
        store
            .append(&id, Message::assistant("hi there"))
            .await
            .unwrap();

        let history = store.history(&id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[1].content, "hi there");
    }

    #[tokio::test]
    async fn test_initial_context_seeds_system_message() {
        let store = ConversationStore::new();
        let id = store.create("user-1", Some("Client holds a EUR portfolio"));
        let history = store.history(&id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, MessageRole::System);
    }

    #[tokio::test]
    async fn test_cap_trims_oldest() {
        let store = ConversationStore::with_cap(4);
        let id = store.create("user-1", None);

        for i in 0..10 {
            store.append(&id, Message::user(format!("m{i}"))).await.unwrap();
        }

        let history = store.history(&id).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "m6");
        assert_eq!(history[3].content, "m9");
    }

    #[tokio::test]
    async fn test_cap_holds_after_any_append_sequence() {
        let store = ConversationStore::new();
        let id = store.create("user-1", Some("context"));

        for i in 0..50 {
            store
                .append_exchange(
                    &id,
                    Message::user(format!("q{i}")),
                    Message::assistant(format!("a{i}")),
                )
                .await
                .unwrap();
            let history = store.history(&id).await.unwrap();
            assert!(history.len() <= MAX_CONTEXT_MESSAGES);
        }
    }

    #[tokio::test]
    async fn test_unknown_conversation_rejected() {
        let store = ConversationStore::new();
        let err = store.history("missing").await.unwrap_err();
        assert!(matches!(err, CoreError::ConversationNotFound(_)));
        assert!(store.append("missing", Message::user("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_keeps_conversation() {
        let store = ConversationStore::new();
        let id = store.create("user-1", None);
        store.append(&id, Message::user("hello")).await.unwrap();

        store.clear(&id).await.unwrap();
        assert!(store.contains(&id));
        assert!(store.history(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_deletes() {
        let store = ConversationStore::new();
        let id = store.create("user-1", None);
        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert!(!store.contains(&id));
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_lose_messages() {
        let store = Arc::new(ConversationStore::with_cap(100));
        let id = store.create("user-1", None);

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.append(&id, Message::user(format!("m{i}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.history(&id).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_exchange_messages_stay_paired() {
        let store = Arc::new(ConversationStore::with_cap(100));
        let id = store.create("user-1", None);

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_exchange(
                        &id,
                        Message::user(format!("q{i}")),
                        Message::assistant(format!("a{i}")),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Each question is immediately followed by its answer
        let history = store.history(&id).await.unwrap();
        assert_eq!(history.len(), 16);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, MessageRole::User);
            assert_eq!(pair[1].role, MessageRole::Assistant);
            assert_eq!(pair[0].content[1..], pair[1].content[1..]);
        }
    }
}
