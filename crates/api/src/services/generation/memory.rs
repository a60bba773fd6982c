//! Per-chat conversation memory.
//!
//! A bounded `moka` cache of sliding windows keyed by chat. Each entry sits
//! behind its own async mutex; the generation service holds the guard for
//! the whole request, so concurrent generations on one chat run one at a
//! time. Entries start empty and are hydrated from the database on first
//! use, so eviction only costs a reload.
//!
//! The cache decides how long an idle memory stays resident. Which mutex a
//! chat maps to is decided by a registry of weak handles: as long as any
//! request still holds a chat's memory, later requests find that same
//! mutex even if the cache has already dropped its copy.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, Weak};

use moka::future::Cache;
use tokio::sync::{Mutex, OwnedMutexGuard};

use reality_cheque_core::ChatId;

use crate::config::MemoryConfig;
use crate::llm::ChatMessage;
use crate::models::Message;

/// Number of past messages kept per chat.
pub const MEMORY_WINDOW: usize = 20;

/// Sliding window of the most recent messages of one chat.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    messages: VecDeque<ChatMessage>,
    hydrated: bool,
}

impl ConversationMemory {
    /// Whether the window has been loaded from storage.
    #[must_use]
    pub const fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Replace the window with persisted messages (oldest first).
    pub fn hydrate(&mut self, messages: &[Message]) {
        self.messages.clear();
        for message in messages {
            self.push(ChatMessage {
                role: message.role.into(),
                content: message.content.clone(),
            });
        }
        self.hydrated = true;
    }

    /// Append a message, dropping the oldest beyond [`MEMORY_WINDOW`].
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        while self.messages.len() > MEMORY_WINDOW {
            self.messages.pop_front();
        }
    }

    /// Messages in the window, oldest first.
    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    /// Number of messages in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

type SharedMemory = Arc<Mutex<ConversationMemory>>;

/// Bounded store of conversation memories.
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<ChatId, SharedMemory>,
    live: Arc<std::sync::Mutex<HashMap<ChatId, Weak<Mutex<ConversationMemory>>>>>,
    prune_above: usize,
}

impl MemoryStore {
    /// Create a store bounded by `config`.
    #[must_use]
    pub fn new(config: &MemoryConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_chats)
            .time_to_idle(config.idle_timeout)
            .build();

        Self {
            cache,
            live: Arc::default(),
            prune_above: usize::try_from(config.max_chats)
                .unwrap_or(usize::MAX)
                .saturating_mul(2),
        }
    }

    /// Lock the memory of `chat_id`, creating an empty one if absent.
    pub async fn lock(&self, chat_id: ChatId) -> OwnedMutexGuard<ConversationMemory> {
        let entry = self.entry(chat_id);
        self.cache.insert(chat_id, Arc::clone(&entry)).await;
        entry.lock_owned().await
    }

    /// The one live memory of `chat_id`, registering a fresh one if none is.
    fn entry(&self, chat_id: ChatId) -> SharedMemory {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = live.get(&chat_id).and_then(Weak::upgrade) {
            return entry;
        }

        if live.len() >= self.prune_above {
            live.retain(|_, weak| weak.strong_count() > 0);
        }
        let entry = SharedMemory::default();
        live.insert(chat_id, Arc::downgrade(&entry));
        entry
    }

    /// Drop the memory of `chat_id`.
    pub async fn evict(&self, chat_id: ChatId) {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&chat_id);
        self.cache.invalidate(&chat_id).await;
    }

    /// Whether `chat_id` currently has a memory entry.
    #[must_use]
    pub fn contains(&self, chat_id: ChatId) -> bool {
        self.cache.contains_key(&chat_id)
    }
}
