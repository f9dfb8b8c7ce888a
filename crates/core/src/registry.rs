//! Conversation → collection bookkeeping.
//!
//! Every live conversation owns one [`CollectionHandle`]. Passage ids are
//! handed out by an atomic counter on the handle, so two uploads racing on
//! the same conversation receive disjoint id ranges.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Collection names are a pure function of the conversation id. Hyphens are
/// not allowed in collection names, so they become underscores.
pub fn collection_name(prefix: &str, conversation_id: &str) -> String {
    format!("{prefix}{}", conversation_id.replace('-', "_"))
}

const MAX_CONVERSATION_ID_LEN: usize = 128;

/// Conversation ids end up in collection names and snapshot file names.
/// `_` is refused because [`collection_name`] maps `-` onto it, and two ids
/// must never share a collection.
pub fn is_valid_conversation_id(conversation_id: &str) -> bool {
    !conversation_id.is_empty()
        && conversation_id.len() <= MAX_CONVERSATION_ID_LEN
        && conversation_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
}

#[derive(Debug)]
pub struct CollectionHandle {
    conversation_id: String,
    name: String,
    created_at: DateTime<Utc>,
    next_id: AtomicU64,
    last_used: Mutex<Instant>,
}

impl CollectionHandle {
    fn new(conversation_id: String, name: String, next_id: u64) -> Self {
        Self {
            conversation_id,
            name,
            created_at: Utc::now(),
            next_id: AtomicU64::new(next_id),
            last_used: Mutex::new(Instant::now()),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Reserves `count` consecutive ids.
    pub fn reserve_ids(&self, count: u64) -> Range<u64> {
        let start = self.next_id.fetch_add(count, Ordering::SeqCst);
        start..start + count
    }

    pub fn touch(&self) {
        if let Ok(mut last_used) = self.last_used.lock() {
            *last_used = Instant::now();
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .map(|last_used| last_used.elapsed())
            .unwrap_or_default()
    }
}

/// Live handles keyed by collection name, so ids that map to the same
/// collection always share one counter.
#[derive(Debug)]
pub struct ConversationRegistry {
    prefix: String,
    handles: RwLock<HashMap<String, Arc<CollectionHandle>>>,
}

impl ConversationRegistry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            handles: RwLock::default(),
        }
    }

    pub fn collection_name(&self, conversation_id: &str) -> String {
        collection_name(&self.prefix, conversation_id)
    }

    pub fn get(&self, conversation_id: &str) -> Option<Arc<CollectionHandle>> {
        let name = self.collection_name(conversation_id);
        self.handles
            .read()
            .ok()
            .and_then(|handles| handles.get(&name).cloned())
    }

    /// Registers a fresh handle, replacing any previous one for the conversation.
    pub fn register(&self, conversation_id: &str, next_id: u64) -> Arc<CollectionHandle> {
        let name = self.collection_name(conversation_id);
        let handle = Arc::new(CollectionHandle::new(
            conversation_id.to_string(),
            name.clone(),
            next_id,
        ));
        if let Ok(mut handles) = self.handles.write() {
            handles.insert(name, Arc::clone(&handle));
        }
        handle
    }

    pub fn remove(&self, conversation_id: &str) -> Option<Arc<CollectionHandle>> {
        let name = self.collection_name(conversation_id);
        self.handles
            .write()
            .ok()
            .and_then(|mut handles| handles.remove(&name))
    }

    /// Whether `handle` is still the registered handle for its collection.
    pub fn is_current(&self, handle: &Arc<CollectionHandle>) -> bool {
        self.handles
            .read()
            .ok()
            .and_then(|handles| handles.get(handle.name()).cloned())
            .is_some_and(|current| Arc::ptr_eq(&current, handle))
    }

    pub fn idle_conversations(&self, ttl: Duration) -> Vec<String> {
        self.handles
            .read()
            .map(|handles| {
                handles
                    .values()
                    .filter(|handle| handle.idle_for() >= ttl)
                    .map(|handle| handle.conversation_id().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.handles.read().map(|handles| handles.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn collection_names_replace_hyphens() {
        assert_eq!(
            collection_name("legal_rag_collection_", "3f2a-41b0-9c"),
            "legal_rag_collection_3f2a_41b0_9c"
        );
    }

    #[test]
    fn conversation_ids_are_restricted_to_name_safe_characters() {
        assert!(is_valid_conversation_id("0b6c7e2e-6f55-4c43-9d0c-3f1d2b8f4a10"));
        assert!(is_valid_conversation_id("case-42"));
        assert!(!is_valid_conversation_id("case_42"));
        assert!(!is_valid_conversation_id(""));
        assert!(!is_valid_conversation_id("../etc"));
        assert!(!is_valid_conversation_id("a b"));
        assert!(!is_valid_conversation_id(&"x".repeat(129)));
    }

    #[test]
    fn accepted_ids_never_share_a_collection() {
        let ids = ["case-1", "case1", "case--1", "ca-se1", "CASE-1"];
        let names: HashSet<String> = ids
            .iter()
            .filter(|id| is_valid_conversation_id(id))
            .map(|id| collection_name("p_", id))
            .collect();

        assert_eq!(names.len(), ids.len());
    }

    #[test]
    fn replaced_handles_are_no_longer_current() {
        let registry = ConversationRegistry::new("p_");
        let first = registry.register("conv", 0);
        assert!(registry.is_current(&first));

        let second = registry.register("conv", 0);

        assert!(!registry.is_current(&first));
        assert!(registry.is_current(&second));
        registry.remove("conv");
        assert!(!registry.is_current(&second));
    }

    #[test]
    fn reserved_ranges_are_disjoint_across_threads() {
        let registry = Arc::new(ConversationRegistry::new("p_"));
        let handle = registry.register("conv", 5);

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || {
                    (0..50)
                        .flat_map(|_| handle.reserve_ids(3))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for worker in workers {
            for id in worker.join().unwrap() {
                assert!(seen.insert(id), "id {id} handed out twice");
            }
        }
        assert_eq!(seen.len(), 8 * 50 * 3);
        assert_eq!(seen.iter().min(), Some(&5));
        assert_eq!(handle.next_id(), 5 + 8 * 50 * 3);
    }

    #[test]
    fn register_replaces_previous_handle() {
        let registry = ConversationRegistry::new("p_");
        let first = registry.register("conv", 0);
        first.reserve_ids(10);

        let second = registry.register("conv", 0);

        assert_eq!(second.next_id(), 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("conv").map(|h| h.next_id()), Some(0));
    }

    #[test]
    fn idle_conversations_respect_ttl() {
        let registry = ConversationRegistry::new("p_");
        registry.register("a", 0);

        assert_eq!(registry.idle_conversations(Duration::ZERO), vec!["a".to_string()]);
        assert!(registry
            .idle_conversations(Duration::from_secs(3600))
            .is_empty());

        registry.remove("a");
        assert!(registry.is_empty());
    }
}
