//! Conversation state store: thread-keyed, append-only message history
//!
//! Threads live for the process lifetime; durable cross-process persistence
//! is an external concern. Messages within a thread are retrievable in
//! append order on every load.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{CoachError, CoachResult};

use super::types::{Message, ThreadId};

/// In-process conversation store shared across concurrent chat requests.
///
/// Cloning is cheap; all clones see the same threads.
#[derive(Clone, Default)]
pub struct ThreadStore {
    threads: Arc<RwLock<HashMap<ThreadId, Vec<Message>>>>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered message history for a thread, empty if the thread is unknown.
    pub fn load(&self, thread_id: &str) -> CoachResult<Vec<Message>> {
        let threads = self
            .threads
            .read()
            .map_err(|_| CoachError::ThreadStore("thread store lock poisoned".to_string()))?;
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }

    /// Append messages to a thread, creating it if absent. The append is
    /// all-or-nothing: callers buffer a full request's worth of messages and
    /// hand them over only once the request completed.
    pub fn append(&self, thread_id: &str, messages: &[Message]) -> CoachResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut threads = self
            .threads
            .write()
            .map_err(|_| CoachError::ThreadStore("thread store lock poisoned".to_string()))?;
        threads
            .entry(thread_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    pub fn exists(&self, thread_id: &str) -> bool {
        self.threads
            .read()
            .map(|threads| threads.contains_key(thread_id))
            .unwrap_or(false)
    }

    pub fn message_count(&self, thread_id: &str) -> usize {
        self.threads
            .read()
            .map(|threads| threads.get(thread_id).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_unknown_thread_is_empty() {
        let store = ThreadStore::new();
        assert!(store.load("nope").unwrap().is_empty());
        assert!(!store.exists("nope"));
    }

    #[test]
    fn test_append_creates_and_preserves_order() {
        let store = ThreadStore::new();
        store
            .append("t1", &[Message::user("one"), Message::assistant("two")])
            .unwrap();
        store.append("t1", &[Message::user("three")]).unwrap();

        let messages = store.load("t1").unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "one");
        assert_eq!(messages[1].content, "two");
        assert_eq!(messages[2].content, "three");
    }

    #[test]
    fn test_empty_append_does_not_create_thread() {
        let store = ThreadStore::new();
        store.append("t1", &[]).unwrap();
        assert!(!store.exists("t1"));
    }

    #[test]
    fn test_threads_are_isolated() {
        let store = ThreadStore::new();
        store.append("a", &[Message::user("for a")]).unwrap();
        store.append("b", &[Message::user("for b")]).unwrap();

        assert_eq!(store.message_count("a"), 1);
        assert_eq!(store.load("b").unwrap()[0].content, "for b");
    }

    #[test]
    fn test_clones_share_state() {
        let store = ThreadStore::new();
        let clone = store.clone();
        store.append("t", &[Message::user("hi")]).unwrap();
        assert_eq!(clone.message_count("t"), 1);
    }
}
