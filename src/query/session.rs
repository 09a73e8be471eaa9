use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::history::Conversation;

pub const SESSION_CAPACITY: usize = 1024;

pub type SharedConversation = Arc<tokio::sync::Mutex<Conversation>>;

struct Entry {
    conversation: SharedConversation,
    last_used: u64,
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, Entry>,
    clock: u64,
}

/// Maps session keys to conversations. Each conversation sits behind its
/// own async lock, so queries on one session run one at a time while
/// different sessions never share turns.
pub struct SessionStore {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_capacity(SESSION_CAPACITY)
    }
}

impl SessionStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    /// Returns the conversation for `key`, creating it on first use.
    pub fn session(&self, key: &str) -> SharedConversation {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = &mut *guard;
        entries.clock += 1;
        let now = entries.clock;
        if let Some(entry) = entries.map.get_mut(key) {
            entry.last_used = now;
            return Arc::clone(&entry.conversation);
        }

        if entries.map.len() >= self.capacity {
            evict_idle(&mut entries.map);
        }
        let conversation = SharedConversation::default();
        entries.map.insert(
            key.to_string(),
            Entry {
                conversation: Arc::clone(&conversation),
                last_used: now,
            },
        );
        debug!(session = key, sessions = entries.map.len(), "session created");
        conversation
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map
            .len()
    }
}

/// Drops the least recently used session nobody is holding.
fn evict_idle(entries: &mut HashMap<String, Entry>) {
    let victim = entries
        .iter()
        .filter(|(_, e)| Arc::strong_count(&e.conversation) == 1)
        .min_by_key(|(_, e)| e.last_used)
        .map(|(k, _)| k.clone());
    match victim {
        Some(key) => {
            entries.remove(&key);
            debug!(session = %key, "evicted least recently used session");
        }
        None => warn!(
            sessions = entries.len(),
            "session store full and every session is in use"
        ),
    }
}
