//! C13 Conversation State Store — keyed by conversation id,
//! holds the compiled state message and last turn for the next request.
//! Best-effort: read failures fall back to empty state, writes are
//! fire-and-forget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use spectyra_core::STATE_TTL_SECS;

use crate::types::Message;

/// Value stored at `state:<conversation_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationStateEntry {
    pub state_msg: Message,
    pub last_turn: Vec<Message>,
}

pub fn state_key(conversation_id: &str) -> String {
    format!("state:{conversation_id}")
}

#[async_trait]
pub trait ConversationStateStore: Send + Sync {
    async fn get(&self, conversation_id: &str) -> Option<ConversationStateEntry>;
    async fn set(&self, conversation_id: &str, entry: ConversationStateEntry);
}

#[derive(Clone)]
struct StoredEntry {
    entry: ConversationStateEntry,
    expires_at_secs: u64,
}

/// In-memory fallback with a background sweep, same shape as
/// [`crate::cache::InMemorySemanticCache`].
pub struct InMemoryStateStore {
    entries: Arc<Mutex<HashMap<String, StoredEntry>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        let entries = Arc::new(Mutex::new(HashMap::new()));
        spawn_sweep(entries.clone());
        Self { entries }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn spawn_sweep(entries: Arc<Mutex<HashMap<String, StoredEntry>>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let now = now_secs();
            let mut guard = entries.lock().await;
            guard.retain(|_, v| v.expires_at_secs > now);
        }
    });
}

#[async_trait]
impl ConversationStateStore for InMemoryStateStore {
    async fn get(&self, conversation_id: &str) -> Option<ConversationStateEntry> {
        let guard = self.entries.lock().await;
        let stored = guard.get(&state_key(conversation_id))?;
        if stored.expires_at_secs <= now_secs() {
            return None;
        }
        Some(stored.entry.clone())
    }

    async fn set(&self, conversation_id: &str, entry: ConversationStateEntry) {
        let mut guard = self.entries.lock().await;
        guard.insert(
            state_key(conversation_id),
            StoredEntry {
                entry,
                expires_at_secs: now_secs() + STATE_TTL_SECS as u64,
            },
        );
    }
}

/// Reads prior state for `conversation_id`, logging and swallowing failures
/// as empty state — a degraded auxiliary collaborator, never a hard error.
pub async fn read_prior_state(
    store: &dyn ConversationStateStore,
    conversation_id: Option<&str>,
) -> Option<ConversationStateEntry> {
    let conversation_id = conversation_id?;
    let entry = store.get(conversation_id).await;
    if entry.is_none() {
        debug!(conversation_id, "no prior conversation state");
    }
    entry
}

/// Fire-and-forget write of the new state after a successful optimization.
pub async fn write_state(
    store: Arc<dyn ConversationStateStore>,
    conversation_id: String,
    entry: ConversationStateEntry,
) {
    tokio::spawn(async move {
        store.set(&conversation_id, entry).await;
        debug!(conversation_id, "wrote conversation state");
    });
}

/// Prepends `prior.state_msg` and `prior.last_turn` to `messages` before
/// unitizing.
pub fn prepend_prior_state(prior: Option<ConversationStateEntry>, messages: Vec<Message>) -> Vec<Message> {
    let Some(prior) = prior else {
        return messages;
    };
    let mut out = vec![prior.state_msg];
    out.extend(prior.last_turn);
    out.extend(messages);
    out
}
