//! Pending-prompt registry.
//!
//! A handler that asks the user a free-text question arms an entry keyed by
//! the question message (the anchor). The next reply targeting that anchor
//! fulfills the entry; if none arrives within the TTL it expires. Per key the
//! lifecycle is Armed → Fulfilled | Expired, terminal either way, and exactly
//! one of the two handlers fires: both paths take the entry out of the map
//! under the lock, so whoever removes it first wins the race.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use tokio::{
    sync::Mutex,
    time::{sleep, Duration, Instant},
};

use crate::domain::{ChatId, MessageId, MessageRef};

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type ReplyHandler = Box<dyn FnOnce(Reply) -> HandlerFuture + Send>;
pub type ExpireHandler = Box<dyn FnOnce() -> HandlerFuture + Send>;

/// Convenience for building handler futures without spelling out the pin-box.
pub fn handler<F>(fut: F) -> HandlerFuture
where
    F: Future<Output = ()> + Send + 'static,
{
    Box::pin(fut)
}

/// A free-text reply delivered to a fulfilled prompt.
#[derive(Clone, Debug)]
pub struct Reply {
    /// The user's reply message itself.
    pub message: MessageRef,
    /// Reply text; `None` for non-text replies (stickers etc).
    pub text: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct PromptKey {
    chat_id: ChatId,
    anchor: MessageId,
}

struct PendingPrompt {
    generation: u64,
    created_at: Instant,
    on_reply: ReplyHandler,
    on_expire: ExpireHandler,
}

#[derive(Default)]
struct RegistryState {
    next_generation: u64,
    entries: HashMap<PromptKey, PendingPrompt>,
}

/// At most one live entry per (chat, anchor); re-arming replaces.
#[derive(Clone, Default)]
pub struct PromptRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending prompt and start its expiry timer.
    ///
    /// An existing entry for the same key is replaced (last-write-wins) and
    /// its handlers are dropped unfired; the replaced entry's timer checks the
    /// generation so it cannot expire its successor.
    pub async fn arm(
        &self,
        chat_id: ChatId,
        anchor: MessageId,
        on_reply: ReplyHandler,
        on_expire: ExpireHandler,
        ttl: Duration,
    ) {
        let key = PromptKey { chat_id, anchor };
        let generation = {
            let mut st = self.state.lock().await;
            let generation = st.next_generation;
            st.next_generation += 1;
            st.entries.insert(
                key,
                PendingPrompt {
                    generation,
                    created_at: Instant::now(),
                    on_reply,
                    on_expire,
                },
            );
            generation
        };

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            sleep(ttl).await;
            let expired = {
                let mut st = state.lock().await;
                match st.entries.get(&key) {
                    Some(e) if e.generation == generation => st.entries.remove(&key),
                    _ => None,
                }
            };
            if let Some(entry) = expired {
                tracing::debug!(
                    chat_id = key.chat_id.0,
                    anchor = key.anchor.0,
                    waited = ?entry.created_at.elapsed(),
                    "prompt expired"
                );
                (entry.on_expire)().await;
            }
        });
    }

    /// Deliver a reply to the prompt anchored at `anchor`, if one is armed.
    ///
    /// Returns true when a handler ran. A reply with no matching entry
    /// (never armed, already fulfilled, or expired) is ignored.
    pub async fn fulfill(&self, chat_id: ChatId, anchor: MessageId, reply: Reply) -> bool {
        let entry = {
            let mut st = self.state.lock().await;
            st.entries.remove(&PromptKey { chat_id, anchor })
        };
        match entry {
            Some(entry) => {
                (entry.on_reply)(reply).await;
                true
            }
            None => false,
        }
    }
}
