//! Ordered working-conversation buffer: append, snapshot, replace, clear.
//!
//! Memory has a single logical writer per agent call; hooks and other
//! observers see a consistent ordered view through [`Memory::snapshot`].
//! There is no eviction here — size-bounded memory is the job of an
//! external context-management collaborator (see [`crate::context`]), which
//! reads a snapshot, trims it, and writes it back via [`Memory::replace_all`].

use crate::message::Msg;
use tokio::sync::Mutex;

/// Ordered, append-only-by-default sequence of messages.
#[derive(Default)]
pub struct Memory {
    messages: Mutex<Vec<Msg>>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Appends one message. Visible to subsequent `snapshot` calls once this
    /// returns.
    pub async fn append(&self, msg: Msg) {
        self.messages.lock().await.push(msg);
    }

    /// Appends several messages, preserving their relative order.
    pub async fn append_all(&self, msgs: impl IntoIterator<Item = Msg>) {
        self.messages.lock().await.extend(msgs);
    }

    /// An immutable, ordered copy of the current contents. Later appends are
    /// not visible through a snapshot already taken.
    pub async fn snapshot(&self) -> Vec<Msg> {
        self.messages.lock().await.clone()
    }

    /// Atomically replaces the entire contents, e.g. after a context-
    /// compression pass run by an external collaborator.
    pub async fn replace_all(&self, msgs: Vec<Msg>) {
        *self.messages.lock().await = msgs;
    }

    /// Removes every message.
    pub async fn clear(&self) {
        self.messages.lock().await.clear();
    }

    /// Current message count.
    pub async fn size(&self) -> usize {
        self.messages.lock().await.len()
    }
}

impl Clone for Memory {
    /// Clones the *current contents*, not a handle to the same storage —
    /// each clone is an independent buffer seeded from a snapshot taken at
    /// clone time. Agents that need to share memory hold an `Arc<Memory>`
    /// instead of cloning.
    fn clone(&self) -> Self {
        let messages = self
            .messages
            .try_lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        Self {
            messages: Mutex::new(messages),
        }
    }
}
