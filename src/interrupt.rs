//! The interrupt controller: a single-slot signal per agent call, source-
//! tagged. Generalizes a bare `Arc<AtomicBool>` interrupted flag into a
//! structured context carrying a source, a timestamp, an optional user
//! message, and the tool calls still outstanding when the signal landed.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, Notify};

use crate::message::ToolUseBlock;

/// Who raised an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSource {
    /// The caller asked the running agent to stop.
    User,
    /// A tool implementation invoked its bound [`InterruptHandle`] mid-call.
    Tool,
    /// The runtime itself raised it (e.g. a fatal hook or supervisory signal).
    System,
}

/// The information captured at the moment an interrupt is signaled.
/// Consumed exactly once by the ReAct loop's reconciliation step.
#[derive(Debug, Clone)]
pub struct InterruptContext {
    pub source: InterruptSource,
    pub timestamp_millis: u64,
    pub user_message: Option<String>,
    /// Tool-use ids that were in flight when the interrupt was observed;
    /// the reconciliation step synthesizes `ToolResultBlock::interrupted`
    /// placeholders for each of these.
    pub pending_tool_calls: Vec<ToolUseBlock>,
}

impl InterruptContext {
    fn new(source: InterruptSource, user_message: Option<String>, pending_tool_calls: Vec<ToolUseBlock>) -> Self {
        Self {
            source,
            timestamp_millis: now_millis(),
            user_message,
            pending_tool_calls,
        }
    }
}

#[derive(Default)]
struct Slot {
    context: Option<InterruptContext>,
}

/// Owns the single-slot interrupt cell for one agent call. Signaling twice
/// before the slot is drained is not an error: the first signal wins and
/// later ones are silently ignored, since there is only one outstanding
/// call to interrupt.
pub struct InterruptController {
    slot: Arc<Mutex<Slot>>,
    notify: Arc<Notify>,
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptController {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// A cloneable capability bound to this controller's slot. Handed to the
    /// ReAct loop (for user/system interrupts) and to tool invocations
    /// (for tool-initiated interrupts) — a bound capability rather than
    /// ambient/thread-local state.
    pub fn handle(&self) -> InterruptHandle {
        InterruptHandle {
            slot: self.slot.clone(),
            notify: self.notify.clone(),
        }
    }

    /// Consumes and clears whatever interrupt is pending, if any. Matches
    /// `getAndClear`: a second call with nothing newly signaled
    /// returns `None`.
    pub async fn get_and_clear(&self) -> Option<InterruptContext> {
        self.slot.lock().await.context.take()
    }

    /// Resets the slot. Called at `preCall` so a stale signal from a
    /// previous call can never leak into a new one.
    pub async fn reset(&self) {
        self.slot.lock().await.context = None;
    }

    pub async fn is_signaled(&self) -> bool {
        self.slot.lock().await.context.is_some()
    }
}

/// Cloneable capability for raising an interrupt against one controller's
/// slot, without holding the controller itself.
#[derive(Clone)]
pub struct InterruptHandle {
    slot: Arc<Mutex<Slot>>,
    notify: Arc<Notify>,
}

impl InterruptHandle {
    /// Signals a user-initiated interrupt, carrying an optional follow-up
    /// message to fold into the recovery turn.
    pub async fn signal_user(&self, user_message: Option<String>, pending_tool_calls: Vec<ToolUseBlock>) {
        self.signal(InterruptSource::User, user_message, pending_tool_calls)
            .await;
    }

    /// Signals a tool-initiated interrupt (a tool calling its bound handle
    /// mid-invocation with a reason). The reason is carried in the same
    /// `user_message` slot the data model defines (lists no separate
    /// field for it); reconciliation combines it with the interrupting
    /// tool's name, taken from the first pending tool call.
    pub async fn signal_tool(&self, reason: impl Into<String>, pending_tool_calls: Vec<ToolUseBlock>) {
        self.signal(InterruptSource::Tool, Some(reason.into()), pending_tool_calls)
            .await;
    }

    /// Signals a system-initiated interrupt.
    pub async fn signal_system(&self, reason: impl Into<String>) {
        self.signal(InterruptSource::System, Some(reason.into()), vec![]).await;
    }

    async fn signal(&self, source: InterruptSource, user_message: Option<String>, pending: Vec<ToolUseBlock>) {
        let mut slot = self.slot.lock().await;
        if slot.context.is_none() {
            slot.context = Some(InterruptContext::new(source, user_message, pending));
        }
        drop(slot);
        self.notify.notify_waiters();
    }

    pub async fn is_signaled(&self) -> bool {
        self.slot.lock().await.context.is_some()
    }

    /// Suspends until this call is interrupted. Returns immediately if
    /// already signaled. Used at suspension points to race a fallible
    /// operation against interruption via `tokio::select!` without busy
    /// polling — e.g. `select! { _ = handle.wait_signaled() => ..., r =
    /// some_future => ... }`.
    pub async fn wait_signaled(&self) {
        loop {
            if self.is_signaled().await {
                return;
            }
            let notified = self.notify.notified();
            if self.is_signaled().await {
                return;
            }
            notified.await;
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
