//! The hook pipeline: ordered observers with suspension-capable pre/post
//! callbacks at nine defined phases. Registration order is the
//! dispatch order; transformations compose left-to-right, i.e. with hooks
//! `H1`, `H2` registered in that order, the payload reaching any downstream
//! component equals `H2(H1(original))`.
//!
//! A simpler first-non-None-decision-wins hook model can't express
//! composition, so every callback here returns the (possibly unchanged)
//! payload rather than an optional override, and every registered hook's
//! callback runs in turn rather than short-circuiting.

use crate::agent::Agent;
use crate::error::Error;
use crate::message::{ContentBlock, Msg, ToolResultBlock, ToolUseBlock};
use async_trait::async_trait;
use std::sync::Arc;

/// Per-hook choice for how `on_reasoning_chunk` receives streaming text:
/// only the new delta, or the cumulative text-so-far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMode {
    Incremental,
    Cumulative,
}

/// A streamed reasoning chunk as delivered to `on_reasoning_chunk`, shaped
/// according to the hook's requested [`ChunkMode`].
#[derive(Debug, Clone)]
pub struct ReasoningChunkView {
    pub text: String,
    pub mode: ChunkMode,
}

/// An observer-and-transformer plugin invoked at defined lifecycle phases.
/// Every method has a no-op default, so a hook only needs to implement the
/// phases it cares about.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str {
        "hook"
    }

    /// Requested chunk mode for `on_reasoning_chunk`. Defaults to incremental.
    fn chunk_mode(&self) -> ChunkMode {
        ChunkMode::Incremental
    }

    async fn pre_call(&self, _agent: &Agent) {}

    async fn pre_reasoning(&self, _agent: &Agent, msgs: Vec<Msg>) -> Vec<Msg> {
        msgs
    }

    async fn on_reasoning_chunk(&self, _agent: &Agent, _chunk: &ReasoningChunkView) {}

    async fn post_reasoning(&self, _agent: &Agent, msg: Msg) -> Msg {
        msg
    }

    async fn pre_acting(&self, _agent: &Agent, tool_use: ToolUseBlock) -> ToolUseBlock {
        tool_use
    }

    async fn on_acting_chunk(&self, _agent: &Agent, _tool_use: &ToolUseBlock, _chunk: &ContentBlock) {}

    async fn post_acting(
        &self,
        _agent: &Agent,
        _tool_use: &ToolUseBlock,
        result: ToolResultBlock,
    ) -> ToolResultBlock {
        result
    }

    async fn on_error(&self, _agent: &Agent, _err: &Error) {}

    async fn post_call(&self, _agent: &Agent, msg: Msg) -> Msg {
        msg
    }
}

/// The ordered chain of hooks attached to an agent. Dispatch is strictly
/// sequential in registration order for every phase.
#[derive(Clone, Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Appends a hook at the end of the chain (registration order).
    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub async fn pre_call(&self, agent: &Agent) {
        for hook in &self.hooks {
            hook.pre_call(agent).await;
        }
    }

    /// `H2(H1(original))`: each hook receives the previous hook's output.
    pub async fn pre_reasoning(&self, agent: &Agent, mut msgs: Vec<Msg>) -> Vec<Msg> {
        for hook in &self.hooks {
            msgs = hook.pre_reasoning(agent, msgs).await;
        }
        msgs
    }

    pub async fn on_reasoning_chunk(&self, agent: &Agent, incremental: &str, cumulative: &str) {
        for hook in &self.hooks {
            let view = match hook.chunk_mode() {
                ChunkMode::Incremental => ReasoningChunkView {
                    text: incremental.to_string(),
                    mode: ChunkMode::Incremental,
                },
                ChunkMode::Cumulative => ReasoningChunkView {
                    text: cumulative.to_string(),
                    mode: ChunkMode::Cumulative,
                },
            };
            hook.on_reasoning_chunk(agent, &view).await;
        }
    }

    pub async fn post_reasoning(&self, agent: &Agent, mut msg: Msg) -> Msg {
        for hook in &self.hooks {
            msg = hook.post_reasoning(agent, msg).await;
        }
        msg
    }

    pub async fn pre_acting(&self, agent: &Agent, mut tool_use: ToolUseBlock) -> ToolUseBlock {
        for hook in &self.hooks {
            tool_use = hook.pre_acting(agent, tool_use).await;
        }
        tool_use
    }

    pub async fn on_acting_chunk(&self, agent: &Agent, tool_use: &ToolUseBlock, chunk: &ContentBlock) {
        for hook in &self.hooks {
            hook.on_acting_chunk(agent, tool_use, chunk).await;
        }
    }

    pub async fn post_acting(
        &self,
        agent: &Agent,
        tool_use: &ToolUseBlock,
        mut result: ToolResultBlock,
    ) -> ToolResultBlock {
        for hook in &self.hooks {
            result = hook.post_acting(agent, tool_use, result).await;
        }
        result
    }

    /// Surfaces an error to every hook's `on_error`, in registration order,
    /// regardless of what any individual hook does with it.
    pub async fn on_error(&self, agent: &Agent, err: &Error) {
        for hook in &self.hooks {
            hook.on_error(agent, err).await;
        }
    }

    pub async fn post_call(&self, agent: &Agent, mut msg: Msg) -> Msg {
        for hook in &self.hooks {
            msg = hook.post_call(agent, msg).await;
        }
        msg
    }
}
