//! The ReAct agent: the state machine alternating reasoning (consult the
//! model) and acting (dispatch tools), bounded by `max_iters`, terminated by
//! a `generate_response` tool call or an interruption.
//!
//! The iterate / assemble / branch shape mirrors a classic auto-execute
//! loop, generalized here with the abstract [`Model`] contract, the
//! structured hook pipeline, and the interrupt controller's reconciliation
//! procedure, and enriched with a `join_all`-based parallel tool dispatch
//! path gated on a per-entry concurrency-safety flag.

use std::sync::Arc;

use futures::future::join_all;
use futures::stream::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::error::Error;
use crate::hooks::{Hook, HookPipeline};
use crate::interrupt::{InterruptContext, InterruptController, InterruptHandle, InterruptSource};
use crate::memory::Memory;
use crate::message::{ContentBlock, MessageRole, Msg, ThinkingBlock, TextBlock, ToolResultBlock, ToolUseBlock};
use crate::model::{Model, ModelCallOptions, ReasoningFragment};
use crate::toolkit::{ToolChunk, Toolkit, GENERATE_RESPONSE};
use crate::Result;

/// Input accepted by [`Agent::call`]: either plain text (the common case) or
/// a fully-formed [`Msg`] (used by pipelines threading one agent's output
/// message into the next agent's call).
pub enum AgentInput {
    Text(String),
    Message(Msg),
}

impl From<&str> for AgentInput {
    fn from(s: &str) -> Self {
        AgentInput::Text(s.to_string())
    }
}

impl From<String> for AgentInput {
    fn from(s: String) -> Self {
        AgentInput::Text(s)
    }
}

impl From<Msg> for AgentInput {
    fn from(m: Msg) -> Self {
        AgentInput::Message(m)
    }
}

impl AgentInput {
    pub(crate) fn into_msg(self) -> Msg {
        match self {
            AgentInput::Text(text) => Msg::user(text),
            AgentInput::Message(msg) => msg,
        }
    }
}

/// Configuration for one [`Agent`]: the narrow subset the ReAct loop itself
/// needs. Model selection, tools, and hooks are supplied separately (the
/// `Model` trait object, the `Toolkit`, and `register_hook`) rather than
/// bundled in here, since those are collaborators with their own lifecycles
/// — unlike a monolithic options struct that bundles everything together.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    name: String,
    system_prompt: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_iters: u32,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            name: "assistant".to_string(),
            system_prompt: String::new(),
            model: String::new(),
            temperature: 0.7,
            max_tokens: Some(4096),
            // Default 10, configurable per agent.
            max_iters: 10,
        }
    }
}

impl AgentOptions {
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn max_iters(&self) -> u32 {
        self.max_iters
    }

    fn call_options(&self) -> ModelCallOptions {
        ModelCallOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Default)]
pub struct AgentOptionsBuilder {
    name: Option<String>,
    system_prompt: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    max_iters: Option<u32>,
}

impl AgentOptionsBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn max_iters(mut self, max_iters: u32) -> Self {
        self.max_iters = Some(max_iters);
        self
    }

    pub fn build(self) -> Result<AgentOptions> {
        let model = self
            .model
            .ok_or_else(|| Error::config("AgentOptions requires a model identifier"))?;
        if self.max_iters == Some(0) {
            return Err(Error::config("max_iters must be at least 1"));
        }
        let defaults = AgentOptions::default();
        Ok(AgentOptions {
            name: self.name.unwrap_or(defaults.name),
            system_prompt: self.system_prompt.unwrap_or_default(),
            model,
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.or(defaults.max_tokens),
            max_iters: self.max_iters.unwrap_or(defaults.max_iters),
        })
    }
}

/// One accumulation slot while reassembling a streamed reasoning turn.
/// Order of first appearance is preserved; a tool-use slot is found by id
/// regardless of interleaving with text/thinking deltas.
enum AccSlot {
    Text(String),
    Thinking(String),
    ToolUse {
        id: String,
        name: Option<String>,
        input_json: String,
    },
}

/// Accumulates a stream of [`ReasoningFragment`]s into a finished [`Msg`].
#[derive(Default)]
struct ReasoningAccumulator {
    slots: Vec<AccSlot>,
}

impl ReasoningAccumulator {
    fn push_text(&mut self, delta: &str) {
        if let Some(AccSlot::Text(s)) = self.slots.last_mut() {
            s.push_str(delta);
        } else {
            self.slots.push(AccSlot::Text(delta.to_string()));
        }
    }

    fn push_thinking(&mut self, delta: &str) {
        if let Some(AccSlot::Thinking(s)) = self.slots.last_mut() {
            s.push_str(delta);
        } else {
            self.slots.push(AccSlot::Thinking(delta.to_string()));
        }
    }

    fn push_tool_use_delta(&mut self, id: &str, name: Option<String>, input_delta: &str) {
        for slot in self.slots.iter_mut() {
            if let AccSlot::ToolUse {
                id: existing_id,
                name: existing_name,
                input_json,
            } = slot
            {
                if existing_id == id {
                    if existing_name.is_none() {
                        *existing_name = name;
                    }
                    input_json.push_str(input_delta);
                    return;
                }
            }
        }
        self.slots.push(AccSlot::ToolUse {
            id: id.to_string(),
            name,
            input_json: input_delta.to_string(),
        });
    }

    /// Text accumulated so far across all `Text` slots, for `CUMULATIVE`
    /// chunk-mode hooks.
    fn cumulative_text(&self) -> String {
        self.slots
            .iter()
            .filter_map(|s| match s {
                AccSlot::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    fn finish(self, participant: &str) -> Msg {
        let content = self
            .slots
            .into_iter()
            .map(|slot| match slot {
                AccSlot::Text(t) => ContentBlock::Text(TextBlock::new(t)),
                AccSlot::Thinking(t) => ContentBlock::Thinking(ThinkingBlock::new(t)),
                AccSlot::ToolUse {
                    id,
                    name,
                    input_json,
                } => {
                    let input = if input_json.trim().is_empty() {
                        serde_json::json!({})
                    } else {
                        serde_json::from_str(&input_json).unwrap_or(serde_json::json!({}))
                    };
                    ContentBlock::ToolUse(ToolUseBlock::new(id, name.unwrap_or_default(), input))
                }
            })
            .collect::<Vec<_>>();

        let content = if content.is_empty() {
            vec![ContentBlock::Text(TextBlock::new(""))]
        } else {
            content
        };

        Msg::new(participant.to_string(), MessageRole::Assistant, content)
    }
}

/// The ReAct agent. Owns its memory, toolkit, hook pipeline, and interrupt
/// controller; consults an injected [`Model`] for reasoning. One `Agent`
/// handles one logical conversation; concurrent calls on the same instance
/// are not supported by the core and must be serialized by the caller.
pub struct Agent {
    options: AgentOptions,
    model: Arc<dyn Model>,
    toolkit: Arc<Toolkit>,
    memory: Memory,
    hooks: RwLock<HookPipeline>,
    interrupt: InterruptController,
}

impl Agent {
    pub fn new(model: Arc<dyn Model>, toolkit: Arc<Toolkit>, options: AgentOptions) -> Self {
        Self {
            options,
            model,
            toolkit,
            memory: Memory::new(),
            hooks: RwLock::new(HookPipeline::new()),
            interrupt: InterruptController::new(),
        }
    }

    /// Builds a minimal agent for unit tests that only need `&Agent` to pass
    /// to hook callbacks — it is never actually driven through `call`, so its
    /// `Model` panics if invoked.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        struct UnusedModel;
        #[async_trait::async_trait]
        impl Model for UnusedModel {
            async fn stream(
                &self,
                _prompt: &[Msg],
                _tool_schemas: &[crate::model::ToolSchema],
                _options: &ModelCallOptions,
            ) -> Result<futures::stream::BoxStream<'static, Result<ReasoningFragment>>> {
                unreachable!("for_tests() agents are not driven through call()")
            }
        }
        Self::new(
            Arc::new(UnusedModel),
            Arc::new(Toolkit::new()),
            AgentOptions::builder().model("test-model").build().unwrap(),
        )
    }

    pub fn name(&self) -> &str {
        self.options.name()
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub fn toolkit(&self) -> &Arc<Toolkit> {
        &self.toolkit
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.handle()
    }

    /// Appends a hook at the end of the chain. Registration order is
    /// dispatch order.
    pub async fn register_hook(&self, hook: Arc<dyn Hook>) {
        self.hooks.write().await.register(hook);
    }

    /// Signals a user-initiated interrupt against the call currently in
    /// flight, if any.
    pub async fn interrupt(&self, user_message: Option<String>) {
        self.interrupt.handle().signal_user(user_message, vec![]).await;
    }

    /// Runs one full turn of the ReAct loop: appends `input` to memory, then
    /// alternates reasoning and acting until a `generate_response` call
    /// lands, `max_iters` is exhausted, or an interrupt is observed.
    #[instrument(skip(self, input), fields(agent = %self.options.name))]
    pub async fn call(&self, input: impl Into<AgentInput>) -> Result<Msg> {
        self.interrupt.reset().await;
        let hooks = self.hooks.read().await;
        hooks.pre_call(self).await;

        self.memory.append(input.into().into_msg()).await;

        for turn in 0..self.options.max_iters {
            debug!(turn, "starting reasoning turn");

            if let Some(ctx) = self.interrupt.get_and_clear().await {
                return Ok(self.reconcile(&hooks, ctx).await);
            }

            let reasoning_msg = match self.run_reasoning_turn(&hooks).await {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    // Interrupted mid-stream; no tool-uses were enumerated
                    // yet this turn.
                    let ctx = self
                        .interrupt
                        .get_and_clear()
                        .await
                        .unwrap_or_else(|| InterruptContext::system("interrupted mid-reasoning"));
                    return Ok(self.reconcile(&hooks, ctx).await);
                }
                Err(err) => {
                    hooks.on_error(self, &err).await;
                    let recovery = Msg::assistant(vec![ContentBlock::Text(TextBlock::new(
                        format!("Model stream failed: {err}"),
                    ))]);
                    self.memory.append(recovery.clone()).await;
                    let final_msg = hooks.post_call(self, recovery).await;
                    return Ok(final_msg);
                }
            };

            let reasoning_msg = hooks.post_reasoning(self, reasoning_msg).await;
            self.memory.append(reasoning_msg.clone()).await;

            let tool_uses = reasoning_msg.tool_uses();

            if tool_uses.is_empty() {
                self.memory
                    .append(Msg::system(
                        "No tool call was made in the previous turn; continue reasoning \
                         or call generate_response to finish.",
                    ))
                    .await;
                continue;
            }

            if let Some(final_use) = tool_uses.iter().find(|t| t.name == GENERATE_RESPONSE).cloned() {
                let final_use = final_use.clone();
                // Tool-uses preceding the terminal call (if any) still need
                // their results before generate_response is honored, so the
                // memory invariant (every tool-use gets a result) holds.
                let preceding: Vec<ToolUseBlock> = tool_uses
                    .iter()
                    .take_while(|t| t.id != final_use.id)
                    .map(|t| (*t).clone())
                    .collect();
                if !preceding.is_empty() {
                    if let Some(ctx) = self
                        .run_acting_phase(&hooks, preceding)
                        .await?
                    {
                        return Ok(self.reconcile(&hooks, ctx).await);
                    }
                }

                return Ok(self.finalize(&hooks, final_use).await);
            }

            let all_tool_uses: Vec<ToolUseBlock> = tool_uses.into_iter().cloned().collect();
            if let Some(ctx) = self.run_acting_phase(&hooks, all_tool_uses).await? {
                return Ok(self.reconcile(&hooks, ctx).await);
            }
        }

        self.interrupt
            .handle()
            .signal_system(format!(
                "maximum iterations reached ({})",
                self.options.max_iters
            ))
            .await;
        let ctx = self
            .interrupt
            .get_and_clear()
            .await
            .expect("system interrupt was just signaled");
        Ok(self.reconcile(&hooks, ctx).await)
    }

    /// Drains one reasoning turn's fragment stream into a finished message.
    /// Returns `Ok(None)` if an interrupt was observed mid-stream before any
    /// `Finish` fragment arrived.
    async fn run_reasoning_turn(&self, hooks: &HookPipeline) -> Result<Option<Msg>> {
        let msgs = self.memory.snapshot().await;
        let mut msgs = hooks.pre_reasoning(self, msgs).await;
        if !self.options.system_prompt.is_empty() {
            msgs.insert(0, Msg::system(self.options.system_prompt.clone()));
        }

        let schemas = self.toolkit.list_active().await;
        let call_options = self.options.call_options();
        let interrupt_handle = self.interrupt.handle();

        let mut stream = self.model.stream(&msgs, &schemas, &call_options).await?;
        let mut acc = ReasoningAccumulator::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = interrupt_handle.wait_signaled() => None,
                fragment = stream.next() => Some(fragment),
            };

            let Some(fragment) = next else {
                return Ok(None);
            };

            let Some(fragment) = fragment else {
                // Stream ended without an explicit Finish fragment.
                break;
            };

            match fragment? {
                ReasoningFragment::TextDelta(delta) => {
                    acc.push_text(&delta);
                    hooks
                        .on_reasoning_chunk(self, &delta, &acc.cumulative_text())
                        .await;
                }
                ReasoningFragment::ThinkingDelta(delta) => {
                    acc.push_thinking(&delta);
                }
                ReasoningFragment::ToolUseDelta {
                    id,
                    name,
                    input_delta,
                } => {
                    acc.push_tool_use_delta(&id, name, &input_delta);
                }
                ReasoningFragment::Finish(reason) => {
                    debug!(reason = %reason, "reasoning turn finished");
                    break;
                }
            }
        }

        Ok(Some(acc.finish(&self.options.name)))
    }

    /// Runs every tool-use in `tool_uses` (in order), concurrently if every
    /// one of them is marked concurrency-safe in the toolkit, sequentially
    /// otherwise. Appends each terminal result to memory in the tool-uses'
    /// original emission order regardless of completion order.
    ///
    /// Returns `Some(ctx)` if an interrupt cut the phase short; the caller
    /// is responsible for reconciliation.
    async fn run_acting_phase(
        &self,
        hooks: &HookPipeline,
        tool_uses: Vec<ToolUseBlock>,
    ) -> Result<Option<InterruptContext>> {
        if self.interrupt.is_signaled().await {
            let ctx = self
                .interrupt
                .get_and_clear()
                .await
                .map(|mut ctx| {
                    ctx.pending_tool_calls = tool_uses.clone();
                    ctx
                })
                .unwrap_or_else(|| InterruptContext::system_with_pending("interrupted before acting", tool_uses.clone()));
            return Ok(Some(ctx));
        }

        let all_concurrent = {
            let mut all_safe = true;
            for t in &tool_uses {
                if !self.toolkit.is_concurrency_safe(&t.name).await {
                    all_safe = false;
                    break;
                }
            }
            all_safe && tool_uses.len() > 1
        };

        let outcomes = if all_concurrent {
            let futures = tool_uses
                .iter()
                .cloned()
                .map(|t| self.run_one_tool(hooks, t));
            join_all(futures).await
        } else {
            let mut outcomes = Vec::with_capacity(tool_uses.len());
            for t in tool_uses.iter().cloned() {
                let outcome = self.run_one_tool(hooks, t).await;
                let interrupted = matches!(outcome, ToolOutcome::Interrupted(_));
                outcomes.push(outcome);
                if interrupted {
                    break;
                }
            }
            outcomes
        };

        let attempted = outcomes.len();
        let mut pending = Vec::new();
        let mut saw_interrupt = false;
        for outcome in outcomes {
            match outcome {
                ToolOutcome::Completed(result) => {
                    self.memory.append(Msg::tool_results(vec![ContentBlock::ToolResult(result)])).await;
                }
                ToolOutcome::Interrupted(tool_use) => {
                    saw_interrupt = true;
                    pending.push(tool_use);
                }
            }
        }

        if saw_interrupt {
            // Tool-uses never attempted because an earlier one interrupted
            // the sequential batch still need synthetic placeholders too.
            pending.extend(tool_uses[attempted..].iter().cloned());
            let ctx = self
                .interrupt
                .get_and_clear()
                .await
                .map(|mut ctx| {
                    ctx.pending_tool_calls = pending.clone();
                    ctx
                })
                .unwrap_or_else(|| InterruptContext::system_with_pending("interrupted while acting", pending));
            return Ok(Some(ctx));
        }

        Ok(None)
    }

    async fn run_one_tool(&self, hooks: &HookPipeline, tool_use: ToolUseBlock) -> ToolOutcome {
        let tool_use = hooks.pre_acting(self, tool_use).await;
        let interrupt_handle = self.interrupt.handle();

        if interrupt_handle.is_signaled().await {
            return ToolOutcome::Interrupted(tool_use);
        }

        let mut chunks = self.toolkit.invoke(tool_use.clone(), interrupt_handle.clone()).await;

        loop {
            let next = tokio::select! {
                biased;
                _ = interrupt_handle.wait_signaled() => None,
                chunk = chunks.next() => Some(chunk),
            };

            match next {
                None => return ToolOutcome::Interrupted(tool_use),
                Some(None) => return ToolOutcome::Interrupted(tool_use),
                Some(Some(ToolChunk::Partial(block))) => {
                    hooks.on_acting_chunk(self, &tool_use, &block).await;
                }
                Some(Some(ToolChunk::Terminal(result))) => {
                    let result = hooks.post_acting(self, &tool_use, result).await;
                    return ToolOutcome::Completed(result);
                }
            }
        }
    }

    /// Invokes the built-in `generate_response` terminal tool, appends its
    /// result, and produces the final user-visible message.
    async fn finalize(&self, hooks: &HookPipeline, tool_use: ToolUseBlock) -> Msg {
        let tool_use = hooks.pre_acting(self, tool_use).await;

        let text = tool_use
            .input
            .get("response")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| tool_use.input.to_string());

        let result = ToolResultBlock::new(
            tool_use.id.clone(),
            tool_use.name.clone(),
            vec![ContentBlock::Text(TextBlock::new(text.clone()))],
        );
        let result = hooks.post_acting(self, &tool_use, result).await;
        self.memory
            .append(Msg::tool_results(vec![ContentBlock::ToolResult(result)]))
            .await;

        let final_msg = Msg::new(
            self.options.name.clone(),
            MessageRole::Assistant,
            vec![ContentBlock::Text(TextBlock::new(text))],
        );
        self.memory.append(final_msg.clone()).await;
        hooks.post_call(self, final_msg).await
    }

    /// Reconciliation: synthesizes interrupted placeholders for every
    /// pending tool-use, runs `postActing` on each, appends the recovery
    /// message, and returns it as the call's result.
    async fn reconcile(&self, hooks: &HookPipeline, ctx: InterruptContext) -> Msg {
        warn!(source = ?ctx.source, "reconciling interrupted call");

        for tool_use in &ctx.pending_tool_calls {
            let synthetic = ToolResultBlock::interrupted(tool_use.id.clone(), tool_use.name.clone());
            let synthetic = hooks.post_acting(self, tool_use, synthetic).await;
            self.memory
                .append(Msg::tool_results(vec![ContentBlock::ToolResult(synthetic)]))
                .await;
        }

        let text = match ctx.source {
            InterruptSource::User => ctx
                .user_message
                .clone()
                .unwrap_or_else(|| "Interrupted by user".to_string()),
            InterruptSource::Tool => {
                let tool_name = ctx
                    .pending_tool_calls
                    .first()
                    .map(|t| t.name.as_str())
                    .unwrap_or("unknown tool");
                let reason = ctx.user_message.clone().unwrap_or_default();
                format!("Tool '{tool_name}' requested interruption: {reason}")
            }
            InterruptSource::System => {
                format!(
                    "Agent stopped: {}",
                    ctx.user_message.clone().unwrap_or_else(|| "system interrupt".to_string())
                )
            }
        };

        let recovery = Msg::new(
            self.options.name.clone(),
            MessageRole::Assistant,
            vec![ContentBlock::Text(TextBlock::new(text))],
        );
        self.memory.append(recovery.clone()).await;
        hooks.post_call(self, recovery).await
    }
}

enum ToolOutcome {
    Completed(ToolResultBlock),
    Interrupted(ToolUseBlock),
}

impl InterruptContext {
    /// Test/internal helper constructing a SYSTEM context directly, used
    /// when the loop needs to reconcile without having gone through
    /// `InterruptHandle::signal_system` (e.g. a race where `get_and_clear`
    /// legitimately returns `None` because nothing was technically queued
    /// via the handle yet).
    fn system(reason: impl Into<String>) -> Self {
        Self::system_with_pending(reason, vec![])
    }

    fn system_with_pending(reason: impl Into<String>, pending: Vec<ToolUseBlock>) -> Self {
        Self {
            source: InterruptSource::System,
            timestamp_millis: 0,
            user_message: Some(reason.into()),
            pending_tool_calls: pending,
        }
    }
}
