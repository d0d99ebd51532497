//! The abstract streaming model contract: the core only ever
//! consumes [`ReasoningFragment`]s. Translating a specific provider's
//! streaming protocol into this shape is that provider's job — see
//! [`crate::providers::openai::OpenAiCompatibleModel`] for the shipped
//! reference implementation.

use crate::Result;
use crate::message::Msg;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

/// One piece of a streamed reasoning turn.
#[derive(Debug, Clone)]
pub enum ReasoningFragment {
    /// An incremental slice of visible text.
    TextDelta(String),
    /// An incremental slice of the model's reasoning trace.
    ThinkingDelta(String),
    /// An incremental slice of one tool-use's JSON input, keyed by the
    /// tool-use's id. `name` is `Some` only on the delta that first
    /// introduces the tool-use (mirrors how most providers stream it).
    ToolUseDelta {
        id: String,
        name: Option<String>,
        input_delta: String,
    },
    /// Generation has ended; carries the provider's finish reason
    /// (`"stop"`, `"tool_calls"`, `"length"`, ...).
    Finish(String),
}

/// A tool's JSON-schema advertisement to the model, as produced by the
/// toolkit for whatever tools are currently active.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Options that shape a single `stream` call. Distinct from [`crate::agent::AgentOptions`]:
/// this is the narrow per-request subset a `Model` implementation needs.
#[derive(Debug, Clone)]
pub struct ModelCallOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// The abstract contract for a streaming chat-completion backend.
///
/// Implementations translate `prompt` + `tool_schemas` into a provider
/// request, issue it, and adapt the provider's streaming events into
/// [`ReasoningFragment`]s. The returned stream is single-producer; dropping
/// it is how a caller cooperatively cancels an in-flight request.
#[async_trait]
pub trait Model: Send + Sync {
    async fn stream(
        &self,
        prompt: &[Msg],
        tool_schemas: &[ToolSchema],
        options: &ModelCallOptions,
    ) -> Result<BoxStream<'static, Result<ReasoningFragment>>>;
}
