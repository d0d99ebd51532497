//! # Agent Core
//!
//! A streaming-first Rust runtime for ReAct-style LLM agents: a structured
//! message model, an ordered memory buffer, a tool registry, an abstract
//! streaming model contract, a composable hook pipeline, a cooperative
//! interrupt protocol, and sequential/fan-out multi-agent pipelines.
//!
//! The core never talks to a concrete model provider directly — it consumes
//! the [`model::Model`] trait. [`providers::openai`] ships an
//! OpenAI-compatible implementation (LM Studio, Ollama, llama.cpp, vLLM,
//! and any other server exposing the `/chat/completions` streaming API).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use agent_core::{Agent, AgentOptions, OpenAiCompatibleModel, Toolkit};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = OpenAiCompatibleModel::new("http://localhost:1234/v1", "");
//!     let options = AgentOptions::builder()
//!         .system_prompt("You are a helpful assistant")
//!         .model("qwen2.5-32b-instruct")
//!         .build()?;
//!
//!     let agent = Agent::new(Arc::new(model), Arc::new(Toolkit::new()), options);
//!     let reply = agent.call("What's the capital of France?").await?;
//!     println!("{}", reply.text());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **message**: the immutable `Msg`/`ContentBlock` data model
//! - **memory**: the ordered, single-writer conversation buffer
//! - **toolkit**: tool registry, groups, streamed invocation
//! - **model**: the abstract `Model` streaming contract
//! - **hooks**: the nine-phase composing hook pipeline
//! - **interrupt**: the cooperative, source-tagged interrupt protocol
//! - **agent**: the ReAct loop tying the above together
//! - **pipeline**: sequential and fan-out multi-agent composition
//! - **plan**: the optional plan-notebook attachable component
//! - **providers**: concrete `Model` implementations
//! - **config**: provider base-url/model environment helpers
//! - **context**: token estimation and history truncation
//! - **retry**: exponential backoff with jitter
//! - **error**: the crate-wide error type

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod interrupt;
pub mod memory;
pub mod message;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod providers;
pub mod retry;
pub mod toolkit;

// --- Core engine ---

pub use agent::{Agent, AgentInput, AgentOptions, AgentOptionsBuilder};
pub use pipeline::{FanoutPipeline, SequentialPipeline};
pub use plan::{PlanNotebook, Subtask, SubtaskStatus};

// --- Data model ---

pub use message::{
    AudioBlock, ContentBlock, ImageBlock, ImageDetail, MediaSource, MessageRole, Msg, TextBlock,
    ThinkingBlock, ToolResultBlock, ToolUseBlock, VideoBlock,
};
pub use memory::Memory;

// --- Tools ---

pub use toolkit::{ToolChunk, ToolContext, ToolEntry, ToolHandler, Toolkit, GENERATE_RESPONSE};

// --- Model contract + shipped provider ---

pub use model::{Model, ModelCallOptions, ReasoningFragment, ToolSchema};
pub use providers::OpenAiCompatibleModel;

// --- Hooks ---

pub use hooks::{ChunkMode, Hook, HookPipeline, ReasoningChunkView};

// --- Interrupts ---

pub use interrupt::{InterruptContext, InterruptController, InterruptHandle, InterruptSource};

// --- Error handling ---

pub use error::{Error, Result};

// --- Provider configuration ---

pub use config::{get_base_url, get_model, Provider};

// --- Context management ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

/// Convenience module bundling the types most agents need.
///
/// ```rust
/// use agent_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Agent, AgentInput, AgentOptions, ContentBlock, Error, FanoutPipeline, Hook, HookPipeline,
        Memory, Model, Msg, OpenAiCompatibleModel, PlanNotebook, Result, SequentialPipeline,
        TextBlock, ToolEntry, ToolResultBlock, ToolUseBlock, Toolkit,
    };
}
