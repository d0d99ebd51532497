//! The tool registry: catalogues tools, synthesizes/holds their JSON-schema
//! descriptors, enforces group activation, and invokes them by name.
//!
//! Builds on a `Tool`/`ToolBuilder`-style schema synthesis, generalized with
//! tool groups, a static concurrency-safety flag per entry, and streamed
//! (not just one-shot) invocation.

use crate::error::Error;
use crate::interrupt::InterruptHandle;
use crate::message::{ContentBlock, ToolResultBlock, ToolUseBlock};
use crate::model::ToolSchema;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Name reserved for the built-in terminal tool. Registering a tool under
/// this name is a configuration error caught by `Toolkit::register`.
pub const GENERATE_RESPONSE: &str = "generate_response";

/// One chunk of a tool's invocation stream: zero or more intermediate
/// `Partial` chunks followed by exactly one `Terminal` block whose `id`
/// matches the originating tool-use.
#[derive(Debug, Clone)]
pub enum ToolChunk {
    Partial(ContentBlock),
    Terminal(ToolResultBlock),
}

/// The capability handle passed to a tool invocation: the tool-initiated
/// interrupt path and a channel for emitting intermediate chunks.
/// This is a bound capability, not ambient/thread-local state.
#[derive(Clone)]
pub struct ToolContext {
    pub interrupt: InterruptHandle,
    emitter: mpsc::Sender<ContentBlock>,
}

impl ToolContext {
    pub(crate) fn new(interrupt: InterruptHandle, emitter: mpsc::Sender<ContentBlock>) -> Self {
        Self { interrupt, emitter }
    }

    /// Emits an intermediate chunk before the tool's terminal result.
    /// Silently dropped if the consumer has stopped listening (e.g. after
    /// an interrupt already tore down the invocation).
    pub async fn emit(&self, block: ContentBlock) {
        let _ = self.emitter.send(block).await;
    }
}

/// The invokable behavior behind a registered tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, tool_use: ToolUseBlock, ctx: ToolContext) -> ToolResultBlock;
}

type SimpleFn = Arc<
    dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = crate::Result<serde_json::Value>> + Send>>
        + Send
        + Sync,
>;

/// Adapts a plain `input -> Result<output>` async closure (the common case)
/// into a [`ToolHandler`] that emits a single terminal chunk.
struct SimpleHandler(SimpleFn);

#[async_trait]
impl ToolHandler for SimpleHandler {
    async fn invoke(&self, tool_use: ToolUseBlock, _ctx: ToolContext) -> ToolResultBlock {
        match (self.0)(tool_use.input).await {
            Ok(value) => ToolResultBlock::new(
                tool_use.id,
                tool_use.name,
                vec![ContentBlock::Text(crate::message::TextBlock::new(
                    value.to_string(),
                ))],
            ),
            Err(e) => ToolResultBlock::error(tool_use.id, tool_use.name, e.to_string()),
        }
    }
}

/// A registered tool: its name, description, JSON-schema parameter
/// descriptor, group membership, static concurrency-safety flag, and the
/// handler that actually runs it.
pub struct ToolEntry {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub group: String,
    /// Whether the ReAct loop may run this tool concurrently with other
    /// concurrency-safe tools from the same reasoning turn — defaults to
    /// `false`, opt-in per entry.
    pub concurrency_safe: bool,
    handler: Arc<dyn ToolHandler>,
}

impl ToolEntry {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            group: "default".to_string(),
            concurrency_safe: false,
            handler,
        }
    }

    /// Convenience constructor for the common one-shot `Fn(input) -> Result<output>` case.
    pub fn simple<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::Result<serde_json::Value>> + Send + 'static,
    {
        let boxed: SimpleFn = Arc::new(move |input| Box::pin(handler(input)));
        Self::new(name, description, parameters, Arc::new(SimpleHandler(boxed)))
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn concurrency_safe(mut self) -> Self {
        self.concurrency_safe = true;
        self
    }

    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Registry of [`ToolEntry`] values plus group activation state.
///
/// Registration/deregistration is serialized relative to `list_active`/
/// `invoke` by an internal `RwLock`, matching "exclusive lock relative
/// to listActive and invoke."
pub struct Toolkit {
    entries: RwLock<Vec<ToolEntry>>,
    active_groups: RwLock<HashSet<String>>,
}

impl Default for Toolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl Toolkit {
    pub fn new() -> Self {
        let mut active = HashSet::new();
        active.insert("default".to_string());
        Self {
            entries: RwLock::new(Vec::new()),
            active_groups: RwLock::new(active),
        }
    }

    /// Registers a tool entry. Rejects re-use of the reserved
    /// `generate_response` name and duplicate names within a group.
    pub async fn register(&self, entry: ToolEntry) -> crate::Result<()> {
        if entry.name == GENERATE_RESPONSE {
            return Err(Error::invalid_input(
                "generate_response is a reserved tool name",
            ));
        }
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.name == entry.name) {
            return Err(Error::invalid_input(format!(
                "tool '{}' is already registered",
                entry.name
            )));
        }
        entries.push(entry);
        Ok(())
    }

    /// Removes a tool entry by name, if present.
    pub async fn deregister(&self, name: &str) {
        self.entries.write().await.retain(|e| e.name != name);
    }

    pub async fn set_active_groups(&self, groups: impl IntoIterator<Item = String>) {
        *self.active_groups.write().await = groups.into_iter().collect();
    }

    /// Active tools, ordered by registration.
    pub async fn list_active(&self) -> Vec<ToolSchema> {
        let active = self.active_groups.read().await;
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| active.contains(&e.group))
            .map(ToolEntry::schema)
            .collect()
    }

    /// Whether the named tool is both registered and in an active group.
    pub async fn is_active(&self, name: &str) -> bool {
        let active = self.active_groups.read().await;
        self.entries
            .read()
            .await
            .iter()
            .any(|e| e.name == name && active.contains(&e.group))
    }

    /// Whether the named tool is marked concurrency-safe. Unregistered
    /// tools are treated as unsafe (sequential).
    pub async fn is_concurrency_safe(&self, name: &str) -> bool {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.concurrency_safe)
            .unwrap_or(false)
    }

    /// Invokes a tool by name, returning the stream of chunks (zero or more
    /// `Partial` followed by one `Terminal`). Unknown tools produce a
    /// single terminal error chunk rather than aborting the loop.
    pub async fn invoke(
        &self,
        tool_use: ToolUseBlock,
        interrupt: InterruptHandle,
    ) -> BoxStream<'static, ToolChunk> {
        let handler = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .find(|e| e.name == tool_use.name)
                .map(|e| Arc::clone(&e.handler))
        };

        let Some(handler) = handler else {
            let err = ToolResultBlock::error(
                tool_use.id.clone(),
                tool_use.name.clone(),
                format!("unknown tool '{}'", tool_use.name),
            );
            return stream::once(async move { ToolChunk::Terminal(err) }).boxed();
        };

        let (tx, rx) = mpsc::channel::<ContentBlock>(16);
        let ctx = ToolContext::new(interrupt, tx);
        let partials = tokio_stream::wrappers::ReceiverStream::new(rx).map(ToolChunk::Partial);

        let terminal = async move { ToolChunk::Terminal(handler.invoke(tool_use, ctx).await) };

        // Partial chunks (if any) precede the terminal chunk; since `emit`
        // happens while `terminal`'s future is still being polled, chain
        // drains the channel only after the handler's future -- both run
        // concurrently via `select`-style merge below, so chunks emitted
        // mid-invocation are not lost.
        let terminal_stream = stream::once(terminal);
        futures::stream::select(partials, terminal_stream).boxed()
    }
}
