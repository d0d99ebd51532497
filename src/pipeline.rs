//! Multi-agent composition: threading one agent's output into the next, or
//! dispatching the same input to several agents at once.
//!
//! Pipelines are agent-like: they expose an `execute` that consumes an
//! [`AgentInput`] and produces the same shape of result a single [`Agent`]
//! would, so a pipeline can itself be nested as one stage of another.
//! Grounded on the worker-dispatch shape of `examples/other_examples`'s
//! `siumai-extras` `workflow.rs` (`Workflow::run_internal`'s worker fan-out),
//! adapted to the simpler list-of-agents composition this crate's agents need
//! and to the `join_all`-based concurrent dispatch already used in
//! `agent.rs`'s tool-acting phase.

use std::sync::Arc;

use futures::future::join_all;

use crate::agent::{Agent, AgentInput};
use crate::message::Msg;
use crate::Result;

/// Threads `input` through `agents` in order: stage `i`'s result becomes
/// stage `i + 1`'s input. An empty pipeline returns the input unchanged.
/// The first stage to fail aborts the remainder and surfaces its error.
pub struct SequentialPipeline {
    agents: Vec<Arc<Agent>>,
}

impl SequentialPipeline {
    pub fn new(agents: Vec<Arc<Agent>>) -> Self {
        Self { agents }
    }

    pub async fn execute(&self, input: impl Into<AgentInput>) -> Result<Msg> {
        let mut input = input.into();
        let mut last = None;

        for agent in &self.agents {
            let result = agent.call(input).await?;
            input = AgentInput::Message(result.clone());
            last = Some(result);
        }

        match last {
            Some(msg) => Ok(msg),
            None => Ok(match input {
                AgentInput::Message(msg) => msg,
                AgentInput::Text(text) => Msg::user(text),
            }),
        }
    }
}

/// Dispatches the same input to every agent, either concurrently or one
/// after another, and returns results in **agent order**, not completion
/// order.
pub struct FanoutPipeline {
    agents: Vec<Arc<Agent>>,
    concurrent: bool,
}

impl FanoutPipeline {
    pub fn new(agents: Vec<Arc<Agent>>, concurrent: bool) -> Self {
        Self { agents, concurrent }
    }

    /// Concurrent mode runs every agent regardless of earlier failures and
    /// surfaces the first error in agent order. Sequential mode stops at the
    /// first failure, matching the documented policy.
    pub async fn execute(&self, input: impl Into<AgentInput>) -> Result<Vec<Msg>> {
        let input = input.into().into_msg();

        if self.concurrent {
            let futures = self
                .agents
                .iter()
                .map(|agent| agent.call(input.clone()));
            let results = join_all(futures).await;
            results.into_iter().collect()
        } else {
            let mut results = Vec::with_capacity(self.agents.len());
            for agent in &self.agents {
                results.push(agent.call(input.clone()).await?);
            }
            Ok(results)
        }
    }
}
