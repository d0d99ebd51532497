//! End-to-end scenarios from the ReAct loop's testable-properties list:
//! simple text replies, tool-call chains, parallel tool dispatch, user and
//! tool-initiated interrupts, and max-iters exhaustion. Each test drives a
//! real [`Agent`] against a scripted [`Model`] so no network access is
//! required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_core::{
    Agent, AgentOptions, ChunkMode, ContentBlock, Hook, Model, ModelCallOptions,
    ReasoningFragment, ToolContext, ToolEntry, ToolHandler, ToolResultBlock, ToolSchema,
    ToolUseBlock, Toolkit,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

/// A model driven by a fixed script of per-turn fragment lists, one list
/// consumed per reasoning turn in order.
struct ScriptedModel {
    turns: Mutex<Vec<Vec<ReasoningFragment>>>,
}

impl ScriptedModel {
    fn new(turns: Vec<Vec<ReasoningFragment>>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().rev().collect()),
        }
    }
}

#[async_trait]
impl Model for ScriptedModel {
    async fn stream(
        &self,
        _prompt: &[agent_core::Msg],
        _tool_schemas: &[ToolSchema],
        _options: &ModelCallOptions,
    ) -> agent_core::Result<BoxStream<'static, agent_core::Result<ReasoningFragment>>> {
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop()
            .expect("ScriptedModel ran out of scripted turns");
        Ok(stream::iter(turn.into_iter().map(Ok)).boxed())
    }
}

fn tool_use_delta(id: &str, name: &str, input: serde_json::Value) -> ReasoningFragment {
    ReasoningFragment::ToolUseDelta {
        id: id.to_string(),
        name: Some(name.to_string()),
        input_delta: input.to_string(),
    }
}

fn finish() -> ReasoningFragment {
    ReasoningFragment::Finish("stop".to_string())
}

#[tokio::test]
async fn simple_text_reply_completes_via_generate_response() {
    // "What is 2+2?" -> model answers directly through the terminal tool.
    let model = ScriptedModel::new(vec![vec![
        tool_use_delta(
            "t1",
            "generate_response",
            serde_json::json!({"response": "4"}),
        ),
        finish(),
    ]]);
    let options = AgentOptions::builder()
        .model("scripted")
        .max_iters(1)
        .build()
        .unwrap();
    let agent = Agent::new(Arc::new(model), Arc::new(Toolkit::new()), options);

    let result = agent.call("What is 2+2?").await.unwrap();
    assert_eq!(result.text(), "4");

    let snapshot = agent.memory().snapshot().await;
    assert_eq!(snapshot[0].role, agent_core::MessageRole::User);
}

#[tokio::test]
async fn one_tool_call_then_generate_response() {
    // get_time(t1) -> generate_response(t2) -> "It is midnight UTC."
    let model = ScriptedModel::new(vec![
        vec![
            tool_use_delta("t1", "get_time", serde_json::json!({"zone": "UTC"})),
            finish(),
        ],
        vec![
            tool_use_delta(
                "t2",
                "generate_response",
                serde_json::json!({"response": "It is midnight UTC."}),
            ),
            finish(),
        ],
    ]);

    let toolkit = Toolkit::new();
    toolkit
        .register(ToolEntry::simple(
            "get_time",
            "current time",
            serde_json::json!({"type": "object"}),
            |_input| async { Ok(serde_json::json!("2024-05-01T00:00:00Z")) },
        ))
        .await
        .unwrap();

    let options = AgentOptions::builder().model("scripted").build().unwrap();
    let agent = Agent::new(Arc::new(model), Arc::new(toolkit), options);

    let result = agent.call("what time is it").await.unwrap();
    assert_eq!(result.text(), "It is midnight UTC.");

    let snapshot = agent.memory().snapshot().await;
    // user, assistant(tool-use t1), tool-result(t1), assistant(tool-use t2), tool-result(t2), final
    assert_eq!(snapshot.len(), 6);
    assert!(matches!(snapshot[1].content[0], ContentBlock::ToolUse(_)));
    assert!(matches!(snapshot[2].content[0], ContentBlock::ToolResult(_)));
    assert!(matches!(snapshot[3].content[0], ContentBlock::ToolUse(_)));
    assert!(matches!(snapshot[4].content[0], ContentBlock::ToolResult(_)));
}

#[tokio::test]
async fn two_parallel_tool_calls_preserve_emission_order_in_memory() {
    // t1 (weather) and t2 (news) both concurrency-safe; memory must show
    // assistant(tool-uses), result(t1), result(t2) regardless of which
    // completes first.
    let model = ScriptedModel::new(vec![
        vec![
            tool_use_delta("t1", "get_weather", serde_json::json!({})),
            tool_use_delta("t2", "get_news", serde_json::json!({})),
            finish(),
        ],
        vec![
            tool_use_delta(
                "t3",
                "generate_response",
                serde_json::json!({"response": "done"}),
            ),
            finish(),
        ],
    ]);

    let toolkit = Toolkit::new();
    toolkit
        .register(
            ToolEntry::simple(
                "get_weather",
                "weather",
                serde_json::json!({}),
                |_input| async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(serde_json::json!("sunny"))
                },
            )
            .concurrency_safe(),
        )
        .await
        .unwrap();
    toolkit
        .register(
            ToolEntry::simple("get_news", "news", serde_json::json!({}), |_input| async {
                Ok(serde_json::json!("nothing happened"))
            })
            .concurrency_safe(),
        )
        .await
        .unwrap();

    let options = AgentOptions::builder().model("scripted").build().unwrap();
    let agent = Agent::new(Arc::new(model), Arc::new(toolkit), options);

    agent.call("what's new").await.unwrap();

    let snapshot = agent.memory().snapshot().await;
    let tool_use_msg = &snapshot[1];
    assert_eq!(tool_use_msg.tool_uses().len(), 2);
    assert_eq!(tool_use_msg.tool_uses()[0].id, "t1");
    assert_eq!(tool_use_msg.tool_uses()[1].id, "t2");

    let result_ids: Vec<&str> = snapshot[2..4]
        .iter()
        .map(|m| match &m.content[0] {
            ContentBlock::ToolResult(r) => r.id.as_str(),
            _ => panic!("expected a tool-result message"),
        })
        .collect();
    assert_eq!(result_ids, vec!["t1", "t2"]);
}

/// A tool whose invocation does not complete until released, so a test can
/// reliably race an external interrupt against it.
struct SlowTool;

#[async_trait]
impl ToolHandler for SlowTool {
    async fn invoke(&self, tool_use: ToolUseBlock, _ctx: ToolContext) -> ToolResultBlock {
        tokio::time::sleep(Duration::from_millis(200)).await;
        ToolResultBlock::new(
            tool_use.id,
            tool_use.name,
            vec![ContentBlock::Text(agent_core::TextBlock::new("done"))],
        )
    }
}

#[tokio::test]
async fn user_interrupt_mid_tool_reconciles_with_synthetic_result() {
    let model = ScriptedModel::new(vec![vec![
        tool_use_delta("t1", "slow_task", serde_json::json!({})),
        finish(),
    ]]);

    let toolkit = Toolkit::new();
    toolkit
        .register(ToolEntry::new(
            "slow_task",
            "takes a while",
            serde_json::json!({}),
            Arc::new(SlowTool),
        ))
        .await
        .unwrap();

    let options = AgentOptions::builder().model("scripted").build().unwrap();
    let agent = Arc::new(Agent::new(Arc::new(model), Arc::new(toolkit), options));

    let agent_for_interrupt = agent.clone();
    let interrupt_task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        agent_for_interrupt
            .interrupt(Some("stop".to_string()))
            .await;
    });

    let result = agent.call("start the slow task").await.unwrap();
    interrupt_task.await.unwrap();

    assert_eq!(result.text(), "stop");

    let snapshot = agent.memory().snapshot().await;
    let synthetic = snapshot
        .iter()
        .find_map(|m| match m.content.first() {
            Some(ContentBlock::ToolResult(r)) if r.id == "t1" => Some(r),
            _ => None,
        })
        .expect("an interrupted placeholder result for t1");
    assert!(synthetic.interrupted);
    assert!(!synthetic.is_error);
}

/// A tool that raises a tool-initiated interrupt partway through its own
/// invocation, then keeps running briefly so the loop's interrupt check
/// reliably wins the race against its own completion.
struct PermissionGatedTool;

#[async_trait]
impl ToolHandler for PermissionGatedTool {
    async fn invoke(&self, tool_use: ToolUseBlock, ctx: ToolContext) -> ToolResultBlock {
        ctx.interrupt
            .signal_tool("permission denied", vec![tool_use.clone()])
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        ToolResultBlock::new(
            tool_use.id,
            tool_use.name,
            vec![ContentBlock::Text(agent_core::TextBlock::new(
                "should not be reached",
            ))],
        )
    }
}

#[tokio::test]
async fn tool_initiated_interrupt_surfaces_tool_name_and_reason() {
    let model = ScriptedModel::new(vec![vec![
        tool_use_delta("t1", "dangerous_tool", serde_json::json!({})),
        finish(),
    ]]);

    let toolkit = Toolkit::new();
    toolkit
        .register(ToolEntry::new(
            "dangerous_tool",
            "asks permission mid-flight",
            serde_json::json!({}),
            Arc::new(PermissionGatedTool),
        ))
        .await
        .unwrap();

    let options = AgentOptions::builder().model("scripted").build().unwrap();
    let agent = Agent::new(Arc::new(model), Arc::new(toolkit), options);

    let result = agent.call("do the dangerous thing").await.unwrap();
    assert!(result.text().contains("dangerous_tool"));
    assert!(result.text().contains("permission denied"));
}

#[tokio::test]
async fn max_iters_exhaustion_yields_a_system_recovery_message() {
    let model = ScriptedModel::new(vec![
        vec![
            ReasoningFragment::TextDelta("still thinking...".to_string()),
            finish(),
        ],
        vec![
            ReasoningFragment::TextDelta("still thinking more...".to_string()),
            finish(),
        ],
        vec![
            ReasoningFragment::TextDelta("and more...".to_string()),
            finish(),
        ],
    ]);

    let options = AgentOptions::builder()
        .model("scripted")
        .max_iters(3)
        .build()
        .unwrap();
    let agent = Agent::new(Arc::new(model), Arc::new(Toolkit::new()), options);

    let result = agent.call("solve this").await.unwrap();
    assert!(result.text().to_lowercase().contains("maximum iterations"));
}

#[tokio::test]
async fn hook_ordering_matches_the_documented_phase_sequence() {
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl Hook for Recorder {
        async fn pre_reasoning(
            &self,
            _agent: &Agent,
            msgs: Vec<agent_core::Msg>,
        ) -> Vec<agent_core::Msg> {
            self.events.lock().unwrap().push("pre_reasoning");
            msgs
        }

        async fn on_reasoning_chunk(&self, _agent: &Agent, _chunk: &agent_core::ReasoningChunkView) {
            self.events.lock().unwrap().push("on_reasoning_chunk");
        }

        async fn post_reasoning(&self, _agent: &Agent, msg: agent_core::Msg) -> agent_core::Msg {
            self.events.lock().unwrap().push("post_reasoning");
            msg
        }

        async fn pre_acting(
            &self,
            _agent: &Agent,
            tool_use: agent_core::ToolUseBlock,
        ) -> agent_core::ToolUseBlock {
            self.events.lock().unwrap().push("pre_acting");
            tool_use
        }

        async fn post_acting(
            &self,
            _agent: &Agent,
            _tool_use: &agent_core::ToolUseBlock,
            result: agent_core::ToolResultBlock,
        ) -> agent_core::ToolResultBlock {
            self.events.lock().unwrap().push("post_acting");
            result
        }
    }

    let model = ScriptedModel::new(vec![vec![
        ReasoningFragment::TextDelta("hi".to_string()),
        tool_use_delta("t1", "noop", serde_json::json!({})),
        finish(),
    ]]);

    let toolkit = Toolkit::new();
    toolkit
        .register(ToolEntry::simple(
            "noop",
            "does nothing",
            serde_json::json!({}),
            |_input| async { Ok(serde_json::json!({})) },
        ))
        .await
        .unwrap();

    let options = AgentOptions::builder()
        .model("scripted")
        .max_iters(1)
        .build()
        .unwrap();
    let agent = Agent::new(Arc::new(model), Arc::new(toolkit), options);

    let recorder = Arc::new(Recorder::default());
    agent.register_hook(recorder.clone()).await;
    agent.call("go").await.unwrap();

    let events = recorder.events.lock().unwrap().clone();
    let pre_reasoning_idx = events.iter().position(|e| *e == "pre_reasoning").unwrap();
    let post_reasoning_idx = events.iter().position(|e| *e == "post_reasoning").unwrap();
    let pre_acting_idx = events.iter().position(|e| *e == "pre_acting").unwrap();
    let post_acting_idx = events.iter().position(|e| *e == "post_acting").unwrap();

    assert!(pre_reasoning_idx < post_reasoning_idx);
    assert!(post_reasoning_idx < pre_acting_idx);
    assert!(pre_acting_idx < post_acting_idx);
}

#[tokio::test]
async fn sequential_pipeline_and_fanout_compose_agents() {
    use agent_core::{FanoutPipeline, SequentialPipeline};

    struct EchoModel {
        suffix: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Model for EchoModel {
        async fn stream(
            &self,
            prompt: &[agent_core::Msg],
            _tool_schemas: &[ToolSchema],
            _options: &ModelCallOptions,
        ) -> agent_core::Result<BoxStream<'static, agent_core::Result<ReasoningFragment>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let last_text = prompt.last().map(|m| m.text()).unwrap_or_default();
            let response = format!("{last_text}{}", self.suffix);
            Ok(stream::iter(vec![
                Ok(tool_use_delta(
                    "t1",
                    "generate_response",
                    serde_json::json!({ "response": response }),
                )),
                Ok(finish()),
            ])
            .boxed())
        }
    }

    fn agent(suffix: &'static str, calls: Arc<AtomicUsize>) -> Arc<Agent> {
        let options = AgentOptions::builder().model("echo").build().unwrap();
        Arc::new(Agent::new(
            Arc::new(EchoModel { suffix, calls }),
            Arc::new(Toolkit::new()),
            options,
        ))
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let seq = SequentialPipeline::new(vec![agent("-a", calls.clone()), agent("-b", calls.clone())]);
    let result = seq.execute("start").await.unwrap();
    assert_eq!(result.text(), "start-a-b");

    let fanout = FanoutPipeline::new(
        vec![agent("-x", calls.clone()), agent("-y", calls.clone())],
        true,
    );
    let results = fanout.execute("in").await.unwrap();
    assert_eq!(
        results.iter().map(|m| m.text()).collect::<Vec<_>>(),
        vec!["in-x", "in-y"]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn cumulative_chunk_mode_hook_receives_accumulated_text() {
    struct CumulativeRecorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Hook for CumulativeRecorder {
        fn chunk_mode(&self) -> ChunkMode {
            ChunkMode::Cumulative
        }

        async fn on_reasoning_chunk(&self, _agent: &Agent, chunk: &agent_core::ReasoningChunkView) {
            self.seen.lock().unwrap().push(chunk.text.clone());
        }
    }

    let model = ScriptedModel::new(vec![vec![
        ReasoningFragment::TextDelta("Hel".to_string()),
        ReasoningFragment::TextDelta("lo".to_string()),
        tool_use_delta(
            "t1",
            "generate_response",
            serde_json::json!({"response": "Hello"}),
        ),
        finish(),
    ]]);

    let options = AgentOptions::builder().model("scripted").build().unwrap();
    let agent = Agent::new(Arc::new(model), Arc::new(Toolkit::new()), options);

    let recorder = Arc::new(CumulativeRecorder {
        seen: Mutex::new(Vec::new()),
    });
    agent.register_hook(recorder.clone()).await;
    agent.call("hi").await.unwrap();

    let seen = recorder.seen.lock().unwrap().clone();
    assert_eq!(seen, vec!["Hel".to_string(), "Hello".to_string()]);
}
