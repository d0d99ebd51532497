//! A shipped, OpenAI-compatible [`Model`] implementation: the formatter +
//! transport collaborator the core's contract expects but does not
//! define. Targets any OpenAI-chat-completions-shaped server (LM Studio,
//! Ollama, llama.cpp, vLLM) via [`crate::config::Provider`].
//!
//! A straightforward HTTP/SSE transport plus wire-chunk parsing. Some
//! streaming clients aggregate deltas into complete blocks inside the
//! transport layer; here each delta is surfaced directly as a
//! [`ReasoningFragment`] and aggregation moves to the ReAct loop's
//! reassembly rule, since that is a core responsibility, not a provider one.

use crate::message::{ContentBlock, MessageRole, Msg};
use crate::model::{Model, ModelCallOptions, ReasoningFragment, ToolSchema};
use crate::{Error, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

/// Wire message as sent in an OpenAI-compatible chat completions request.
#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: WireFunctionSchema,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunctionSchema {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireChunk {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireChoice {
    delta: WireDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// An OpenAI-chat-completions-compatible [`Model`]. One instance targets one
/// `base_url`; construct a fresh one per provider if an agent needs to talk
/// to more than one server.
pub struct OpenAiCompatibleModel {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleModel {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    fn format_prompt(prompt: &[Msg]) -> Vec<WireMessage> {
        let mut out = Vec::new();
        for msg in prompt {
            let role = match msg.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::System => "system",
                MessageRole::Tool => "tool",
                // Control messages are a live-session concept; the offline
                // completions wire format has no analogue, so they are
                // dropped rather than mis-rendered as a chat turn.
                MessageRole::Control => continue,
            };

            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();
            let mut tool_result: Option<(&str, String)> = None;

            for block in &msg.content {
                match block {
                    ContentBlock::Text(t) => text_parts.push(t.text.clone()),
                    // The model's own reasoning trace is never replayed back
                    // to itself as wire content.
                    ContentBlock::Thinking(_) => {}
                    ContentBlock::ToolUse(t) => tool_calls.push(WireToolCall {
                        id: t.id.clone(),
                        call_type: "function".to_string(),
                        function: WireFunction {
                            name: t.name.clone(),
                            arguments: t.input.to_string(),
                        },
                    }),
                    ContentBlock::ToolResult(r) => {
                        let text = r
                            .output
                            .iter()
                            .filter_map(|b| match b {
                                ContentBlock::Text(t) => Some(t.text.clone()),
                                _ => None,
                            })
                            .collect::<Vec<_>>()
                            .join("\n");
                        tool_result = Some((r.id.as_str(), text));
                    }
                    ContentBlock::Image(_) | ContentBlock::Audio(_) | ContentBlock::Video(_) => {}
                    ContentBlock::Control(_) => {}
                }
            }

            if let Some((id, text)) = tool_result {
                out.push(WireMessage {
                    role: "tool".to_string(),
                    content: Some(text),
                    tool_calls: None,
                    tool_call_id: Some(id.to_string()),
                });
                continue;
            }

            out.push(WireMessage {
                role: role.to_string(),
                content: if text_parts.is_empty() {
                    None
                } else {
                    Some(text_parts.join(""))
                },
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
            });
        }
        out
    }

    fn format_tools(schemas: &[ToolSchema]) -> Option<Vec<WireTool>> {
        if schemas.is_empty() {
            return None;
        }
        Some(
            schemas
                .iter()
                .map(|s| WireTool {
                    tool_type: "function".to_string(),
                    function: WireFunctionSchema {
                        name: s.name.clone(),
                        description: s.description.clone(),
                        parameters: s.parameters.clone(),
                    },
                })
                .collect(),
        )
    }

    /// Translates one wire chunk's deltas into zero or more
    /// [`ReasoningFragment`]s, in emission order.
    fn parse_fragment(chunk: WireChunk) -> Vec<ReasoningFragment> {
        let mut out = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    out.push(ReasoningFragment::TextDelta(text));
                }
            }
            if let Some(text) = choice.delta.reasoning_content {
                if !text.is_empty() {
                    out.push(ReasoningFragment::ThinkingDelta(text));
                }
            }
            if let Some(tool_calls) = choice.delta.tool_calls {
                for (index, delta) in tool_calls.into_iter().enumerate() {
                    let id = delta.id.unwrap_or_else(|| format!("tool_call_{index}"));
                    let name = delta.function.as_ref().and_then(|f| f.name.clone());
                    let input_delta = delta
                        .function
                        .and_then(|f| f.arguments)
                        .unwrap_or_default();
                    out.push(ReasoningFragment::ToolUseDelta {
                        id,
                        name,
                        input_delta,
                    });
                }
            }
            if let Some(reason) = choice.finish_reason {
                out.push(ReasoningFragment::Finish(reason));
            }
        }
        out
    }
}

/// Decodes the response body as a `text/event-stream` and parses each
/// event's `data` payload as a wire chunk, dropping the terminal `[DONE]`
/// sentinel and any comment/keep-alive events with no data.
fn parse_sse_lines(
    body: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<WireChunk>> + Send>> {
    let stream = body
        .bytes_stream()
        .eventsource()
        .filter_map(move |event| async move {
            let event = match event {
                Ok(e) => e,
                Err(e) => return Some(Err(Error::stream(format!("SSE transport error: {e}")))),
            };
            if event.data == "[DONE]" {
                return None;
            }
            Some(
                serde_json::from_str::<WireChunk>(&event.data)
                    .map_err(|e| Error::stream(format!("failed to parse chunk: {e}"))),
            )
        });
    Box::pin(stream)
}

#[async_trait]
impl Model for OpenAiCompatibleModel {
    async fn stream(
        &self,
        prompt: &[Msg],
        tool_schemas: &[ToolSchema],
        options: &ModelCallOptions,
    ) -> Result<BoxStream<'static, Result<ReasoningFragment>>> {
        let request = WireRequest {
            model: options.model.clone(),
            messages: Self::format_prompt(prompt),
            stream: true,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            tools: Self::format_tools(tool_schemas),
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(format!("API error {status}: {body}")));
        }

        let chunks = parse_sse_lines(response);
        let fragments = chunks.flat_map(|chunk_result| {
            futures::stream::iter(match chunk_result {
                Ok(chunk) => Self::parse_fragment(chunk).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            })
        });

        Ok(fragments.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ContentBlock, ToolResultBlock, ToolUseBlock};

    #[test]
    fn format_prompt_renders_tool_use_and_tool_result_as_distinct_wire_turns() {
        let msgs = vec![
            Msg::user("what time is it"),
            Msg::assistant(vec![ContentBlock::ToolUse(ToolUseBlock::new(
                "t1",
                "get_time",
                serde_json::json!({"zone": "UTC"}),
            ))]),
            Msg::tool_results(vec![ContentBlock::ToolResult(ToolResultBlock::new(
                "t1",
                "get_time",
                vec![ContentBlock::Text(crate::message::TextBlock::new(
                    "2024-05-01T00:00:00Z",
                ))],
            ))]),
        ];

        let wire = OpenAiCompatibleModel::format_prompt(&msgs);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[1].tool_calls.as_ref().unwrap()[0].id, "t1");
        assert_eq!(wire[2].role, "tool");
        assert_eq!(wire[2].tool_call_id.as_deref(), Some("t1"));
    }

    #[test]
    fn parse_fragment_emits_text_then_finish() {
        let chunk = WireChunk {
            choices: vec![WireChoice {
                delta: WireDelta {
                    content: Some("hi".to_string()),
                    reasoning_content: None,
                    tool_calls: None,
                },
                finish_reason: Some("stop".to_string()),
            }],
        };
        let fragments = OpenAiCompatibleModel::parse_fragment(chunk);
        assert_eq!(fragments.len(), 2);
        assert!(matches!(fragments[0], ReasoningFragment::TextDelta(ref s) if s == "hi"));
        assert!(matches!(fragments[1], ReasoningFragment::Finish(ref r) if r == "stop"));
    }

    #[test]
    fn parse_fragment_emits_tool_use_delta_with_name_on_first_chunk() {
        let chunk = WireChunk {
            choices: vec![WireChoice {
                delta: WireDelta {
                    content: None,
                    reasoning_content: None,
                    tool_calls: Some(vec![WireToolCallDelta {
                        id: Some("call_1".to_string()),
                        function: Some(WireFunctionDelta {
                            name: Some("get_weather".to_string()),
                            arguments: Some("{\"city\":".to_string()),
                        }),
                    }]),
                },
                finish_reason: None,
            }],
        };
        let fragments = OpenAiCompatibleModel::parse_fragment(chunk);
        assert_eq!(fragments.len(), 1);
        match &fragments[0] {
            ReasoningFragment::ToolUseDelta {
                id,
                name,
                input_delta,
            } => {
                assert_eq!(id, "call_1");
                assert_eq!(name.as_deref(), Some("get_weather"));
                assert_eq!(input_delta, "{\"city\":");
            }
            other => panic!("expected ToolUseDelta, got {other:?}"),
        }
    }
}
