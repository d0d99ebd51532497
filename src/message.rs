//! The immutable structured message model: `Msg` and its content blocks.
//!
//! A [`Msg`] is a participant, a role, a creation timestamp, and an ordered,
//! non-empty list of [`ContentBlock`]s. Messages are never mutated after
//! construction; "editing" a message means building a new one.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Who sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
    Control,
}

/// Detail level for image content, mirrored from the OpenAI vision API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

impl std::fmt::Display for ImageDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageDetail::Low => write!(f, "low"),
            ImageDetail::High => write!(f, "high"),
            ImageDetail::Auto => write!(f, "auto"),
        }
    }
}

/// Where a piece of media content comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    /// An http(s) URL or a data: URI.
    Url { url: String },
    /// Base64-encoded bytes plus a MIME type.
    Base64 { data: String, mime_type: String },
    /// Raw PCM audio/video descriptor (sample rate, channel count, etc. live in `params`).
    Raw {
        params: serde_json::Value,
    },
}

/// Plain text content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// The model's reasoning trace. Never sent to downstream tools; carried
/// through memory purely for observability / transcript fidelity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingBlock {
    pub text: String,
}

impl ThinkingBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// One tool invocation proposed by the model. `id` is unique within the
/// message that carries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

impl ToolUseBlock {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// The result for a tool-use with the same `id`. `output` is itself a list
/// of blocks so tools may stream text, images, etc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub id: String,
    pub name: String,
    pub output: Vec<ContentBlock>,
    pub is_error: bool,
    pub interrupted: bool,
}

impl ToolResultBlock {
    pub fn new(id: impl Into<String>, name: impl Into<String>, output: Vec<ContentBlock>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            output,
            is_error: false,
            interrupted: false,
        }
    }

    pub fn error(id: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            output: vec![ContentBlock::Text(TextBlock::new(message))],
            is_error: true,
            interrupted: false,
        }
    }

    /// Synthesizes the interrupted-tool placeholder result required by the
    /// reconciliation procedure: a non-error, `interrupted=true` terminal
    /// block standing in for a tool-use that never completed.
    pub fn interrupted(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            output: vec![ContentBlock::Text(TextBlock::new(
                "Tool execution interrupted",
            ))],
            is_error: false,
            interrupted: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageBlock {
    pub source: MediaSource,
    pub detail: ImageDetail,
}

impl ImageBlock {
    pub fn from_url(url: impl Into<String>) -> crate::Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(crate::Error::invalid_input("image url cannot be empty"));
        }
        Ok(Self {
            source: MediaSource::Url { url },
            detail: ImageDetail::Auto,
        })
    }

    pub fn from_base64(data: impl AsRef<str>, mime_type: impl AsRef<str>) -> crate::Result<Self> {
        let data = data.as_ref();
        let mime_type = mime_type.as_ref();
        if data.trim().is_empty() {
            return Err(crate::Error::invalid_input("image data cannot be empty"));
        }
        if mime_type.trim().is_empty() {
            return Err(crate::Error::invalid_input("mime_type cannot be empty"));
        }
        Ok(Self {
            source: MediaSource::Base64 {
                data: data.to_string(),
                mime_type: mime_type.to_string(),
            },
            detail: ImageDetail::Auto,
        })
    }

    pub fn with_detail(mut self, detail: ImageDetail) -> Self {
        self.detail = detail;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBlock {
    pub source: MediaSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoBlock {
    pub source: MediaSource,
}

/// Live-session control signal (commit, interrupt, clear, create-response).
/// Not consumed by the offline ReAct loop, but passes through memory
/// unmodified for collaborators built on top of it (e.g. a live-session
/// transport).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlBlock {
    pub kind: String,
    pub params: serde_json::Value,
}

/// Tagged content-block union. A [`Msg`] carries an ordered, non-empty list
/// of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    Thinking(ThinkingBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
    Image(ImageBlock),
    Audio(AudioBlock),
    Video(VideoBlock),
    Control(ControlBlock),
}

impl ContentBlock {
    /// `Some(id)` if this block is a `ToolUseBlock`.
    pub fn tool_use_id(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolUse(t) => Some(&t.id),
            _ => None,
        }
    }

    /// `Some(id)` if this block is a `ToolResultBlock`.
    pub fn tool_result_id(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolResult(r) => Some(&r.id),
            _ => None,
        }
    }
}

/// An immutable message: participant, role, creation time, and content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Msg {
    pub participant: String,
    pub role: MessageRole,
    pub created_at_millis: u64,
    pub content: Vec<ContentBlock>,
}

impl Msg {
    pub fn new(participant: impl Into<String>, role: MessageRole, content: Vec<ContentBlock>) -> Self {
        Self {
            participant: participant.into(),
            role,
            created_at_millis: now_millis(),
            content,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(
            "user",
            MessageRole::User,
            vec![ContentBlock::Text(TextBlock::new(text))],
        )
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self::new("assistant", MessageRole::Assistant, content)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(
            "system",
            MessageRole::System,
            vec![ContentBlock::Text(TextBlock::new(text))],
        )
    }

    pub fn tool_results(blocks: Vec<ContentBlock>) -> Self {
        Self::new("tool", MessageRole::Tool, blocks)
    }

    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> crate::Result<Self> {
        Ok(Self::new(
            "user",
            MessageRole::User,
            vec![
                ContentBlock::Text(TextBlock::new(text)),
                ContentBlock::Image(ImageBlock::from_url(image_url)?),
            ],
        ))
    }

    pub fn user_with_image_detail(
        text: impl Into<String>,
        image_url: impl Into<String>,
        detail: ImageDetail,
    ) -> crate::Result<Self> {
        Ok(Self::new(
            "user",
            MessageRole::User,
            vec![
                ContentBlock::Text(TextBlock::new(text)),
                ContentBlock::Image(ImageBlock::from_url(image_url)?.with_detail(detail)),
            ],
        ))
    }

    pub fn user_with_base64_image(
        text: impl Into<String>,
        base64_data: impl AsRef<str>,
        mime_type: impl AsRef<str>,
    ) -> crate::Result<Self> {
        Ok(Self::new(
            "user",
            MessageRole::User,
            vec![
                ContentBlock::Text(TextBlock::new(text)),
                ContentBlock::Image(ImageBlock::from_base64(base64_data, mime_type)?),
            ],
        ))
    }

    /// All `ToolUseBlock`s in this message's content, in emission order.
    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text across `Text` blocks only (not thinking, not tool output).
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
