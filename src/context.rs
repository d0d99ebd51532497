//! Context management utilities for manual history management.
//!
//! These are opt-in helpers for the external context-management collaborator
//! the core assumes exists: the core itself never evicts or truncates memory. A
//! caller that wants to keep a conversation under a token budget reads
//! [`Memory::snapshot`](crate::memory::Memory::snapshot), decides whether to
//! truncate using these functions, and writes the result back with
//! [`Memory::replace_all`](crate::memory::Memory::replace_all).
//!
//! # Examples
//!
//! ```rust
//! use agent_core::{Msg, estimate_tokens, truncate_messages};
//!
//! let messages = vec![Msg::system("You are a helpful assistant"), Msg::user("Hello!")];
//! let tokens = estimate_tokens(&messages);
//!
//! if tokens > 28000 {
//!     let truncated = truncate_messages(&messages, 10, true);
//!     // persist `truncated` back via Memory::replace_all
//!     let _ = truncated;
//! }
//! ```

use crate::message::{ContentBlock, MessageRole, Msg};

/// Estimate token count for a message list.
///
/// Uses character-based approximation (1 token ≈ 4 characters). This is an
/// APPROXIMATION: actual token counts vary by model family (GPT, Llama,
/// Qwen, Mistral tokenizers all differ). Always include a 10-20% safety
/// margin when checking against a hard limit. For exact counts, an
/// implementer should wire in a provider-specific tokenizer at the
/// [`crate::model::Model`] boundary — this crate keeps no tokenizer
/// dependency to stay provider-neutral.
pub fn estimate_tokens(messages: &[Msg]) -> usize {
    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 0;

    for message in messages {
        total_chars += 8; // ~2 tokens for role formatting

        for block in &message.content {
            match block {
                ContentBlock::Text(text) => {
                    total_chars += text.text.len();
                }
                ContentBlock::Thinking(thinking) => {
                    total_chars += thinking.text.len();
                }
                ContentBlock::ToolUse(tool) => {
                    total_chars += tool.name.len();
                    total_chars += tool.id.len();
                    total_chars += tool.input.to_string().len();
                }
                ContentBlock::ToolResult(result) => {
                    total_chars += result.id.len();
                    total_chars += result.name.len();
                    total_chars += estimate_tokens_for_blocks(&result.output) * 4;
                }
                ContentBlock::Image(_) | ContentBlock::Audio(_) | ContentBlock::Video(_) => {
                    // Media tokenization is provider-specific; a flat
                    // placeholder keeps the estimate conservative.
                    total_chars += 256;
                }
                ContentBlock::Control(control) => {
                    total_chars += control.kind.len();
                    total_chars += control.params.to_string().len();
                }
            }
        }
    }

    total_chars += 16; // conversation-level overhead

    (total_chars + 3) / 4 // ceiling division
}

fn estimate_tokens_for_blocks(blocks: &[ContentBlock]) -> usize {
    blocks
        .iter()
        .map(|b| match b {
            ContentBlock::Text(t) => (t.text.len() + 3) / 4,
            ContentBlock::Thinking(t) => (t.text.len() + 3) / 4,
            _ => 64,
        })
        .sum()
}

/// Truncate message history, keeping recent messages.
///
/// Always preserves the system prompt (if present and `preserve_system` is
/// set) and keeps the most recent `keep` messages. This is a SIMPLE
/// truncation: it does not attempt to preserve the tool-use/tool-result
/// pairing invariant across the cut, so callers that truncate
/// mid-conversation may need to re-synthesize a recovery message, the same
/// way the interrupt reconciliation path does.
pub fn truncate_messages(messages: &[Msg], keep: usize, preserve_system: bool) -> Vec<Msg> {
    if messages.is_empty() {
        return Vec::new();
    }

    if messages.len() <= keep {
        return messages.to_vec();
    }

    let has_system =
        preserve_system && !messages.is_empty() && messages[0].role == MessageRole::System;

    if has_system {
        let mut result = vec![messages[0].clone()];
        if keep > 0 && messages.len() > 1 {
            let start = messages.len().saturating_sub(keep);
            result.extend_from_slice(&messages[start..]);
        }
        result
    } else if keep > 0 {
        let start = messages.len().saturating_sub(keep);
        messages[start..].to_vec()
    } else {
        Vec::new()
    }
}

/// Check if history is approaching a token limit.
///
/// Combines [`estimate_tokens`] with a threshold check: returns `true` if
/// the estimate exceeds `limit * margin` (e.g. `margin = 0.9` trips at 90%
/// of a 32k context window).
pub fn is_approaching_limit(messages: &[Msg], limit: usize, margin: f32) -> bool {
    let estimated = estimate_tokens(messages);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}
