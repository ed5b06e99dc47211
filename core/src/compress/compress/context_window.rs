//! Token estimation and overflow detection for context window.
//!
//! Uses a heuristic (~4 chars per token) and, when available, hybrid strategy
//! with last LLM usage + delta for messages after last think.

use crate::message::Message;

/// Heuristic: approximate characters per token for English/mixed text (used by `estimate_tokens`).
const CHARS_PER_TOKEN: u32 = 4;

/// Heuristic token estimate: ~4 characters per token.
pub fn estimate_tokens(messages: &[Message]) -> u32 {
    let total: usize = messages
        .iter()
        .map(|m| match m {
            Message::System(s) | Message::User(s) | Message::Assistant(s) => s.len(),
        })
        .sum();
    (total / CHARS_PER_TOKEN as usize) as u32
}

/// Input for overflow check: only the fields needed to decide if context overflows.
///
/// Constructed by the caller (e.g. from `ReActState` + `CompactionConfig`); this module
/// does not depend on those types.
#[derive(Debug)]
pub struct ContextWindowCheck<'a> {
    /// Conversation messages (used for token estimate or delta after last think).
    pub messages: &'a [Message],
    /// Last LLM usage (prompt_tokens, completion_tokens) when available for hybrid estimate.
    pub usage: Option<(u32, u32)>,
    /// Message count at last Think; messages after this index use delta estimate.
    pub message_count_after_last_think: Option<usize>,
    /// Maximum context size in tokens.
    pub max_context_tokens: u32,
    /// Tokens to reserve for generation.
    pub reserve_tokens: u32,
}

/// Hybrid overflow check: use last LLM usage + estimated delta for new messages when available.
///
/// Only requires the fields in `ContextWindowCheck`; no dependency on `ReActState` or `CompactionConfig`.
pub fn is_overflow(input: &ContextWindowCheck<'_>) -> bool {
    // Current token count: hybrid (usage + delta) when we have last-Think usage and message count, else full estimate.
    let current = match (input.usage, input.message_count_after_last_think) {
        (Some((prompt, completion)), Some(count)) if count <= input.messages.len() => {
            let base = prompt + completion; // Tokens consumed by the last Think round (from provider).
            let delta = estimate_tokens(&input.messages[count..]); // Messages added after that round.
            base + delta
        }
        _ => estimate_tokens(input.messages), // No usage or count → estimate entire history.
    };
    // Overflow when context + reserve for generation exceeds limit.
    current + input.reserve_tokens > input.max_context_tokens
}
