//! Tool result clearing: replace the bodies of old tool results with a
//! one-line sentinel.
//!
//! Tool results are the single largest context consumer in an agent loop.
//! A `read_file` can inject 30KB; a `grep` can return hundreds of lines.
//! Most of it is irrelevant once the model has acted on it. Clearing needs no
//! LLM call and the stored history keeps the full body.
//!
//! A cleared result carries `compacted_at`, which makes clearing idempotent
//! and lets token estimation skip it.

use crate::ChatMessage;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Body written in place of a cleared tool result.
///
/// Kept shorter than [`MIN_CLEARABLE_CHARS`] so clearing never grows a
/// message.
pub const CLEARED_SENTINEL: &str = "[Cleared: old tool result removed to save context]";

/// Results at or below this many characters are not worth clearing.
pub const MIN_CLEARABLE_CHARS: usize = 100;

/// Index of the first message inside the protected window: the span covering
/// the last `protected_turns` assistant messages and everything after them.
///
/// Returns `0` (everything protected) when the history has fewer assistant
/// turns than the window.
pub fn protected_window_start(messages: &[ChatMessage], protected_turns: usize) -> usize {
    if protected_turns == 0 {
        return messages.len();
    }
    let mut seen = 0;
    for (i, msg) in messages.iter().enumerate().rev() {
        if matches!(msg, ChatMessage::Assistant(_)) {
            seen += 1;
            if seen == protected_turns {
                return i;
            }
        }
    }
    0
}

/// Clear tool results older than the protected window.
///
/// Skips protected tool names, results already cleared, and results of at
/// most [`MIN_CLEARABLE_CHARS`] characters. Returns the number cleared.
pub fn clear_old_tool_results(
    messages: &mut [ChatMessage],
    protected_turns: usize,
    protected_tools: &HashSet<String>,
    now: DateTime<Utc>,
) -> usize {
    let boundary = protected_window_start(messages, protected_turns);
    let mut cleared = 0;

    for msg in messages.iter_mut().take(boundary) {
        let ChatMessage::Tool(tool) = msg else {
            continue;
        };
        if tool.compacted_at.is_some()
            || protected_tools.contains(&tool.name)
            || tool.content.chars().count() <= MIN_CLEARABLE_CHARS
        {
            continue;
        }
        tool.content = CLEARED_SENTINEL.to_string();
        tool.compacted_at = Some(now);
        cleared += 1;
    }
    cleared
}
