//! Smart pruning: drop stale payloads beyond a recency window.
//!
//! The LLM interface usually ships its own pruning helper that knows which
//! provider-specific parts can be discarded. [`MessagePruner`] is the seam it
//! plugs into. [`RecencyPruner`] is the built-in fallback.

use crate::{AssistantPart, ChatMessage};

/// A pruning capability consumed at level 2 and above.
///
/// Implementations return a new list. An `Err` is logged by the caller and
/// the pass is skipped; it never fails the turn.
pub trait MessagePruner: Send + Sync {
    fn prune(&self, messages: &[ChatMessage], keep_recent: usize) -> Result<Vec<ChatMessage>, String>;
}

/// Strips reasoning and streamed tool-call parts from assistant messages
/// older than the last `keep_recent` messages. Assistant messages left with
/// nothing to send are dropped.
///
/// Structured `tool_calls` are kept so their results stay paired.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecencyPruner;

impl MessagePruner for RecencyPruner {
    fn prune(&self, messages: &[ChatMessage], keep_recent: usize) -> Result<Vec<ChatMessage>, String> {
        let window_start = messages.len().saturating_sub(keep_recent);
        let mut out = Vec::with_capacity(messages.len());

        for (i, msg) in messages.iter().enumerate() {
            match msg {
                ChatMessage::Assistant(a) if i < window_start => {
                    let mut pruned = a.clone();
                    pruned.parts.retain(|p| matches!(p, AssistantPart::Text { .. }));
                    if !pruned.is_empty() {
                        out.push(ChatMessage::Assistant(pruned));
                    }
                }
                other => out.push(other.clone()),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AssistantMessage, ToolCall};
    use serde_json::json;

    fn streamed(reasoning: &str, text: Option<&str>) -> ChatMessage {
        let mut parts = vec![
            AssistantPart::Reasoning {
                text: reasoning.into(),
            },
            AssistantPart::ToolCall {
                tool_call_id: "p1".into(),
                name: "grep".into(),
                arguments: json!({"pattern": "x"}),
            },
        ];
        if let Some(t) = text {
            parts.push(AssistantPart::Text { text: t.into() });
        }
        ChatMessage::Assistant(AssistantMessage {
            parts,
            ..Default::default()
        })
    }

    #[test]
    fn strips_old_reasoning_only() {
        let messages = vec![
            ChatMessage::user("go"),
            streamed("long thoughts", Some("answer")),
            ChatMessage::user("more"),
            streamed("recent thoughts", Some("answer 2")),
        ];
        let out = RecencyPruner.prune(&messages, 2).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[1].as_assistant().unwrap().parts.len(), 1);
        assert_eq!(out[3].as_assistant().unwrap().parts.len(), 3);
    }

    #[test]
    fn drops_emptied_assistants() {
        let messages = vec![
            streamed("only thinking", None),
            ChatMessage::user("next"),
        ];
        let out = RecencyPruner.prune(&messages, 1).unwrap();
        assert_eq!(out, vec![ChatMessage::user("next")]);
    }

    #[test]
    fn keeps_structured_tool_calls() {
        let messages = vec![
            ChatMessage::assistant_tool_calls(vec![ToolCall::new("c1", "read_file", json!({}))]),
            ChatMessage::tool_result("c1", "read_file", "body"),
            ChatMessage::user("next"),
        ];
        let out = RecencyPruner.prune(&messages, 1).unwrap();
        assert_eq!(out, messages);
    }
}
