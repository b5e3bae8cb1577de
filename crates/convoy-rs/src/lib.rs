//! Conversation-budget controller and tool-execution orchestrator for LLM agents.
//!
//! `convoy-rs` is the part of an agent runtime that sits between the
//! conversation history and the model. It answers two questions on every
//! turn:
//!
//! 1. **What do we send?** The [`CompressionController`](context::compression::CompressionController)
//!    turns the stored history into a budget-fit message list. How hard it
//!    squeezes is driven by a [`CompressionLevel`](context::budget::CompressionLevel)
//!    derived from the previous turn's token usage.
//! 2. **How do we run what the model asked for?** The
//!    [`ToolOrchestrator`](agent::orchestrator::ToolOrchestrator) executes a
//!    batch of tool calls with bounded concurrency for unsupervised calls and
//!    a serialized, human-gated pass for calls that need approval.
//!
//! The LLM transport, the UI store, concrete tools and file access are
//! consumed through narrow traits ([`ToolExecutor`](tools::core::ToolExecutor),
//! [`ThreadStore`](agent::store::ThreadStore), [`FileReader`](agent::store::FileReader),
//! [`MessagePruner`](context::prune::MessagePruner)) so the core stays free of
//! I/O policy.
//!
//! # Turn loop
//!
//! ```ignore
//! use convoy_rs::prelude::*;
//!
//! let mut compression = CompressionController::new(CompressionConfig::default());
//!
//! // Before sending: shrink history using last turn's level.
//! let prepared = compression.prepare(&history, compression.current_level());
//! let response = llm.send(&prepared.messages).await?;
//!
//! // After the response: derive the level for the next turn.
//! let stats = compression.record_usage(&response.usage, 200_000, history.len());
//! if stats.needs_handoff {
//!     // start a fresh session instead of compressing further
//! }
//!
//! // Execute requested tools.
//! let orchestrator = ToolOrchestrator::new(&executor, &registry, &store, &files, &gate)
//!     .with_event_handler(&LoggingHandler);
//! let outcome = orchestrator.execute_tools(&response.tool_calls, &ctx, &cancel).await;
//! history.extend(outcome.results.iter().map(ToolCallResult::to_message));
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Token estimation, compression levels and stats, the multi-pass `prepare` pipeline |
//! | [`tools`] | Tool execution seam, approval/file-modifying side-table, same-file dependency analysis |
//! | [`agent`] | Approval gate, events, store seam, lifecycle, the orchestrator |

pub mod agent;
pub mod context;
pub mod prelude;
pub mod tools;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
    Checkpoint,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
            MessageRole::Checkpoint => write!(f, "checkpoint"),
        }
    }
}

/// A message in the stored conversation history.
///
/// `Checkpoint` entries are UI bookkeeping (undo anchors) and are never sent
/// to the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    User(UserMessage),
    Assistant(AssistantMessage),
    Tool(ToolMessage),
    Checkpoint(CheckpointMessage),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: MessageContent,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct AssistantMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Free-form parts as streamed by the model (text, tool calls, reasoning).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<AssistantPart>,
}

/// The result of a tool call, as stored in history.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolMessage {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    /// Set when compression replaced the body with a sentinel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compacted_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CheckpointMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// User message body: plain text or a list of parts (text and images).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A structured content part.
///
/// Parts of a type this crate does not model (files, audio, provider
/// extensions) are kept verbatim in [`ContentPart::Unknown`] and written back
/// unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        /// Data URL or remote URL.
        image: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    #[serde(untagged)]
    Unknown(serde_json::Value),
}

/// A part of a streamed assistant message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantPart {
    Text {
        text: String,
    },
    ToolCall {
        tool_call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    Reasoning {
        text: String,
    },
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        ChatMessage::User(UserMessage {
            id: None,
            content: MessageContent::Text(text.into()),
        })
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        ChatMessage::User(UserMessage {
            id: None,
            content: MessageContent::Parts(parts),
        })
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        ChatMessage::Assistant(AssistantMessage {
            content: Some(text.into()),
            ..Default::default()
        })
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        ChatMessage::Assistant(AssistantMessage {
            tool_calls: Some(calls),
            ..Default::default()
        })
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        ChatMessage::Tool(ToolMessage {
            tool_call_id: call_id.into(),
            name: name.into(),
            content: content.into(),
            compacted_at: None,
        })
    }

    pub fn checkpoint(id: impl Into<String>) -> Self {
        ChatMessage::Checkpoint(CheckpointMessage {
            id: id.into(),
            label: None,
        })
    }

    pub fn role(&self) -> MessageRole {
        match self {
            ChatMessage::User(_) => MessageRole::User,
            ChatMessage::Assistant(_) => MessageRole::Assistant,
            ChatMessage::Tool(_) => MessageRole::Tool,
            ChatMessage::Checkpoint(_) => MessageRole::Checkpoint,
        }
    }

    pub fn as_tool(&self) -> Option<&ToolMessage> {
        match self {
            ChatMessage::Tool(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            ChatMessage::Assistant(a) => Some(a),
            _ => None,
        }
    }
}

impl AssistantMessage {
    /// The visible text of the message: `content` if present, otherwise the
    /// concatenated text parts.
    pub fn text(&self) -> Option<String> {
        if let Some(ref content) = self.content
            && !content.trim().is_empty()
        {
            return Some(content.clone());
        }
        let joined: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| match p {
                AssistantPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if joined.is_empty() {
            None
        } else {
            Some(joined.join(""))
        }
    }

    /// IDs of every tool call this message declares, from both the
    /// structured `tool_calls` list and streamed tool-call parts.
    pub fn declared_call_ids(&self) -> impl Iterator<Item = &str> {
        self.tool_calls
            .iter()
            .flatten()
            .map(|c| c.id.as_str())
            .chain(self.parts.iter().filter_map(|p| match p {
                AssistantPart::ToolCall { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            }))
    }

    /// Whether the message carries nothing worth sending.
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(|c| c.is_empty())
            && self.tool_calls.as_ref().is_none_or(|c| c.is_empty())
            && self.parts.is_empty()
    }
}

// ── Tool calls ─────────────────────────────────────────────────────

/// A tool call emitted by the model. Immutable once created.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Read a string argument by key.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

// ── Usage ──────────────────────────────────────────────────────────

/// Token usage reported by the model for one turn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_constructors() {
        let user = ChatMessage::user("hello");
        assert_eq!(user.role(), MessageRole::User);

        let assist = ChatMessage::assistant_text("hi");
        assert_eq!(assist.role(), MessageRole::Assistant);
        assert_eq!(assist.as_assistant().unwrap().text().as_deref(), Some("hi"));

        let tool = ChatMessage::tool_result("call-1", "read_file", "body");
        assert_eq!(tool.role(), MessageRole::Tool);
        assert_eq!(tool.as_tool().unwrap().tool_call_id, "call-1");

        assert_eq!(ChatMessage::checkpoint("cp").role(), MessageRole::Checkpoint);
    }

    #[test]
    fn serializes_with_role_tag() {
        let msg = ChatMessage::tool_result("c1", "grep", "x");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "c1");
        assert!(v.get("compacted_at").is_none());
    }

    #[test]
    fn deserializes_user_parts() {
        let v = json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "look"},
                {"type": "image", "image": "data:image/png;base64,AAAA"},
                {"type": "file", "data": "QUJD", "name": "notes.pdf"}
            ]
        });
        let msg: ChatMessage = serde_json::from_value(v.clone()).unwrap();
        let ChatMessage::User(u) = &msg else {
            panic!("expected user message");
        };
        let MessageContent::Parts(parts) = &u.content else {
            panic!("expected parts");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(parts[1], ContentPart::Image { .. }));
        assert_eq!(
            parts[2],
            ContentPart::Unknown(json!({"type": "file", "data": "QUJD", "name": "notes.pdf"}))
        );
        assert_eq!(serde_json::to_value(&msg).unwrap(), v);
    }

    #[test]
    fn assistant_text_falls_back_to_parts() {
        let msg = AssistantMessage {
            parts: vec![
                AssistantPart::Reasoning {
                    text: "thinking".into(),
                },
                AssistantPart::Text {
                    text: "The chart ".into(),
                },
                AssistantPart::Text {
                    text: "shows growth.".into(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(msg.text().as_deref(), Some("The chart shows growth."));
    }

    #[test]
    fn declared_call_ids_include_parts() {
        let msg = AssistantMessage {
            tool_calls: Some(vec![ToolCall::new("a", "read_file", json!({}))]),
            parts: vec![AssistantPart::ToolCall {
                tool_call_id: "b".into(),
                name: "grep".into(),
                arguments: json!({}),
            }],
            ..Default::default()
        };
        let ids: Vec<&str> = msg.declared_call_ids().collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
