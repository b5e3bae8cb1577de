//! Tool-call lifecycle states and terminal results.
//!
//! ```text
//! unsupervised: created ─► running ─► success | error
//! supervised:   created ─► pending_approval ─► running ─► success | error
//!                                    └──────► rejected | skipped
//! ```
//!
//! A call whose same-file dependency did not execute goes straight from
//! `created` to `skipped` and never reaches the approval stage.

use crate::tools::core::ToolOutput;
use crate::{ChatMessage, ToolCall};
use serde::{Deserialize, Serialize};

/// Body of a result skipped because an earlier write to the same file did
/// not execute.
pub const SKIPPED_DEPENDENCY: &str = "Skipped: dependency not met";

/// Body of a result the user declined.
pub const REJECTED_BY_USER: &str = "Rejected: the user declined this tool call";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Created,
    PendingApproval,
    Running,
    Success,
    Error,
    Rejected,
    Skipped,
}

impl ToolCallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ToolCallStatus::Success
                | ToolCallStatus::Error
                | ToolCallStatus::Rejected
                | ToolCallStatus::Skipped
        )
    }

    /// Whether the call ran, successfully or not. Dependents may proceed
    /// only after an executed prerequisite.
    pub fn executed(self) -> bool {
        matches!(self, ToolCallStatus::Success | ToolCallStatus::Error)
    }

    /// Legal edges of the lifecycle graph.
    pub fn can_transition_to(self, next: ToolCallStatus) -> bool {
        use ToolCallStatus::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Created, PendingApproval)
                | (Created, Skipped)
                | (PendingApproval, Running)
                | (PendingApproval, Rejected)
                | (PendingApproval, Skipped)
                | (Running, Success)
                | (Running, Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToolCallStatus::Created => "created",
            ToolCallStatus::PendingApproval => "pending_approval",
            ToolCallStatus::Running => "running",
            ToolCallStatus::Success => "success",
            ToolCallStatus::Error => "error",
            ToolCallStatus::Rejected => "rejected",
            ToolCallStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one call in a batch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCallResult {
    pub tool_call: ToolCall,
    pub status: ToolCallStatus,
    /// Text handed back to the model.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_content: Option<serde_json::Value>,
}

impl ToolCallResult {
    pub fn success(tool_call: ToolCall, output: ToolOutput) -> Self {
        Self {
            tool_call,
            status: ToolCallStatus::Success,
            content: output.result,
            meta: output.meta,
            rich_content: output.rich_content,
        }
    }

    pub fn error(tool_call: ToolCall, message: impl AsRef<str>) -> Self {
        Self::bare(tool_call, ToolCallStatus::Error, format!("Error: {}", message.as_ref()))
    }

    pub fn rejected(tool_call: ToolCall) -> Self {
        Self::bare(tool_call, ToolCallStatus::Rejected, REJECTED_BY_USER.to_string())
    }

    pub fn skipped(tool_call: ToolCall) -> Self {
        Self::bare(tool_call, ToolCallStatus::Skipped, SKIPPED_DEPENDENCY.to_string())
    }

    fn bare(tool_call: ToolCall, status: ToolCallStatus, content: String) -> Self {
        Self {
            tool_call,
            status,
            content,
            meta: None,
            rich_content: None,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.tool_call.id
    }

    /// Tool-result message to append to history for the next turn.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::tool_result(&self.tool_call.id, &self.tool_call.name, &self.content)
    }
}
