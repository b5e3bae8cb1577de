//! Tool execution seam and the per-tool policy side-table.
//!
//! Concrete tools live outside this crate. The orchestrator only needs two
//! things from them: a way to run a call ([`ToolExecutor`]) and a few facts
//! about each tool name ([`ToolRegistry`]): whether it needs human approval
//! and whether it modifies files. The latter drives snapshotting and
//! same-file ordering.

use super::names;
use crate::ToolCall;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

/// Boxed future returned by [`ToolExecutor::execute`].
///
/// Type alias to keep trait signatures and implementations readable.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<ToolOutput, String>> + Send + 'a>>;

/// Argument keys that may carry the target path of a file-modifying call.
pub const PATH_ARGUMENT_KEYS: &[&str] = &["path", "file_path"];

// ── Execution context ──────────────────────────────────────────────

/// Read-only context shared by every call in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolExecutionContext {
    pub workspace_path: PathBuf,
    /// Assistant message that emitted the batch. Store updates are keyed by it.
    pub current_assistant_id: String,
}

impl ToolExecutionContext {
    pub fn new(workspace_path: impl Into<PathBuf>, current_assistant_id: impl Into<String>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            current_assistant_id: current_assistant_id.into(),
        }
    }

    /// Resolve a tool-supplied path against the workspace.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = PathBuf::from(path);
        if candidate.is_absolute() {
            candidate
        } else {
            self.workspace_path.join(candidate)
        }
    }
}

// ── Output ─────────────────────────────────────────────────────────

/// Successful output of a tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text handed back to the model.
    pub result: String,
    /// Structured metadata for observers (exit codes, line counts, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    /// Rich rendering payload for the UI (diffs, tables, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_content: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            ..Default::default()
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_rich_content(mut self, rich_content: serde_json::Value) -> Self {
        self.rich_content = Some(rich_content);
        self
    }
}

// ── ToolExecutor trait ─────────────────────────────────────────────

/// Runs tool calls on behalf of the orchestrator.
///
/// An `Err` becomes a terminal `error` result; a panic inside the future is
/// caught and treated the same way. Neither affects sibling calls.
///
/// # Example
///
/// ```ignore
/// struct Shell;
///
/// impl ToolExecutor for Shell {
///     fn execute<'a>(&'a self, call: &'a ToolCall, ctx: &'a ToolExecutionContext) -> ToolFuture<'a> {
///         Box::pin(async move {
///             let cmd = call.arg_str("command").ok_or("missing command")?;
///             let out = run(cmd, &ctx.workspace_path).await.map_err(|e| e.to_string())?;
///             Ok(ToolOutput::new(out))
///         })
///     }
/// }
/// ```
pub trait ToolExecutor: Send + Sync {
    fn execute<'a>(&'a self, call: &'a ToolCall, ctx: &'a ToolExecutionContext) -> ToolFuture<'a>;
}

// ── ToolRegistry ───────────────────────────────────────────────────

/// How much supervision a tool needs before it runs.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalType {
    /// Runs without asking.
    #[default]
    None,
    /// Runs a terminal command; the user confirms first.
    Terminal,
    /// Destructive; the user confirms first.
    Dangerous,
}

/// Facts about one tool name.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToolPolicy {
    #[serde(default)]
    pub approval: ApprovalType,
    #[serde(default)]
    pub modifies_files: bool,
}

/// Side-table mapping tool names to their [`ToolPolicy`].
///
/// Unknown names get the default policy: no approval, not file-modifying.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    policies: HashMap<String, ToolPolicy>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the canonical tool names in
    /// [`names`](super::names).
    pub fn with_builtin_tools() -> Self {
        Self::new()
            .with_tool(names::READ_FILE, ApprovalType::None, false)
            .with_tool(names::LIST_DIR, ApprovalType::None, false)
            .with_tool(names::GREP, ApprovalType::None, false)
            .with_tool(names::TODO, ApprovalType::None, false)
            .with_tool(names::PLAN, ApprovalType::None, false)
            .with_tool(names::ASK_USER, ApprovalType::None, false)
            .with_tool(names::WRITE_FILE, ApprovalType::None, true)
            .with_tool(names::EDIT_FILE, ApprovalType::None, true)
            .with_tool(names::DELETE_FILE, ApprovalType::Dangerous, true)
            .with_tool(names::SHELL, ApprovalType::Terminal, false)
    }

    /// Register or replace a tool's policy.
    pub fn with_tool(mut self, name: impl Into<String>, approval: ApprovalType, modifies_files: bool) -> Self {
        self.register(name, approval, modifies_files);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, approval: ApprovalType, modifies_files: bool) {
        self.policies.insert(
            name.into(),
            ToolPolicy {
                approval,
                modifies_files,
            },
        );
    }

    pub fn policy(&self, name: &str) -> ToolPolicy {
        self.policies.get(name).copied().unwrap_or_default()
    }

    pub fn approval_type(&self, name: &str) -> ApprovalType {
        self.policy(name).approval
    }

    pub fn modifies_files(&self, name: &str) -> bool {
        self.policy(name).modifies_files
    }

    /// Whether a call to `name` must wait for the approval gate.
    pub fn needs_approval(&self, name: &str, auto_approve: bool) -> bool {
        !auto_approve && self.approval_type(name) != ApprovalType::None
    }

    /// Target path of a file-modifying call, `None` for every other call.
    pub fn target_path<'c>(&self, call: &'c ToolCall) -> Option<&'c str> {
        if !self.modifies_files(&call.name) {
            return None;
        }
        PATH_ARGUMENT_KEYS
            .iter()
            .find_map(|key| call.arg_str(key))
            .filter(|p| !p.is_empty())
    }
}
