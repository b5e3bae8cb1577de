//! Store and file seams.
//!
//! The orchestrator reflects every transition into a shared thread store
//! that a UI also reads, and records file snapshots for undo. Both live
//! outside this crate; [`MemoryStore`] and [`FsFileReader`] are the in-crate
//! implementations used by the CLI and tests.

use super::lifecycle::ToolCallStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

// ── Store interface ────────────────────────────────────────────────

/// A single-record update to a tool call. Fields left `None` are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolCallPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolCallStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rich_content: Option<serde_json::Value>,
}

impl ToolCallPatch {
    pub fn status(status: ToolCallStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_meta(mut self, meta: Option<serde_json::Value>) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_rich_content(mut self, rich_content: Option<serde_json::Value>) -> Self {
        self.rich_content = rich_content;
        self
    }
}

/// Thread state shared with the UI.
///
/// Each method is one atomic update keyed by call ID. No two orchestrator
/// tasks ever target the same call ID, so implementations need no
/// cross-call locking beyond keeping each update whole.
pub trait ThreadStore: Send + Sync {
    fn update_tool_call(&self, assistant_id: &str, call_id: &str, patch: ToolCallPatch);

    fn add_tool_result(&self, call_id: &str, name: &str, content: &str, status: ToolCallStatus);

    /// Record the pre-execution content of `path` for undo. `None` means the
    /// file did not exist.
    fn add_snapshot_to_current_checkpoint(&self, path: &str, content: Option<String>);
}

// ── File interface ─────────────────────────────────────────────────

/// Boxed future returned by [`FileReader::read`].
pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

/// Reads files for snapshotting. `None` means the file does not exist yet;
/// read failures are reported the same way.
pub trait FileReader: Send + Sync {
    fn read<'a>(&'a self, path: &'a Path) -> ReadFuture<'a>;
}

/// [`FileReader`] over the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsFileReader;

impl FileReader for FsFileReader {
    fn read<'a>(&'a self, path: &'a Path) -> ReadFuture<'a> {
        Box::pin(async move { tokio::fs::read_to_string(path).await.ok() })
    }
}

// ── MemoryStore ────────────────────────────────────────────────────

/// Current state of one tool call as the UI would see it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub assistant_id: String,
    pub status: Option<ToolCallStatus>,
    pub result: Option<String>,
    pub meta: Option<serde_json::Value>,
    pub rich_content: Option<serde_json::Value>,
    /// Every status written, in order.
    pub history: Vec<ToolCallStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredToolResult {
    pub call_id: String,
    pub name: String,
    pub content: String,
    pub status: ToolCallStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSnapshot {
    pub path: String,
    pub content: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tool_calls: HashMap<String, ToolCallRecord>,
    results: Vec<StoredToolResult>,
    snapshots: Vec<FileSnapshot>,
}

/// In-memory [`ThreadStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool_call(&self, call_id: &str) -> Option<ToolCallRecord> {
        self.lock().tool_calls.get(call_id).cloned()
    }

    /// Tool results in the order they were added.
    pub fn results(&self) -> Vec<StoredToolResult> {
        self.lock().results.clone()
    }

    pub fn snapshots(&self) -> Vec<FileSnapshot> {
        self.lock().snapshots.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ThreadStore for MemoryStore {
    fn update_tool_call(&self, assistant_id: &str, call_id: &str, patch: ToolCallPatch) {
        let mut state = self.lock();
        let record = state.tool_calls.entry(call_id.to_string()).or_default();
        record.assistant_id = assistant_id.to_string();
        if let Some(status) = patch.status {
            record.status = Some(status);
            record.history.push(status);
        }
        if patch.result.is_some() {
            record.result = patch.result;
        }
        if patch.meta.is_some() {
            record.meta = patch.meta;
        }
        if patch.rich_content.is_some() {
            record.rich_content = patch.rich_content;
        }
    }

    fn add_tool_result(&self, call_id: &str, name: &str, content: &str, status: ToolCallStatus) {
        self.lock().results.push(StoredToolResult {
            call_id: call_id.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            status,
        });
    }

    fn add_snapshot_to_current_checkpoint(&self, path: &str, content: Option<String>) {
        self.lock().snapshots.push(FileSnapshot {
            path: path.to_string(),
            content,
        });
    }
}
