//! Convenience re-exports for common `convoy-rs` types.
//!
//! Meant to be glob-imported by the host agent loop:
//!
//! ```ignore
//! use convoy_rs::prelude::*;
//! ```
//!
//! Individual compression passes, latches and the dependency graph are left
//! out; import those from their modules directly when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    AssistantMessage, AssistantPart, ChatMessage, ContentPart, MessageContent, MessageRole,
    TokenUsage, ToolCall, ToolMessage,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{
    CompressionConfig, CompressionController, CompressionLevel, CompressionStats, MessagePruner,
    PrepareResult, RecencyPruner, estimate_messages_tokens, estimate_tokens,
};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{
    ApprovalType, ToolExecutionContext, ToolExecutor, ToolFuture, ToolOutput, ToolRegistry,
};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    ApprovalDecision, ApprovalGate, CompositeEventHandler, EventHandler, ExecutionOutcome,
    FileReader, FnEventHandler, FsFileReader, LoggingHandler, MemoryStore, NoopHandler,
    OrchestratorConfig, OrchestratorEvent, RuntimeConfig, ThreadStore, ToolCallPatch,
    ToolCallResult, ToolCallStatus, ToolOrchestrator,
};

pub use tokio_util::sync::CancellationToken;
