//! Events and handlers for the [`ToolOrchestrator`](super::orchestrator::ToolOrchestrator).
//!
//! The orchestrator publishes every lifecycle transition as an
//! [`OrchestratorEvent`] the moment it happens, so observers see results
//! incrementally rather than when the batch ends.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |
//! | Custom `impl EventHandler` | Full control (UI, metrics) |

use super::lifecycle::{ToolCallResult, ToolCallStatus};
use crate::ToolCall;
use crate::tools::core::ApprovalType;
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the orchestrator during a batch.
#[derive(Debug)]
pub enum OrchestratorEvent<'a> {
    /// A batch is starting.
    BatchStarted { total: usize, supervised: usize },
    /// Pre-execution content of a file was recorded for undo.
    SnapshotTaken { path: &'a str, existed: bool },
    /// A call moved to a new lifecycle state.
    StatusChanged {
        call: &'a ToolCall,
        status: ToolCallStatus,
    },
    /// A supervised call is waiting on the approval gate.
    ApprovalRequested {
        call: &'a ToolCall,
        approval: ApprovalType,
    },
    /// A call reached a terminal state.
    ToolFinished { result: &'a ToolCallResult },
    /// Cancellation stopped the supervised pass.
    Cancelled { remaining: usize },
    /// The batch is done.
    BatchFinished { results: usize, user_rejected: bool },
}

/// Handler for orchestrator events.
///
/// Handlers are called synchronously from the orchestrator's task and
/// should return quickly.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &OrchestratorEvent<'_>) {
        let _ = event;
    }
}

/// A no-op event handler.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// # Example
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let OrchestratorEvent::ToolFinished { result } = event {
///         println!("{} -> {}", result.tool_call.name, result.status);
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&OrchestratorEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&OrchestratorEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&OrchestratorEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &OrchestratorEvent<'_>) {
        (self.0)(event)
    }
}

/// An event handler that delegates to multiple inner handlers, in
/// registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with(my_ui_handler);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a handler to the chain. Handlers are called in registration order.
    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler to the chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    /// Add a handler from an `Option`. `None` is a no-op.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &OrchestratorEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Renders every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &OrchestratorEvent<'_>) {
        match event {
            OrchestratorEvent::BatchStarted { total, supervised } => {
                info!("Executing {total} tool call(s), {supervised} supervised");
            }
            OrchestratorEvent::SnapshotTaken { path, existed } => {
                debug!(
                    "Snapshot {path} ({})",
                    if *existed { "existing" } else { "new file" }
                );
            }
            OrchestratorEvent::StatusChanged { call, status } => {
                debug!("Tool {} [{}] -> {status}", call.name, call.id);
            }
            OrchestratorEvent::ApprovalRequested { call, approval } => {
                info!("Awaiting approval for {} [{}] ({approval:?})", call.name, call.id);
            }
            OrchestratorEvent::ToolFinished { result } => {
                let name = &result.tool_call.name;
                match result.status {
                    ToolCallStatus::Error => warn!("Tool {name} failed: {}", result.content),
                    status => debug!("Tool {name} {status}: {} bytes", result.content.len()),
                }
            }
            OrchestratorEvent::Cancelled { remaining } => {
                info!("Cancelled; {remaining} supervised call(s) not dispatched");
            }
            OrchestratorEvent::BatchFinished {
                results,
                user_rejected,
            } => {
                info!(
                    "Batch finished: {results} result(s){}",
                    if *user_rejected { ", user rejected" } else { "" }
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn composite_dispatches_to_all() {
        let count = Arc::new(AtomicUsize::new(0));
        let (a, b) = (Arc::clone(&count), Arc::clone(&count));
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            }))
            .with_if(false, NoopHandler)
            .with_opt(Some(FnEventHandler::new(move |_| {
                b.fetch_add(10, Ordering::SeqCst);
            })))
            .with(LoggingHandler);

        handler.on_event(&OrchestratorEvent::BatchStarted {
            total: 2,
            supervised: 1,
        });
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn logging_handler_covers_every_event() {
        let call = ToolCall::new("c1", "shell", json!({"command": "ls"}));
        let result = ToolCallResult::error(call.clone(), "boom");
        let events = [
            OrchestratorEvent::BatchStarted {
                total: 1,
                supervised: 1,
            },
            OrchestratorEvent::SnapshotTaken {
                path: "a.txt",
                existed: false,
            },
            OrchestratorEvent::StatusChanged {
                call: &call,
                status: ToolCallStatus::Running,
            },
            OrchestratorEvent::ApprovalRequested {
                call: &call,
                approval: ApprovalType::Terminal,
            },
            OrchestratorEvent::ToolFinished { result: &result },
            OrchestratorEvent::Cancelled { remaining: 0 },
            OrchestratorEvent::BatchFinished {
                results: 1,
                user_rejected: false,
            },
        ];
        for event in &events {
            LoggingHandler.on_event(event);
        }
    }
}
