//! Tool-execution runtime: the [`ToolOrchestrator`] and its supporting modules.
//!
//! - [`orchestrator::ToolOrchestrator`]: executes a batch of tool calls.
//!   Start here.
//! - [`approval`]: per-session [`ApprovalGate`] rendezvous with
//!   cancellation and timeout.
//! - [`events`]: [`EventHandler`] trait and [`OrchestratorEvent`] enum for
//!   observing a batch. Includes [`LoggingHandler`], [`CompositeEventHandler`]
//!   and [`FnEventHandler`].
//! - [`lifecycle`]: [`ToolCallStatus`] state machine and [`ToolCallResult`].
//! - [`store`]: the [`ThreadStore`] and [`FileReader`] seams.
//! - [`config`]: [`OrchestratorConfig`] and the combined [`RuntimeConfig`].

pub mod approval;
pub mod config;
pub mod events;
pub mod lifecycle;
pub mod orchestrator;
pub mod store;

// Re-export commonly used items at the module level.
pub use approval::{ApprovalDecision, ApprovalGate};
pub use config::{OrchestratorConfig, RuntimeConfig};
pub use events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    OrchestratorEvent,
};
pub use lifecycle::{SKIPPED_DEPENDENCY, ToolCallResult, ToolCallStatus};
pub use orchestrator::{ExecutionOutcome, ToolOrchestrator};
pub use store::{FileReader, FsFileReader, MemoryStore, ThreadStore, ToolCallPatch};
