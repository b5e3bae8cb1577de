//! Tool execution seam, per-tool policy, and same-file dependency analysis.
//!
//! - [`core`]: the [`ToolExecutor`] trait the orchestrator drives, the
//!   [`ToolRegistry`] side-table (approval classification, file-modifying
//!   flag) and [`ToolExecutionContext`].
//! - [`dag`]: last-writer-per-path dependency graph and the completion
//!   latches that enforce it at runtime.
//! - [`names`]: canonical tool-name constants.

pub mod core;
pub mod dag;
pub mod names;

pub use self::core::{
    ApprovalType, ToolExecutionContext, ToolExecutor, ToolFuture, ToolOutput, ToolPolicy,
    ToolRegistry,
};
pub use dag::{CompletionLatches, DependencyGraph, build_dependencies};
