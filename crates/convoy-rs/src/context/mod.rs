//! Context budget management: token estimation, usage-derived levels, and
//! the compression passes that fit history into the model's window.
//!
//! 1. **[`tokens`]** heuristic token counting (CJK-aware, flat image cost).
//!
//! 2. **[`budget`]** maps the last turn's input-token ratio onto a
//!    [`CompressionLevel`] and records [`CompressionStats`]. Level 4 signals a
//!    session handoff.
//!
//! 3. **[`truncation`]**, **[`eviction`]**, **[`images`]**, **[`prune`]** are
//!    the individual passes. Each is cheap, needs no LLM call, and only ever
//!    shrinks content.
//!
//! 4. **[`compression`]** chains the passes into
//!    [`CompressionController::prepare`], a pure `history × level → history`
//!    function.

pub mod budget;
pub mod compression;
pub mod eviction;
pub mod images;
pub mod prune;
pub mod tokens;
pub mod truncation;

// Re-export commonly used items at the module level.
pub use budget::{CompressionLevel, CompressionStats, calculate_level, update_stats};
pub use compression::{CompressionConfig, CompressionController, PrepareResult};
pub use prune::{MessagePruner, RecencyPruner};
pub use tokens::{estimate_content_tokens, estimate_messages_tokens, estimate_tokens};
