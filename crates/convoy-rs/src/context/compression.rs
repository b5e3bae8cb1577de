//! The multi-pass `prepare` pipeline and cross-turn level tracking.
//!
//! [`CompressionController::prepare`] is a pure function of the stored
//! history and a level: it clones what it needs and never touches the
//! caller's slice. Strategies are cumulative, so a higher level runs every
//! pass of the lower ones with tighter parameters:
//!
//! | pass | levels |
//! |---|---|
//! | drop checkpoints | all |
//! | message-count ceiling | 1+ |
//! | smart prune | 2+ |
//! | file-write argument truncation | 1+ |
//! | tool-result clearing | 2+ |
//! | image placeholders | all |
//! | orphan tool-result removal | all |

use super::budget::{CompressionLevel, CompressionStats, update_stats};
use super::eviction::clear_old_tool_results;
use super::images::replace_images;
use super::prune::{MessagePruner, RecencyPruner};
use super::truncation::{message_limit, trim_to_limit, truncate_file_write_arguments};
use crate::tools::names::{FILE_WRITE_TOOLS, PROTECTED_TOOLS, TRUNCATABLE_FIELDS};
use crate::{ChatMessage, TokenUsage};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Tunables for [`CompressionController`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Base message ceiling. The effective cap is `min(base, level ceiling)`.
    pub max_messages: usize,
    /// Assistant turns whose tool results survive clearing at level 2.
    pub keep_recent_turns: usize,
    /// Assistant turns whose tool results survive clearing at level 3+.
    pub deep_compression_turns: usize,
    /// Recency window handed to the smart pruner.
    pub prune_recent_messages: usize,
    /// Tools whose results are never cleared.
    pub protected_tools: HashSet<String>,
    /// Tools whose arguments carry file bodies.
    pub file_write_tools: HashSet<String>,
    /// Argument fields truncated on file-write calls.
    pub truncatable_fields: Vec<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_messages: 60,
            keep_recent_turns: 5,
            deep_compression_turns: 2,
            prune_recent_messages: 6,
            protected_tools: PROTECTED_TOOLS.iter().map(|s| s.to_string()).collect(),
            file_write_tools: FILE_WRITE_TOOLS.iter().map(|s| s.to_string()).collect(),
            truncatable_fields: TRUNCATABLE_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CompressionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_keep_recent_turns(mut self, turns: usize) -> Self {
        self.keep_recent_turns = turns;
        self
    }

    pub fn with_deep_compression_turns(mut self, turns: usize) -> Self {
        self.deep_compression_turns = turns;
        self
    }

    pub fn with_prune_recent_messages(mut self, messages: usize) -> Self {
        self.prune_recent_messages = messages;
        self
    }

    /// Add a protected tool name (its results will never be cleared).
    pub fn protect_tool(mut self, name: impl Into<String>) -> Self {
        self.protected_tools.insert(name.into());
        self
    }

    /// Register an additional file-writing tool for argument truncation.
    pub fn with_file_write_tool(mut self, name: impl Into<String>) -> Self {
        self.file_write_tools.insert(name.into());
        self
    }

    /// Protected tool-result window for `level`.
    fn protected_turns(&self, level: CompressionLevel) -> usize {
        if level >= CompressionLevel::L3 {
            self.deep_compression_turns
        } else {
            self.keep_recent_turns
        }
    }
}

/// What `prepare` produced and what it did. Observability only; nothing here
/// is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareResult {
    /// Messages to send.
    pub messages: Vec<ChatMessage>,
    pub applied_level: CompressionLevel,
    /// Distinct tool calls whose arguments were truncated.
    pub truncated_tool_calls: usize,
    /// Tool results replaced with the cleared sentinel.
    pub cleared_tool_results: usize,
    /// Messages removed by any pass, checkpoints included.
    pub removed_messages: usize,
    /// Image parts replaced with placeholders.
    pub replaced_images: usize,
}

/// Turns stored history into a budget-fit message list and tracks the
/// usage-derived level across turns.
pub struct CompressionController {
    config: CompressionConfig,
    pruner: Box<dyn MessagePruner>,
    last_stats: Option<CompressionStats>,
}

impl CompressionController {
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            config,
            pruner: Box::new(RecencyPruner),
            last_stats: None,
        }
    }

    /// Replace the built-in [`RecencyPruner`].
    pub fn with_pruner(mut self, pruner: impl MessagePruner + 'static) -> Self {
        self.pruner = Box::new(pruner);
        self
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Stats recorded after the most recent turn.
    pub fn last_stats(&self) -> Option<&CompressionStats> {
        self.last_stats.as_ref()
    }

    /// Level to apply to the next request: the one derived from the last
    /// recorded usage, or `L0` before any turn.
    pub fn current_level(&self) -> CompressionLevel {
        self.last_stats.as_ref().map_or(CompressionLevel::L0, |s| s.level)
    }

    /// Record usage for the turn that just finished and return the new stats.
    pub fn record_usage(
        &mut self,
        usage: &TokenUsage,
        context_limit: u64,
        message_count: usize,
    ) -> &CompressionStats {
        let stats = update_stats(usage, context_limit, self.last_stats.as_ref(), message_count);
        debug!("{}", stats.to_log_string());
        self.last_stats.insert(stats)
    }

    /// Build the message list for one request at `level`.
    pub fn prepare(&self, history: &[ChatMessage], level: CompressionLevel) -> PrepareResult {
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .filter(|m| !matches!(m, ChatMessage::Checkpoint(_)))
            .cloned()
            .collect();
        let checkpoints = history.len() - messages.len();
        if checkpoints > 0 {
            debug!("Dropped {} checkpoint message(s)", checkpoints);
        }

        if let Some(limit) = message_limit(level, self.config.max_messages) {
            let dropped = trim_to_limit(&mut messages, limit);
            if dropped > 0 {
                debug!("Trimmed {} oldest message(s) to fit limit {}", dropped, limit);
            }
        }

        if level >= CompressionLevel::L2 {
            match self.pruner.prune(&messages, self.config.prune_recent_messages) {
                Ok(pruned) => {
                    if pruned != messages {
                        debug!("Smart prune: {} -> {} message(s)", messages.len(), pruned.len());
                    }
                    messages = pruned;
                }
                Err(e) => warn!("Smart prune failed, continuing unpruned: {e}"),
            }
        }

        let truncated_tool_calls = truncate_file_write_arguments(
            &mut messages,
            level,
            &self.config.file_write_tools,
            &self.config.truncatable_fields,
        );
        if truncated_tool_calls > 0 {
            debug!("Truncated arguments of {} file-write call(s)", truncated_tool_calls);
        }

        let cleared_tool_results = if level >= CompressionLevel::L2 {
            let cleared = clear_old_tool_results(
                &mut messages,
                self.config.protected_turns(level),
                &self.config.protected_tools,
                Utc::now(),
            );
            if cleared > 0 {
                debug!("Cleared {} old tool result(s)", cleared);
            }
            cleared
        } else {
            0
        };

        let replaced_images = replace_images(&mut messages);
        if replaced_images > 0 {
            debug!("Replaced {} image(s) with placeholders", replaced_images);
        }

        let orphans = drop_orphan_tool_results(&mut messages);
        if orphans > 0 {
            debug!("Dropped {} orphaned tool result(s)", orphans);
        }

        let removed_messages = history.len() - messages.len();
        debug!(
            "Prepared {} message(s) at level {} (removed {}, truncated {}, cleared {})",
            messages.len(),
            level,
            removed_messages,
            truncated_tool_calls,
            cleared_tool_results
        );

        PrepareResult {
            messages,
            applied_level: level,
            truncated_tool_calls,
            cleared_tool_results,
            removed_messages,
            replaced_images,
        }
    }
}

impl Default for CompressionController {
    fn default() -> Self {
        Self::new(CompressionConfig::default())
    }
}

/// Remove tool results whose call is not declared by an earlier assistant
/// message. Returns the number removed.
fn drop_orphan_tool_results(messages: &mut Vec<ChatMessage>) -> usize {
    let mut declared: HashSet<String> = HashSet::new();
    let before = messages.len();
    messages.retain(|msg| match msg {
        ChatMessage::Assistant(a) => {
            declared.extend(a.declared_call_ids().map(str::to_string));
            true
        }
        ChatMessage::Tool(t) => declared.contains(&t.tool_call_id),
        _ => true,
    });
    before - messages.len()
}
