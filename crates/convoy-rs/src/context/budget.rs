//! Usage-derived compression levels.
//!
//! After every turn the model reports how many input tokens the request
//! consumed. The ratio of that number to the context limit picks a
//! [`CompressionLevel`] for the *next* turn. Only input tokens count: output
//! tokens do not occupy the window for the following request.
//!
//! The level computed from turn N is applied to the request of turn N+1, so a
//! single outlier turn never triggers instant over-compression of the turn
//! that produced it.

use crate::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Usage ratios at which each level starts.
const LEVEL_1_RATIO: f64 = 0.50;
const LEVEL_2_RATIO: f64 = 0.70;
const LEVEL_3_RATIO: f64 = 0.85;
const LEVEL_4_RATIO: f64 = 0.95;

/// How aggressively history is shrunk before it is sent.
///
/// Ordinal: higher levels apply every strategy of the lower ones plus more.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(into = "u8", from = "u8")]
pub enum CompressionLevel {
    /// Only checkpoint bookkeeping is removed.
    #[default]
    L0 = 0,
    /// Message-count cap and large-argument truncation.
    L1 = 1,
    /// Adds smart pruning and clearing of old tool results.
    L2 = 2,
    /// Narrows the protected tool-result window.
    L3 = 3,
    /// Floor. The session should hand off.
    L4 = 4,
}

impl CompressionLevel {
    /// All levels in ascending order.
    pub const ALL: [CompressionLevel; 5] = [
        CompressionLevel::L0,
        CompressionLevel::L1,
        CompressionLevel::L2,
        CompressionLevel::L3,
        CompressionLevel::L4,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Index into per-level tables.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl From<CompressionLevel> for u8 {
    fn from(level: CompressionLevel) -> u8 {
        level.as_u8()
    }
}

/// Out-of-range values clamp to [`CompressionLevel::L4`].
impl From<u8> for CompressionLevel {
    fn from(value: u8) -> Self {
        match value {
            0 => CompressionLevel::L0,
            1 => CompressionLevel::L1,
            2 => CompressionLevel::L2,
            3 => CompressionLevel::L3,
            _ => CompressionLevel::L4,
        }
    }
}

impl std::fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.as_u8())
    }
}

/// Map a usage ratio onto a level.
///
/// | ratio | level |
/// |---|---|
/// | < 0.50 | 0 |
/// | < 0.70 | 1 |
/// | < 0.85 | 2 |
/// | < 0.95 | 3 |
/// | ≥ 0.95 | 4 |
pub fn calculate_level(ratio: f64) -> CompressionLevel {
    if ratio < LEVEL_1_RATIO {
        CompressionLevel::L0
    } else if ratio < LEVEL_2_RATIO {
        CompressionLevel::L1
    } else if ratio < LEVEL_3_RATIO {
        CompressionLevel::L2
    } else if ratio < LEVEL_4_RATIO {
        CompressionLevel::L3
    } else {
        CompressionLevel::L4
    }
}

/// Usage snapshot after a turn. Drives the next turn's level.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CompressionStats {
    pub level: CompressionLevel,
    /// `input_tokens / context_limit`.
    pub ratio: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub context_limit: u64,
    /// Input tokens saved relative to the previous turn (never negative).
    pub saved_tokens: u64,
    /// `saved_tokens` as a whole-number percentage of the previous input.
    pub saved_percent: f64,
    pub message_count: usize,
    /// The level hit the floor: start a fresh session rather than keep
    /// compressing.
    pub needs_handoff: bool,
    pub last_updated_at: DateTime<Utc>,
}

impl CompressionStats {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: {} tokens ({:.0}% of {}), level {}{}",
            self.input_tokens,
            self.ratio * 100.0,
            self.context_limit,
            self.level,
            if self.needs_handoff { ", handoff" } else { "" },
        )
    }
}

/// Compute stats for the turn that just finished.
///
/// A zero `context_limit` means the limit is unknown; the ratio is then
/// reported as `0.0` so compression stays off rather than jumping to the
/// floor.
pub fn update_stats(
    usage: &TokenUsage,
    context_limit: u64,
    previous: Option<&CompressionStats>,
    message_count: usize,
) -> CompressionStats {
    let input_tokens = usage.prompt_tokens;
    let ratio = if context_limit > 0 {
        input_tokens as f64 / context_limit as f64
    } else {
        warn!("Context limit is 0; treating usage ratio as 0");
        0.0
    };
    let level = calculate_level(ratio);

    let (saved_tokens, saved_percent) = match previous {
        Some(prev) if prev.input_tokens > 0 => {
            let saved = prev.input_tokens.saturating_sub(input_tokens);
            let pct = (saved as f64 / prev.input_tokens as f64 * 100.0).round();
            (saved, pct)
        }
        _ => (0, 0.0),
    };

    let needs_handoff = level >= CompressionLevel::L4;

    debug!(
        "Usage ratio {:.3} ({} / {}) -> level {}",
        ratio, input_tokens, context_limit, level
    );
    if needs_handoff && !previous.is_some_and(|p| p.needs_handoff) {
        info!("Context usage at {:.0}%: session handoff required", ratio * 100.0);
    }

    CompressionStats {
        level,
        ratio,
        input_tokens,
        output_tokens: usage.completion_tokens,
        context_limit,
        saved_tokens,
        saved_percent,
        message_count,
        needs_handoff,
        last_updated_at: Utc::now(),
    }
}
