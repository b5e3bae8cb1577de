//! Orchestrator and runtime configuration.
//!
//! [`RuntimeConfig`] bundles both halves of the subsystem so a host can load
//! them from one JSON document. Every field has a default; a partial document
//! overrides only what it names.

use crate::context::compression::CompressionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for [`ToolOrchestrator`](super::orchestrator::ToolOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Width of the unsupervised worker pool. Default: `8`.
    pub max_concurrency: usize,
    /// Run every call unsupervised. Default: `false`.
    pub auto_approve: bool,
    /// Give up on an approval after this many milliseconds. Default: wait
    /// forever.
    pub approval_timeout_ms: Option<u64>,
    /// Serialize same-file writes in the unsupervised pool too. Default: `true`.
    pub serialize_same_file_writes: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            auto_approve: false,
            approval_timeout_ms: None,
            serialize_same_file_writes: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    /// Sub-millisecond remainders round up, so a non-zero timeout never
    /// becomes zero.
    pub fn with_approval_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.approval_timeout_ms = timeout.map(|d| {
            u64::try_from(d.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
        });
        self
    }

    pub fn with_serialize_same_file_writes(mut self, serialize: bool) -> Self {
        self.serialize_same_file_writes = serialize;
        self
    }

    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_ms.map(Duration::from_millis)
    }
}

/// Both halves of the subsystem's configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub compression: CompressionConfig,
    pub orchestrator: OrchestratorConfig,
}

impl RuntimeConfig {
    pub fn from_json(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("Invalid runtime config: {e}"))
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        Self::from_json(&text)
    }
}
