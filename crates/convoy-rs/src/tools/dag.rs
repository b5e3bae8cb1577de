//! Same-file write ordering for a batch of tool calls.
//!
//! When the model emits several calls in one turn, two of them may write the
//! same file. Running those concurrently (or running the second after the
//! first was rejected) corrupts the user's intent, so each file-modifying
//! call depends on the previous writer of its path. Unrelated paths stay
//! unordered.
//!
//! [`build_dependencies`] produces the graph. [`CompletionLatches`] is the
//! runtime half: every call settles its latch exactly once, and dependents
//! wait on the latches of their prerequisites.

use super::core::ToolRegistry;
use crate::ToolCall;
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;

/// Dependency graph: call ID → IDs of calls that must settle first.
pub type DependencyGraph = HashMap<String, HashSet<String>>;

/// Build the same-file dependency graph over `calls`, in call order.
///
/// Every call has an entry. Calls without a path, and calls that do not
/// modify files, have an empty set. Edges always point at earlier calls, so
/// the graph is acyclic.
pub fn build_dependencies(calls: &[ToolCall], registry: &ToolRegistry) -> DependencyGraph {
    let mut last_writer: HashMap<&str, &str> = HashMap::new();
    let mut graph: DependencyGraph = HashMap::with_capacity(calls.len());

    for call in calls {
        let deps = graph.entry(call.id.clone()).or_default();
        if let Some(path) = registry.target_path(call)
            && let Some(prev) = last_writer.insert(path, call.id.as_str())
            && prev != call.id
        {
            deps.insert(prev.to_string());
        }
    }
    graph
}

/// One-shot completion latches keyed by call ID.
///
/// A latch settles to `true` when the call executed (success or error) and
/// to `false` when it was rejected, skipped or cancelled. Settling is
/// idempotent: the first value wins.
#[derive(Debug)]
pub struct CompletionLatches {
    latches: HashMap<String, watch::Sender<Option<bool>>>,
}

impl CompletionLatches {
    pub fn new<'c>(call_ids: impl IntoIterator<Item = &'c str>) -> Self {
        let latches = call_ids
            .into_iter()
            .map(|id| (id.to_string(), watch::channel(None).0))
            .collect();
        Self { latches }
    }

    /// Settle `call_id`. Later calls for the same ID are ignored.
    pub fn settle(&self, call_id: &str, executed: bool) {
        if let Some(tx) = self.latches.get(call_id) {
            tx.send_if_modified(|state| {
                if state.is_some() {
                    return false;
                }
                *state = Some(executed);
                true
            });
        }
    }

    /// Settle every latch still open as not executed.
    pub fn settle_remaining(&self) {
        for id in self.latches.keys() {
            self.settle(id, false);
        }
    }

    /// Current state of `call_id`: `None` while open or unknown.
    pub fn state(&self, call_id: &str) -> Option<bool> {
        self.latches.get(call_id).and_then(|tx| *tx.borrow())
    }

    /// Wait until every dependency settles. Returns `true` only if all of
    /// them executed. Unknown IDs count as unmet.
    pub async fn wait_all(&self, deps: &HashSet<String>) -> bool {
        let mut all_met = true;
        for dep in deps {
            let Some(tx) = self.latches.get(dep) else {
                all_met = false;
                continue;
            };
            let mut rx = tx.subscribe();
            let met = rx
                .wait_for(Option::is_some)
                .await
                .is_ok_and(|state| (*state).unwrap_or(false));
            all_met &= met;
        }
        all_met
    }
}
