//! Batch execution of model-requested tool calls.
//!
//! [`ToolOrchestrator::execute_tools`] runs one batch in four phases:
//!
//! 1. **Snapshot** every path a file-modifying call will touch, before
//!    anything runs, so the batch can be undone.
//! 2. **Partition** calls into unsupervised and supervised using the
//!    registry's approval classification.
//! 3. **Unsupervised pool**: bounded fan-out/fan-in. Each call's failure is
//!    caught locally and becomes an `error` result; siblings keep running.
//! 4. **Supervised pass**: strictly sequential, in input order, each call
//!    gated on human approval. A rejection never aborts the batch.
//!
//! Both pools run at the same time. Writes to the same path are serialized
//! across them through completion latches: a call waits for the previous
//! writer of its path and is skipped if that writer did not execute.

use super::approval::ApprovalGate;
use super::config::OrchestratorConfig;
use super::events::{EventHandler, NoopHandler, OrchestratorEvent};
use super::lifecycle::{ToolCallResult, ToolCallStatus};
use super::store::{FileReader, ThreadStore, ToolCallPatch};
use crate::ToolCall;
use crate::tools::core::{ToolExecutionContext, ToolExecutor, ToolRegistry};
use crate::tools::dag::{CompletionLatches, DependencyGraph, build_dependencies};
use futures::FutureExt;
use futures::future::join_all;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a batch produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    /// One entry per call that reached a terminal state, in input order.
    /// Supervised calls not dispatched because of cancellation are absent.
    pub results: Vec<ToolCallResult>,
    /// At least one supervised call was declined, cancelled or timed out
    /// while waiting for approval.
    pub user_rejected: bool,
}

impl ExecutionOutcome {
    pub fn result(&self, call_id: &str) -> Option<&ToolCallResult> {
        self.results.iter().find(|r| r.tool_call.id == call_id)
    }
}

/// Executes tool-call batches for one session.
///
/// Collaborators are borrowed; the orchestrator owns only its configuration
/// and the worker-pool semaphore, which is sized once at construction.
pub struct ToolOrchestrator<'a> {
    executor: &'a dyn ToolExecutor,
    registry: &'a ToolRegistry,
    store: &'a dyn ThreadStore,
    files: &'a dyn FileReader,
    gate: &'a ApprovalGate,
    event_handler: &'a dyn EventHandler,
    config: OrchestratorConfig,
    permits: Semaphore,
}

impl<'a> ToolOrchestrator<'a> {
    pub fn new(
        executor: &'a dyn ToolExecutor,
        registry: &'a ToolRegistry,
        store: &'a dyn ThreadStore,
        files: &'a dyn FileReader,
        gate: &'a ApprovalGate,
    ) -> Self {
        let config = OrchestratorConfig::default();
        Self {
            executor,
            registry,
            store,
            files,
            gate,
            event_handler: &NoopHandler,
            permits: Semaphore::new(config.max_concurrency.max(1)),
            config,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.permits = Semaphore::new(config.max_concurrency.max(1));
        self.config = config;
        self
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Whether `call` must pass the approval gate.
    pub fn needs_approval(&self, call: &ToolCall) -> bool {
        self.registry.needs_approval(&call.name, self.config.auto_approve)
    }

    /// Execute one batch. Never panics and never returns an error: every
    /// failure resolves to a terminal result for the affected call.
    pub async fn execute_tools(
        &self,
        calls: &[ToolCall],
        ctx: &ToolExecutionContext,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        if calls.is_empty() {
            return ExecutionOutcome::default();
        }

        self.snapshot_files(calls, ctx).await;

        let (supervised, unsupervised): (Vec<_>, Vec<_>) = calls
            .iter()
            .enumerate()
            .partition(|(_, call)| self.needs_approval(call));
        debug!(
            "Partitioned {} call(s): {} unsupervised, {} supervised",
            calls.len(),
            unsupervised.len(),
            supervised.len()
        );
        self.emit(&OrchestratorEvent::BatchStarted {
            total: calls.len(),
            supervised: supervised.len(),
        });

        for call in calls {
            self.store.update_tool_call(
                &ctx.current_assistant_id,
                &call.id,
                ToolCallPatch::status(ToolCallStatus::Created),
            );
        }

        let graph = build_dependencies(calls, self.registry);
        let latches = CompletionLatches::new(calls.iter().map(|c| c.id.as_str()));

        let pool = join_all(
            unsupervised
                .iter()
                .map(|&(index, call)| self.run_unsupervised(index, call, ctx, &graph, &latches)),
        );
        let sequential = self.run_supervised(&supervised, ctx, &graph, &latches, cancel);
        let (pool_results, (supervised_results, user_rejected)) = tokio::join!(pool, sequential);
        latches.settle_remaining();

        let mut indexed: Vec<(usize, ToolCallResult)> =
            pool_results.into_iter().chain(supervised_results).collect();
        indexed.sort_by_key(|(index, _)| *index);
        let results: Vec<ToolCallResult> = indexed.into_iter().map(|(_, r)| r).collect();

        self.emit(&OrchestratorEvent::BatchFinished {
            results: results.len(),
            user_rejected,
        });
        ExecutionOutcome {
            results,
            user_rejected,
        }
    }

    // ── Phases ─────────────────────────────────────────────────────

    /// Record the current content of every path a file-modifying call in the
    /// batch touches. Each path is read once.
    async fn snapshot_files(&self, calls: &[ToolCall], ctx: &ToolExecutionContext) {
        let mut seen: HashSet<&str> = HashSet::new();
        for call in calls {
            let Some(path) = self.registry.target_path(call) else {
                continue;
            };
            if !seen.insert(path) {
                continue;
            }
            let content = self.files.read(&ctx.resolve(path)).await;
            let existed = content.is_some();
            self.store.add_snapshot_to_current_checkpoint(path, content);
            self.emit(&OrchestratorEvent::SnapshotTaken { path, existed });
        }
    }

    async fn run_unsupervised(
        &self,
        index: usize,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
        graph: &DependencyGraph,
        latches: &CompletionLatches,
    ) -> (usize, ToolCallResult) {
        if self.config.serialize_same_file_writes
            && let Some(deps) = graph.get(&call.id)
            && !deps.is_empty()
            && !latches.wait_all(deps).await
        {
            return (index, self.skip(call, ctx, latches, ToolCallStatus::Created));
        }

        // The semaphore is owned here and never closed, so acquire cannot fail.
        let _permit = self.permits.acquire().await.ok();
        (index, self.run_call(call, ctx, latches, ToolCallStatus::Created).await)
    }

    async fn run_supervised(
        &self,
        calls: &[(usize, &ToolCall)],
        ctx: &ToolExecutionContext,
        graph: &DependencyGraph,
        latches: &CompletionLatches,
        cancel: &CancellationToken,
    ) -> (Vec<(usize, ToolCallResult)>, bool) {
        let mut results = Vec::with_capacity(calls.len());
        let mut user_rejected = false;

        for (pos, &(index, call)) in calls.iter().enumerate() {
            if cancel.is_cancelled() {
                let remaining = &calls[pos..];
                info!("Cancelled; {} supervised call(s) not dispatched", remaining.len());
                for (_, c) in remaining {
                    latches.settle(&c.id, false);
                }
                self.emit(&OrchestratorEvent::Cancelled {
                    remaining: remaining.len(),
                });
                break;
            }

            if let Some(deps) = graph.get(&call.id)
                && !latches.wait_all(deps).await
            {
                results.push((index, self.skip(call, ctx, latches, ToolCallStatus::Created)));
                continue;
            }

            self.transition(call, ctx, ToolCallStatus::Created, ToolCallStatus::PendingApproval);
            self.emit(&OrchestratorEvent::ApprovalRequested {
                call,
                approval: self.registry.approval_type(&call.name),
            });
            let decision = self
                .gate
                .wait_for_approval_with(&call.id, cancel, self.config.approval_timeout())
                .await;

            if !decision.is_approved() {
                info!("Tool {} [{}] not approved: {decision:?}", call.name, call.id);
                user_rejected = true;
                let result = ToolCallResult::rejected(call.clone());
                self.finish(ctx, &result, latches, ToolCallStatus::PendingApproval);
                results.push((index, result));
                continue;
            }

            results.push((
                index,
                self.run_call(call, ctx, latches, ToolCallStatus::PendingApproval).await,
            ));
        }
        (results, user_rejected)
    }

    // ── Per-call plumbing ──────────────────────────────────────────

    /// Execute one call with error and panic isolation.
    async fn run_call(
        &self,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
        latches: &CompletionLatches,
        from: ToolCallStatus,
    ) -> ToolCallResult {
        self.transition(call, ctx, from, ToolCallStatus::Running);

        let outcome = AssertUnwindSafe(self.executor.execute(call, ctx))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(Ok(output)) => ToolCallResult::success(call.clone(), output),
            Ok(Err(e)) => {
                warn!("Tool {} [{}] failed: {e}", call.name, call.id);
                ToolCallResult::error(call.clone(), e)
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                warn!("Tool {} [{}] panicked: {msg}", call.name, call.id);
                ToolCallResult::error(call.clone(), format!("tool panicked: {msg}"))
            }
        };

        self.finish(ctx, &result, latches, ToolCallStatus::Running);
        result
    }

    fn skip(
        &self,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
        latches: &CompletionLatches,
        from: ToolCallStatus,
    ) -> ToolCallResult {
        info!("Skipping {} [{}]: dependency not met", call.name, call.id);
        let result = ToolCallResult::skipped(call.clone());
        self.finish(ctx, &result, latches, from);
        result
    }

    /// Publish a non-terminal transition.
    fn transition(
        &self,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
        from: ToolCallStatus,
        to: ToolCallStatus,
    ) {
        debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
        self.store.update_tool_call(
            &ctx.current_assistant_id,
            &call.id,
            ToolCallPatch::status(to),
        );
        self.emit(&OrchestratorEvent::StatusChanged { call, status: to });
    }

    /// Publish a terminal result and settle the call's latch.
    fn finish(
        &self,
        ctx: &ToolExecutionContext,
        result: &ToolCallResult,
        latches: &CompletionLatches,
        from: ToolCallStatus,
    ) {
        let call = &result.tool_call;
        debug_assert!(
            from.can_transition_to(result.status),
            "illegal transition {from} -> {}",
            result.status
        );
        self.store.update_tool_call(
            &ctx.current_assistant_id,
            &call.id,
            ToolCallPatch::status(result.status)
                .with_result(result.content.clone())
                .with_meta(result.meta.clone())
                .with_rich_content(result.rich_content.clone()),
        );
        self.store
            .add_tool_result(&call.id, &call.name, &result.content, result.status);
        self.emit(&OrchestratorEvent::StatusChanged {
            call,
            status: result.status,
        });
        self.emit(&OrchestratorEvent::ToolFinished { result });
        latches.settle(&call.id, result.status.executed());
    }

    fn emit(&self, event: &OrchestratorEvent<'_>) {
        self.event_handler.on_event(event);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::store::{MemoryStore, ReadFuture};
    use crate::tools::core::{ApprovalType, ToolFuture, ToolOutput};
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes the call name; fails on `fail`, panics on `panic`, sleeps
    /// `sleep_ms` when given. Tracks peak concurrency.
    #[derive(Default)]
    struct FakeExecutor {
        running: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    impl ToolExecutor for FakeExecutor {
        fn execute<'a>(&'a self, call: &'a ToolCall, _ctx: &'a ToolExecutionContext) -> ToolFuture<'a> {
            Box::pin(async move {
                let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                if let Some(ms) = call.arguments.get("sleep_ms").and_then(|v| v.as_u64()) {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                self.running.fetch_sub(1, Ordering::SeqCst);
                self.order.lock().unwrap().push(call.id.clone());
                match call.name.as_str() {
                    "fail" => Err("boom".to_string()),
                    "panic" => panic!("tool exploded"),
                    _ => Ok(ToolOutput::new(format!("ran {}", call.id))),
                }
            })
        }
    }

    #[derive(Default)]
    struct FakeFiles(HashMap<String, String>);

    impl FileReader for FakeFiles {
        fn read<'a>(&'a self, path: &'a Path) -> ReadFuture<'a> {
            let content = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| self.0.get(n).cloned());
            Box::pin(async move { content })
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .with_tool("write_file", ApprovalType::None, true)
            .with_tool("guarded_write", ApprovalType::Dangerous, true)
            .with_tool("shell", ApprovalType::Terminal, false)
    }

    fn ctx() -> ToolExecutionContext {
        ToolExecutionContext::new("/work", "asst-1")
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let (exec, reg, store, files, gate) =
            (FakeExecutor::default(), registry(), MemoryStore::new(), FakeFiles::default(), ApprovalGate::new());
        let orch = ToolOrchestrator::new(&exec, &reg, &store, &files, &gate);
        let outcome = orch.execute_tools(&[], &ctx(), &CancellationToken::new()).await;
        assert_eq!(outcome, ExecutionOutcome::default());
    }

    #[tokio::test]
    async fn failures_and_panics_are_isolated() {
        let (exec, reg, store, files, gate) =
            (FakeExecutor::default(), registry(), MemoryStore::new(), FakeFiles::default(), ApprovalGate::new());
        let orch = ToolOrchestrator::new(&exec, &reg, &store, &files, &gate);
        let calls = vec![
            ToolCall::new("a", "read_file", json!({})),
            ToolCall::new("b", "fail", json!({})),
            ToolCall::new("c", "panic", json!({})),
        ];
        let outcome = orch.execute_tools(&calls, &ctx(), &CancellationToken::new()).await;
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.result("a").unwrap().status, ToolCallStatus::Success);
        assert_eq!(outcome.result("b").unwrap().content, "Error: boom");
        let c = outcome.result("c").unwrap();
        assert_eq!(c.status, ToolCallStatus::Error);
        assert!(c.content.contains("tool exploded"));
        assert!(!outcome.user_rejected);
    }

    #[tokio::test]
    async fn pool_respects_concurrency_limit() {
        let (exec, reg, store, files, gate) =
            (FakeExecutor::default(), registry(), MemoryStore::new(), FakeFiles::default(), ApprovalGate::new());
        let orch = ToolOrchestrator::new(&exec, &reg, &store, &files, &gate)
            .with_config(OrchestratorConfig::new().with_max_concurrency(2));
        let calls: Vec<ToolCall> = (0..6)
            .map(|i| ToolCall::new(format!("c{i}"), "read_file", json!({"sleep_ms": 10})))
            .collect();
        let outcome = orch.execute_tools(&calls, &ctx(), &CancellationToken::new()).await;
        assert_eq!(outcome.results.len(), 6);
        assert!(outcome.results.iter().all(|r| r.status == ToolCallStatus::Success));
        assert_eq!(exec.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_concurrency_still_runs_one_at_a_time() {
        let (exec, reg, store, files, gate) =
            (FakeExecutor::default(), registry(), MemoryStore::new(), FakeFiles::default(), ApprovalGate::new());
        let orch = ToolOrchestrator::new(&exec, &reg, &store, &files, &gate)
            .with_config(OrchestratorConfig::new().with_max_concurrency(0));
        let calls: Vec<ToolCall> = (0..3)
            .map(|i| ToolCall::new(format!("c{i}"), "read_file", json!({"sleep_ms": 5})))
            .collect();
        let outcome = orch.execute_tools(&calls, &ctx(), &CancellationToken::new()).await;
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(exec.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn snapshots_each_path_once_before_execution() {
        let exec = FakeExecutor::default();
        let (reg, store, gate) = (registry(), MemoryStore::new(), ApprovalGate::new());
        let files = FakeFiles([("a.txt".to_string(), "old".to_string())].into_iter().collect());
        let orch = ToolOrchestrator::new(&exec, &reg, &store, &files, &gate);
        let calls = vec![
            ToolCall::new("w1", "write_file", json!({"path": "a.txt"})),
            ToolCall::new("w2", "write_file", json!({"path": "a.txt"})),
            ToolCall::new("w3", "write_file", json!({"path": "new.txt"})),
            ToolCall::new("r1", "read_file", json!({"path": "other.txt"})),
        ];
        orch.execute_tools(&calls, &ctx(), &CancellationToken::new()).await;
        let snaps = store.snapshots();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].path, "a.txt");
        assert_eq!(snaps[0].content.as_deref(), Some("old"));
        assert_eq!(snaps[1].path, "new.txt");
        assert_eq!(snaps[1].content, None);
    }

    #[tokio::test]
    async fn unsupervised_same_file_writes_run_in_order() {
        let (exec, reg, store, files, gate) =
            (FakeExecutor::default(), registry(), MemoryStore::new(), FakeFiles::default(), ApprovalGate::new());
        let orch = ToolOrchestrator::new(&exec, &reg, &store, &files, &gate);
        let calls = vec![
            ToolCall::new("first", "write_file", json!({"path": "f", "sleep_ms": 30})),
            ToolCall::new("second", "write_file", json!({"path": "f"})),
        ];
        orch.execute_tools(&calls, &ctx(), &CancellationToken::new()).await;
        assert_eq!(*exec.order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn store_sees_legal_transitions() {
        let (exec, reg, store, files, gate) =
            (FakeExecutor::default(), registry(), MemoryStore::new(), FakeFiles::default(), ApprovalGate::new());
        let orch = ToolOrchestrator::new(&exec, &reg, &store, &files, &gate);
        let calls = vec![ToolCall::new("a", "read_file", json!({}))];
        orch.execute_tools(&calls, &ctx(), &CancellationToken::new()).await;
        let record = store.tool_call("a").unwrap();
        assert_eq!(record.assistant_id, "asst-1");
        assert_eq!(
            record.history,
            vec![ToolCallStatus::Created, ToolCallStatus::Running, ToolCallStatus::Success]
        );
        for pair in record.history.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
        }
        assert_eq!(store.results()[0].content, "ran a");
    }

    #[tokio::test]
    async fn auto_approve_runs_supervised_tools_unsupervised() {
        let (exec, reg, store, files, gate) =
            (FakeExecutor::default(), registry(), MemoryStore::new(), FakeFiles::default(), ApprovalGate::new());
        let orch = ToolOrchestrator::new(&exec, &reg, &store, &files, &gate)
            .with_config(OrchestratorConfig::new().with_auto_approve(true));
        let calls = vec![ToolCall::new("s", "shell", json!({"command": "ls"}))];
        let outcome = orch.execute_tools(&calls, &ctx(), &CancellationToken::new()).await;
        assert_eq!(outcome.results[0].status, ToolCallStatus::Success);
        assert_eq!(gate.pending_call_id(), None);
    }

    #[tokio::test]
    async fn approval_timeout_rejects() {
        let (exec, reg, store, files, gate) =
            (FakeExecutor::default(), registry(), MemoryStore::new(), FakeFiles::default(), ApprovalGate::new());
        let orch = ToolOrchestrator::new(&exec, &reg, &store, &files, &gate).with_config(
            OrchestratorConfig::new().with_approval_timeout(Some(Duration::from_secs(0))),
        );
        let calls = vec![ToolCall::new("s", "shell", json!({}))];
        let outcome = orch.execute_tools(&calls, &ctx(), &CancellationToken::new()).await;
        assert!(outcome.user_rejected);
        assert_eq!(outcome.results[0].status, ToolCallStatus::Rejected);
    }

    #[test]
    fn panic_messages() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
