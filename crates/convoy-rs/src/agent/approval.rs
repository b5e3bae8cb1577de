//! Single-slot human approval rendezvous.
//!
//! One gate per session, passed to the orchestrator by reference. The
//! orchestrator waits; a UI or channel handler calls [`ApprovalGate::approve`]
//! or [`ApprovalGate::reject`] from elsewhere. There is no queue: only one
//! approval is ever outstanding, and a second concurrent wait is rejected on
//! the spot so the first keeps its slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How a wait on the gate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
    Cancelled,
    TimedOut,
}

impl ApprovalDecision {
    pub fn is_approved(self) -> bool {
        self == ApprovalDecision::Approved
    }
}

struct PendingApproval {
    ticket: u64,
    call_id: String,
    tx: oneshot::Sender<bool>,
}

/// Per-session approval gate.
#[derive(Default)]
pub struct ApprovalGate {
    slot: Mutex<Option<PendingApproval>>,
    next_ticket: AtomicU64,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait without cancellation or timeout. `true` only on approval.
    pub async fn wait_for_approval(&self, call_id: &str) -> bool {
        self.wait_for_approval_with(call_id, &CancellationToken::new(), None)
            .await
            .is_approved()
    }

    /// Wait until the call is approved or rejected, `cancel` fires, or
    /// `timeout` elapses.
    pub async fn wait_for_approval_with(
        &self,
        call_id: &str,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> ApprovalDecision {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let mut rx = {
            let mut slot = self.lock();
            if let Some(pending) = slot.as_ref() {
                warn!(
                    "Approval for {call_id} requested while {} is pending; rejecting",
                    pending.call_id
                );
                return ApprovalDecision::Rejected;
            }
            let (tx, rx) = oneshot::channel();
            *slot = Some(PendingApproval {
                ticket,
                call_id: call_id.to_string(),
                tx,
            });
            rx
        };
        debug!("Waiting for approval of {call_id}");

        let deadline = async {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let decision = tokio::select! {
            answer = &mut rx => answer_to_decision(answer),
            _ = cancel.cancelled() => give_up(&mut rx, ApprovalDecision::Cancelled),
            _ = deadline => give_up(&mut rx, ApprovalDecision::TimedOut),
        };

        // Free the slot if nobody resolved it.
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|p| p.ticket == ticket) {
            *slot = None;
        }
        debug!("Approval of {call_id}: {decision:?}");
        decision
    }

    /// Approve the pending call. Returns `false` when nothing is pending.
    pub fn approve(&self) -> bool {
        self.resolve(true)
    }

    /// Reject the pending call. Returns `false` when nothing is pending.
    pub fn reject(&self) -> bool {
        self.resolve(false)
    }

    /// ID of the call currently awaiting a decision.
    pub fn pending_call_id(&self) -> Option<String> {
        self.lock().as_ref().map(|p| p.call_id.clone())
    }

    fn resolve(&self, approved: bool) -> bool {
        match self.lock().take() {
            Some(pending) => pending.tx.send(approved).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingApproval>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn answer_to_decision(answer: Result<bool, oneshot::error::RecvError>) -> ApprovalDecision {
    match answer {
        Ok(true) => ApprovalDecision::Approved,
        // Rejected, or the sender was dropped.
        Ok(false) | Err(_) => ApprovalDecision::Rejected,
    }
}

/// Stop accepting answers. An answer that was already sent wins over
/// `fallback`, so `approve`/`reject` report `true` exactly when the waiter
/// saw their answer.
fn give_up(rx: &mut oneshot::Receiver<bool>, fallback: ApprovalDecision) -> ApprovalDecision {
    rx.close();
    match rx.try_recv() {
        Ok(answer) => answer_to_decision(Ok(answer)),
        Err(_) => fallback,
    }
}

impl std::fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGate")
            .field("pending", &self.pending_call_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn wait_until_pending(gate: &ApprovalGate) {
        while gate.pending_call_id().is_none() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn approve_resolves_wait() {
        let gate = Arc::new(ApprovalGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait_for_approval("c1").await })
        };
        wait_until_pending(&gate).await;
        assert_eq!(gate.pending_call_id().as_deref(), Some("c1"));
        assert!(gate.approve());
        assert!(waiter.await.unwrap());
        assert_eq!(gate.pending_call_id(), None);
    }

    #[tokio::test]
    async fn reject_resolves_wait() {
        let gate = Arc::new(ApprovalGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait_for_approval("c1").await })
        };
        wait_until_pending(&gate).await;
        assert!(gate.reject());
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn resolve_without_pending_is_noop() {
        let gate = ApprovalGate::new();
        assert!(!gate.approve());
        assert!(!gate.reject());
    }

    #[tokio::test]
    async fn cancellation_ends_wait() {
        let gate = ApprovalGate::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let decision = gate.wait_for_approval_with("c1", &cancel, None).await;
        assert_eq!(decision, ApprovalDecision::Cancelled);
        assert_eq!(gate.pending_call_id(), None);
    }

    #[tokio::test]
    async fn timeout_ends_wait() {
        let gate = ApprovalGate::new();
        let decision = gate
            .wait_for_approval_with("c1", &CancellationToken::new(), Some(Duration::from_millis(20)))
            .await;
        assert_eq!(decision, ApprovalDecision::TimedOut);
        assert_eq!(gate.pending_call_id(), None);
    }

    #[test]
    fn answer_after_giving_up_is_refused() {
        let (tx, mut rx) = oneshot::channel();
        assert_eq!(give_up(&mut rx, ApprovalDecision::Cancelled), ApprovalDecision::Cancelled);
        assert!(tx.send(true).is_err());
    }

    #[test]
    fn answer_sent_before_giving_up_wins() {
        let (tx, mut rx) = oneshot::channel();
        assert!(tx.send(true).is_ok());
        assert_eq!(give_up(&mut rx, ApprovalDecision::TimedOut), ApprovalDecision::Approved);

        let (tx, mut rx) = oneshot::channel();
        assert!(tx.send(false).is_ok());
        assert_eq!(give_up(&mut rx, ApprovalDecision::TimedOut), ApprovalDecision::Rejected);
    }

    #[tokio::test]
    async fn approve_after_timeout_reports_nothing_pending() {
        let gate = ApprovalGate::new();
        let decision = gate
            .wait_for_approval_with("c1", &CancellationToken::new(), Some(Duration::from_millis(5)))
            .await;
        assert_eq!(decision, ApprovalDecision::TimedOut);
        assert!(!gate.approve());
    }

    #[tokio::test]
    async fn second_wait_is_rejected_immediately() {
        let gate = Arc::new(ApprovalGate::new());
        let first = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait_for_approval("c1").await })
        };
        wait_until_pending(&gate).await;

        assert!(!gate.wait_for_approval("c2").await);
        assert_eq!(gate.pending_call_id().as_deref(), Some("c1"));

        gate.approve();
        assert!(first.await.unwrap());
    }
}
