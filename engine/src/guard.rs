//! Re-entrancy guard and the serialization lane.
//!
//! Every guarded operation runs inside a task-local scope. A guarded entry
//! point reached while that scope is active can only have come from a
//! collaborator called by the operation itself, so it is rejected and the
//! scope is poisoned; the outer operation observes the poison at its next
//! checkpoint and reverts. Calls from other tasks queue on the lane instead,
//! so operations still run strictly one at a time.
//!
//! A collaborator that calls back from a task it spawned is outside the
//! scope and waits on the lane held by the operation awaiting it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use assetbank_common::{BankError, OperationId, Result};
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

static NEXT_GUARD_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static ACTIVE: Vec<Arc<ScopeState>>;
}

#[derive(Debug)]
struct ScopeState {
    guard_id: u64,
    operation_id: OperationId,
    poisoned: AtomicBool,
}

/// Exclusion guard for one bank.
#[derive(Debug)]
pub struct ReentrancyGuard {
    id: u64,
    lane: Mutex<()>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self {
            id: NEXT_GUARD_ID.fetch_add(1, Ordering::Relaxed),
            lane: Mutex::new(()),
        }
    }

    /// This guard's scope on the current task, if an operation is in flight.
    fn active_scope(&self) -> Option<Arc<ScopeState>> {
        ACTIVE
            .try_with(|scopes| scopes.iter().find(|s| s.guard_id == self.id).cloned())
            .ok()
            .flatten()
    }

    /// Whether the current task is inside one of this guard's operations.
    pub fn is_held(&self) -> bool {
        self.active_scope().is_some()
    }

    /// Fail with `ReentrancyDetected` when called from inside an operation,
    /// poisoning that operation.
    pub fn reject_reentry(&self) -> Result<()> {
        if let Some(scope) = self.active_scope() {
            scope.poisoned.store(true, Ordering::SeqCst);
            warn!(operation_id = %scope.operation_id, "Re-entrant call rejected");
            return Err(BankError::ReentrancyDetected);
        }
        Ok(())
    }

    /// Enter the guard for a new operation, waiting for the lane.
    pub async fn enter(&self, operation_id: OperationId) -> Result<GuardScope<'_>> {
        self.reject_reentry()?;
        let lane = self.lane.lock().await;

        Ok(GuardScope {
            _lane: lane,
            state: Arc::new(ScopeState {
                guard_id: self.id,
                operation_id,
                poisoned: AtomicBool::new(false),
            }),
        })
    }
}

impl Default for ReentrancyGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// A held guard. Released on drop, on every path.
#[derive(Debug)]
pub struct GuardScope<'a> {
    _lane: MutexGuard<'a, ()>,
    state: Arc<ScopeState>,
}

impl GuardScope<'_> {
    pub fn operation_id(&self) -> OperationId {
        self.state.operation_id
    }

    pub fn is_poisoned(&self) -> bool {
        self.state.poisoned.load(Ordering::SeqCst)
    }

    /// Fail with `ReentrancyDetected` if a re-entrant call was observed.
    pub fn ensure_clean(&self) -> Result<()> {
        if self.is_poisoned() {
            return Err(BankError::ReentrancyDetected);
        }
        Ok(())
    }

    /// Run `fut` with this scope active on the current task.
    pub async fn run<F: Future>(&self, fut: F) -> F::Output {
        let mut scopes = ACTIVE.try_with(|s| s.clone()).unwrap_or_default();
        scopes.push(self.state.clone());
        ACTIVE.scope(scopes, fut).await
    }
}
