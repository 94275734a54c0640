//! Execution sink: the seam between the engine and side-effecting actions.
//!
//! The engine never runs an action directly; it hands the action and an
//! [`ActionContext`] to an [`ExecutionSink`] and reads back the
//! [`Outcome`]. The sink owns whatever workspace/materialization the action
//! needs and streams logs into the state store. [`LocalSink`] is the
//! in-process implementation; remote or containerized runners implement the
//! same trait.

use crate::event::Event;
use crate::goal::GoalAction;
use crate::outcome::Outcome;
use crate::store::StateStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use uuid::Uuid;

/// Cooperative cancellation token.
///
/// Cloning is cheap; all clones observe the same flag. Cancellation is a
/// request, not a kill: actions are expected to notice and return early.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender gone without a cancel request; nothing will ever fire.
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Log stream of one goal instance, writing through the state store.
#[derive(Clone)]
pub struct LogHandle {
    store: Arc<dyn StateStore>,
    instance_id: Uuid,
    goal: String,
}

impl LogHandle {
    pub fn new(store: Arc<dyn StateStore>, instance_id: Uuid, goal: &str) -> Self {
        Self {
            store,
            instance_id,
            goal: goal.to_string(),
        }
    }

    /// Append one log line. Store failures are logged and swallowed so a
    /// broken log backend never fails the action itself.
    pub fn line(&self, line: &str) {
        if let Err(err) = self.store.append_log(self.instance_id, line) {
            tracing::warn!(goal = %self.goal, error = %err, "failed to append log line");
        }
    }
}

/// Everything an action receives about its invocation.
#[derive(Clone)]
pub struct ActionContext {
    pub event: Arc<Event>,
    pub activation_id: Uuid,
    pub instance_id: Uuid,
    /// Goal name this invocation belongs to.
    pub goal: String,
    /// 1-based attempt counter; increments on retry.
    pub attempt: u32,
    pub log: LogHandle,
    pub cancel: CancelToken,
}

/// Asynchronous action runner contract.
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn execute(&self, action: Arc<dyn GoalAction>, ctx: ActionContext) -> Outcome;
}

/// Runs actions in-process on the current runtime.
///
/// An optional concurrency cap bounds how many actions run at once; the
/// engine itself imposes no bound on non-isolated goals, so the cap is the
/// sink's own resource limit.
pub struct LocalSink {
    limit: Option<Arc<Semaphore>>,
}

impl LocalSink {
    pub fn new() -> Self {
        Self { limit: None }
    }

    pub fn with_concurrency_limit(limit: usize) -> Self {
        Self {
            limit: Some(Arc::new(Semaphore::new(limit))),
        }
    }
}

impl Default for LocalSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionSink for LocalSink {
    async fn execute(&self, action: Arc<dyn GoalAction>, ctx: ActionContext) -> Outcome {
        let _permit = match &self.limit {
            Some(semaphore) => match semaphore.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return Outcome::permanent("execution sink closed"),
            },
            None => None,
        };

        if ctx.cancel.is_cancelled() {
            return Outcome::skipped("cancelled before start");
        }

        ctx.log
            .line(&format!("goal '{}' attempt {} starting", ctx.goal, ctx.attempt));
        let outcome = action.run(&ctx).await;
        match &outcome {
            Outcome::Success { .. } => {
                ctx.log.line(&format!("goal '{}' succeeded", ctx.goal));
            }
            Outcome::Failure { retryable, message } => {
                ctx.log.line(&format!(
                    "goal '{}' failed (retryable: {retryable}): {message}",
                    ctx.goal
                ));
            }
            Outcome::Skipped { reason } => {
                ctx.log
                    .line(&format!("goal '{}' skipped: {reason}", ctx.goal));
            }
        }
        outcome
    }
}
