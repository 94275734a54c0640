//! Activation execution loop.
//!
//! One [`ActivationExecutor::run`] call drives one activation (goal graph ×
//! event) to completion: it promotes eligible instances, spawns a worker
//! task per ready goal, serializes isolated goals on a per-activation slot,
//! applies retries, and reacts to approval signals and cooperative
//! cancellation. The scheduler is owned by this loop — worker tasks report
//! back over a channel and never mutate state themselves.

use crate::config::EngineConfig;
use crate::engine::scheduler::ActivationScheduler;
use crate::engine::state::{ActivationSummary, ExecutionTimer, GoalState};
use crate::event::Event;
use crate::graph::{GoalGraph, NodeIndex};
use crate::outcome::Outcome;
use crate::sink::{ActionContext, CancelToken, ExecutionSink, LogHandle};
use crate::store::StateStore;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use uuid::Uuid;

/// Lifecycle events emitted during activation execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GoalEvent {
    /// A goal graph was instantiated for an event.
    Activated {
        activation_id: Uuid,
        graph: String,
        goals: Vec<String>,
    },
    /// A goal instance started running.
    GoalStarted {
        instance_id: Uuid,
        goal: String,
        attempt: u32,
    },
    /// A goal instance re-entered `Running` after a transient failure.
    GoalRetrying {
        instance_id: Uuid,
        goal: String,
        attempt: u32,
    },
    /// A gated goal instance is waiting for an external approval signal.
    AwaitingApproval { instance_id: Uuid, goal: String },
    /// A goal instance reached a terminal state.
    GoalCompleted {
        instance_id: Uuid,
        goal: String,
        state: GoalState,
    },
    /// The whole activation finished.
    ActivationCompleted {
        activation_id: Uuid,
        summary: ActivationSummary,
    },
}

/// External approval decision for one gated goal instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApprovalSignal {
    pub instance_id: Uuid,
    pub approved: bool,
}

/// Messages worker tasks send back to the activation loop.
#[derive(Debug)]
enum WorkerMessage {
    Retry {
        node: NodeIndex,
        attempt: u32,
    },
    Done {
        node: NodeIndex,
        outcome: Outcome,
        attempts: u32,
    },
}

/// Runs activations against an execution sink and a state store.
pub struct ActivationExecutor {
    config: EngineConfig,
    sink: Arc<dyn ExecutionSink>,
    store: Arc<dyn StateStore>,
    event_tx: Option<mpsc::Sender<GoalEvent>>,
}

impl ActivationExecutor {
    pub fn new(
        config: EngineConfig,
        sink: Arc<dyn ExecutionSink>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            config,
            sink,
            store,
            event_tx: None,
        }
    }

    /// Set the channel lifecycle events are emitted on.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<GoalEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Execute one activation to completion and return its summary.
    ///
    /// Approval signals arrive on `approval_rx`; closing that channel while
    /// gated instances wait (and nothing is in flight) skips those gates.
    /// Cancelling `cancel` abandons the activation: non-terminal instances
    /// become `Skipped` and in-flight actions are asked to stop.
    pub async fn run(
        &self,
        activation_id: Uuid,
        graph: Arc<GoalGraph>,
        event: Arc<Event>,
        mut approval_rx: mpsc::Receiver<ApprovalSignal>,
        cancel: CancelToken,
    ) -> ActivationSummary {
        let timer = ExecutionTimer::start();
        let mut scheduler = ActivationScheduler::new(
            activation_id,
            Arc::clone(&graph),
            Arc::clone(&self.store),
        );

        tracing::info!(
            activation = %activation_id,
            graph = %graph.name(),
            event = %event.id,
            goals = graph.len(),
            "activating goal graph"
        );
        self.emit(GoalEvent::Activated {
            activation_id,
            graph: graph.name().to_string(),
            goals: graph.goal_names(),
        })
        .await;

        let (result_tx, mut result_rx) =
            mpsc::channel::<WorkerMessage>(self.config.result_channel_capacity);
        // The one core-managed mutual-exclusion resource: isolated goals of
        // this activation serialize on it.
        let isolation_slot = Arc::new(Semaphore::new(1));
        let mut in_flight = 0usize;
        let mut approvals_open = true;
        let mut abandoned = false;

        loop {
            scheduler.promote();
            for index in scheduler.ready() {
                scheduler.mark_running(index);
                self.spawn_worker(
                    activation_id,
                    &scheduler,
                    index,
                    &event,
                    &result_tx,
                    &isolation_slot,
                    &cancel,
                );
                in_flight += 1;
            }
            self.forward_events(&mut scheduler).await;

            if scheduler.all_terminal() {
                break;
            }

            if in_flight == 0 && !approvals_open && scheduler.waiting_approval_count() > 0 {
                scheduler.skip_waiting("approval channel closed");
                continue;
            }

            tokio::select! {
                message = result_rx.recv(), if in_flight > 0 => match message {
                    Some(WorkerMessage::Retry { node, attempt }) => {
                        scheduler.mark_retry(node, attempt);
                    }
                    Some(WorkerMessage::Done { node, outcome, attempts }) => {
                        in_flight -= 1;
                        scheduler.record_outcome(node, &outcome, attempts);
                    }
                    None => {
                        in_flight = 0;
                    }
                },
                signal = approval_rx.recv(), if approvals_open => match signal {
                    Some(ApprovalSignal { instance_id, approved: true }) => {
                        if !scheduler.approve(instance_id) {
                            tracing::warn!(
                                activation = %activation_id,
                                instance = %instance_id,
                                "approval for unknown or non-gated instance"
                            );
                        }
                    }
                    Some(ApprovalSignal { instance_id, approved: false }) => {
                        if !scheduler.reject(instance_id) {
                            tracing::warn!(
                                activation = %activation_id,
                                instance = %instance_id,
                                "rejection for unknown or non-gated instance"
                            );
                        }
                    }
                    None => {
                        approvals_open = false;
                    }
                },
                _ = cancel.cancelled(), if !abandoned => {
                    abandoned = true;
                    tracing::info!(activation = %activation_id, "activation abandoned");
                    scheduler.abandon("activation abandoned");
                }
            }
        }

        self.forward_events(&mut scheduler).await;
        let summary = scheduler.summary(timer.elapsed());
        tracing::info!(
            activation = %activation_id,
            graph = %graph.name(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "activation complete"
        );
        self.emit(GoalEvent::ActivationCompleted {
            activation_id,
            summary: summary.clone(),
        })
        .await;
        summary
    }

    /// Spawn the worker task for one ready instance. The worker owns the
    /// retry loop; state transitions are reported back over the channel.
    #[allow(clippy::too_many_arguments)]
    fn spawn_worker(
        &self,
        activation_id: Uuid,
        scheduler: &ActivationScheduler,
        index: NodeIndex,
        event: &Arc<Event>,
        result_tx: &mpsc::Sender<WorkerMessage>,
        isolation_slot: &Arc<Semaphore>,
        cancel: &CancelToken,
    ) {
        let Some(node) = scheduler.graph().node(index) else {
            return;
        };
        let goal_def = Arc::clone(node.goal());
        let options = goal_def.options();
        let action = goal_def.action();
        let instance = scheduler.instance(index);
        let instance_id = instance.id;
        let goal_name = instance.goal.clone();

        let sink = Arc::clone(&self.sink);
        let store = Arc::clone(&self.store);
        let max_attempts = self.config.max_attempts;
        let result_tx = result_tx.clone();
        let slot = options.isolate.then(|| Arc::clone(isolation_slot));
        let event = Arc::clone(event);
        let cancel = cancel.clone();

        tokio::spawn(async move {
            let _permit = match &slot {
                Some(slot) => slot.clone().acquire_owned().await.ok(),
                None => None,
            };

            let mut attempt = 1u32;
            loop {
                let ctx = ActionContext {
                    event: Arc::clone(&event),
                    activation_id,
                    instance_id,
                    goal: goal_name.clone(),
                    attempt,
                    log: LogHandle::new(Arc::clone(&store), instance_id, &goal_name),
                    cancel: cancel.clone(),
                };
                // A panicking action must not take the worker down with it:
                // an unreported worker would leave the instance Running and
                // the activation loop waiting forever.
                let outcome = AssertUnwindSafe(sink.execute(Arc::clone(&action), ctx))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        tracing::error!(goal = %goal_name, attempt, "action panicked");
                        Outcome::permanent("action panicked")
                    });

                let retry = options.retry
                    && outcome.is_retryable()
                    && attempt < max_attempts
                    && !cancel.is_cancelled();
                if retry {
                    attempt += 1;
                    if result_tx
                        .send(WorkerMessage::Retry {
                            node: index,
                            attempt,
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    continue;
                }

                let _ = result_tx
                    .send(WorkerMessage::Done {
                        node: index,
                        outcome,
                        attempts: attempt,
                    })
                    .await;
                return;
            }
        });
    }

    async fn emit(&self, event: GoalEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    async fn forward_events(&self, scheduler: &mut ActivationScheduler) {
        for event in scheduler.take_events() {
            self.emit(event).await;
        }
    }
}
