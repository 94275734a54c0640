//! The delivery machine: goals, rules, and push handling in one place.
//!
//! A [`DeliveryMachine`] is configured once at startup (register goal
//! definitions, add trigger rules, pick a sink and a store) and then fed
//! push events. Each matching rule produces an independent [`Activation`]
//! running on its own task; callers hold [`ActivationControls`] to approve
//! gated goals or abandon the run.

use crate::config::EngineConfig;
use crate::engine::{ActivationExecutor, ActivationSummary, ApprovalSignal, GoalEvent};
use crate::errors::EngineError;
use crate::event::Event;
use crate::goal::{GoalDefinition, GoalRegistry};
use crate::graph::GoalGraph;
use crate::sink::{CancelToken, ExecutionSink, LocalSink};
use crate::store::{InMemoryStore, StateStore};
use crate::trigger::{self, TriggerRule};
use anyhow::Result;
use futures::future::try_join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Handle to approve, reject, or abandon one running activation.
///
/// Clones share the underlying channels; keep a clone alive for as long as
/// approvals should remain possible.
#[derive(Clone)]
pub struct ActivationControls {
    approval_tx: mpsc::Sender<ApprovalSignal>,
    cancel: CancelToken,
}

impl ActivationControls {
    /// Approve a gated goal instance. Returns false when the activation is
    /// no longer listening.
    pub async fn approve(&self, instance_id: Uuid) -> bool {
        self.approval_tx
            .send(ApprovalSignal {
                instance_id,
                approved: true,
            })
            .await
            .is_ok()
    }

    /// Reject a gated goal instance, skipping it and its dependents.
    pub async fn reject(&self, instance_id: Uuid) -> bool {
        self.approval_tx
            .send(ApprovalSignal {
                instance_id,
                approved: false,
            })
            .await
            .is_ok()
    }

    /// Abandon the activation: in-flight actions are cancelled
    /// cooperatively and everything non-terminal is skipped.
    pub fn abandon(&self) {
        self.cancel.cancel();
    }
}

/// One goal graph activated for one event, running on its own task.
pub struct Activation {
    id: Uuid,
    graph_name: String,
    controls: ActivationControls,
    handle: JoinHandle<ActivationSummary>,
}

impl Activation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    pub fn controls(&self) -> ActivationControls {
        self.controls.clone()
    }

    /// Wait for the activation to finish.
    ///
    /// This drops the activation's own controls handle, so unless the
    /// caller kept a [`controls`](Self::controls) clone, goals still
    /// waiting for approval are skipped rather than waited on forever.
    pub async fn wait(self) -> Result<ActivationSummary, EngineError> {
        let Activation {
            graph_name,
            controls,
            handle,
            ..
        } = self;
        drop(controls);
        handle
            .await
            .map_err(|_| EngineError::ActivationLost { graph: graph_name })
    }
}

/// Declarative push-to-goals orchestrator.
pub struct DeliveryMachine {
    name: String,
    config: EngineConfig,
    registry: GoalRegistry,
    rules: Vec<TriggerRule>,
    sink: Arc<dyn ExecutionSink>,
    store: Arc<dyn StateStore>,
    event_tx: Option<mpsc::Sender<GoalEvent>>,
}

impl DeliveryMachine {
    /// Create a machine with the default in-process sink and in-memory
    /// store.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            config: EngineConfig::default(),
            registry: GoalRegistry::new(),
            rules: Vec::new(),
            sink: Arc::new(LocalSink::new()),
            store: Arc::new(InMemoryStore::new()),
            event_tx: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    /// Emit lifecycle events on the given channel.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<GoalEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Register a goal definition; names are unique per machine.
    pub fn register_goal(&mut self, goal: GoalDefinition) -> Result<Arc<GoalDefinition>> {
        self.registry.register(goal)
    }

    pub fn goal(&self, name: &str) -> Option<Arc<GoalDefinition>> {
        self.registry.get(name)
    }

    pub fn add_rule(&mut self, rule: TriggerRule) {
        self.rules.push(rule);
    }

    /// Evaluate trigger rules against an event and start one activation per
    /// match. Returns immediately; activations run on their own tasks.
    pub fn on_push(&self, event: Event) -> Vec<Activation> {
        let event = Arc::new(event);
        let graphs = trigger::evaluate(&event, &self.rules);
        if graphs.is_empty() {
            tracing::debug!(
                machine = %self.name,
                event = %event.id,
                "no trigger rule matched"
            );
        }
        graphs
            .into_iter()
            .map(|graph| self.activate(graph, Arc::clone(&event)))
            .collect()
    }

    /// Start all matching activations and wait for every one of them.
    ///
    /// No approver is attached, so gated goals end up skipped once nothing
    /// can approve them; use [`on_push`](Self::on_push) and keep the
    /// controls when approvals are expected.
    pub async fn deliver(&self, event: Event) -> Result<Vec<ActivationSummary>, EngineError> {
        let activations = self.on_push(event);
        try_join_all(activations.into_iter().map(Activation::wait)).await
    }

    fn activate(&self, graph: Arc<GoalGraph>, event: Arc<Event>) -> Activation {
        let activation_id = Uuid::new_v4();
        let (approval_tx, approval_rx) = mpsc::channel(self.config.approval_channel_capacity);
        let cancel = CancelToken::new();

        let mut executor = ActivationExecutor::new(
            self.config.clone(),
            Arc::clone(&self.sink),
            Arc::clone(&self.store),
        );
        if let Some(tx) = &self.event_tx {
            executor = executor.with_event_channel(tx.clone());
        }

        let graph_name = graph.name().to_string();
        tracing::info!(
            machine = %self.name,
            activation = %activation_id,
            graph = %graph_name,
            "starting activation"
        );
        let controls = ActivationControls {
            approval_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(async move {
            executor
                .run(activation_id, graph, event, approval_rx, cancel)
                .await
        });

        Activation {
            id: activation_id,
            graph_name,
            controls,
            handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GoalState;
    use crate::graph::GraphBuilder;
    use crate::outcome::Outcome;
    use crate::trigger::{any_push, metadata_flag, when_push_satisfies};

    fn push() -> Event {
        Event::push("org/app", "main", "abc123")
    }

    #[tokio::test]
    async fn deliver_runs_matching_graphs() {
        let mut machine = DeliveryMachine::new("ci");
        let build = machine
            .register_goal(GoalDefinition::from_fn("build", |_ctx| async {
                Outcome::success()
            }))
            .unwrap();
        let graph = Arc::new(GraphBuilder::new("build").plan(&build).build().unwrap());
        machine.add_rule(when_push_satisfies(any_push()).set_goals(graph));

        let summaries = machine.deliver(push()).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].all_succeeded());
    }

    #[tokio::test]
    async fn unmatched_push_produces_no_activations() {
        let mut machine = DeliveryMachine::new("ci");
        let build = machine
            .register_goal(GoalDefinition::from_fn("build", |_ctx| async {
                Outcome::success()
            }))
            .unwrap();
        let graph = Arc::new(GraphBuilder::new("build").plan(&build).build().unwrap());
        machine.add_rule(when_push_satisfies(metadata_flag("is_maven")).set_goals(graph));

        assert!(machine.on_push(push()).is_empty());
        assert!(machine.deliver(push()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deliver_without_approver_skips_gated_goals() {
        let mut machine = DeliveryMachine::new("ci");
        let deploy = machine
            .register_goal(
                GoalDefinition::from_fn("prod-deploy", |_ctx| async { Outcome::success() })
                    .with_pre_approval(true),
            )
            .unwrap();
        let graph = Arc::new(GraphBuilder::new("deploy").plan(&deploy).build().unwrap());
        machine.add_rule(when_push_satisfies(any_push()).set_goals(graph));

        let summaries = machine.deliver(push()).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(matches!(
            summaries[0].state_of("prod-deploy"),
            Some(GoalState::Skipped { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_goal_registration_is_rejected() {
        let mut machine = DeliveryMachine::new("ci");
        machine
            .register_goal(GoalDefinition::from_fn("build", |_ctx| async {
                Outcome::success()
            }))
            .unwrap();
        assert!(
            machine
                .register_goal(GoalDefinition::from_fn("build", |_ctx| async {
                    Outcome::success()
                }))
                .is_err()
        );
    }
}
