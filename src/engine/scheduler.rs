//! Per-activation scheduling state.
//!
//! The [`ActivationScheduler`] is the single writer of instance state for
//! one activation: it computes eligibility, applies transitions, propagates
//! skips downstream, and tracks approvals. It is owned by the activation
//! loop in the executor; worker tasks never touch
//! it directly, which keeps retry bookkeeping and readiness checks free of
//! races.

use crate::engine::executor::GoalEvent;
use crate::engine::state::{ActivationSummary, GoalInstance, GoalReport, GoalState};
use crate::graph::{GoalGraph, NodeIndex};
use crate::outcome::Outcome;
use crate::store::{StateStore, TransitionRecord};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct ActivationScheduler {
    activation_id: Uuid,
    graph: Arc<GoalGraph>,
    instances: Vec<GoalInstance>,
    /// Nodes approved before they became eligible.
    approved: HashSet<NodeIndex>,
    store: Arc<dyn StateStore>,
    /// Lifecycle events produced by transitions, drained by the executor.
    events: Vec<GoalEvent>,
}

impl ActivationScheduler {
    pub fn new(activation_id: Uuid, graph: Arc<GoalGraph>, store: Arc<dyn StateStore>) -> Self {
        let instances = graph
            .nodes()
            .iter()
            .map(|node| GoalInstance::new(node.name()))
            .collect();
        Self {
            activation_id,
            graph,
            instances,
            approved: HashSet::new(),
            store,
            events: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Arc<GoalGraph> {
        &self.graph
    }

    pub fn instances(&self) -> &[GoalInstance] {
        &self.instances
    }

    pub fn instance(&self, index: NodeIndex) -> &GoalInstance {
        &self.instances[index]
    }

    fn index_of_instance(&self, instance_id: Uuid) -> Option<NodeIndex> {
        self.instances.iter().position(|i| i.id == instance_id)
    }

    /// Apply a state transition, recording it and emitting the matching
    /// lifecycle event. All mutations of instance state funnel through here.
    fn transition(&mut self, index: NodeIndex, to: GoalState) {
        let from = self.instances[index].state.clone();
        let instance_id = self.instances[index].id;
        let goal = self.instances[index].goal.clone();

        if to.is_running() && !from.is_running() {
            self.instances[index].started_at = Some(Utc::now());
        }
        if to.is_terminal() {
            self.instances[index].finished_at = Some(Utc::now());
        }
        self.instances[index].state = to.clone();

        tracing::debug!(
            activation = %self.activation_id,
            goal = %goal,
            from = from.label(),
            to = to.label(),
            "goal transition"
        );

        if let Err(err) = self.store.record_transition(TransitionRecord {
            activation_id: self.activation_id,
            instance_id,
            goal: goal.clone(),
            from: from.clone(),
            to: to.clone(),
            at: Utc::now(),
        }) {
            tracing::warn!(goal = %goal, error = %err, "failed to record transition");
        }

        match &to {
            GoalState::WaitingApproval => self.events.push(GoalEvent::AwaitingApproval {
                instance_id,
                goal,
            }),
            GoalState::Running { attempt } if from.is_running() => {
                self.events.push(GoalEvent::GoalRetrying {
                    instance_id,
                    goal,
                    attempt: *attempt,
                });
            }
            GoalState::Running { attempt } => self.events.push(GoalEvent::GoalStarted {
                instance_id,
                goal,
                attempt: *attempt,
            }),
            state if state.is_terminal() => self.events.push(GoalEvent::GoalCompleted {
                instance_id,
                goal,
                state: to.clone(),
            }),
            _ => {}
        }
    }

    /// Move every eligible `Planned` instance forward: to `Skipped` when a
    /// predecessor already failed or was skipped, to `WaitingApproval` when
    /// gated, otherwise to `Ready`.
    pub fn promote(&mut self) {
        for index in 0..self.instances.len() {
            if self.instances[index].state != GoalState::Planned {
                continue;
            }

            let mut all_succeeded = true;
            let mut blocking: Option<NodeIndex> = None;
            for &dep in self.graph.dependencies(index) {
                match &self.instances[dep].state {
                    GoalState::Succeeded => {}
                    GoalState::Failed { .. } | GoalState::Skipped { .. } => {
                        blocking = Some(dep);
                        all_succeeded = false;
                        break;
                    }
                    _ => {
                        all_succeeded = false;
                        break;
                    }
                }
            }

            if let Some(dep) = blocking {
                let reason = format!(
                    "predecessor '{}' {}",
                    self.instances[dep].goal,
                    self.instances[dep].state.label()
                );
                self.transition(index, GoalState::Skipped { reason });
                continue;
            }
            if !all_succeeded {
                continue;
            }

            let gated = self
                .graph
                .node(index)
                .map(|n| n.goal().options().pre_approval)
                .unwrap_or(false);
            if gated && !self.approved.contains(&index) {
                self.transition(index, GoalState::WaitingApproval);
            } else {
                self.transition(index, GoalState::Ready);
            }
        }
    }

    /// Indices currently in `Ready`.
    pub fn ready(&self) -> Vec<NodeIndex> {
        self.instances
            .iter()
            .enumerate()
            .filter(|(_, i)| i.state == GoalState::Ready)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn mark_running(&mut self, index: NodeIndex) {
        self.instances[index].attempts = 1;
        self.transition(index, GoalState::Running { attempt: 1 });
    }

    /// `Running → Running` self-loop on retry.
    pub fn mark_retry(&mut self, index: NodeIndex, attempt: u32) {
        self.instances[index].attempts = attempt;
        self.transition(index, GoalState::Running { attempt });
    }

    /// Record a worker outcome. Ignored when the instance is already
    /// terminal (an abandoned activation may see late results).
    pub fn record_outcome(&mut self, index: NodeIndex, outcome: &Outcome, attempts: u32) {
        if self.instances[index].state.is_terminal() {
            return;
        }
        self.instances[index].attempts = attempts;
        match outcome {
            Outcome::Success { artifact } => {
                self.instances[index].artifact = artifact.clone();
                self.transition(index, GoalState::Succeeded);
            }
            Outcome::Failure { message, .. } => {
                self.transition(
                    index,
                    GoalState::Failed {
                        reason: message.clone(),
                    },
                );
                self.skip_dependents(index);
            }
            Outcome::Skipped { reason } => {
                self.transition(
                    index,
                    GoalState::Skipped {
                        reason: reason.clone(),
                    },
                );
                self.skip_dependents(index);
            }
        }
    }

    /// Transitively skip everything downstream of a failed/skipped node.
    fn skip_dependents(&mut self, index: NodeIndex) {
        let reason = format!(
            "predecessor '{}' {}",
            self.instances[index].goal,
            self.instances[index].state.label()
        );
        let dependents: Vec<NodeIndex> = self.graph.dependents(index).to_vec();
        for dep in dependents {
            if !self.instances[dep].state.is_terminal() {
                self.transition(
                    dep,
                    GoalState::Skipped {
                        reason: reason.clone(),
                    },
                );
                self.skip_dependents(dep);
            }
        }
    }

    /// External approval signal. Returns false when the instance id is
    /// unknown or past the point where approval means anything.
    pub fn approve(&mut self, instance_id: Uuid) -> bool {
        let Some(index) = self.index_of_instance(instance_id) else {
            return false;
        };
        match self.instances[index].state {
            GoalState::WaitingApproval => {
                self.transition(index, GoalState::Ready);
                true
            }
            // Approval ahead of eligibility is remembered, but only for
            // goals that actually carry a gate.
            GoalState::Planned => {
                let gated = self
                    .graph
                    .node(index)
                    .map(|n| n.goal().options().pre_approval)
                    .unwrap_or(false);
                gated && self.approved.insert(index)
            }
            _ => false,
        }
    }

    /// External rejection: the gated instance is skipped and its
    /// dependents with it.
    pub fn reject(&mut self, instance_id: Uuid) -> bool {
        let Some(index) = self.index_of_instance(instance_id) else {
            return false;
        };
        match self.instances[index].state {
            GoalState::WaitingApproval | GoalState::Planned => {
                self.transition(
                    index,
                    GoalState::Skipped {
                        reason: "approval rejected".to_string(),
                    },
                );
                self.skip_dependents(index);
                true
            }
            _ => false,
        }
    }

    /// Skip all instances still waiting for approval.
    pub fn skip_waiting(&mut self, reason: &str) {
        for index in 0..self.instances.len() {
            if self.instances[index].state == GoalState::WaitingApproval {
                self.transition(
                    index,
                    GoalState::Skipped {
                        reason: reason.to_string(),
                    },
                );
                self.skip_dependents(index);
            }
        }
    }

    /// Abandon the activation: every non-terminal instance becomes
    /// `Skipped`. In-flight actions are cancelled cooperatively by the
    /// executor; their late results are ignored.
    pub fn abandon(&mut self, reason: &str) {
        for index in 0..self.instances.len() {
            if !self.instances[index].state.is_terminal() {
                self.transition(
                    index,
                    GoalState::Skipped {
                        reason: reason.to_string(),
                    },
                );
            }
        }
    }

    pub fn all_terminal(&self) -> bool {
        self.instances.iter().all(|i| i.state.is_terminal())
    }

    pub fn waiting_approval_count(&self) -> usize {
        self.instances
            .iter()
            .filter(|i| i.state == GoalState::WaitingApproval)
            .count()
    }

    pub fn take_events(&mut self) -> Vec<GoalEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn summary(&self, duration: Duration) -> ActivationSummary {
        let mut summary =
            ActivationSummary::new(self.activation_id, self.graph.name(), self.instances.len());
        for instance in &self.instances {
            summary.record(GoalReport::from(instance));
        }
        summary.duration = duration;
        summary
    }
}
