//! Per-instance state tracking for goal activations.
//!
//! Each goal node of an activated graph gets one [`GoalInstance`] whose
//! [`GoalState`] the orchestration engine drives through the lifecycle
//! `Planned → WaitingApproval? → Ready → Running → {Succeeded, Failed,
//! Skipped}`. The [`ActivationSummary`] aggregates terminal states for one
//! activation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Lifecycle state of one goal instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GoalState {
    /// Created on activation; predecessors not yet satisfied.
    Planned,
    /// Eligible, but gated on an external approval signal.
    WaitingApproval,
    /// All predecessors succeeded; queued for dispatch.
    Ready,
    /// Action dispatched to a worker. `attempt` increments on retry
    /// (self-loop). An isolated goal may still be queued on the
    /// activation's isolation slot while in this state.
    Running { attempt: u32 },
    /// Action reported success.
    Succeeded,
    /// Action failed permanently or exhausted its retry budget.
    Failed { reason: String },
    /// Never executed: predecessor failure, rejection, abandonment, or the
    /// action itself declined to run.
    Skipped { reason: String },
}

impl GoalState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed { .. } | Self::Skipped { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// State name for logs and transition records.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::WaitingApproval => "waiting_approval",
            Self::Ready => "ready",
            Self::Running { .. } => "running",
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// One execution of a goal node for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalInstance {
    pub id: Uuid,
    /// Goal name, unique within the graph.
    pub goal: String,
    pub state: GoalState,
    /// Attempts consumed so far (0 until first dispatch).
    pub attempts: u32,
    /// Artifact reported by a successful action, for downstream consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl GoalInstance {
    pub fn new(goal: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal: goal.to_string(),
            state: GoalState::Planned,
            attempts: 0,
            artifact: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Reason attached to a terminal `Failed`/`Skipped` state, if any.
    pub fn reason(&self) -> Option<&str> {
        match &self.state {
            GoalState::Failed { reason } | GoalState::Skipped { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Terminal report for one goal instance, kept in the activation summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalReport {
    pub instance_id: Uuid,
    pub goal: String,
    pub state: GoalState,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&GoalInstance> for GoalReport {
    fn from(instance: &GoalInstance) -> Self {
        Self {
            instance_id: instance.id,
            goal: instance.goal.clone(),
            state: instance.state.clone(),
            attempts: instance.attempts,
            artifact: instance.artifact.clone(),
            started_at: instance.started_at,
            finished_at: instance.finished_at,
        }
    }
}

/// Aggregated result of one activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationSummary {
    pub activation_id: Uuid,
    pub graph: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub goals: HashMap<String, GoalReport>,
}

impl ActivationSummary {
    pub fn new(activation_id: Uuid, graph: &str, total: usize) -> Self {
        Self {
            activation_id,
            graph: graph.to_string(),
            total,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            duration: Duration::ZERO,
            goals: HashMap::new(),
        }
    }

    pub fn record(&mut self, report: GoalReport) {
        match report.state {
            GoalState::Succeeded => self.succeeded += 1,
            GoalState::Failed { .. } => self.failed += 1,
            GoalState::Skipped { .. } => self.skipped += 1,
            _ => {}
        }
        self.goals.insert(report.goal.clone(), report);
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && self.succeeded == self.total
    }

    pub fn state_of(&self, goal: &str) -> Option<&GoalState> {
        self.goals.get(goal).map(|r| &r.state)
    }
}

/// Tracks execution timing.
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Serde helpers serializing `Duration` as milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
