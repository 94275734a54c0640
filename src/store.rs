//! State-transition and log recording.
//!
//! The engine emits one [`TransitionRecord`] per state change and streams
//! action log lines through [`StateStore::append_log`]. The persistence
//! backend is pluggable; [`InMemoryStore`] is the built-in implementation
//! used by tests and embedders that only need in-process queries.

use crate::engine::GoalState;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// One state change of one goal instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub activation_id: Uuid,
    pub instance_id: Uuid,
    pub goal: String,
    pub from: GoalState,
    pub to: GoalState,
    pub at: DateTime<Utc>,
}

/// Sink for state transitions and execution logs.
///
/// Implementations must tolerate concurrent calls: the engine records
/// transitions from activation loops while sinks stream log lines from
/// worker tasks.
pub trait StateStore: Send + Sync {
    fn record_transition(&self, record: TransitionRecord) -> Result<()>;
    fn append_log(&self, instance_id: Uuid, line: &str) -> Result<()>;
}

#[derive(Default)]
struct StoreInner {
    transitions: Vec<TransitionRecord>,
    logs: HashMap<Uuid, Vec<String>>,
}

/// In-process store keeping everything in memory.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All transitions in record order.
    pub fn transitions(&self) -> Vec<TransitionRecord> {
        self.inner
            .lock()
            .map(|inner| inner.transitions.clone())
            .unwrap_or_default()
    }

    /// Transitions of one instance, in record order.
    pub fn transitions_for(&self, instance_id: Uuid) -> Vec<TransitionRecord> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .transitions
                    .iter()
                    .filter(|r| r.instance_id == instance_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn logs_for(&self, instance_id: Uuid) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.logs.get(&instance_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl StateStore for InMemoryStore {
    fn record_transition(&self, record: TransitionRecord) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        inner.transitions.push(record);
        Ok(())
    }

    fn append_log(&self, instance_id: Uuid, line: &str) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        inner
            .logs
            .entry(instance_id)
            .or_default()
            .push(line.to_string());
        Ok(())
    }
}
