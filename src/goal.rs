//! Goal definitions and the action contract.
//!
//! A [`GoalDefinition`] is the static description of one unit of delivery
//! work (version, build, docker build, deploy): a unique name, an async
//! [`GoalAction`], and [`GoalOptions`] controlling isolation, retry, and
//! pre-approval. Definitions are immutable and shared behind `Arc`s; the
//! engine never mutates them.

use crate::outcome::Outcome;
use crate::sink::ActionContext;
use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The executable unit behind a goal.
///
/// Actions are supplied by build/deploy integrations; the engine only ever
/// calls `run` and reads the returned [`Outcome`]. Implementations must be
/// cancellation-aware: they receive a cancel token through the context and
/// should return early (any outcome) once it fires.
#[async_trait]
pub trait GoalAction: Send + Sync {
    async fn run(&self, ctx: &ActionContext) -> Outcome;
}

struct FnAction<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> GoalAction for FnAction<F>
where
    F: Fn(ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send,
{
    async fn run(&self, ctx: &ActionContext) -> Outcome {
        (self.f)(ctx.clone()).await
    }
}

/// Wrap an async closure as a [`GoalAction`].
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn GoalAction>
where
    F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    Arc::new(FnAction { f })
}

/// Declared execution options for a goal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalOptions {
    /// Serialize this goal against other isolated goals of the same
    /// activation (shared build caches, exclusive tooling).
    #[serde(default)]
    pub isolate: bool,
    /// Re-attempt transient failures up to the engine's max-attempts bound.
    #[serde(default)]
    pub retry: bool,
    /// Hold the goal in `WaitingApproval` until an external sign-off.
    #[serde(default)]
    pub pre_approval: bool,
}

/// Static description of one goal kind.
#[derive(Clone)]
pub struct GoalDefinition {
    name: String,
    options: GoalOptions,
    action: Arc<dyn GoalAction>,
}

impl GoalDefinition {
    /// Create a goal with default options.
    pub fn new(name: &str, action: Arc<dyn GoalAction>) -> Self {
        Self {
            name: name.to_string(),
            options: GoalOptions::default(),
            action,
        }
    }

    /// Create a goal from an async closure.
    pub fn from_fn<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self::new(name, action_fn(f))
    }

    pub fn with_isolate(mut self, isolate: bool) -> Self {
        self.options.isolate = isolate;
        self
    }

    pub fn with_retry(mut self, retry: bool) -> Self {
        self.options.retry = retry;
        self
    }

    pub fn with_pre_approval(mut self, pre_approval: bool) -> Self {
        self.options.pre_approval = pre_approval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> GoalOptions {
        self.options
    }

    pub fn action(&self) -> Arc<dyn GoalAction> {
        Arc::clone(&self.action)
    }
}

impl fmt::Debug for GoalDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoalDefinition")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Catalog of goal definitions, registered once at startup.
#[derive(Debug, Default)]
pub struct GoalRegistry {
    goals: HashMap<String, Arc<GoalDefinition>>,
}

impl GoalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Names are unique across the registry.
    pub fn register(&mut self, goal: GoalDefinition) -> Result<Arc<GoalDefinition>> {
        if self.goals.contains_key(goal.name()) {
            bail!("goal '{}' is already registered", goal.name());
        }
        let goal = Arc::new(goal);
        self.goals.insert(goal.name().to_string(), Arc::clone(&goal));
        Ok(goal)
    }

    pub fn get(&self, name: &str) -> Option<Arc<GoalDefinition>> {
        self.goals.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }
}
