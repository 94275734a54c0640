//! goalflow: a goal-graph delivery orchestrator.
//!
//! Declarative goal plans (DAGs of named goals with `after` edges) are
//! paired with push tests; every matching rule activates its graph for the
//! incoming event. The engine runs independent goals concurrently,
//! serializes isolated ones, retries transient failures, holds gated goals
//! for external approval, and skips downstream work when a predecessor
//! fails.
//!
//! ```
//! use goalflow::goal::GoalDefinition;
//! use goalflow::graph::GraphBuilder;
//! use goalflow::machine::DeliveryMachine;
//! use goalflow::outcome::Outcome;
//! use goalflow::trigger::{any_push, when_push_satisfies};
//! use goalflow::Event;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let mut machine = DeliveryMachine::new("ci");
//! let version = machine.register_goal(GoalDefinition::from_fn("version", |_ctx| async {
//!     Outcome::success()
//! }))?;
//! let build = machine.register_goal(
//!     GoalDefinition::from_fn("build", |ctx| async move {
//!         ctx.log.line("compiling");
//!         Outcome::success()
//!     })
//!     .with_retry(true),
//! )?;
//!
//! let graph = Arc::new(
//!     GraphBuilder::new("build")
//!         .plan(&version)
//!         .plan(&build)
//!         .after(&version)
//!         .build()?,
//! );
//! machine.add_rule(when_push_satisfies(any_push()).set_goals(graph));
//!
//! let summaries = machine
//!     .deliver(Event::push("org/app", "main", "abc123"))
//!     .await?;
//! assert!(summaries[0].all_succeeded());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod event;
pub mod goal;
pub mod graph;
pub mod machine;
pub mod outcome;
pub mod sink;
pub mod store;
pub mod trigger;

pub use config::EngineConfig;
pub use engine::{ActivationSummary, GoalEvent, GoalState};
pub use errors::{EngineError, GraphError};
pub use event::Event;
pub use goal::{GoalDefinition, GoalOptions};
pub use graph::{GoalGraph, GraphBuilder};
pub use machine::{Activation, ActivationControls, DeliveryMachine};
pub use outcome::Outcome;
pub use sink::{ActionContext, ExecutionSink, LocalSink};
pub use store::{InMemoryStore, StateStore};
