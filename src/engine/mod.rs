//! Activation engine.
//!
//! An *activation* is one goal graph instantiated for one event. The
//! engine drives each activation through the per-goal state machine
//! (`Planned → WaitingApproval? → Ready → Running → terminal`), running
//! independent goals concurrently, serializing isolated ones, retrying
//! transient failures, and skipping downstream work when a predecessor
//! fails. Execution itself is delegated to an
//! [`ExecutionSink`](crate::sink::ExecutionSink).

mod executor;
mod scheduler;
mod state;

pub use executor::{ActivationExecutor, ApprovalSignal, GoalEvent};
pub use state::{ActivationSummary, ExecutionTimer, GoalInstance, GoalReport, GoalState};
