//! Typed error hierarchy for the goalflow engine.
//!
//! Two top-level enums cover the two failure domains:
//! - `GraphError` — plan construction failures (fatal, reject the graph)
//! - `EngineError` — activation-level failures of the orchestration loop
//!
//! Action failures are *not* errors at this level: they are tagged
//! [`Outcome`](crate::outcome::Outcome) values scoped to one goal instance.

use thiserror::Error;

/// Errors raised while building a [`GoalGraph`](crate::graph::GoalGraph).
///
/// All variants are fatal for the graph under construction; a plan that
/// fails validation is never activated.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("dependency cycle in graph '{graph}', involving goals {goals:?}")]
    Cycle { graph: String, goals: Vec<String> },

    #[error("goal '{goal}' in graph '{graph}' depends on unknown goal '{dependency}'")]
    UnknownGoal {
        graph: String,
        goal: String,
        dependency: String,
    },

    #[error("duplicate goal '{goal}' in graph '{graph}'")]
    DuplicateGoal { graph: String, goal: String },

    #[error("after() called before any goal was planned in graph '{graph}'")]
    AfterBeforePlan { graph: String },

    #[error("graph '{graph}' contains no goals")]
    EmptyGraph { graph: String },
}

/// Errors from the orchestration engine itself.
///
/// These describe infrastructure failures of an activation, not action
/// outcomes: a goal whose action fails ends up `Failed`/`Skipped` in the
/// activation summary without surfacing here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("activation task for graph '{graph}' panicked or was aborted")]
    ActivationLost { graph: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_names_graph_and_goals() {
        let err = GraphError::Cycle {
            graph: "deploy".to_string(),
            goals: vec!["build".to_string(), "version".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("deploy"));
        assert!(msg.contains("build"));
        assert!(msg.contains("version"));
    }

    #[test]
    fn unknown_goal_error_carries_dependency() {
        let err = GraphError::UnknownGoal {
            graph: "build".to_string(),
            goal: "package".to_string(),
            dependency: "compile".to_string(),
        };
        match &err {
            GraphError::UnknownGoal { dependency, .. } => assert_eq!(dependency, "compile"),
            _ => panic!("expected UnknownGoal"),
        }
        assert!(err.to_string().contains("compile"));
    }

    #[test]
    fn engine_error_converts_from_anyhow() {
        let inner = anyhow::anyhow!("store unavailable");
        let err: EngineError = inner.into();
        assert!(matches!(err, EngineError::Other(_)));
        assert!(err.to_string().contains("store unavailable"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        let graph_err = GraphError::EmptyGraph {
            graph: "x".to_string(),
        };
        assert_std_error(&graph_err);
        let engine_err = EngineError::ActivationLost {
            graph: "deploy".to_string(),
        };
        assert_std_error(&engine_err);
    }
}
