//! Goal dependency graphs.
//!
//! A [`GoalGraph`] is an immutable directed acyclic graph of goal nodes,
//! produced by the fluent [`GraphBuilder`]. The builder mirrors declarative
//! plan wiring:
//!
//! ```
//! use goalflow::goal::GoalDefinition;
//! use goalflow::graph::GraphBuilder;
//! use goalflow::outcome::Outcome;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), goalflow::errors::GraphError> {
//! let version = Arc::new(GoalDefinition::from_fn("version", |_| async {
//!     Outcome::success()
//! }));
//! let build = Arc::new(
//!     GoalDefinition::from_fn("build", |_| async { Outcome::success() })
//!         .with_isolate(true),
//! );
//!
//! let build_goals = GraphBuilder::new("build")
//!     .plan(&version)
//!     .plan(&build)
//!     .after(&version)
//!     .build()?;
//!
//! assert_eq!(build_goals.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! Independently defined graphs compose through
//! [`GraphBuilder::after_graph`], which is how build → docker-build → deploy
//! chains are assembled from separate plans.

mod builder;

pub use builder::{GoalGraph, GoalNode, GraphBuilder, NodeIndex};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::GoalDefinition;
    use crate::outcome::Outcome;
    use std::sync::Arc;

    fn goal(name: &str) -> Arc<GoalDefinition> {
        Arc::new(GoalDefinition::from_fn(name, |_ctx| async {
            Outcome::success()
        }))
    }

    #[test]
    fn composed_graphs_chain_through_sinks() {
        let version = goal("version");
        let build = goal("build");
        let docker_build = goal("docker-build");
        let staging = goal("staging-deploy");
        let prod = goal("prod-deploy");

        let build_goals = GraphBuilder::new("build")
            .plan(&version)
            .plan(&build)
            .after(&version)
            .build()
            .unwrap();

        let docker_goals = GraphBuilder::new("docker build")
            .plan(&docker_build)
            .after_graph(&build_goals)
            .build()
            .unwrap();

        let deploy_goals = GraphBuilder::new("deploy")
            .plan(&staging)
            .after_graph(&docker_goals)
            .plan(&prod)
            .after(&staging)
            .build()
            .unwrap();

        // The deploy graph contains the whole chain.
        assert_eq!(deploy_goals.len(), 5);

        let staging_idx = deploy_goals.index_of("staging-deploy").unwrap();
        let docker_idx = deploy_goals.index_of("docker-build").unwrap();
        let prod_idx = deploy_goals.index_of("prod-deploy").unwrap();

        assert_eq!(deploy_goals.dependencies(staging_idx), &[docker_idx]);
        assert_eq!(deploy_goals.dependencies(prod_idx), &[staging_idx]);
        assert_eq!(deploy_goals.sinks(), vec![prod_idx]);
    }
}
