//! Fluent builder producing immutable goal graphs.
//!
//! The builder validates at `build()` time: duplicate goal names, unknown
//! `after` references, and dependency cycles all reject the graph with a
//! [`GraphError`]. A graph that builds is guaranteed acyclic with every
//! predecessor resolving inside the same graph.

use crate::errors::GraphError;
use crate::goal::GoalDefinition;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Index into a graph's node list.
pub type NodeIndex = usize;

/// One node of a goal graph: a goal definition plus its predecessors.
#[derive(Debug, Clone)]
pub struct GoalNode {
    goal: Arc<GoalDefinition>,
    dependencies: Vec<String>,
}

impl GoalNode {
    pub fn goal(&self) -> &Arc<GoalDefinition> {
        &self.goal
    }

    pub fn name(&self) -> &str {
        self.goal.name()
    }

    /// Predecessor goal names, as declared.
    pub fn dependency_names(&self) -> &[String] {
        &self.dependencies
    }
}

/// An immutable, validated DAG of goal nodes.
#[derive(Debug, Clone)]
pub struct GoalGraph {
    name: String,
    nodes: Vec<GoalNode>,
    index_map: HashMap<String, NodeIndex>,
    /// index -> nodes that depend on it
    forward_edges: Vec<Vec<NodeIndex>>,
    /// index -> nodes it depends on
    reverse_edges: Vec<Vec<NodeIndex>>,
}

impl GoalGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: NodeIndex) -> Option<&GoalNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[GoalNode] {
        &self.nodes
    }

    pub fn index_of(&self, goal_name: &str) -> Option<NodeIndex> {
        self.index_map.get(goal_name).copied()
    }

    /// Nodes that depend on the given node (forward edges).
    pub fn dependents(&self, index: NodeIndex) -> &[NodeIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Nodes the given node depends on (reverse edges).
    pub fn dependencies(&self, index: NodeIndex) -> &[NodeIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Nodes with no predecessors (eligible immediately on activation).
    pub fn roots(&self) -> Vec<NodeIndex> {
        self.reverse_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Nodes no other node depends on. `after_graph` chains onto these.
    pub fn sinks(&self) -> Vec<NodeIndex> {
        self.forward_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Goal names in node order.
    pub fn goal_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name().to_string()).collect()
    }
}

struct PlannedNode {
    goal: Arc<GoalDefinition>,
    dependencies: HashSet<String>,
}

/// Fluent builder for [`GoalGraph`].
///
/// `plan` adds a node; `after` declares predecessors of the most recently
/// planned node; `after_graph` merges another graph in and chains the
/// pending node onto that graph's sinks. Errors are deferred to `build()`
/// so plans read as a single chain.
pub struct GraphBuilder {
    name: String,
    nodes: Vec<PlannedNode>,
    index_map: HashMap<String, NodeIndex>,
    /// Node(s) that `after` currently applies to.
    pending: Vec<NodeIndex>,
    errors: Vec<GraphError>,
}

impl GraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
            index_map: HashMap::new(),
            pending: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Add a goal node to the plan.
    pub fn plan(mut self, goal: &Arc<GoalDefinition>) -> Self {
        if self.index_map.contains_key(goal.name()) {
            self.errors.push(GraphError::DuplicateGoal {
                graph: self.name.clone(),
                goal: goal.name().to_string(),
            });
            return self;
        }
        let index = self.nodes.len();
        self.index_map.insert(goal.name().to_string(), index);
        self.nodes.push(PlannedNode {
            goal: Arc::clone(goal),
            dependencies: HashSet::new(),
        });
        self.pending = vec![index];
        self
    }

    /// Declare that the most recently planned node runs after `goal`.
    pub fn after(self, goal: &GoalDefinition) -> Self {
        self.after_named(goal.name())
    }

    /// `after` by goal name; resolution is validated at `build()`.
    pub fn after_named(mut self, goal_name: &str) -> Self {
        if self.pending.is_empty() {
            self.errors.push(GraphError::AfterBeforePlan {
                graph: self.name.clone(),
            });
            return self;
        }
        for &index in &self.pending {
            self.nodes[index].dependencies.insert(goal_name.to_string());
        }
        self
    }

    /// Merge `other`'s nodes and edges into this plan (deduplicated by goal
    /// name) and chain the pending node(s) onto `other`'s sinks.
    ///
    /// This is how independently defined graphs compose: the deploy plan
    /// does `.plan(&staging).after_graph(&docker_goals)` and inherits the
    /// whole docker-build chain.
    pub fn after_graph(mut self, other: &GoalGraph) -> Self {
        if self.pending.is_empty() {
            self.errors.push(GraphError::AfterBeforePlan {
                graph: self.name.clone(),
            });
            return self;
        }

        for node in other.nodes() {
            match self.index_map.get(node.name()) {
                Some(&existing) => {
                    for dep in node.dependency_names() {
                        self.nodes[existing].dependencies.insert(dep.clone());
                    }
                }
                None => {
                    let index = self.nodes.len();
                    self.index_map.insert(node.name().to_string(), index);
                    self.nodes.push(PlannedNode {
                        goal: Arc::clone(node.goal()),
                        dependencies: node.dependency_names().iter().cloned().collect(),
                    });
                }
            }
        }

        let sink_names: Vec<String> = other
            .sinks()
            .into_iter()
            .filter_map(|i| other.node(i).map(|n| n.name().to_string()))
            .collect();
        for &index in &self.pending {
            // A merged node cannot depend on itself via its own sink.
            let own_name = self.nodes[index].goal.name().to_string();
            for sink in &sink_names {
                if *sink != own_name {
                    self.nodes[index].dependencies.insert(sink.clone());
                }
            }
        }
        self
    }

    /// Validate the plan and produce the immutable graph.
    pub fn build(mut self) -> Result<GoalGraph, GraphError> {
        if let Some(err) = self.errors.drain(..).next() {
            return Err(err);
        }
        if self.nodes.is_empty() {
            return Err(GraphError::EmptyGraph { graph: self.name });
        }

        let mut forward_edges: Vec<Vec<NodeIndex>> = vec![Vec::new(); self.nodes.len()];
        let mut reverse_edges: Vec<Vec<NodeIndex>> = vec![Vec::new(); self.nodes.len()];

        for (to, node) in self.nodes.iter().enumerate() {
            let mut deps: Vec<&String> = node.dependencies.iter().collect();
            deps.sort();
            for dep in deps {
                let from = *self.index_map.get(dep).ok_or_else(|| GraphError::UnknownGoal {
                    graph: self.name.clone(),
                    goal: node.goal.name().to_string(),
                    dependency: dep.clone(),
                })?;
                forward_edges[from].push(to);
                reverse_edges[to].push(from);
            }
        }

        let nodes: Vec<GoalNode> = self
            .nodes
            .into_iter()
            .map(|planned| {
                let mut dependencies: Vec<String> = planned.dependencies.into_iter().collect();
                dependencies.sort();
                GoalNode {
                    goal: planned.goal,
                    dependencies,
                }
            })
            .collect();

        let graph = GoalGraph {
            name: self.name,
            nodes,
            index_map: self.index_map,
            forward_edges,
            reverse_edges,
        };

        Self::validate_no_cycles(&graph)?;
        Ok(graph)
    }

    /// Cycle check via Kahn's algorithm; names the goals stuck in the cycle.
    fn validate_no_cycles(graph: &GoalGraph) -> Result<(), GraphError> {
        let mut in_degree: Vec<usize> = graph.reverse_edges.iter().map(|deps| deps.len()).collect();

        let mut queue: Vec<NodeIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;
        while let Some(node) = queue.pop() {
            processed += 1;
            for &dependent in graph.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed != graph.len() {
            let mut goals: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .filter_map(|(i, _)| graph.node(i).map(|n| n.name().to_string()))
                .collect();
            goals.sort();
            return Err(GraphError::Cycle {
                graph: graph.name.clone(),
                goals,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::GoalDefinition;
    use crate::outcome::Outcome;

    fn goal(name: &str) -> Arc<GoalDefinition> {
        Arc::new(GoalDefinition::from_fn(name, |_ctx| async {
            Outcome::success()
        }))
    }

    #[test]
    fn builds_simple_chain() {
        let version = goal("version");
        let build = goal("build");

        let graph = GraphBuilder::new("build")
            .plan(&version)
            .plan(&build)
            .after(&version)
            .build()
            .unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.roots(), vec![0]);
        assert_eq!(graph.sinks(), vec![1]);
        assert_eq!(graph.dependencies(1), &[0]);
        assert_eq!(graph.dependents(0), &[1]);
    }

    #[test]
    fn diamond_has_single_root_and_sink() {
        let a = goal("a");
        let b = goal("b");
        let c = goal("c");
        let d = goal("d");

        let graph = GraphBuilder::new("diamond")
            .plan(&a)
            .plan(&b)
            .after(&a)
            .plan(&c)
            .after(&a)
            .plan(&d)
            .after(&b)
            .after(&c)
            .build()
            .unwrap();

        assert_eq!(graph.roots(), vec![0]);
        assert_eq!(graph.sinks(), vec![3]);
        let d_deps = graph.dependencies(3);
        assert!(d_deps.contains(&1));
        assert!(d_deps.contains(&2));
    }

    #[test]
    fn cycle_is_rejected_with_goal_names() {
        let a = goal("a");
        let b = goal("b");

        let result = GraphBuilder::new("cyclic")
            .plan(&a)
            .after(&b)
            .plan(&b)
            .after(&a)
            .build();

        match result {
            Err(GraphError::Cycle { graph, goals }) => {
                assert_eq!(graph, "cyclic");
                assert_eq!(goals, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let build = goal("build");

        let result = GraphBuilder::new("build")
            .plan(&build)
            .after_named("nonexistent")
            .build();

        match result {
            Err(GraphError::UnknownGoal { goal, dependency, .. }) => {
                assert_eq!(goal, "build");
                assert_eq!(dependency, "nonexistent");
            }
            other => panic!("expected UnknownGoal, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_goal_is_rejected() {
        let build = goal("build");
        let result = GraphBuilder::new("build").plan(&build).plan(&build).build();
        assert!(matches!(result, Err(GraphError::DuplicateGoal { .. })));
    }

    #[test]
    fn after_before_plan_is_rejected() {
        let build = goal("build");
        let result = GraphBuilder::new("broken").after(&build).build();
        assert!(matches!(result, Err(GraphError::AfterBeforePlan { .. })));
    }

    #[test]
    fn empty_plan_is_rejected() {
        let result = GraphBuilder::new("empty").build();
        assert!(matches!(result, Err(GraphError::EmptyGraph { .. })));
    }

    #[test]
    fn after_graph_merges_and_dedupes_nodes() {
        let version = goal("version");
        let build = goal("build");
        let docker = goal("docker-build");

        let build_goals = GraphBuilder::new("build")
            .plan(&version)
            .plan(&build)
            .after(&version)
            .build()
            .unwrap();

        let docker_goals = GraphBuilder::new("docker build")
            .plan(&docker)
            .after_graph(&build_goals)
            .build()
            .unwrap();

        assert_eq!(docker_goals.len(), 3);
        let docker_idx = docker_goals.index_of("docker-build").unwrap();
        let build_idx = docker_goals.index_of("build").unwrap();
        assert_eq!(docker_goals.dependencies(docker_idx), &[build_idx]);

        // Merging the same graph into another plan again dedupes by name.
        let staging = goal("staging-deploy");
        let deploy_goals = GraphBuilder::new("deploy")
            .plan(&staging)
            .after_graph(&docker_goals)
            .build()
            .unwrap();
        assert_eq!(deploy_goals.len(), 4);
        let staging_idx = deploy_goals.index_of("staging-deploy").unwrap();
        assert_eq!(
            deploy_goals.dependencies(staging_idx),
            &[deploy_goals.index_of("docker-build").unwrap()]
        );
    }
}
