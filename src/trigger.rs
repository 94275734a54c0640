//! Push tests and trigger rules.
//!
//! A [`PushTest`] is a pure predicate over an [`Event`]; rules pair a test
//! with the goal graph to activate when it matches. Every matching rule
//! fires independently, so one push can start several activations.
//!
//! ```
//! use goalflow::trigger::{all_satisfied, metadata_flag, when_push_satisfies};
//! # use goalflow::goal::GoalDefinition;
//! # use goalflow::graph::GraphBuilder;
//! # use goalflow::outcome::Outcome;
//! # use std::sync::Arc;
//! # let build = Arc::new(GoalDefinition::from_fn("build", |_| async { Outcome::success() }));
//! # let graph = Arc::new(GraphBuilder::new("build").plan(&build).build().unwrap());
//! let rule = when_push_satisfies(all_satisfied(vec![
//!     metadata_flag("is_maven"),
//!     metadata_flag("has_dockerfile"),
//! ]))
//! .set_goals(graph);
//! ```

use crate::event::Event;
use crate::graph::GoalGraph;
use std::sync::Arc;

/// Predicate over a push event.
///
/// Tests must be pure: same event, same answer. The engine may evaluate
/// them in any order and never caches results across events.
pub trait PushTest: Send + Sync {
    fn name(&self) -> &str;
    fn test(&self, event: &Event) -> bool;
}

struct FnTest<F> {
    name: String,
    f: F,
}

impl<F> PushTest for FnTest<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn test(&self, event: &Event) -> bool {
        (self.f)(event)
    }
}

/// Wrap a closure as a named [`PushTest`].
pub fn predicate<F>(name: &str, f: F) -> Arc<dyn PushTest>
where
    F: Fn(&Event) -> bool + Send + Sync + 'static,
{
    Arc::new(FnTest {
        name: name.to_string(),
        f,
    })
}

struct AllSatisfied {
    name: String,
    tests: Vec<Arc<dyn PushTest>>,
}

impl PushTest for AllSatisfied {
    fn name(&self) -> &str {
        &self.name
    }

    fn test(&self, event: &Event) -> bool {
        self.tests.iter().all(|t| t.test(event))
    }
}

/// Conjunction: matches when every inner test matches.
pub fn all_satisfied(tests: Vec<Arc<dyn PushTest>>) -> Arc<dyn PushTest> {
    let name = format!(
        "all({})",
        tests
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Arc::new(AllSatisfied { name, tests })
}

struct NotTest {
    name: String,
    inner: Arc<dyn PushTest>,
}

impl PushTest for NotTest {
    fn name(&self) -> &str {
        &self.name
    }

    fn test(&self, event: &Event) -> bool {
        !self.inner.test(event)
    }
}

/// Negation of a push test.
pub fn not(inner: Arc<dyn PushTest>) -> Arc<dyn PushTest> {
    let name = format!("not({})", inner.name());
    Arc::new(NotTest { name, inner })
}

/// Matches when the event carries `key: true` in its metadata.
pub fn metadata_flag(key: &str) -> Arc<dyn PushTest> {
    let key = key.to_string();
    let name = key.clone();
    Arc::new(FnTest {
        name,
        f: move |event: &Event| event.metadata_flag(&key),
    })
}

/// Matches pushes to one branch.
pub fn branch_is(branch: &str) -> Arc<dyn PushTest> {
    let branch = branch.to_string();
    Arc::new(FnTest {
        name: format!("branch is '{branch}'"),
        f: move |event: &Event| event.branch == branch,
    })
}

/// Matches pushes to one repository.
pub fn repository_is(repository: &str) -> Arc<dyn PushTest> {
    let repository = repository.to_string();
    Arc::new(FnTest {
        name: format!("repository is '{repository}'"),
        f: move |event: &Event| event.repository == repository,
    })
}

/// Matches every push.
pub fn any_push() -> Arc<dyn PushTest> {
    predicate("any push", |_| true)
}

/// One trigger rule: a push test plus the graph it activates.
#[derive(Clone)]
pub struct TriggerRule {
    test: Arc<dyn PushTest>,
    graph: Arc<GoalGraph>,
}

impl TriggerRule {
    pub fn new(test: Arc<dyn PushTest>, graph: Arc<GoalGraph>) -> Self {
        Self { test, graph }
    }

    pub fn test(&self) -> &Arc<dyn PushTest> {
        &self.test
    }

    pub fn graph(&self) -> &Arc<GoalGraph> {
        &self.graph
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.test.test(event)
    }
}

/// Builder returned by [`when_push_satisfies`].
pub struct RuleBuilder {
    test: Arc<dyn PushTest>,
}

impl RuleBuilder {
    /// Attach the goal graph this rule activates.
    pub fn set_goals(self, graph: Arc<GoalGraph>) -> TriggerRule {
        TriggerRule::new(self.test, graph)
    }
}

/// Start a trigger rule from a push test.
pub fn when_push_satisfies(test: Arc<dyn PushTest>) -> RuleBuilder {
    RuleBuilder { test }
}

/// Evaluate every rule against an event; all matches fire.
pub fn evaluate(event: &Event, rules: &[TriggerRule]) -> Vec<Arc<GoalGraph>> {
    rules
        .iter()
        .filter(|rule| {
            let matched = rule.matches(event);
            tracing::debug!(
                test = rule.test().name(),
                graph = rule.graph().name(),
                matched,
                "push test evaluated"
            );
            matched
        })
        .map(|rule| Arc::clone(rule.graph()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::GoalDefinition;
    use crate::graph::GraphBuilder;
    use crate::outcome::Outcome;

    fn graph(name: &str) -> Arc<GoalGraph> {
        let goal = Arc::new(GoalDefinition::from_fn(name, |_ctx| async {
            Outcome::success()
        }));
        Arc::new(GraphBuilder::new(name).plan(&goal).build().unwrap())
    }

    fn maven_push() -> Event {
        Event::push("org/app", "main", "abc123").with_metadata("is_maven", true)
    }

    #[test]
    fn metadata_flag_requires_boolean_true() {
        let test = metadata_flag("is_maven");
        assert!(test.test(&maven_push()));
        assert!(!test.test(&Event::push("org/app", "main", "abc123")));
        assert!(!test.test(
            &Event::push("org/app", "main", "abc123").with_metadata("is_maven", "yes")
        ));
    }

    #[test]
    fn all_satisfied_is_conjunction() {
        let both = all_satisfied(vec![metadata_flag("is_maven"), branch_is("main")]);
        assert!(both.test(&maven_push()));
        assert!(!both.test(
            &Event::push("org/app", "feature/x", "abc123").with_metadata("is_maven", true)
        ));
        assert_eq!(both.name(), "all(is_maven, branch is 'main')");
    }

    #[test]
    fn not_negates() {
        let test = not(branch_is("main"));
        assert!(!test.test(&maven_push()));
        assert!(test.test(&Event::push("org/app", "feature/x", "abc123")));
        assert_eq!(test.name(), "not(branch is 'main')");
    }

    #[test]
    fn all_matching_rules_fire() {
        let rules = vec![
            when_push_satisfies(metadata_flag("is_maven")).set_goals(graph("build")),
            when_push_satisfies(metadata_flag("has_dockerfile")).set_goals(graph("docker")),
            when_push_satisfies(any_push()).set_goals(graph("version")),
        ];

        let event = maven_push().with_metadata("has_dockerfile", true);
        let graphs = evaluate(&event, &rules);
        let names: Vec<&str> = graphs.iter().map(|g| g.name()).collect();
        assert_eq!(names, vec!["build", "docker", "version"]);
    }

    #[test]
    fn no_match_yields_no_activations() {
        let rules =
            vec![when_push_satisfies(metadata_flag("is_maven")).set_goals(graph("build"))];
        let graphs = evaluate(&Event::push("org/app", "main", "abc123"), &rules);
        assert!(graphs.is_empty());
    }

    #[test]
    fn repository_test_matches_exactly() {
        let test = repository_is("org/app");
        assert!(test.test(&maven_push()));
        assert!(!test.test(&Event::push("org/other", "main", "abc123")));
    }
}
