//! Property tests for the rule algebra and rule map defaults

use auth_shield::*;
use futures::executor::block_on;
use proptest::prelude::*;
use query_pipeline::{Arguments, Field, FieldDefinition, Location, ObjectType, ResponsePath, Schema, TypeRef};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const FIELDS: [&str; 6] = ["f0", "f1", "f2", "f3", "f4", "f5"];

/// Reference model of a rule tree
#[derive(Debug, Clone)]
enum Tree {
    Allow,
    Deny(u8),
    Error(u8),
    And(Vec<Tree>),
    Or(Vec<Tree>),
    Chain(Vec<Tree>),
    Race(Vec<Tree>),
}

fn tree() -> impl Strategy<Value = Tree> {
    let leaf = prop_oneof![
        Just(Tree::Allow),
        (0u8..3).prop_map(Tree::Deny),
        (0u8..3).prop_map(Tree::Error),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Tree::And),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Tree::Or),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Tree::Chain),
            prop::collection::vec(inner, 0..4).prop_map(Tree::Race),
        ]
    })
}

fn build(tree: &Tree) -> ShieldRule<()> {
    let children = |trees: &[Tree]| trees.iter().map(build).collect::<Vec<_>>();
    match tree {
        Tree::Allow => allow(),
        Tree::Deny(n) => deny(format!("deny-{}", n)),
        Tree::Error(n) => error(anyhow::anyhow!("error-{}", n)),
        Tree::And(trees) => and(children(trees)),
        Tree::Or(trees) => or(children(trees)),
        Tree::Chain(trees) => chain(children(trees)),
        Tree::Race(trees) => race(children(trees)),
    }
}

/// What the algebra promises; every child here settles immediately, so a
/// race is decided by declaration order
fn expected(tree: &Tree) -> Decision {
    match tree {
        Tree::Allow => Decision::Allow,
        Tree::Deny(n) => Decision::deny(format!("deny-{}", n)),
        Tree::Error(n) => Decision::error(anyhow::anyhow!("error-{}", n)),
        Tree::And(trees) | Tree::Chain(trees) => trees
            .iter()
            .map(expected)
            .find(|decision| !decision.is_allow())
            .unwrap_or(Decision::Allow),
        Tree::Or(trees) => {
            let mut first_deny = None;
            for decision in trees.iter().map(expected) {
                match decision {
                    Decision::Allow => return Decision::Allow,
                    Decision::Deny { .. } => {
                        first_deny.get_or_insert(decision);
                    }
                    Decision::Error { .. } => return decision,
                }
            }
            first_deny.unwrap_or_else(Decision::denied)
        }
        Tree::Race(trees) => {
            let decisions: Vec<Decision> = trees.iter().map(expected).collect();
            decisions
                .iter()
                .find(|decision| !decision.is_error())
                .or_else(|| decisions.first())
                .cloned()
                .unwrap_or_else(Decision::denied)
        }
    }
}

fn schema() -> Schema<()> {
    let query = FIELDS.iter().fold(ObjectType::new("Query"), |object, name| {
        object.field(FieldDefinition::new(*name, TypeRef::named("String")))
    });
    Schema::builder().query(query).build().unwrap()
}

fn context(spec: RuleSpec<()>) -> EvaluationContext<()> {
    let rules = RuleMap::build(&spec, &schema()).unwrap();
    EvaluationContext::new(Arc::new(()), Arc::new(rules))
}

fn evaluate(eval: &EvaluationContext<()>, field: &str) -> Decision {
    let rule = eval.rules().rule_for("Query", field).cloned().unwrap();
    let node = Field {
        alias: None,
        name: field.to_string(),
        arguments: Vec::new(),
        directives: Vec::new(),
        selection_set: Vec::new(),
        location: Location { line: 1, column: 1 },
    };
    let path = ResponsePath::root().key(field);
    let call = FieldCall {
        parent_type: "Query",
        field_name: field,
        path: &path,
        arguments: &Map::new(),
        parent: &Value::Null,
        node: &node,
        phase: Phase::Validation,
    };
    block_on(eval.evaluate(&rule, &call))
}

proptest! {
    #[test]
    fn prop_combinators_match_reference(tree in tree()) {
        let eval = context(RuleSpec::new().field("Query", "f0", build(&tree)));
        prop_assert_eq!(evaluate(&eval, "f0"), expected(&tree));
    }

    #[test]
    fn prop_unbound_fields_allow(bound in prop::collection::vec(any::<bool>(), FIELDS.len())) {
        let spec = FIELDS
            .iter()
            .zip(&bound)
            .filter(|(_, bound)| **bound)
            .fold(RuleSpec::new(), |spec, (name, _)| spec.field("Query", *name, deny("bound")));
        let eval = context(spec);

        for (name, bound) in FIELDS.iter().zip(&bound) {
            let decision = evaluate(&eval, name);
            if *bound {
                prop_assert_eq!(decision, Decision::deny("bound"));
            } else {
                prop_assert_eq!(decision, Decision::Allow);
            }
        }
    }

    #[test]
    fn prop_repeated_evaluation_is_stable(tree in tree()) {
        let eval = context(RuleSpec::new().field("Query", "f1", build(&tree)));
        let first = evaluate(&eval, "f1");
        let settled = eval.cache().len();
        prop_assert!(settled >= 1);

        // second lookup is served from the cache
        prop_assert_eq!(evaluate(&eval, "f1"), first);
        prop_assert_eq!(eval.cache().len(), settled);
    }

    #[test]
    fn prop_cached_rule_runs_once(repeats in 1usize..6) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let counting = execution(move |_: &(), _: &Arguments, _: &Value| {
            counted.fetch_add(1, Ordering::SeqCst);
            true
        });
        let eval = context(RuleSpec::new().field("Query", "f2", counting));

        for _ in 0..repeats {
            prop_assert_eq!(evaluate(&eval, "f2"), Decision::Allow);
        }
        prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
