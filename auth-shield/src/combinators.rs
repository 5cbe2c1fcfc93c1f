//! Rule-authoring vocabulary
//!
//! Leaf adapters (`allow`, `deny`, `error`, `execution`, `validation`) and
//! structural rules over children (`and`, `or`, `chain`, `race`, `input`).
//!
//! - `and` / `chain`: children in order, the first `Deny` or `Error` wins,
//!   `Allow` when every child allows (also when there are none)
//! - `or`: children in order, the first `Allow` wins, an `Error` is returned
//!   at once, otherwise the first child's deny; no children means deny
//! - `race`: children concurrently; the first settled `Allow` or `Deny` wins
//!   and the rest are dropped, children settling together are ranked by
//!   position, and if every child fails the first failure is returned

use crate::context::EvaluationContext;
use crate::decision::{Decision, IntoDecision, RuleFailure};
use crate::rule::{FieldCall, Rule, ShieldRule};
use async_trait::async_trait;
use futures::future::{poll_fn, BoxFuture};
use futures::FutureExt;
use query_pipeline::Arguments;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::task::Poll;

// =============================================================================
// Constant rules
// =============================================================================

pub struct Allow;

#[async_trait]
impl<C: Send + Sync + 'static> Rule<C> for Allow {
    async fn evaluate(&self, _eval: &EvaluationContext<C>, _call: &FieldCall<'_>) -> Decision {
        Decision::Allow
    }

    fn name(&self) -> &'static str {
        "allow"
    }
}

pub struct Deny {
    reason: String,
}

#[async_trait]
impl<C: Send + Sync + 'static> Rule<C> for Deny {
    async fn evaluate(&self, _eval: &EvaluationContext<C>, _call: &FieldCall<'_>) -> Decision {
        Decision::deny(self.reason.clone())
    }

    fn name(&self) -> &'static str {
        "deny"
    }
}

pub struct Fail {
    cause: RuleFailure,
}

#[async_trait]
impl<C: Send + Sync + 'static> Rule<C> for Fail {
    async fn evaluate(&self, _eval: &EvaluationContext<C>, _call: &FieldCall<'_>) -> Decision {
        Decision::Error {
            cause: self.cause.clone(),
        }
    }

    fn name(&self) -> &'static str {
        "error"
    }
}

pub fn allow<C: Send + Sync + 'static>() -> ShieldRule<C> {
    Arc::new(Allow)
}

pub fn deny<C: Send + Sync + 'static>(reason: impl Into<String>) -> ShieldRule<C> {
    Arc::new(Deny {
        reason: reason.into(),
    })
}

/// Always fails; marks slots that should never be reached
pub fn error<C: Send + Sync + 'static>(cause: impl Into<anyhow::Error>) -> ShieldRule<C> {
    Arc::new(Fail {
        cause: RuleFailure::new(cause),
    })
}

// =============================================================================
// Sequential combinators
// =============================================================================

async fn all_allow<C>(rules: &[ShieldRule<C>], eval: &EvaluationContext<C>, call: &FieldCall<'_>) -> Decision
where
    C: Send + Sync + 'static,
{
    for rule in rules {
        match eval.evaluate(rule, call).await {
            Decision::Allow => continue,
            blocked => return blocked,
        }
    }
    Decision::Allow
}

pub struct And<C> {
    rules: Vec<ShieldRule<C>>,
}

#[async_trait]
impl<C: Send + Sync + 'static> Rule<C> for And<C> {
    async fn evaluate(&self, eval: &EvaluationContext<C>, call: &FieldCall<'_>) -> Decision {
        all_allow(&self.rules, eval, call).await
    }

    fn name(&self) -> &'static str {
        "and"
    }

    fn children(&self) -> Vec<ShieldRule<C>> {
        self.rules.clone()
    }
}

/// Like [`And`]; later rules may rely on earlier ones having allowed
pub struct Chain<C> {
    rules: Vec<ShieldRule<C>>,
}

#[async_trait]
impl<C: Send + Sync + 'static> Rule<C> for Chain<C> {
    async fn evaluate(&self, eval: &EvaluationContext<C>, call: &FieldCall<'_>) -> Decision {
        all_allow(&self.rules, eval, call).await
    }

    fn name(&self) -> &'static str {
        "chain"
    }

    fn children(&self) -> Vec<ShieldRule<C>> {
        self.rules.clone()
    }
}

pub struct Or<C> {
    rules: Vec<ShieldRule<C>>,
}

#[async_trait]
impl<C: Send + Sync + 'static> Rule<C> for Or<C> {
    async fn evaluate(&self, eval: &EvaluationContext<C>, call: &FieldCall<'_>) -> Decision {
        let mut first_deny = None;
        for rule in &self.rules {
            match eval.evaluate(rule, call).await {
                Decision::Allow => return Decision::Allow,
                denied @ Decision::Deny { .. } => {
                    first_deny.get_or_insert(denied);
                }
                failed @ Decision::Error { .. } => return failed,
            }
        }
        first_deny.unwrap_or_else(Decision::denied)
    }

    fn name(&self) -> &'static str {
        "or"
    }

    fn children(&self) -> Vec<ShieldRule<C>> {
        self.rules.clone()
    }
}

pub fn and<C: Send + Sync + 'static>(rules: Vec<ShieldRule<C>>) -> ShieldRule<C> {
    Arc::new(And { rules })
}

pub fn chain<C: Send + Sync + 'static>(rules: Vec<ShieldRule<C>>) -> ShieldRule<C> {
    Arc::new(Chain { rules })
}

pub fn or<C: Send + Sync + 'static>(rules: Vec<ShieldRule<C>>) -> ShieldRule<C> {
    Arc::new(Or { rules })
}

// =============================================================================
// Race
// =============================================================================

pub struct Race<C> {
    rules: Vec<ShieldRule<C>>,
}

#[async_trait]
impl<C: Send + Sync + 'static> Rule<C> for Race<C> {
    async fn evaluate(&self, eval: &EvaluationContext<C>, call: &FieldCall<'_>) -> Decision {
        if self.rules.is_empty() {
            return Decision::denied();
        }

        let mut pending: Vec<Option<BoxFuture<'_, Decision>>> = self
            .rules
            .iter()
            .map(|rule| Some(eval.evaluate(rule, call).boxed()))
            .collect();
        let mut failures: Vec<Option<Decision>> = vec![None; pending.len()];

        // Polling in declaration order on every wake ranks children that
        // settle together by position. Dropping `pending` cancels the losers.
        poll_fn(|cx| {
            for (slot, failure) in pending.iter_mut().zip(failures.iter_mut()) {
                let Some(future) = slot else {
                    continue;
                };
                if let Poll::Ready(decision) = future.as_mut().poll(cx) {
                    *slot = None;
                    if decision.is_error() {
                        *failure = Some(decision);
                    } else {
                        return Poll::Ready(decision);
                    }
                }
            }

            if pending.iter().all(Option::is_none) {
                let first = failures.iter_mut().find_map(Option::take);
                return Poll::Ready(first.unwrap_or_else(Decision::denied));
            }
            Poll::Pending
        })
        .await
    }

    fn name(&self) -> &'static str {
        "race"
    }

    fn children(&self) -> Vec<ShieldRule<C>> {
        self.rules.clone()
    }
}

pub fn race<C: Send + Sync + 'static>(rules: Vec<ShieldRule<C>>) -> ShieldRule<C> {
    Arc::new(Race { rules })
}

// =============================================================================
// Input requirements
// =============================================================================

/// Declares a selection the wrapped rule needs next to the guarded field
pub struct Input<C> {
    selection: String,
    rule: ShieldRule<C>,
}

#[async_trait]
impl<C: Send + Sync + 'static> Rule<C> for Input<C> {
    async fn evaluate(&self, eval: &EvaluationContext<C>, call: &FieldCall<'_>) -> Decision {
        eval.evaluate(&self.rule, call).await
    }

    fn name(&self) -> &'static str {
        "input"
    }

    fn children(&self) -> Vec<ShieldRule<C>> {
        vec![self.rule.clone()]
    }

    fn requirement(&self) -> Option<&str> {
        Some(&self.selection)
    }
}

/// `selection` is selection-set text such as `"{ id owner { id } }"`,
/// read against the guarded field's parent type
pub fn input<C: Send + Sync + 'static>(selection: impl Into<String>, rule: ShieldRule<C>) -> ShieldRule<C> {
    Arc::new(Input {
        selection: selection.into(),
        rule,
    })
}

// =============================================================================
// Predicate adapters
// =============================================================================

type ExecutionFn<C> = Box<dyn Fn(&C, &Arguments, &Value) -> Decision + Send + Sync>;
type AsyncExecutionFn<C> = Box<dyn Fn(Arc<C>, Arguments, Value) -> BoxFuture<'static, Decision> + Send + Sync>;
type ValidationFn<C> = Box<dyn Fn(&C, &FieldCall<'_>) -> Decision + Send + Sync>;

pub struct Execution<C> {
    predicate: ExecutionFn<C>,
}

#[async_trait]
impl<C: Send + Sync + 'static> Rule<C> for Execution<C> {
    async fn evaluate(&self, eval: &EvaluationContext<C>, call: &FieldCall<'_>) -> Decision {
        (self.predicate)(eval.context().as_ref(), call.arguments, call.parent)
    }

    fn name(&self) -> &'static str {
        "execution"
    }
}

pub struct AsyncExecution<C> {
    predicate: AsyncExecutionFn<C>,
}

#[async_trait]
impl<C: Send + Sync + 'static> Rule<C> for AsyncExecution<C> {
    async fn evaluate(&self, eval: &EvaluationContext<C>, call: &FieldCall<'_>) -> Decision {
        (self.predicate)(eval.context().clone(), call.arguments.clone(), call.parent.clone()).await
    }

    fn name(&self) -> &'static str {
        "execution"
    }
}

pub struct Validation<C> {
    predicate: ValidationFn<C>,
}

#[async_trait]
impl<C: Send + Sync + 'static> Rule<C> for Validation<C> {
    async fn evaluate(&self, eval: &EvaluationContext<C>, call: &FieldCall<'_>) -> Decision {
        (self.predicate)(eval.context().as_ref(), call)
    }

    fn name(&self) -> &'static str {
        "validation"
    }
}

/// Predicate over (context, arguments, parent value)
///
/// During validation the parent is `null` and the arguments are the ones
/// written in the document.
pub fn execution<C, F, R>(predicate: F) -> ShieldRule<C>
where
    C: Send + Sync + 'static,
    F: Fn(&C, &Arguments, &Value) -> R + Send + Sync + 'static,
    R: IntoDecision,
{
    Arc::new(Execution {
        predicate: Box::new(move |context: &C, arguments: &Arguments, parent: &Value| {
            predicate(context, arguments, parent).into_decision()
        }),
    })
}

/// [`execution`] for predicates that need to await something
pub fn execution_async<C, F, Fut, R>(predicate: F) -> ShieldRule<C>
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Arguments, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoDecision + Send + 'static,
{
    Arc::new(AsyncExecution {
        predicate: Box::new(move |context: Arc<C>, arguments: Arguments, parent: Value| {
            let pending = predicate(context, arguments, parent);
            async move { pending.await.into_decision() }.boxed()
        }),
    })
}

/// Predicate over the field's document node
pub fn validation<C, F, R>(predicate: F) -> ShieldRule<C>
where
    C: Send + Sync + 'static,
    F: Fn(&C, &FieldCall<'_>) -> R + Send + Sync + 'static,
    R: IntoDecision,
{
    Arc::new(Validation {
        predicate: Box::new(move |context: &C, call: &FieldCall<'_>| {
            predicate(context, call).into_decision()
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DEFAULT_DENY_MESSAGE;
    use crate::rule::Phase;
    use crate::rule_map::{RuleMap, RuleSpec};
    use anyhow::anyhow;
    use query_pipeline::{parse_document, FieldDefinition, ObjectType, ResponsePath, Schema, Selection, TypeRef};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Caller {
        user: Option<String>,
    }

    fn schema() -> Schema<Caller> {
        Schema::builder()
            .query(ObjectType::new("Query").field(FieldDefinition::new("secret", TypeRef::named("String"))))
            .build()
            .unwrap()
    }

    /// Evaluate `rule` for `{ secret(id: 7) }` with `rule` bound to the field
    async fn run(rule: ShieldRule<Caller>, user: Option<&str>) -> Decision {
        let spec = RuleSpec::new().field("Query", "secret", rule.clone());
        let rules = Arc::new(RuleMap::build(&spec, &schema()).unwrap());
        let eval = EvaluationContext::new(
            Arc::new(Caller {
                user: user.map(str::to_string),
            }),
            rules,
        );

        let document = parse_document("{ secret(id: 7) }").unwrap();
        let Some(Selection::Field(node)) = document.operations[0].selection_set.first().cloned() else {
            panic!("expected a field");
        };
        let path = ResponsePath::root().key("secret");
        let mut arguments = Arguments::new();
        arguments.insert("id".into(), json!(7));
        let parent = json!({});
        let call = FieldCall {
            parent_type: "Query",
            field_name: "secret",
            path: &path,
            arguments: &arguments,
            parent: &parent,
            node: &node,
            phase: Phase::Execution,
        };
        eval.evaluate(&rule, &call).await
    }

    #[tokio::test]
    async fn test_and_short_circuits() {
        assert_eq!(run(and(vec![]), None).await, Decision::Allow);
        assert_eq!(run(and(vec![allow(), deny("x")]), None).await, Decision::deny("x"));
        assert_eq!(
            run(and(vec![deny("first"), deny("second")]), None).await,
            Decision::deny("first")
        );

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let tail = execution(move |_: &Caller, _: &Arguments, _: &Value| {
            counted.fetch_add(1, Ordering::SeqCst);
            true
        });
        let decision = run(and(vec![error(anyhow!("broken")), tail]), None).await;
        assert!(decision.is_error());
        assert_eq!(calls.load(Ordering::SeqCst), 0, "later children must not run");
    }

    #[tokio::test]
    async fn test_or_semantics() {
        assert_eq!(run(or(vec![]), None).await, Decision::deny(DEFAULT_DENY_MESSAGE));
        assert_eq!(run(or(vec![deny("x"), allow()]), None).await, Decision::Allow);
        assert_eq!(
            run(or(vec![deny("first"), deny("second")]), None).await,
            Decision::deny("first")
        );
        assert!(run(or(vec![error(anyhow!("broken")), allow()]), None).await.is_error());
        assert!(run(or(vec![deny("x"), error(anyhow!("broken")), allow()]), None)
            .await
            .is_error());
    }

    #[tokio::test]
    async fn test_or_stops_at_allow_before_a_failing_child() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let failing = execution(move |_: &Caller, _: &Arguments, _: &Value| {
            counted.fetch_add(1, Ordering::SeqCst);
            Err::<bool, _>(anyhow!("roles unavailable"))
        });

        assert_eq!(run(or(vec![allow(), failing]), None).await, Decision::Allow);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chain_matches_and() {
        assert_eq!(run(chain(vec![]), None).await, Decision::Allow);
        assert_eq!(run(chain(vec![allow(), deny("x")]), None).await, Decision::deny("x"));
    }

    #[tokio::test]
    async fn test_race_first_settled_non_error_wins() {
        let slow_allow = execution_async(|_: Arc<Caller>, _: Arguments, _: Value| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            true
        });
        let fast_deny = execution_async(|_: Arc<Caller>, _: Arguments, _: Value| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Decision::deny("fast")
        });
        assert_eq!(run(race(vec![slow_allow, fast_deny]), None).await, Decision::deny("fast"));

        // settled together: declaration order decides
        assert_eq!(run(race(vec![deny("a"), allow()]), None).await, Decision::deny("a"));
        assert_eq!(
            run(race(vec![error(anyhow!("broken")), allow()]), None).await,
            Decision::Allow
        );
    }

    #[tokio::test]
    async fn test_race_all_errors_and_empty() {
        let decision = run(race(vec![error(anyhow!("first")), error(anyhow!("second"))]), None).await;
        assert_eq!(decision, Decision::error(anyhow!("first")));
        assert_eq!(run(race(vec![]), None).await, Decision::deny(DEFAULT_DENY_MESSAGE));
    }

    #[tokio::test]
    async fn test_predicates_see_context_and_arguments() {
        let signed_in = execution(|caller: &Caller, _: &Arguments, _: &Value| caller.user.is_some());
        assert_eq!(run(signed_in.clone(), Some("ada")).await, Decision::Allow);
        assert_eq!(run(signed_in, None).await, Decision::deny(DEFAULT_DENY_MESSAGE));

        let lucky = execution(|_: &Caller, arguments: &Arguments, _: &Value| {
            arguments.get("id") == Some(&json!(7))
        });
        assert_eq!(run(lucky, None).await, Decision::Allow);

        let failing = execution(|_: &Caller, _: &Arguments, _: &Value| -> anyhow::Result<bool> {
            Err(anyhow!("lookup failed"))
        });
        assert_eq!(run(failing, None).await, Decision::error(anyhow!("lookup failed")));

        let by_node = validation(|_: &Caller, call: &FieldCall<'_>| call.node.arguments.len() == 1);
        assert_eq!(run(by_node, None).await, Decision::Allow);
    }

    #[tokio::test]
    async fn test_input_delegates() {
        let rule = input("{ id }", deny("inner"));
        assert_eq!(rule.requirement(), Some("{ id }"));
        assert_eq!(rule.children().len(), 1);
        assert_eq!(run(rule, None).await, Decision::deny("inner"));
    }
}
