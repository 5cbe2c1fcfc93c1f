use crate::context::EvaluationContext;
use crate::decision::Decision;
use async_trait::async_trait;
use query_pipeline::{Arguments, Field, ResponsePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Shared handle to a rule node
pub type ShieldRule<C> = Arc<dyn Rule<C>>;

/// Which enforcement step is asking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Document walk before execution; the parent value is not known yet
    Validation,
    /// Resolver guard during execution
    Execution,
}

/// One field occurrence a rule is asked about
#[derive(Debug, Clone, Copy)]
pub struct FieldCall<'a> {
    pub parent_type: &'a str,
    pub field_name: &'a str,
    /// Response path of the occurrence, alias aware
    pub path: &'a ResponsePath,
    pub arguments: &'a Arguments,
    /// Resolved parent object; `null` during validation
    pub parent: &'a Value,
    /// The field's node in the query document
    pub node: &'a Field,
    pub phase: Phase,
}

/// Authorization rule
///
/// Rules are pure: the returned [`Decision`] is the only observable effect
/// of an evaluation. Structural rules evaluate their children through
/// [`EvaluationContext::evaluate`] so that child results are cached too.
#[async_trait]
pub trait Rule<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    async fn evaluate(&self, eval: &EvaluationContext<C>, call: &FieldCall<'_>) -> Decision;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Direct child rules, in declaration order
    fn children(&self) -> Vec<ShieldRule<C>> {
        Vec::new()
    }

    /// Selection text this rule needs present next to the guarded field
    fn requirement(&self) -> Option<&str> {
        None
    }
}
