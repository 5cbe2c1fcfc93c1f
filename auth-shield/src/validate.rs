//! Document validation before execution
//!
//! Walks the selected operation with two explicit stacks, one of pending
//! collected fields and one of (object type, response path) scopes, so the
//! walk needs no shared visitor state. Field collection is the host's own,
//! which makes the set of visited fields the set execution would resolve.

use crate::context::EvaluationContext;
use crate::instrument::rejection;
use crate::rule::{FieldCall, Phase, ShieldRule};
use futures::future::join_all;
use query_pipeline::{
    collect_fields, Arguments, CollectedField, Document, Field, GraphQLError, ObjectType, OperationKind,
    ResponsePath, Schema, Variables,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// One field occurrence reached by the walk
struct Visit<C> {
    parent_type: String,
    field_name: String,
    path: ResponsePath,
    arguments: Arguments,
    node: Arc<Field>,
    rule: ShieldRule<C>,
}

/// Evaluate the rule of every selected field
///
/// Returns one error per blocked field, in pre-order, depth-first selection
/// order. The walk always completes; nothing short-circuits across fields.
/// Unknown operations and fields are left for the host to report.
pub async fn validate<C>(
    schema: &Schema<C>,
    document: &Document,
    operation_name: Option<&str>,
    variables: &Variables,
    eval: &EvaluationContext<C>,
    debug_errors: bool,
) -> Vec<GraphQLError>
where
    C: Send + Sync + 'static,
{
    let visits = walk(schema, document, operation_name, variables, eval);
    debug!(request_id = %eval.request_id(), fields = visits.len(), "Validating document");

    let unresolved = Value::Null;
    let parent = &unresolved;
    let decisions = join_all(visits.iter().map(|visit| async move {
        let call = FieldCall {
            parent_type: &visit.parent_type,
            field_name: &visit.field_name,
            path: &visit.path,
            arguments: &visit.arguments,
            parent,
            node: &visit.node,
            phase: Phase::Validation,
        };
        eval.evaluate(&visit.rule, &call).await
    }))
    .await;

    let errors: Vec<GraphQLError> = visits
        .iter()
        .zip(decisions.iter())
        .filter_map(|(visit, decision)| {
            let (message, extensions) = rejection(decision, debug_errors)?;
            Some(GraphQLError {
                message,
                locations: vec![visit.node.location],
                path: Some(visit.path.clone()),
                extensions: Some(extensions),
            })
        })
        .collect();

    if !errors.is_empty() {
        warn!(
            request_id = %eval.request_id(),
            blocked = errors.len(),
            "Document rejected by field rules"
        );
    }
    errors
}

fn walk<C>(
    schema: &Schema<C>,
    document: &Document,
    operation_name: Option<&str>,
    variables: &Variables,
    eval: &EvaluationContext<C>,
) -> Vec<Visit<C>>
where
    C: Send + Sync + 'static,
{
    let mut visits = Vec::new();
    let Ok(operation) = document.operation(operation_name) else {
        return visits;
    };
    let root = match operation.kind {
        OperationKind::Query => Some(schema.query_type()),
        OperationKind::Mutation => schema.mutation_type(),
        OperationKind::Subscription => None,
    };
    let Some(root) = root else {
        return visits;
    };

    let variables = operation.coerce_variables(variables);
    let mut pending: Vec<std::vec::IntoIter<CollectedField>> =
        vec![collect_fields(document, root.name(), &operation.selection_set, &variables).into_iter()];
    let mut scopes: Vec<(&ObjectType<C>, ResponsePath)> = vec![(root, ResponsePath::root())];

    while let Some(fields) = pending.last_mut() {
        let Some(collected) = fields.next() else {
            pending.pop();
            scopes.pop();
            continue;
        };
        let Some((object, path)) = scopes.last() else {
            break;
        };
        let object = *object;
        let Some(definition) = object.get_field(&collected.field.name) else {
            continue;
        };
        let path = path.key(&collected.response_key);

        if let Some(rule) = eval.rules().rule_for(object.name(), definition.name()) {
            visits.push(Visit {
                parent_type: object.name().to_string(),
                field_name: definition.name().to_string(),
                path: path.clone(),
                arguments: collected.field.arguments(&variables),
                node: collected.field.clone(),
                rule: rule.clone(),
            });
        }

        if let Some(child) = schema.object_type(definition.ty().base_name()) {
            let nested = collect_fields(document, child.name(), &collected.selection_set, &variables);
            pending.push(nested.into_iter());
            scopes.push((child, path));
        }
    }

    visits
}
