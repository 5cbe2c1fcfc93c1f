use crate::context::EvaluationContext;
use crate::decision::Decision;
use crate::error::{FORBIDDEN, RULE_ERROR};
use crate::rule::{FieldCall, Phase};
use crate::rule_map::RuleMap;
use futures::FutureExt;
use query_pipeline::{FieldDefinition, FieldError, ObjectType, Resolver, ResolverArgs, Schema};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Instrumentation tag carried by schemas this crate has guarded
pub const INSTRUMENTATION_TAG: &str = "shield";

/// Message and extensions describing a blocking decision
pub(crate) fn rejection(decision: &Decision, debug: bool) -> Option<(String, Map<String, Value>)> {
    let mut extensions = Map::new();
    let message = match decision {
        Decision::Allow => return None,
        Decision::Deny { reason } => {
            extensions.insert("code".into(), Value::String(FORBIDDEN.into()));
            reason.clone()
        }
        Decision::Error { cause } => {
            extensions.insert("code".into(), Value::String(RULE_ERROR.into()));
            if debug {
                let chain = cause.chain().into_iter().map(Value::String).collect();
                extensions.insert("cause".into(), Value::Array(chain));
            }
            cause.to_string()
        }
    };
    Some((message, extensions))
}

/// Guard every resolver of `schema` with its rule
///
/// A schema that already carries [`INSTRUMENTATION_TAG`] comes back as the
/// same `Arc`, so firing the schema hook again never wraps twice.
pub fn instrument<C>(schema: &Arc<Schema<C>>, rules: Arc<RuleMap<C>>, debug_errors: bool) -> Arc<Schema<C>>
where
    C: Send + Sync + 'static,
{
    if schema.is_instrumented_by(INSTRUMENTATION_TAG) {
        debug!("Schema already instrumented");
        return schema.clone();
    }

    let instrumented = schema.instrument(INSTRUMENTATION_TAG, |object, field| {
        guard(&rules, object, field, debug_errors)
    });
    info!(
        types = instrumented.object_types().count(),
        "Schema instrumented with field rules"
    );
    Arc::new(instrumented)
}

fn guard<C>(
    rules: &Arc<RuleMap<C>>,
    object: &ObjectType<C>,
    field: &FieldDefinition<C>,
    debug_errors: bool,
) -> Resolver<C>
where
    C: Send + Sync + 'static,
{
    let original = field.resolver().clone();
    let Some(rule) = rules.rule_for(object.name(), field.name()).cloned() else {
        return original;
    };
    let rules = rules.clone();

    Arc::new(move |args: ResolverArgs<C>| {
        let original = original.clone();
        let rule = rule.clone();
        let rules = rules.clone();
        async move {
            // resolvers outside a shielded request still get a private context
            let eval = args
                .info
                .extensions
                .get::<EvaluationContext<C>>()
                .cloned()
                .unwrap_or_else(|| EvaluationContext::new(args.context.clone(), rules));

            let decision = {
                let call = FieldCall {
                    parent_type: &args.info.parent_type,
                    field_name: &args.info.field_name,
                    path: &args.info.path,
                    arguments: &args.arguments,
                    parent: &args.parent,
                    node: &args.info.field,
                    phase: Phase::Execution,
                };
                eval.evaluate(&rule, &call).await
            };

            match rejection(&decision, debug_errors) {
                None => original(args).await,
                Some((message, extensions)) => Err(FieldError {
                    message,
                    extensions: Some(extensions),
                }),
            }
        }
        .boxed()
    })
}
