use crate::augment::wrap_parse;
use crate::context::EvaluationContext;
use crate::instrument::{instrument, INSTRUMENTATION_TAG};
use crate::options::ShieldOptions;
use crate::rule_map::{RuleMap, RuleSpec};
use crate::validate::validate;
use async_trait::async_trait;
use parking_lot::RwLock;
use query_pipeline::{ExecutionArgs, ExecutionResult, ParseFn, PipelineError, Plugin, Schema};
use std::sync::Arc;
use tracing::{debug, info};

/// Plugin name reported to the host
pub const PLUGIN_NAME: &str = "shield";

/// Rule map and guarded schema of the current schema build
struct ShieldState<C> {
    schema: Arc<Schema<C>>,
    rules: Arc<RuleMap<C>>,
}

impl<C> Clone for ShieldState<C> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            rules: self.rules.clone(),
        }
    }
}

/// Field authorization plugin for a [`query_pipeline::Pipeline`]
pub struct Shield<C> {
    spec: RuleSpec<C>,
    options: ShieldOptions,
    state: RwLock<Option<ShieldState<C>>>,
}

/// Configure field authorization for a pipeline
///
/// The rule spec is checked against the schema when the pipeline is built;
/// unknown types or fields fail the build.
pub fn use_shield<C>(spec: RuleSpec<C>, options: ShieldOptions) -> Shield<C>
where
    C: Send + Sync + 'static,
{
    Shield {
        spec,
        options,
        state: RwLock::new(None),
    }
}

impl<C> Shield<C>
where
    C: Send + Sync + 'static,
{
    pub fn options(&self) -> &ShieldOptions {
        &self.options
    }

    /// Rule map of the current schema, once one was built
    pub fn rules(&self) -> Option<Arc<RuleMap<C>>> {
        self.state.read().as_ref().map(|state| state.rules.clone())
    }

    fn state(&self) -> Option<ShieldState<C>> {
        self.state.read().clone()
    }
}

#[async_trait]
impl<C> Plugin<C> for Shield<C>
where
    C: Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn on_schema_ready(&self, schema: &Arc<Schema<C>>) -> Result<Option<Arc<Schema<C>>>, PipelineError> {
        let mut state = self.state.write();
        if schema.is_instrumented_by(INSTRUMENTATION_TAG) && state.is_some() {
            debug!("Schema already carries field rules");
            return Ok(None);
        }

        let rules = RuleMap::build(&self.spec, schema).map_err(|error| PipelineError::Plugin {
            plugin: PLUGIN_NAME,
            source: error.into(),
        })?;
        let rules = Arc::new(rules);
        let instrumented = instrument(schema, rules.clone(), self.options.debug);
        *state = Some(ShieldState {
            schema: instrumented.clone(),
            rules,
        });

        if Arc::ptr_eq(schema, &instrumented) {
            return Ok(None);
        }
        info!(debug = self.options.debug, "Field rules applied to schema");
        Ok(Some(instrumented))
    }

    fn on_parse(&self, parse: ParseFn) -> ParseFn {
        match self.state() {
            Some(state) if state.rules.has_requirements() => wrap_parse(parse, state.schema, state.rules),
            _ => parse,
        }
    }

    async fn on_execute(&self, args: &mut ExecutionArgs<'_, C>) -> Option<ExecutionResult> {
        let state = self.state()?;
        let eval = EvaluationContext::new(args.context.clone(), state.rules);
        args.extensions.insert(eval.clone());

        let errors = validate(
            args.schema,
            args.document,
            args.operation_name,
            args.variables,
            &eval,
            self.options.debug,
        )
        .await;

        if errors.is_empty() {
            None
        } else {
            Some(ExecutionResult::from_errors(errors))
        }
    }
}
