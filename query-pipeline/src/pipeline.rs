//! Request pipeline
//!
//! Owns the (possibly plugin-replaced) schema and drives each request
//! through parse → plugin execute hooks → executor.

use crate::document::Variables;
use crate::error::Result;
use crate::executor::{execute, ExecutionRequest};
use crate::parser::{default_parse_fn, ParseFn};
use crate::plugin::{ExecutionArgs, Plugin};
use crate::response::ExecutionResult;
use crate::schema::Schema;
use http::Extensions;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// One incoming request
pub struct Request<C> {
    pub query: String,
    pub operation_name: Option<String>,
    pub variables: Variables,
    pub context: Arc<C>,
    pub root_value: Value,
}

impl<C> Request<C> {
    pub fn new(query: impl Into<String>, context: C) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: Variables::new(),
            context: Arc::new(context),
            root_value: Value::Object(Default::default()),
        }
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }
}

pub struct PipelineBuilder<C> {
    schema: Schema<C>,
    plugins: Vec<Arc<dyn Plugin<C>>>,
    parse: ParseFn,
}

impl<C> PipelineBuilder<C>
where
    C: Send + Sync + 'static,
{
    pub fn plugin(mut self, plugin: impl Plugin<C> + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn shared_plugin(mut self, plugin: Arc<dyn Plugin<C>>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Replace the native parse function
    pub fn parse_fn(mut self, parse: ParseFn) -> Self {
        self.parse = parse;
        self
    }

    /// Fire the schema-ready hooks and assemble the pipeline
    pub fn build(self) -> Result<Pipeline<C>> {
        let mut schema = Arc::new(self.schema);
        for plugin in &self.plugins {
            if let Some(replacement) = plugin.on_schema_ready(&schema)? {
                info!(plugin = plugin.name(), "Plugin replaced schema");
                schema = replacement;
            }
        }

        Ok(Pipeline {
            schema,
            plugins: self.plugins,
            parse: self.parse,
        })
    }
}

pub struct Pipeline<C> {
    schema: Arc<Schema<C>>,
    plugins: Vec<Arc<dyn Plugin<C>>>,
    parse: ParseFn,
}

impl<C> Pipeline<C>
where
    C: Send + Sync + 'static,
{
    pub fn builder(schema: Schema<C>) -> PipelineBuilder<C> {
        PipelineBuilder {
            schema,
            plugins: Vec::new(),
            parse: default_parse_fn(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema<C>> {
        &self.schema
    }

    /// Swap in a rebuilt schema, running the schema-ready hooks again
    pub fn replace_schema(&mut self, schema: Arc<Schema<C>>) -> Result<()> {
        let mut schema = schema;
        for plugin in &self.plugins {
            if let Some(replacement) = plugin.on_schema_ready(&schema)? {
                schema = replacement;
            }
        }
        self.schema = schema;
        Ok(())
    }

    pub async fn execute(&self, request: Request<C>) -> ExecutionResult {
        let parse = self
            .plugins
            .iter()
            .fold(self.parse.clone(), |parse, plugin| plugin.on_parse(parse));

        let document = match parse(&request.query) {
            Ok(document) => document,
            Err(error) => {
                debug!(error = %error, "Parse failed");
                return error.into();
            }
        };

        let mut extensions = Extensions::new();
        {
            let mut args = ExecutionArgs {
                schema: &self.schema,
                document: &document,
                operation_name: request.operation_name.as_deref(),
                context: &request.context,
                variables: &request.variables,
                extensions: &mut extensions,
            };
            for plugin in &self.plugins {
                if let Some(result) = plugin.on_execute(&mut args).await {
                    debug!(plugin = plugin.name(), "Plugin stopped execution");
                    return result;
                }
            }
        }

        execute(ExecutionRequest {
            schema: &self.schema,
            document: &document,
            operation_name: request.operation_name.as_deref(),
            context: request.context.clone(),
            variables: &request.variables,
            root_value: request.root_value,
            extensions: Arc::new(extensions),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphQLError;
    use crate::schema::{FieldDefinition, ObjectType, TypeRef};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn schema() -> Schema<()> {
        Schema::builder()
            .query(
                ObjectType::new("Query").field(
                    FieldDefinition::new("ping", TypeRef::named("String"))
                        .resolve(|_| async { Ok(json!("pong")) }),
                ),
            )
            .build()
            .unwrap()
    }

    #[derive(Default)]
    struct Gate {
        parses: AtomicUsize,
        closed: bool,
    }

    #[async_trait]
    impl Plugin<()> for Gate {
        fn name(&self) -> &'static str {
            "gate"
        }

        fn on_parse(&self, parse: ParseFn) -> ParseFn {
            self.parses.fetch_add(1, Ordering::SeqCst);
            parse
        }

        async fn on_execute(&self, _args: &mut ExecutionArgs<'_, ()>) -> Option<ExecutionResult> {
            self.closed
                .then(|| ExecutionResult::from_errors(vec![GraphQLError::new("closed")]))
        }
    }

    #[tokio::test]
    async fn test_execute_round_trip() {
        let pipeline = Pipeline::builder(schema()).build().unwrap();
        let result = pipeline.execute(Request::new("{ ping }", ())).await;
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"data": {"ping": "pong"}, "errors": []})
        );
    }

    #[tokio::test]
    async fn test_parse_errors_return_without_data() {
        let pipeline = Pipeline::builder(schema()).build().unwrap();
        let result = pipeline.execute(Request::new("{ ping", ())).await;
        assert!(result.data.is_none());
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_plugin_can_stop_execution() {
        let gate = Arc::new(Gate {
            closed: true,
            ..Default::default()
        });
        let pipeline = Pipeline::builder(schema())
            .shared_plugin(gate.clone())
            .build()
            .unwrap();
        let result = pipeline.execute(Request::new("{ ping }", ())).await;
        assert!(result.data.is_none());
        assert_eq!(result.errors[0].message, "closed");
        assert_eq!(gate.parses.load(Ordering::SeqCst), 1);
    }
}
