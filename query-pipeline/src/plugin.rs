//! Plugin lifecycle hooks
//!
//! A plugin sees three points of the pipeline:
//!
//! - **schema ready**: once per schema build, may hand back a replacement
//! - **parse**: once per request, may wrap the parse function
//! - **execute**: once per request before the executor runs, may end the
//!   request with its own result

use crate::document::{Document, Variables};
use crate::error::PipelineError;
use crate::parser::ParseFn;
use crate::response::ExecutionResult;
use crate::schema::Schema;
use async_trait::async_trait;
use http::Extensions;
use std::sync::Arc;

/// Arguments of the execute hook
pub struct ExecutionArgs<'a, C> {
    pub schema: &'a Arc<Schema<C>>,
    pub document: &'a Document,
    pub operation_name: Option<&'a str>,
    pub context: &'a Arc<C>,
    pub variables: &'a Variables,
    /// Request-scoped state; resolvers see it through `ResolveInfo::extensions`
    pub extensions: &'a mut Extensions,
}

#[async_trait]
pub trait Plugin<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    /// Name used in logs and construction errors
    fn name(&self) -> &'static str;

    /// Called when a schema is built; `Some` replaces it
    fn on_schema_ready(
        &self,
        _schema: &Arc<Schema<C>>,
    ) -> Result<Option<Arc<Schema<C>>>, PipelineError> {
        Ok(None)
    }

    /// Called before each parse with the current parse function
    fn on_parse(&self, parse: ParseFn) -> ParseFn {
        parse
    }

    /// Called before execution; `Some` stops the request with that result
    async fn on_execute(&self, _args: &mut ExecutionArgs<'_, C>) -> Option<ExecutionResult> {
        None
    }
}
