//! Operation executor
//!
//! Resolves an operation against a schema. Query fields at the same level
//! resolve concurrently, mutation root fields one after another. A null
//! produced at a non-null position propagates to the nearest nullable
//! ancestor, and the error that caused it is recorded exactly once.

use crate::document::{collect_fields, CollectedField, Document, OperationKind, Selection, Variables};
use crate::error::GraphQLError;
use crate::path::ResponsePath;
use crate::response::ExecutionResult;
use crate::schema::{ObjectType, ResolveInfo, ResolverArgs, Schema, TypeRef};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use http::Extensions;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Inputs of one execution
pub struct ExecutionRequest<'a, C> {
    pub schema: &'a Schema<C>,
    pub document: &'a Document,
    pub operation_name: Option<&'a str>,
    pub context: Arc<C>,
    pub variables: &'a Variables,
    pub root_value: Value,
    pub extensions: Arc<Extensions>,
}

pub async fn execute<C>(request: ExecutionRequest<'_, C>) -> ExecutionResult
where
    C: Send + Sync + 'static,
{
    let operation = match request.document.operation(request.operation_name) {
        Ok(operation) => operation,
        Err(error) => return error.into(),
    };

    let root = match operation.kind {
        OperationKind::Query => Some(request.schema.query_type()),
        OperationKind::Mutation => request.schema.mutation_type(),
        OperationKind::Subscription => None,
    };
    let Some(root) = root else {
        return GraphQLError::new(format!(
            "Schema is not configured to execute {:?} operations.",
            operation.kind
        ))
        .with_location(operation.location)
        .into();
    };

    debug!(
        operation = operation.name.as_deref().unwrap_or("<anonymous>"),
        kind = ?operation.kind,
        "Executing operation"
    );

    let executor = Executor {
        schema: request.schema,
        document: request.document,
        context: request.context,
        variables: Arc::new(operation.coerce_variables(request.variables)),
        extensions: request.extensions,
        errors: Mutex::new(Vec::new()),
    };

    let data = executor
        .execute_selection_set(
            root,
            &operation.selection_set,
            request.root_value,
            ResponsePath::root(),
            operation.kind == OperationKind::Mutation,
        )
        .await;

    ExecutionResult {
        data: Some(data.map_or(Value::Null, Value::Object)),
        errors: executor.errors.into_inner(),
    }
}

struct Executor<'a, C> {
    schema: &'a Schema<C>,
    document: &'a Document,
    context: Arc<C>,
    variables: Arc<Variables>,
    extensions: Arc<Extensions>,
    errors: Mutex<Vec<GraphQLError>>,
}

impl<'a, C> Executor<'a, C>
where
    C: Send + Sync + 'static,
{
    fn push_error(&self, error: GraphQLError) {
        self.errors.lock().push(error);
    }

    /// `None` means a non-null field inside turned out null
    fn execute_selection_set<'f>(
        &'f self,
        object: &'f ObjectType<C>,
        selections: &'f [Selection],
        parent: Value,
        path: ResponsePath,
        serial: bool,
    ) -> BoxFuture<'f, Option<Map<String, Value>>> {
        async move {
            let fields = collect_fields(self.document, object.name(), selections, &self.variables);
            let mut data = Map::new();

            if serial {
                for field in &fields {
                    let value = self.resolve_field(object, field, &parent, &path).await?;
                    data.insert(field.response_key.clone(), value);
                }
            } else {
                let values = join_all(
                    fields
                        .iter()
                        .map(|field| self.resolve_field(object, field, &parent, &path)),
                )
                .await;
                for (field, value) in fields.iter().zip(values) {
                    data.insert(field.response_key.clone(), value?);
                }
            }

            Some(data)
        }
        .boxed()
    }

    fn resolve_field<'f>(
        &'f self,
        object: &'f ObjectType<C>,
        collected: &'f CollectedField,
        parent: &'f Value,
        path: &'f ResponsePath,
    ) -> BoxFuture<'f, Option<Value>> {
        async move {
            let field = &collected.field;
            let path = path.key(&collected.response_key);

            if field.name == "__typename" {
                return Some(Value::String(object.name().to_string()));
            }

            let Some(definition) = object.get_field(&field.name) else {
                self.push_error(
                    GraphQLError::new(format!(
                        "Cannot query field \"{}\" on type \"{}\".",
                        field.name,
                        object.name()
                    ))
                    .with_location(field.location)
                    .with_path(path),
                );
                return Some(Value::Null);
            };

            let args = ResolverArgs {
                context: self.context.clone(),
                arguments: field.arguments(&self.variables),
                parent: parent.clone(),
                info: ResolveInfo {
                    parent_type: object.name().to_string(),
                    field_name: field.name.clone(),
                    return_type: definition.ty().clone(),
                    path: path.clone(),
                    field: field.clone(),
                    selection_set: collected.selection_set.clone(),
                    variables: self.variables.clone(),
                    extensions: self.extensions.clone(),
                },
            };

            match (definition.resolver())(args).await {
                Ok(value) => {
                    self.complete_value(object.name(), collected, definition.ty(), value, path)
                        .await
                }
                Err(error) => {
                    debug!(path = %path, error = %error, "Resolver failed");
                    self.push_error(error.into_graphql(field.location, path));
                    if definition.ty().is_non_null() {
                        None
                    } else {
                        Some(Value::Null)
                    }
                }
            }
        }
        .boxed()
    }

    fn complete_value<'f>(
        &'f self,
        parent_type: &'f str,
        collected: &'f CollectedField,
        ty: &'f TypeRef,
        value: Value,
        path: ResponsePath,
    ) -> BoxFuture<'f, Option<Value>> {
        async move {
            match ty {
                TypeRef::NonNull(inner) => {
                    if value.is_null() {
                        self.push_error(
                            GraphQLError::new(format!(
                                "Cannot return null for non-nullable field {}.{}.",
                                parent_type, collected.field.name
                            ))
                            .with_location(collected.field.location)
                            .with_path(path),
                        );
                        return None;
                    }
                    // a nested null was already reported where it happened
                    self.complete_value(parent_type, collected, inner, value, path)
                        .await
                        .filter(|completed| !completed.is_null())
                }
                _ if value.is_null() => Some(Value::Null),
                TypeRef::List(item_type) => {
                    let items = match value {
                        Value::Array(items) => items,
                        single => vec![single],
                    };
                    let completed = join_all(items.into_iter().enumerate().map(|(index, item)| {
                        self.complete_value(parent_type, collected, item_type, item, path.index(index))
                    }))
                    .await;
                    let items: Option<Vec<Value>> = completed.into_iter().collect();
                    Some(items.map_or(Value::Null, Value::Array))
                }
                TypeRef::Named(name) => match self.schema.object_type(name) {
                    Some(object) => {
                        let data = self
                            .execute_selection_set(object, &collected.selection_set, value, path, false)
                            .await;
                        Some(data.map_or(Value::Null, Value::Object))
                    }
                    None => Some(value),
                },
            }
        }
        .boxed()
    }
}
