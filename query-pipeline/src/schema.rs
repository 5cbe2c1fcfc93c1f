//! Schema type system
//!
//! Object types with resolver-backed fields, named scalars and the usual
//! list / non-null wrappers. Interfaces, unions and input object types are
//! not modelled.

use crate::document::{Arguments, Field, Selection, Variables};
use crate::error::{FieldResult, PipelineError, Result};
use crate::path::ResponsePath;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::Extensions;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Scalars every schema knows about
pub const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

/// Field resolution step
pub type Resolver<C> = Arc<dyn Fn(ResolverArgs<C>) -> BoxFuture<'static, FieldResult<Value>> + Send + Sync>;

/// Everything a resolver gets to see for one field occurrence
pub struct ResolverArgs<C> {
    pub context: Arc<C>,
    pub arguments: Arguments,
    pub parent: Value,
    pub info: ResolveInfo,
}

/// Position of the field being resolved
#[derive(Debug, Clone)]
pub struct ResolveInfo {
    pub parent_type: String,
    pub field_name: String,
    pub return_type: TypeRef,
    pub path: ResponsePath,
    pub field: Arc<Field>,
    /// Merged sub-selections, for resolvers that look ahead
    pub selection_set: Vec<Selection>,
    pub variables: Arc<Variables>,
    /// Request-scoped state placed by plugins
    pub extensions: Arc<Extensions>,
}

/// Wrap an async function as a [`Resolver`]
pub fn resolver<C, F, Fut>(f: F) -> Resolver<C>
where
    C: 'static,
    F: Fn(ResolverArgs<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FieldResult<Value>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

/// Resolver reading `field_name` off the parent object
pub fn default_resolver<C: 'static>(field_name: &str) -> Resolver<C> {
    let field_name = field_name.to_string();
    Arc::new(move |args: ResolverArgs<C>| {
        let value = args.parent.get(&field_name).cloned().unwrap_or(Value::Null);
        futures::future::ready(FieldResult::Ok(value)).boxed()
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn non_null(inner: TypeRef) -> Self {
        Self::NonNull(Box::new(inner))
    }

    /// Read SDL notation: `String`, `[User!]!`, ...
    pub fn parse(notation: &str) -> Option<Self> {
        let notation = notation.trim();
        if let Some(inner) = notation.strip_suffix('!') {
            return match Self::parse(inner)? {
                Self::NonNull(_) => None,
                inner => Some(Self::non_null(inner)),
            };
        }
        if let Some(inner) = notation.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            return Self::parse(inner).map(Self::list);
        }
        let valid = !notation.is_empty()
            && notation.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        valid.then(|| Self::named(notation))
    }

    /// Innermost named type
    pub fn base_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.base_name(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{}", name),
            Self::List(inner) => write!(f, "[{}]", inner),
            Self::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

pub struct FieldDefinition<C> {
    name: String,
    ty: TypeRef,
    resolver: Resolver<C>,
}

impl<C: Send + Sync + 'static> FieldDefinition<C> {
    /// Field resolved by reading the parent object
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        let name = name.into();
        Self {
            resolver: default_resolver(&name),
            name,
            ty,
        }
    }

    pub fn resolve<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ResolverArgs<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FieldResult<Value>> + Send + 'static,
    {
        self.resolver = resolver(f);
        self
    }
}

impl<C> FieldDefinition<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    pub fn resolver(&self) -> &Resolver<C> {
        &self.resolver
    }
}

impl<C> Clone for FieldDefinition<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            ty: self.ty.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<C> fmt::Debug for FieldDefinition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

pub struct ObjectType<C> {
    name: String,
    fields: Vec<FieldDefinition<C>>,
}

impl<C> ObjectType<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDefinition<C>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDefinition<C>] {
        &self.fields
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDefinition<C>> {
        self.fields.iter().find(|field| field.name == name)
    }
}

impl<C> Clone for ObjectType<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            fields: self.fields.clone(),
        }
    }
}

impl<C> fmt::Debug for ObjectType<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectType")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Executable schema
///
/// Besides types it carries the set of instrumentation tags that plugins
/// stamp on schemas they have rewritten, so a plugin can tell whether a
/// schema it is handed already went through it.
pub struct Schema<C> {
    query_type: String,
    mutation_type: Option<String>,
    types: BTreeMap<String, ObjectType<C>>,
    scalars: BTreeSet<String>,
    instrumentation: BTreeSet<String>,
}

impl<C> Clone for Schema<C> {
    fn clone(&self) -> Self {
        Self {
            query_type: self.query_type.clone(),
            mutation_type: self.mutation_type.clone(),
            types: self.types.clone(),
            scalars: self.scalars.clone(),
            instrumentation: self.instrumentation.clone(),
        }
    }
}

impl<C> fmt::Debug for Schema<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("query_type", &self.query_type)
            .field("mutation_type", &self.mutation_type)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("instrumentation", &self.instrumentation)
            .finish()
    }
}

impl<C> Schema<C> {
    pub fn builder() -> SchemaBuilder<C> {
        SchemaBuilder::default()
    }

    pub fn query_type(&self) -> &ObjectType<C> {
        // presence checked by SchemaBuilder::build
        &self.types[&self.query_type]
    }

    pub fn mutation_type(&self) -> Option<&ObjectType<C>> {
        self.mutation_type
            .as_ref()
            .and_then(|name| self.types.get(name))
    }

    pub fn object_type(&self, name: &str) -> Option<&ObjectType<C>> {
        self.types.get(name)
    }

    pub fn object_types(&self) -> impl Iterator<Item = &ObjectType<C>> {
        self.types.values()
    }

    pub fn is_scalar(&self, name: &str) -> bool {
        BUILTIN_SCALARS.contains(&name) || self.scalars.contains(name)
    }

    pub fn is_instrumented_by(&self, tag: &str) -> bool {
        self.instrumentation.contains(tag)
    }

    /// Copy of the schema with every resolver replaced by `wrap`'s result,
    /// stamped with `tag`
    pub fn instrument<F>(&self, tag: &str, wrap: F) -> Self
    where
        F: Fn(&ObjectType<C>, &FieldDefinition<C>) -> Resolver<C>,
    {
        let mut instrumented = self.clone();
        for (name, object) in &mut instrumented.types {
            let original = &self.types[name];
            for (field, source) in object.fields.iter_mut().zip(original.fields.iter()) {
                field.resolver = wrap(original, source);
            }
        }
        instrumented.instrumentation.insert(tag.to_string());
        instrumented
    }
}

pub struct SchemaBuilder<C> {
    query_type: String,
    mutation_type: Option<String>,
    objects: Vec<ObjectType<C>>,
    scalars: Vec<String>,
}

impl<C> Default for SchemaBuilder<C> {
    fn default() -> Self {
        Self {
            query_type: "Query".to_string(),
            mutation_type: None,
            objects: Vec::new(),
            scalars: Vec::new(),
        }
    }
}

impl<C> SchemaBuilder<C> {
    /// Register the query root type
    pub fn query(mut self, object: ObjectType<C>) -> Self {
        self.query_type = object.name.clone();
        self.objects.push(object);
        self
    }

    /// Register the mutation root type
    pub fn mutation(mut self, object: ObjectType<C>) -> Self {
        self.mutation_type = Some(object.name.clone());
        self.objects.push(object);
        self
    }

    pub fn object(mut self, object: ObjectType<C>) -> Self {
        self.objects.push(object);
        self
    }

    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.scalars.push(name.into());
        self
    }

    pub fn build(self) -> Result<Schema<C>> {
        let mut types = BTreeMap::new();
        let mut scalars = BTreeSet::new();

        for scalar in self.scalars {
            if BUILTIN_SCALARS.contains(&scalar.as_str()) || !scalars.insert(scalar.clone()) {
                return Err(PipelineError::DuplicateDefinition(scalar));
            }
        }

        for object in self.objects {
            let mut seen = BTreeSet::new();
            for field in &object.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(PipelineError::DuplicateDefinition(format!(
                        "{}.{}",
                        object.name, field.name
                    )));
                }
            }
            if scalars.contains(&object.name)
                || BUILTIN_SCALARS.contains(&object.name.as_str())
                || types.contains_key(&object.name)
            {
                return Err(PipelineError::DuplicateDefinition(object.name));
            }
            types.insert(object.name.clone(), object);
        }

        for object in types.values() {
            for field in &object.fields {
                let base = field.ty.base_name();
                if !types.contains_key(base)
                    && !scalars.contains(base)
                    && !BUILTIN_SCALARS.contains(&base)
                {
                    return Err(PipelineError::UnknownType {
                        owner: object.name.clone(),
                        field: field.name.clone(),
                        type_name: base.to_string(),
                    });
                }
            }
        }

        if !types.contains_key(&self.query_type) {
            return Err(PipelineError::InvalidRootType(self.query_type));
        }
        if let Some(ref mutation) = self.mutation_type {
            if !types.contains_key(mutation) {
                return Err(PipelineError::InvalidRootType(mutation.clone()));
            }
        }

        Ok(Schema {
            query_type: self.query_type,
            mutation_type: self.mutation_type,
            types,
            scalars,
            instrumentation: BTreeSet::new(),
        })
    }
}
