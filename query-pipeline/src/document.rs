//! Query document AST
//!
//! Owned, cheaply clonable representation of a parsed query. Field nodes sit
//! behind `Arc` so resolvers and rules can hold on to them without copying
//! the subtree.

use crate::error::{GraphQLError, Location};
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Variable values supplied with a request
pub type Variables = Map<String, Value>;

/// Coerced field arguments
pub type Arguments = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub operations: Vec<OperationDefinition>,
    pub fragments: Vec<FragmentDefinition>,
}

impl Document {
    /// Pick the operation to run
    ///
    /// Without a name the document must contain exactly one operation.
    pub fn operation(&self, name: Option<&str>) -> Result<&OperationDefinition, GraphQLError> {
        match name {
            Some(name) => self
                .operations
                .iter()
                .find(|operation| operation.name.as_deref() == Some(name))
                .ok_or_else(|| GraphQLError::new(format!("Unknown operation named \"{}\".", name))),
            None => match self.operations.as_slice() {
                [operation] => Ok(operation),
                [] => Err(GraphQLError::new("Must provide an operation.")),
                _ => Err(GraphQLError::new(
                    "Must provide operation name if query contains multiple operations.",
                )),
            },
        }
    }

    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.fragments.iter().find(|fragment| fragment.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub selection_set: Vec<Selection>,
    pub location: Location,
}

impl OperationDefinition {
    /// Provided variables with declared defaults filled in
    pub fn coerce_variables(&self, provided: &Variables) -> Variables {
        let mut variables = provided.clone();
        for definition in &self.variables {
            if variables.contains_key(&definition.name) {
                continue;
            }
            if let Some(ref default) = definition.default_value {
                variables.insert(definition.name.clone(), default.resolve(provided));
            }
        }
        variables
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub default_value: Option<InputValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub selection_set: Vec<Selection>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Arc<Field>),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    pub name: String,
    pub directives: Vec<Directive>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
    pub location: Location,
}

impl Field {
    /// Key under which the field appears in the response
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Argument literals with variables substituted
    pub fn arguments(&self, variables: &Variables) -> Arguments {
        self.arguments
            .iter()
            .map(|(name, value)| (name.clone(), value.resolve(variables)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
}

/// Literal value as written in the document
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Enum(String),
    Variable(String),
    List(Vec<InputValue>),
    Object(Vec<(String, InputValue)>),
}

impl InputValue {
    /// JSON value with variables substituted; unknown variables become null
    pub fn resolve(&self, variables: &Variables) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Int(value) => Value::Number(Number::from(*value)),
            Self::Float(value) => Number::from_f64(*value).map_or(Value::Null, Value::Number),
            Self::String(value) | Self::Enum(value) => Value::String(value.clone()),
            Self::Boolean(value) => Value::Bool(*value),
            Self::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
            Self::List(items) => Value::Array(items.iter().map(|item| item.resolve(variables)).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.resolve(variables)))
                    .collect(),
            ),
        }
    }
}

/// All selections of one response key within a selection set
#[derive(Debug, Clone)]
pub struct CollectedField {
    pub response_key: String,
    /// First occurrence; its name and arguments are authoritative
    pub field: Arc<Field>,
    /// Sub-selections of every occurrence, in document order
    pub selection_set: Vec<Selection>,
}

/// Group a selection set's fields by response key for one concrete type
///
/// Fragment spreads and inline fragments whose type condition matches
/// `type_name` are inlined, `@skip`/`@include` are honoured, and repeated
/// response keys are merged. Both execution and document validation walk
/// the document through this function so that they see the same fields.
pub fn collect_fields(
    document: &Document,
    type_name: &str,
    selections: &[Selection],
    variables: &Variables,
) -> Vec<CollectedField> {
    let mut collected = Vec::new();
    let mut visited_fragments = HashSet::new();
    collect_into(
        document,
        type_name,
        selections,
        variables,
        &mut collected,
        &mut visited_fragments,
    );
    collected
}

fn collect_into(
    document: &Document,
    type_name: &str,
    selections: &[Selection],
    variables: &Variables,
    collected: &mut Vec<CollectedField>,
    visited_fragments: &mut HashSet<String>,
) {
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                if !should_include(&field.directives, variables) {
                    continue;
                }
                let key = field.response_key();
                match collected.iter_mut().find(|entry| entry.response_key == key) {
                    Some(entry) => entry.selection_set.extend(field.selection_set.iter().cloned()),
                    None => collected.push(CollectedField {
                        response_key: key.to_string(),
                        field: field.clone(),
                        selection_set: field.selection_set.clone(),
                    }),
                }
            }
            Selection::FragmentSpread(spread) => {
                if !should_include(&spread.directives, variables)
                    || !visited_fragments.insert(spread.name.clone())
                {
                    continue;
                }
                if let Some(fragment) = document.fragment(&spread.name) {
                    if fragment.type_condition == type_name {
                        collect_into(
                            document,
                            type_name,
                            &fragment.selection_set,
                            variables,
                            collected,
                            visited_fragments,
                        );
                    }
                }
            }
            Selection::InlineFragment(inline) => {
                if !should_include(&inline.directives, variables) {
                    continue;
                }
                let applies = inline
                    .type_condition
                    .as_deref()
                    .map_or(true, |condition| condition == type_name);
                if applies {
                    collect_into(
                        document,
                        type_name,
                        &inline.selection_set,
                        variables,
                        collected,
                        visited_fragments,
                    );
                }
            }
        }
    }
}

fn should_include(directives: &[Directive], variables: &Variables) -> bool {
    directives.iter().all(|directive| {
        let condition = directive
            .arguments
            .iter()
            .find(|(name, _)| name == "if")
            .map(|(_, value)| value.resolve(variables))
            .and_then(|value| value.as_bool());
        match (directive.name.as_str(), condition) {
            ("skip", Some(true)) => false,
            ("include", Some(false)) => false,
            _ => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_document;
    use serde_json::json;

    fn keys(collected: &[CollectedField]) -> Vec<&str> {
        collected.iter().map(|entry| entry.response_key.as_str()).collect()
    }

    #[test]
    fn test_collect_merges_and_inlines() {
        let document = parse_document(
            "query { a b: a ...F ... on Query { c } ... on Other { d } a { x } } fragment F on Query { e }",
        )
        .unwrap();
        let operation = document.operation(None).unwrap();
        let collected = collect_fields(&document, "Query", &operation.selection_set, &Variables::new());
        assert_eq!(keys(&collected), vec!["a", "b", "e", "c"]);
        let first = collected.first().unwrap();
        assert_eq!(first.selection_set.len(), 1);
    }

    #[test]
    fn test_skip_and_include() {
        let document =
            parse_document("query($hide: Boolean) { a @skip(if: $hide) b @include(if: false) c }").unwrap();
        let operation = document.operation(None).unwrap();
        let mut variables = Variables::new();
        variables.insert("hide".into(), json!(true));
        let collected = collect_fields(&document, "Query", &operation.selection_set, &variables);
        assert_eq!(keys(&collected), vec!["c"]);
    }

    #[test]
    fn test_operation_selection() {
        let document = parse_document("query A { a } query B { b }").unwrap();
        assert!(document.operation(None).is_err());
        assert_eq!(document.operation(Some("B")).unwrap().name.as_deref(), Some("B"));
        assert!(document.operation(Some("C")).is_err());
    }

    #[test]
    fn test_argument_resolution() {
        let document = parse_document("query($id: ID = \"7\") { user(id: $id, tags: [A, \"b\"], limit: 3) }").unwrap();
        let operation = document.operation(None).unwrap();
        let variables = operation.coerce_variables(&Variables::new());
        let collected = collect_fields(&document, "Query", &operation.selection_set, &variables);
        let arguments = collected.first().unwrap().field.arguments(&variables);
        assert_eq!(
            Value::Object(arguments),
            json!({"id": "7", "tags": ["A", "b"], "limit": 3})
        );
    }
}
