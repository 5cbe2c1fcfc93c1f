//! Query text → [`Document`]
//!
//! Syntax is handled by `graphql-parser`; this module only converts its
//! borrowed AST into the owned one in [`crate::document`].

use crate::document::{
    Directive, Document, Field, FragmentDefinition, FragmentSpread, InlineFragment, InputValue,
    OperationDefinition, OperationKind, Selection, VariableDefinition,
};
use crate::error::{GraphQLError, Location};
use graphql_parser::query as ast;
use graphql_parser::Pos;
use std::sync::Arc;

/// Parse step of the pipeline; plugins may wrap it
pub type ParseFn = Arc<dyn Fn(&str) -> Result<Document, GraphQLError> + Send + Sync>;

/// The host's native parse function
pub fn default_parse_fn() -> ParseFn {
    Arc::new(parse_document)
}

pub fn parse_document(source: &str) -> Result<Document, GraphQLError> {
    let parsed = ast::parse_query::<String>(source).map_err(syntax_error)?;
    let mut document = Document::default();

    for definition in parsed.definitions {
        match definition {
            ast::Definition::Operation(operation) => {
                document.operations.push(convert_operation(operation));
            }
            ast::Definition::Fragment(fragment) => {
                let ast::TypeCondition::On(type_condition) = fragment.type_condition;
                document.fragments.push(FragmentDefinition {
                    name: fragment.name,
                    type_condition,
                    selection_set: convert_selection_set(fragment.selection_set),
                    location: location(fragment.position),
                });
            }
        }
    }

    Ok(document)
}

/// Parse a bare selection set such as `"{ id owner { id } }"`
pub fn parse_selection_set(source: &str) -> Result<Vec<Selection>, GraphQLError> {
    let document = parse_document(source)?;
    match (document.operations.as_slice(), document.fragments.is_empty()) {
        ([operation], true) if operation.kind == OperationKind::Query && operation.name.is_none() => {
            Ok(operation.selection_set.clone())
        }
        _ => Err(GraphQLError::syntax(
            format!("Expected a single selection set, found \"{}\"", source.trim()),
            None,
        )),
    }
}

fn syntax_error(error: graphql_parser::query::ParseError) -> GraphQLError {
    let message = error.to_string();
    let message = message
        .strip_prefix("query parse error: ")
        .unwrap_or(&message)
        .trim()
        .to_string();
    GraphQLError::syntax(message, None)
}

fn location(position: Pos) -> Location {
    Location {
        line: position.line,
        column: position.column,
    }
}

fn convert_operation(operation: ast::OperationDefinition<'_, String>) -> OperationDefinition {
    match operation {
        ast::OperationDefinition::SelectionSet(selection_set) => OperationDefinition {
            kind: OperationKind::Query,
            name: None,
            variables: Vec::new(),
            location: location(selection_set.span.0),
            selection_set: convert_selection_set(selection_set),
        },
        ast::OperationDefinition::Query(query) => OperationDefinition {
            kind: OperationKind::Query,
            name: query.name,
            variables: convert_variables(query.variable_definitions),
            selection_set: convert_selection_set(query.selection_set),
            location: location(query.position),
        },
        ast::OperationDefinition::Mutation(mutation) => OperationDefinition {
            kind: OperationKind::Mutation,
            name: mutation.name,
            variables: convert_variables(mutation.variable_definitions),
            selection_set: convert_selection_set(mutation.selection_set),
            location: location(mutation.position),
        },
        ast::OperationDefinition::Subscription(subscription) => OperationDefinition {
            kind: OperationKind::Subscription,
            name: subscription.name,
            variables: convert_variables(subscription.variable_definitions),
            selection_set: convert_selection_set(subscription.selection_set),
            location: location(subscription.position),
        },
    }
}

fn convert_variables(definitions: Vec<ast::VariableDefinition<'_, String>>) -> Vec<VariableDefinition> {
    definitions
        .into_iter()
        .map(|definition| VariableDefinition {
            name: definition.name,
            default_value: definition.default_value.map(convert_value),
        })
        .collect()
}

fn convert_selection_set(selection_set: ast::SelectionSet<'_, String>) -> Vec<Selection> {
    selection_set
        .items
        .into_iter()
        .map(|selection| match selection {
            ast::Selection::Field(field) => Selection::Field(Arc::new(Field {
                alias: field.alias,
                name: field.name,
                arguments: convert_arguments(field.arguments),
                directives: convert_directives(field.directives),
                location: location(field.position),
                selection_set: convert_selection_set(field.selection_set),
            })),
            ast::Selection::FragmentSpread(spread) => Selection::FragmentSpread(FragmentSpread {
                name: spread.fragment_name,
                directives: convert_directives(spread.directives),
                location: location(spread.position),
            }),
            ast::Selection::InlineFragment(inline) => Selection::InlineFragment(InlineFragment {
                type_condition: inline
                    .type_condition
                    .map(|ast::TypeCondition::On(name)| name),
                directives: convert_directives(inline.directives),
                location: location(inline.position),
                selection_set: convert_selection_set(inline.selection_set),
            }),
        })
        .collect()
}

fn convert_directives(directives: Vec<ast::Directive<'_, String>>) -> Vec<Directive> {
    directives
        .into_iter()
        .map(|directive| Directive {
            name: directive.name,
            arguments: convert_arguments(directive.arguments),
        })
        .collect()
}

fn convert_arguments(arguments: Vec<(String, ast::Value<'_, String>)>) -> Vec<(String, InputValue)> {
    arguments
        .into_iter()
        .map(|(name, value)| (name, convert_value(value)))
        .collect()
}

fn convert_value(value: ast::Value<'_, String>) -> InputValue {
    match value {
        ast::Value::Variable(name) => InputValue::Variable(name),
        ast::Value::Int(number) => number
            .as_i64()
            .map_or(InputValue::Null, InputValue::Int),
        ast::Value::Float(value) => InputValue::Float(value),
        ast::Value::String(value) => InputValue::String(value),
        ast::Value::Boolean(value) => InputValue::Boolean(value),
        ast::Value::Null => InputValue::Null,
        ast::Value::Enum(name) => InputValue::Enum(name),
        ast::Value::List(items) => InputValue::List(items.into_iter().map(convert_value).collect()),
        ast::Value::Object(fields) => InputValue::Object(
            fields
                .into_iter()
                .map(|(name, value)| (name, convert_value(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shorthand_query() {
        let document = parse_document("{ secret }").unwrap();
        let operation = document.operation(None).unwrap();
        assert_eq!(operation.kind, OperationKind::Query);
        match operation.selection_set.first() {
            Some(Selection::Field(field)) => {
                assert_eq!(field.name, "secret");
                assert_eq!(field.location, Location { line: 1, column: 3 });
            }
            other => panic!("unexpected selection: {:?}", other),
        }
    }

    #[test]
    fn test_parse_named_operations_and_fragments() {
        let document = parse_document(
            "mutation Rename($name: String = \"x\") { rename(name: $name) { id ...Bits } } fragment Bits on User { name }",
        )
        .unwrap();
        let operation = document.operation(Some("Rename")).unwrap();
        assert_eq!(operation.kind, OperationKind::Mutation);
        assert_eq!(operation.variables.len(), 1);
        assert_eq!(document.fragment("Bits").unwrap().type_condition, "User");
    }

    #[test]
    fn test_syntax_errors() {
        let error = parse_document("{ secret ").unwrap_err();
        assert!(error.message.starts_with("Syntax Error"));
        assert!(parse_selection_set("{ id owner { id } }").is_ok());
        assert!(parse_selection_set("query Named { id }").is_err());
        assert!(parse_selection_set("{ id ").is_err());
    }
}
