//! Parse-time input requirements
//!
//! Rules built with [`crate::combinators::input`] name fields they need
//! resolved next to the field they guard. After the host has parsed a query,
//! every selection set that selects such a field gets the missing required
//! fields merged in. Requirements that cannot be satisfied fail the parse.

use crate::rule_map::RuleMap;
use query_pipeline::{
    parse_selection_set, Document, GraphQLError, ObjectType, OperationKind, ParseFn, Schema, Selection,
};
use std::sync::Arc;
use tracing::debug;

/// Wrap `parse` so that documents it produces carry all input requirements
pub fn wrap_parse<C>(parse: ParseFn, schema: Arc<Schema<C>>, rules: Arc<RuleMap<C>>) -> ParseFn
where
    C: Send + Sync + 'static,
{
    Arc::new(move |source: &str| {
        let document = parse(source)?;
        augment(document, &schema, &rules)
    })
}

/// Merge the input requirements of every selected field into `document`
pub fn augment<C>(mut document: Document, schema: &Schema<C>, rules: &RuleMap<C>) -> Result<Document, GraphQLError>
where
    C: Send + Sync + 'static,
{
    if !rules.has_requirements() {
        return Ok(document);
    }

    for operation in &mut document.operations {
        let root = match operation.kind {
            OperationKind::Query => Some(schema.query_type()),
            OperationKind::Mutation => schema.mutation_type(),
            OperationKind::Subscription => None,
        };
        if let Some(root) = root {
            augment_selections(&mut operation.selection_set, root, schema, rules)?;
        }
    }

    for fragment in &mut document.fragments {
        if let Some(object) = schema.object_type(&fragment.type_condition) {
            augment_selections(&mut fragment.selection_set, object, schema, rules)?;
        }
    }

    Ok(document)
}

fn augment_selections<C>(
    selections: &mut Vec<Selection>,
    object: &ObjectType<C>,
    schema: &Schema<C>,
    rules: &RuleMap<C>,
) -> Result<(), GraphQLError>
where
    C: Send + Sync + 'static,
{
    let mut required = Vec::new();
    for selection in selections.iter() {
        let Selection::Field(field) = selection else {
            continue;
        };
        for text in rules.requirements(object.name(), &field.name) {
            let parsed = parse_selection_set(text)?;
            check_requirement(&parsed, object, schema, text)?;
            required.extend(parsed);
        }
    }
    merge(selections, required)?;

    for selection in selections.iter_mut() {
        match selection {
            Selection::Field(field) => {
                let child = object
                    .get_field(&field.name)
                    .and_then(|definition| schema.object_type(definition.ty().base_name()));
                if let Some(child) = child {
                    if !field.selection_set.is_empty() {
                        augment_selections(&mut Arc::make_mut(field).selection_set, child, schema, rules)?;
                    }
                }
            }
            Selection::InlineFragment(inline) => {
                let target = match inline.type_condition.as_deref() {
                    Some(name) => schema.object_type(name),
                    None => Some(object),
                };
                if let Some(target) = target {
                    augment_selections(&mut inline.selection_set, target, schema, rules)?;
                }
            }
            // fragment definitions are augmented on their own
            Selection::FragmentSpread(_) => {}
        }
    }

    Ok(())
}

/// Every field of a requirement must exist where it will be merged
fn check_requirement<C>(
    selections: &[Selection],
    object: &ObjectType<C>,
    schema: &Schema<C>,
    text: &str,
) -> Result<(), GraphQLError> {
    for selection in selections {
        let Selection::Field(field) = selection else {
            return Err(GraphQLError::syntax(
                format!("Input requirement \"{}\" may only select fields", text.trim()),
                None,
            ));
        };
        if field.name == "__typename" {
            continue;
        }
        let Some(definition) = object.get_field(&field.name) else {
            return Err(GraphQLError::syntax(
                format!(
                    "Cannot query field \"{}\" on type \"{}\" required by input \"{}\"",
                    field.name,
                    object.name(),
                    text.trim()
                ),
                Some(field.location),
            ));
        };
        match schema.object_type(definition.ty().base_name()) {
            Some(child) => check_requirement(&field.selection_set, child, schema, text)?,
            None if !field.selection_set.is_empty() => {
                return Err(GraphQLError::syntax(
                    format!(
                        "Field \"{}\" of type \"{}\" must not have a selection in input \"{}\"",
                        field.name,
                        definition.ty(),
                        text.trim()
                    ),
                    Some(field.location),
                ));
            }
            None => {}
        }
    }
    Ok(())
}

/// Add required fields whose response key is missing, recursing into
/// sub-selections of keys that are already there
///
/// A key already taken by a different field or different arguments cannot
/// carry the requirement and fails like a native field conflict.
fn merge(selections: &mut Vec<Selection>, required: Vec<Selection>) -> Result<(), GraphQLError> {
    for selection in required {
        let Selection::Field(needed) = selection else {
            continue;
        };
        let existing = selections.iter_mut().find_map(|selection| match selection {
            Selection::Field(field) if field.response_key() == needed.response_key() => Some(field),
            _ => None,
        });
        match existing {
            Some(existing) if existing.name != needed.name || existing.arguments != needed.arguments => {
                return Err(GraphQLError::syntax(
                    format!(
                        "Fields \"{}\" conflict: \"{}\" is selected where input requires \"{}\"",
                        needed.response_key(),
                        existing.name,
                        needed.name
                    ),
                    Some(existing.location),
                ));
            }
            Some(existing) => {
                if !needed.selection_set.is_empty() {
                    merge(&mut Arc::make_mut(existing).selection_set, needed.selection_set.clone())?;
                }
            }
            None => {
                debug!(field = %needed.response_key(), "Adding required input field");
                selections.push(Selection::Field(needed));
            }
        }
    }
    Ok(())
}
