//! Pipeline error types
//!
//! Two shapes of failure leave the pipeline: [`PipelineError`] for problems
//! while assembling a pipeline (schema build, plugin setup), and
//! [`GraphQLError`] for everything that ends up in a response's error list.

use crate::path::ResponsePath;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Extension code attached to syntax errors.
pub const GRAPHQL_PARSE_FAILED: &str = "GRAPHQL_PARSE_FAILED";

/// Main pipeline construction error type
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A field refers to a type the schema does not define
    #[error("Unknown type '{type_name}' referenced by {owner}.{field}")]
    UnknownType {
        owner: String,
        field: String,
        type_name: String,
    },

    /// The query root type is missing or is not an object type
    #[error("Invalid root type: {0}")]
    InvalidRootType(String),

    /// Two definitions share one name
    #[error("Duplicate definition: {0}")]
    DuplicateDefinition(String),

    /// A plugin refused the schema it was handed
    #[error("Plugin '{plugin}' failed: {source}")]
    Plugin {
        plugin: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Source location of a document node, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// An entry of a response's `errors` list
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<ResponsePath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// Error shaped like the host's own syntax errors
    pub fn syntax(message: impl Into<String>, location: Option<Location>) -> Self {
        let mut error = Self::new(format!("Syntax Error: {}", message.into()))
            .with_code(GRAPHQL_PARSE_FAILED);
        error.locations.extend(location);
        error
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    pub fn with_path(mut self, path: ResponsePath) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_code(self, code: &str) -> Self {
        self.with_extension("code", Value::String(code.to_string()))
    }

    pub fn with_extension(mut self, key: &str, value: Value) -> Self {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value);
        self
    }

    /// The `extensions.code` entry, if any
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|extensions| extensions.get("code"))
            .and_then(Value::as_str)
    }
}

/// Error returned by a field resolver
///
/// The executor turns it into a [`GraphQLError`] carrying the field's
/// location and response path.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct FieldError {
    pub message: String,
    pub extensions: Option<Map<String, Value>>,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: None,
        }
    }

    pub fn with_extension(mut self, key: &str, value: Value) -> Self {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value);
        self
    }

    pub fn with_code(self, code: &str) -> Self {
        self.with_extension("code", Value::String(code.to_string()))
    }

    pub(crate) fn into_graphql(self, location: Location, path: ResponsePath) -> GraphQLError {
        GraphQLError {
            message: self.message,
            locations: vec![location],
            path: Some(path),
            extensions: self.extensions,
        }
    }
}

impl From<anyhow::Error> for FieldError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error.to_string())
    }
}

pub type FieldResult<T> = std::result::Result<T, FieldError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathSegment;
    use serde_json::json;

    #[test]
    fn test_error_serialization_skips_empty_parts() {
        let error = GraphQLError::new("boom");
        assert_eq!(serde_json::to_value(&error).unwrap(), json!({"message": "boom"}));

        let error = GraphQLError::new("no")
            .with_location(Location { line: 1, column: 3 })
            .with_path(ResponsePath::from(vec![PathSegment::key("secret")]))
            .with_code("FORBIDDEN");
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({
                "message": "no",
                "locations": [{"line": 1, "column": 3}],
                "path": ["secret"],
                "extensions": {"code": "FORBIDDEN"}
            })
        );
        assert_eq!(error.code(), Some("FORBIDDEN"));
    }

    #[test]
    fn test_syntax_error_shape() {
        let error = GraphQLError::syntax("Unexpected `}`", Some(Location { line: 2, column: 1 }));
        assert!(error.message.starts_with("Syntax Error: "));
        assert_eq!(error.code(), Some(GRAPHQL_PARSE_FAILED));
        assert_eq!(error.locations.len(), 1);
    }
}
