use crate::error::GraphQLError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response body of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub data: Option<Value>,
    pub errors: Vec<GraphQLError>,
}

impl ExecutionResult {
    /// Result that carries no data, only errors
    pub fn from_errors(errors: Vec<GraphQLError>) -> Self {
        Self { data: None, errors }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl From<GraphQLError> for ExecutionResult {
    fn from(error: GraphQLError) -> Self {
        Self::from_errors(vec![error])
    }
}
