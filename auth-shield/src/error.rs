use thiserror::Error;

/// Extension code of a field blocked by a deny decision
pub const FORBIDDEN: &str = "FORBIDDEN";

/// Extension code of a field blocked because its rule failed
pub const RULE_ERROR: &str = "RULE_ERROR";

#[derive(Error, Debug)]
pub enum ShieldError {
    #[error("Rule references unknown type: {0}")]
    UnknownType(String),

    #[error("Rule references unknown field: {type_name}.{field}")]
    UnknownField { type_name: String, field: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ShieldError>;
