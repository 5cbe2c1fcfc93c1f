use crate::error::Result;
use config::{Config, Environment};
use serde::{Deserialize, Serialize};

/// Prefix of the environment variables read by [`ShieldOptions::from_env`]
pub const ENV_PREFIX: &str = "SHIELD";

/// Shield configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldOptions {
    /// Expose the full cause chain of failing rules in error extensions
    pub debug: bool,
}

impl ShieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Load from `SHIELD_*` environment variables, e.g. `SHIELD_DEBUG=true`
    pub fn from_env() -> Result<Self> {
        Self::from_environment(Environment::with_prefix(ENV_PREFIX))
    }

    fn from_environment(environment: Environment) -> Result<Self> {
        let options = Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(options)
    }
}
