//! Configuration loader with environment variable expansion

use super::{expand_env_vars, Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Expand `${VAR}` placeholders, parse, and validate
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }
}
