//! Aggregation configuration, loaded by reference.
//!
//! The root names a configuration in its `EvalCircuit` message and every
//! server resolves that name through its own [`ConfigLoader`]. This keeps the
//! circuit parameters out of the wire messages while still letting all
//! servers agree on them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default point at which servers evaluate the proof polynomials.
///
/// Must lie outside the interpolation domain `0..=2M` of every circuit the
/// deployment uses.
pub const DEFAULT_EVAL_POINT: u64 = 0x5eed_cafe_f00d;

/// Circuit and field parameters shared by every server in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Number of servers the client requests are shared across.
    pub num_servers: usize,

    /// Number of features per data point (the label is extra).
    pub num_features: usize,

    /// Evaluation point for the polynomial identity check.
    #[serde(default = "default_eval_point")]
    pub eval_point: u64,
}

fn default_eval_point() -> u64 {
    DEFAULT_EVAL_POINT
}

impl AggregationConfig {
    /// Create a configuration with the default evaluation point.
    pub fn new(num_servers: usize, num_features: usize) -> Self {
        Self {
            num_servers,
            num_features,
            eval_point: DEFAULT_EVAL_POINT,
        }
    }

    /// Override the evaluation point.
    pub fn with_eval_point(mut self, eval_point: u64) -> Self {
        self.eval_point = eval_point;
        self
    }

    /// Check the parameters that do not depend on the circuit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_servers == 0 {
            return Err(ConfigError::Invalid("num_servers must be at least 1".into()));
        }
        if self.num_features == 0 {
            return Err(ConfigError::Invalid("num_features must be at least 1".into()));
        }
        if self.eval_point >= crate::MODULUS {
            return Err(ConfigError::Invalid(format!(
                "eval_point {} is not a field element",
                self.eval_point
            )));
        }
        Ok(())
    }

    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AggregationConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Errors resolving a configuration reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration found for reference {0:?}")]
    NotFound(String),

    #[error("failed to read configuration: {0}")]
    Io(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Resolves a configuration reference to its parameters.
pub trait ConfigLoader: Send + Sync {
    /// Load the configuration named by `reference`.
    fn load(&self, reference: &str) -> Result<AggregationConfig, ConfigError>;
}

/// Loads TOML configuration files, treating references as paths.
///
/// Relative references are resolved against the loader's base directory.
#[derive(Debug, Clone, Default)]
pub struct FileConfigLoader {
    base_dir: Option<PathBuf>,
}

impl FileConfigLoader {
    /// Create a loader that resolves relative references against the
    /// process working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader that resolves relative references against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ConfigLoader for FileConfigLoader {
    fn load(&self, reference: &str) -> Result<AggregationConfig, ConfigError> {
        if reference.is_empty() {
            return Err(ConfigError::NotFound(String::new()));
        }
        let path = self.resolve(reference);
        let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(reference.to_string()),
            _ => ConfigError::Io(format!("{}: {}", path.display(), e)),
        })?;
        AggregationConfig::from_toml_str(&text)
    }
}

/// In-memory loader for tests and simulation.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigLoader {
    configs: HashMap<String, AggregationConfig>,
}

impl StaticConfigLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader holding a single configuration.
    pub fn single(reference: impl Into<String>, config: AggregationConfig) -> Self {
        Self::new().with(reference, config)
    }

    /// Register a configuration under `reference`.
    pub fn with(mut self, reference: impl Into<String>, config: AggregationConfig) -> Self {
        self.configs.insert(reference.into(), config);
        self
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, reference: &str) -> Result<AggregationConfig, ConfigError> {
        let config = self
            .configs
            .get(reference)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(reference.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_toml_defaults_eval_point() {
        let config = AggregationConfig::from_toml_str("num_servers = 3\nnum_features = 2\n").unwrap();
        assert_eq!(config, AggregationConfig::new(3, 2));
        assert_eq!(config.eval_point, DEFAULT_EVAL_POINT);
    }

    #[test]
    fn test_validate_rejects_zero_features() {
        let err = AggregationConfig::from_toml_str("num_servers = 3\nnum_features = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(matches!(
            AggregationConfig::from_toml_str("num_servers = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_file_loader_resolves_relative_reference() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("linreg.toml")).unwrap();
        let config = AggregationConfig::new(4, 3).with_eval_point(987_654_321);
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .unwrap();

        let loader = FileConfigLoader::with_base_dir(dir.path());
        assert_eq!(loader.load("linreg.toml").unwrap(), config);
        assert!(matches!(
            loader.load("missing.toml"),
            Err(ConfigError::NotFound(_))
        ));
        assert!(matches!(loader.load(""), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_static_loader() {
        let loader = StaticConfigLoader::single("linreg", AggregationConfig::new(3, 2));
        assert_eq!(loader.load("linreg").unwrap().num_servers, 3);
        assert!(matches!(loader.load("other"), Err(ConfigError::NotFound(_))));
    }
}
