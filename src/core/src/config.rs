//! Configuration management.

use serde::Deserialize;

/// Main core configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    /// Lineage resolution configuration
    #[serde(default)]
    pub lineage: LineageConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineageConfig {
    /// Maximum ancestor-walk depth before the traversal guard trips
    #[serde(default = "default_max_ancestor_depth")]
    pub max_ancestor_depth: usize,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            max_ancestor_depth: default_max_ancestor_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

// Default value functions
fn default_max_ancestor_depth() -> usize {
    crate::lineage::DEFAULT_MAX_ANCESTOR_DEPTH
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_json_logging() -> bool {
    true
}

impl CoreConfig {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("SPORELOG").separator("__"))
            .build()?;

        let cfg: CoreConfig = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SPORELOG").separator("__"))
            .build()?;

        let cfg: CoreConfig = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.lineage.max_ancestor_depth, 10);
        assert_eq!(cfg.observability.log_level, "info");
        assert!(cfg.observability.json_logging);
    }

    #[test]
    fn test_load_with_empty_environment_uses_defaults() {
        let cfg = CoreConfig::load().unwrap();
        assert_eq!(cfg.lineage.max_ancestor_depth, 10);
    }
}
