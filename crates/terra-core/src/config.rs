//! CLI configuration
//!
//! Configuration file: ~/.terra/config.yaml (or $TERRA_CONTEXT_DIR/config.yaml)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TerraError};
use crate::paths::Paths;

/// How tool commands are launched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppLaunch {
    LocalProcess,
    DockerContainer,
}

impl Default for AppLaunch {
    fn default() -> Self {
        Self::LocalProcess
    }
}

/// Global CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Maximum number of resources listed per workspace
    #[serde(default = "default_resource_limit")]
    pub resource_limit: usize,

    #[serde(default)]
    pub app_launch: AppLaunch,

    /// Image used when launching tools in a container
    #[serde(default = "default_docker_image")]
    pub docker_image: String,

    /// Default log filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-request timeout for remote calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Retry settings for remote calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_resource_limit() -> usize {
    1000
}

fn default_docker_image() -> String {
    "terra-cli/tools:stable".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    16_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            resource_limit: default_resource_limit(),
            app_launch: AppLaunch::default(),
            docker_image: default_docker_image(),
            log_level: default_log_level(),
            retry: RetryConfig::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl CliConfig {
    /// Load configuration from the default location
    pub fn load(paths: &Paths) -> Result<Self> {
        Self::load_from(&paths.config_file())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            TerraError::InvalidInput(format!(
                "Failed to parse CLI config {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self, paths: &Paths) -> Result<()> {
        self.save_to(&paths.config_file())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content = serde_yaml::to_string(self)?;
        crate::files::write_atomic(path, content.as_bytes(), false)
    }

    pub fn validate(&self) -> Result<()> {
        if self.resource_limit == 0 {
            return Err(TerraError::InvalidInput(
                "resource-limit must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(TerraError::InvalidInput(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = CliConfig::load_from(&dir.path().join("config.yaml"))?;
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.resource_limit, 1000);
        assert_eq!(config.app_launch, AppLaunch::LocalProcess);
        Ok(())
    }

    #[test]
    fn test_save_and_reload() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");

        let mut config = CliConfig::default();
        config.resource_limit = 3;
        config.app_launch = AppLaunch::DockerContainer;
        config.save_to(&path)?;

        let loaded = CliConfig::load_from(&path)?;
        assert_eq!(loaded.resource_limit, 3);
        assert_eq!(loaded.app_launch, AppLaunch::DockerContainer);
        Ok(())
    }

    #[test]
    fn test_partial_file_fills_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "resource_limit: 5\napp_launch: DOCKER_CONTAINER\n")?;

        let config = CliConfig::load_from(&path)?;
        assert_eq!(config.resource_limit, 5);
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.log_level, "info");
        Ok(())
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut config = CliConfig::default();
        config.resource_limit = 0;
        assert!(matches!(config.validate(), Err(TerraError::InvalidInput(_))));
    }
}
