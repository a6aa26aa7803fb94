//! Run Configuration
//!
//! Settings for one provisioning run, loaded from a TOML file.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`PROVISIO_SUBSCRIPTION_ID`, `PROVISIO_RESOURCE_GROUP`,
//!    `PROVISIO_LOCATION`, `PROVISIO_MAX_PARALLEL`)
//! 2. Config file
//! 3. Defaults
//!
//! ```toml
//! max_parallel = 8
//! timeout_secs = 900
//! identity_tag = "provisio-resource-name"
//! progress = true
//!
//! [scope]
//! subscription_id = "00000000-0000-0000-0000-000000000000"
//! resource_group = "rg-myapp-dev"
//! location = "westeurope"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProvisioError, Result};
use crate::provision::ExternalScope;

pub const DEFAULT_MAX_PARALLEL: usize = 4;
pub const DEFAULT_IDENTITY_TAG: &str = "provisio-resource-name";

/// Provisioning run settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// External scope searched for existing objects and deployed into
    pub scope: ExternalScope,

    /// Concurrent provisioning calls within one layer
    pub max_parallel: usize,

    /// Per-resource limit for reconcile + create (no limit when unset)
    pub timeout_secs: Option<u64>,

    /// Tag carrying a resource's stable identity on external objects
    pub identity_tag: String,

    /// Print coloured progress and the run summary to stdout
    pub progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scope: ExternalScope::default(),
            max_parallel: DEFAULT_MAX_PARALLEL,
            timeout_secs: None,
            identity_tag: DEFAULT_IDENTITY_TAG.to_string(),
            progress: false,
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ProvisioError::Config {
            reason: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    ///
    /// Returns default config if file doesn't exist.
    /// Returns error if file exists but is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ProvisioError::Config {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ProvisioError::Config {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        fs::write(path.as_ref(), content).map_err(|e| ProvisioError::Config {
            reason: format!("Failed to write config file: {}", e),
        })
    }

    /// Merge with environment variables
    ///
    /// Empty variables are ignored; an unparsable `PROVISIO_MAX_PARALLEL` is an error.
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(v) = non_empty_var("PROVISIO_SUBSCRIPTION_ID") {
            self.scope.subscription_id = v;
        }
        if let Some(v) = non_empty_var("PROVISIO_RESOURCE_GROUP") {
            self.scope.resource_group = v;
        }
        if let Some(v) = non_empty_var("PROVISIO_LOCATION") {
            self.scope.location = Some(v);
        }
        if let Some(v) = non_empty_var("PROVISIO_MAX_PARALLEL") {
            self.max_parallel = v.parse().map_err(|_| ProvisioError::Config {
                reason: format!("PROVISIO_MAX_PARALLEL must be a positive integer, got '{}'", v),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_scope(mut self, scope: ExternalScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            return Err(ProvisioError::Config {
                reason: "max_parallel must be at least 1".into(),
            });
        }
        if self.identity_tag.trim().is_empty() {
            return Err(ProvisioError::Config {
                reason: "identity_tag must not be empty".into(),
            });
        }
        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.max_parallel, 4);
        assert_eq!(config.identity_tag, "provisio-resource-name");
        assert!(config.timeout().is_none());
        assert!(!config.progress);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RunConfig::from_toml_str(
            r#"
            timeout_secs = 600
            progress = true

            [scope]
            resource_group = "rg-dev"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_parallel, DEFAULT_MAX_PARALLEL);
        assert_eq!(config.scope.resource_group, "rg-dev");
        assert_eq!(config.timeout(), Some(Duration::from_secs(600)));
        assert!(config.progress);
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let err = RunConfig::from_toml_str("max_parallel = 0").unwrap_err();
        assert!(matches!(err, ProvisioError::Config { .. }));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = RunConfig::from_toml_str("max_parallel = [").unwrap_err();
        assert_eq!(err.code(), "PROV-001");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("provisio.toml");

        let config = RunConfig::default()
            .with_scope(ExternalScope::new("sub-1", "rg-prod"))
            .with_max_parallel(2)
            .with_timeout(Duration::from_secs(120));
        config.save(&path).unwrap();

        assert_eq!(RunConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_gives_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = RunConfig::load(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_env_overrides_config() {
        env::set_var("PROVISIO_RESOURCE_GROUP", "rg-from-env");
        env::set_var("PROVISIO_LOCATION", "");

        let config = RunConfig::default()
            .with_scope(ExternalScope {
                location: Some("westeurope".into()),
                ..ExternalScope::new("sub-1", "rg-from-file")
            })
            .with_env()
            .unwrap();

        assert_eq!(config.scope.resource_group, "rg-from-env");
        // empty env does not override
        assert_eq!(config.scope.location.as_deref(), Some("westeurope"));

        env::remove_var("PROVISIO_RESOURCE_GROUP");
        env::remove_var("PROVISIO_LOCATION");
    }
}
