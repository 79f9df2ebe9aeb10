//! Configuration surface consumed by the engine
//!
//! The core consumes a `Config` value; discovering and merging config
//! files is the embedder's job. `Config` derives serde so embedders can
//! read it straight from TOML.

use crate::error::{NimbusError, NimbusResult};
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reload behavior
    pub reload: ReloadConfig,

    /// Namespace roots and entry points
    pub paths: PathsConfig,
}

/// Reload behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Seconds a cache entry is trusted without re-statting the backing
    /// resource. Trades staleness under development against filesystem
    /// call volume under load.
    pub window_secs: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self { window_secs: 5 }
    }
}

/// Namespace roots and dispatch entry points
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Logical root for application scripts
    pub script_root: String,

    /// Logical root for templates
    pub template_root: String,

    /// Template file extension
    pub template_ext: String,

    /// Logical path of the application entry script
    pub entry_script: String,

    /// Function the entry script exports for request dispatch
    pub entry_function: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            script_root: "/app".to_string(),
            template_root: "/app/views".to_string(),
            template_ext: "jst".to_string(),
            entry_script: "/app/main.js".to_string(),
            entry_function: "main".to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> NimbusResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> NimbusResult<()> {
        if self.reload.window_secs == 0 {
            return Err(NimbusError::ConfigInvalid {
                reason: "reload.window_secs must be greater than zero".to_string(),
            });
        }
        for (field, value) in [
            ("paths.script_root", &self.paths.script_root),
            ("paths.template_root", &self.paths.template_root),
            ("paths.template_ext", &self.paths.template_ext),
            ("paths.entry_script", &self.paths.entry_script),
            ("paths.entry_function", &self.paths.entry_function),
        ] {
            if value.trim().is_empty() {
                return Err(NimbusError::ConfigInvalid {
                    reason: format!("{field} must not be empty"),
                });
            }
        }
        let root = crate::resource::canonical(&self.paths.script_root);
        let entry = crate::resource::canonical(&self.paths.entry_script);
        if !entry.starts_with(&root) {
            return Err(NimbusError::ConfigInvalid {
                reason: format!(
                    "paths.entry_script {entry} must live under paths.script_root {root}"
                ),
            });
        }
        Ok(())
    }

    /// Reload window as a duration
    pub fn reload_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reload.window_secs as i64)
    }
}
