// SPDX-License-Identifier: Apache-2.0

//! Router configuration
//!
//! Loaded from a JSON file (defaults when the file is missing), then
//! overridden by `REQUESTER_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::RouteOptions;

pub const CONFIG_FILE_NAME: &str = "router.json";
pub const DEFAULT_ROUTER_NAME: &str = "composite";

pub const ENV_DISCOVERY: &str = "REQUESTER_DISCOVERY";
pub const ENV_MANY: &str = "REQUESTER_MANY";
pub const ENV_BESTEFFORT: &str = "REQUESTER_BESTEFFORT";
pub const ENV_MAXDEPTH: &str = "REQUESTER_MAXDEPTH";
pub const ENV_EXPLAIN: &str = "REQUESTER_EXPLAIN";
pub const ENV_ASYNC: &str = "REQUESTER_ASYNC";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Name the composite router registers under.
    pub name: String,
    pub options: RouteOptions,
    /// Tracing filter directive, `RUST_LOG` still wins.
    pub log_filter: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_ROUTER_NAME.to_string(),
            options: RouteOptions::default(),
            log_filter: None,
        }
    }
}

impl RouterConfig {
    /// `<config dir>/requester/router.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("requester").join(CONFIG_FILE_NAME))
    }

    /// Reads the file at `path`, falling back to defaults when it does not
    /// exist, then applies environment overrides.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Reads the file at `path` only; the environment is not consulted.
    pub fn load_file(path: &Path) -> EngineResult<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                EngineError::validation(format!("Failed to read config {:?}: {}", path, e))
            })?;
            let config: RouterConfig = serde_json::from_str(&content).map_err(|e| {
                EngineError::validation(format!("Failed to parse config {:?}: {}", path, e))
            })?;
            info!("Loaded router configuration from {:?}", path);
            config
        } else {
            debug!("No router config file found, using defaults");
            RouterConfig::default()
        };
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::internal(format!("Failed to create config dir: {}", e)))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| EngineError::internal(format!("Failed to write config: {}", e)))?;
        debug!("Saved router configuration to {:?}", path);
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary variable source.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let options = &mut self.options;
        if let Some(value) = flag(&var, ENV_DISCOVERY) {
            options.discovery = value;
        }
        if let Some(value) = flag(&var, ENV_MANY) {
            options.many = value;
        }
        if let Some(value) = flag(&var, ENV_BESTEFFORT) {
            options.besteffort = Some(value);
        }
        if let Some(raw) = var(ENV_MAXDEPTH) {
            match raw.trim().parse::<usize>() {
                Ok(depth) => options.maxdepth = depth,
                Err(_) => warn!(variable = ENV_MAXDEPTH, value = %raw, "Ignoring invalid depth"),
            }
        }
        if let Some(value) = flag(&var, ENV_EXPLAIN) {
            options.explain = value;
        }
        if let Some(value) = flag(&var, ENV_ASYNC) {
            options.asynchronous = value;
        }
    }
}

fn flag(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = var(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(variable = key, value = %raw, "Ignoring invalid boolean");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RouterConfig::load_file(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, RouterConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = RouterConfig {
            name: "edge".into(),
            options: RouteOptions::default().with_discovery(true).with_maxdepth(5),
            log_filter: Some("requester=debug".into()),
        };
        config.save(&path).unwrap();

        assert_eq!(RouterConfig::load_file(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"options": {"many": true}}"#).unwrap();
        let config = RouterConfig::load_file(&path).unwrap();
        assert!(config.options.many);
        assert!(config.options.asynchronous);
        assert_eq!(config.name, DEFAULT_ROUTER_NAME);
    }

    #[test]
    fn invalid_file_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            RouterConfig::load_file(&path),
            Err(EngineError::ValidationError { .. })
        ));
    }

    #[test]
    fn overrides_win_over_file() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_DISCOVERY, "true"),
            (ENV_BESTEFFORT, "0"),
            (ENV_MAXDEPTH, "7"),
            (ENV_ASYNC, "off"),
            (ENV_EXPLAIN, "maybe"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"options": {"discovery": false, "maxdepth": 3}}"#).unwrap();
        let mut config = RouterConfig::load_file(&path).unwrap();
        assert_eq!(config.options.maxdepth, 3);
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert!(config.options.discovery);
        assert_eq!(config.options.besteffort, Some(false));
        assert_eq!(config.options.maxdepth, 7);
        assert!(!config.options.asynchronous);
        assert!(!config.options.explain);
    }
}
