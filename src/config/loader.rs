// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files and environment variables.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::AgentConfig;

/// Environment variable holding the client id.
pub const ENV_CLIENT_ID: &str = "APISCOPE_CLIENT_ID";

/// Environment variable holding the environment label.
pub const ENV_ENV: &str = "APISCOPE_ENV";

/// Environment variable overriding the hub URL.
pub const ENV_HUB_URL: &str = "APISCOPE_HUB_URL";

/// Environment variable holding the application version.
pub const ENV_APP_VERSION: &str = "APISCOPE_APP_VERSION";

/// Environment variable toggling request logging (`true`/`false`).
pub const ENV_REQUEST_LOGGING: &str = "APISCOPE_REQUEST_LOGGING";

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<AgentConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Save configuration to a JSON file.
pub fn save_config_file(path: &Path, config: &AgentConfig) -> Result<PathBuf, ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(path.to_path_buf())
}

/// Apply environment overrides using the given variable lookup.
///
/// Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut AgentConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(client_id) = get(ENV_CLIENT_ID) {
        config.client_id = client_id;
    }
    if let Some(env) = get(ENV_ENV) {
        config.env = env;
    }
    if let Some(hub_url) = get(ENV_HUB_URL) {
        config.hub_url = hub_url;
    }
    if let Some(version) = get(ENV_APP_VERSION) {
        config.app_version = Some(version);
    }
    if let Some(flag) = get(ENV_REQUEST_LOGGING) {
        config.request_logging.enabled = match flag.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => return Err(ConfigError::invalid(ENV_REQUEST_LOGGING, "expected a boolean")),
        };
    }
    Ok(())
}

/// Load configuration from an optional file, then the process environment.
///
/// The result is validated before it is returned.
pub fn load_config(path: Option<&Path>) -> Result<AgentConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => AgentConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
