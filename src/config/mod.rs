// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for the agent.
//!
//! Configuration comes from, in increasing precedence:
//! - defaults
//! - a JSON or YAML file (camelCase keys)
//! - `APISCOPE_*` environment variables
//!
//! The client validates the result once at construction; an invalid
//! configuration disables the agent instead of failing the host application.

mod loader;
mod types;

pub use loader::{
    apply_env_overrides, load_config, load_config_file, save_config_file, ENV_APP_VERSION,
    ENV_CLIENT_ID, ENV_ENV, ENV_HUB_URL, ENV_REQUEST_LOGGING,
};

pub use types::{
    AgentConfig, CountersConfig, HistogramConfig, RequestLoggingConfig, SyncConfig,
    DEFAULT_HUB_URL,
};
