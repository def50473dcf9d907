//! Subcommand implementations.

pub mod chat;
pub mod config_cmd;
pub mod doctor;
pub mod models;
pub mod onboard;

use anyhow::Context;
use std::path::{Path, PathBuf};
use zema_config::AppConfig;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => AppConfig::load().context("Failed to load config"),
    }
}

/// The file `load_config` reads.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}
