//! Utility functions for the Cogni app
//!
//! Settings live in `<config dir>/cogni/settings.json`; command history is
//! stored next to them.

use anyhow::{Context, Result};
use shared::settings::AppSettings;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "cogni";

pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("settings.json"))
}

/// Load settings, falling back to defaults when missing or unreadable
pub fn load_settings_or_default() -> AppSettings {
    match config_path() {
        Some(path) => load_settings_from(&path),
        None => AppSettings::default(),
    }
}

pub fn load_settings_from(path: &Path) -> AppSettings {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => return AppSettings::default(),
    };
    match serde_json::from_slice::<AppSettings>(&bytes) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "ignoring unreadable settings");
            AppSettings::default()
        }
    }
}

/// Save settings to disk
pub fn save_settings(settings: &AppSettings) -> Result<()> {
    let path = config_path().context("no config directory on this platform")?;
    save_settings_to(settings, &path)
}

pub fn save_settings_to(settings: &AppSettings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Expand a leading `~/` to the home directory
pub fn expand_user_path(path_str: &str) -> PathBuf {
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path_str)
}
