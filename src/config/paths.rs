//! Platform-specific configuration and cache paths.

use crate::constants::APP_NAME;
use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the configuration directory for the current platform.
///
/// - Linux: `~/.config/spikeline/`
/// - macOS: `~/Library/Application Support/spikeline/`
/// - Windows: `%APPDATA%\spikeline\`
pub fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(Error::ConfigDirNotFound)
}

/// Get the full path to the config file.
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the waveform cache directory for the current platform.
pub fn default_cache_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.cache_dir().join("waveforms"))
        .ok_or(Error::CacheDirNotFound)
}

/// Get the sorter working-directory root for the current platform.
pub fn default_work_root() -> Result<PathBuf> {
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.cache_dir().join("jobs"))
        .ok_or(Error::CacheDirNotFound)
}
