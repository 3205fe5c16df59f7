//! Shared path helpers for the CLI and settings.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Application directory name under the platform data directory.
const APP_DIR: &str = "aitag";

/// Gets the cross-platform application data directory.
///
/// Returns `{data_dir}/aitag` where `data_dir` is:
/// - Linux: `~/.local/share`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
///
/// # Errors
///
/// Returns an error if the data directory cannot be determined.
pub fn get_app_dir() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?;

    Ok(data_dir.join(APP_DIR))
}

/// Gets the database path, `{data_dir}/aitag/notes.db`.
pub fn get_database_path() -> Result<PathBuf> {
    Ok(get_app_dir()?.join("notes.db"))
}

/// Gets the settings path, `{data_dir}/aitag/settings.json`.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_app_dir()?.join("settings.json"))
}

/// Ensures the parent directory of a file exists.
///
/// Creates the directory structure if it doesn't exist using `create_dir_all`.
///
/// # Errors
///
/// Returns an error if directory creation fails.
pub fn ensure_parent_directory(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}
