//! Centralized path definitions for all data files and directories.
//!
//! This module is the single source of truth for leaf filenames, directory names,
//! and path-building functions. No other module should hard-code these strings.

use std::path::{Path, PathBuf};

// ── Application identity ─────────────────────────────────────────

pub const APP_DIR_NAME: &str = "folio";

// ── Leaf filenames ───────────────────────────────────────────────

pub const SETTINGS_FILE: &str = "settings.json";
pub const PROJECT_EXT: &str = "folio";

// ── Directory names ──────────────────────────────────────────────

pub const NAV_DIR: &str = "nav";

// ── Config-dir functions (take app_config_dir) ───────────────────

/// Resolve the app config directory: the explicit override, else the OS default.
pub fn app_config_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(dir) => Some(dir.to_path_buf()),
        None => dirs::config_dir().map(|d| d.join(APP_DIR_NAME)),
    }
}

pub fn settings_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SETTINGS_FILE)
}

pub fn nav_dir(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(NAV_DIR)
}

pub fn nav_path(app_config_dir: &Path, project_id: &str) -> PathBuf {
    nav_dir(app_config_dir).join(format!("{project_id}.json"))
}

// ── Project-file functions ───────────────────────────────────────

/// Directory photo paths are resolved against when the project stores none.
pub fn project_base(project_file: &Path) -> Option<PathBuf> {
    project_file.parent().map(Path::to_path_buf)
}
