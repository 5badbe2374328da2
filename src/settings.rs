use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::AppError;
use crate::util::{read_json, write_json};

const SETTINGS_VERSION: u32 = 1;
const MAX_RECENT: usize = 10;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2000;

/// Application-level settings stored in the OS config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppSettings {
    pub version: u32,
    /// Recently opened project files, most recent first.
    #[serde(default)]
    pub recent: Vec<PathBuf>,
    /// Maximum number of undoable steps kept per project.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Grace period granted to a project's tasks before they are aborted.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// `tracing` filter directive. None = `info`.
    #[serde(default)]
    pub log_filter: Option<String>,
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            recent: Vec::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            log_filter: None,
        }
    }
}

impl AppSettings {
    /// Move `file` to the front of the recent list.
    pub fn touch_recent(&mut self, file: &Path) {
        self.recent.retain(|f| f != file);
        self.recent.insert(0, file.to_path_buf());
        self.recent.truncate(MAX_RECENT);
    }
}

/// Load settings from the app config directory. Returns None if no settings file exists.
pub fn load_settings(app_config_dir: &Path) -> Option<AppSettings> {
    let path = crate::paths::settings_path(app_config_dir);
    if !path.exists() {
        return None;
    }
    match read_json::<AppSettings>(&path) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring unreadable settings: {e}");
            None
        }
    }
}

/// Save settings to the app config directory.
pub fn save_settings(app_config_dir: &Path, settings: &AppSettings) -> Result<(), AppError> {
    std::fs::create_dir_all(app_config_dir)?;
    write_json(&crate::paths::settings_path(app_config_dir), settings)
}
