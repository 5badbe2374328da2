use std::path::Path;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::AppError;
use crate::util::{read_json, write_json};

/// Navigation state remembered per project between sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NavState {
    #[serde(default)]
    pub list: Option<i64>,
    #[serde(default)]
    pub item: Option<i64>,
    #[serde(default)]
    pub photo: Option<i64>,
}

/// Load the saved state of `project_id`. Missing or unreadable files yield the default.
pub fn restore(app_config_dir: &Path, project_id: &str) -> NavState {
    let path = crate::paths::nav_path(app_config_dir, project_id);
    if !path.exists() {
        return NavState::default();
    }
    read_json(&path).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), "discarding nav state: {e}");
        NavState::default()
    })
}

pub fn persist(app_config_dir: &Path, project_id: &str, state: &NavState) -> Result<(), AppError> {
    write_json(&crate::paths::nav_path(app_config_dir, project_id), state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn persisted_state_restores_per_project() {
        let dir = tempfile::tempdir().unwrap();
        let state = NavState {
            list: None,
            item: Some(3),
            photo: Some(7),
        };
        persist(dir.path(), "p1", &state).unwrap();
        assert_eq!(restore(dir.path(), "p1"), state);
        assert_eq!(restore(dir.path(), "p2"), NavState::default());
    }
}
