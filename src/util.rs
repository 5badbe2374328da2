use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AppError;

/// The name serde gives a unit variant, e.g. `"photo.create"` for
/// [`ActionType::PhotoCreate`](crate::action::ActionType::PhotoCreate).
pub fn serde_variant_name<T: Serialize>(val: &T) -> Option<String> {
    match serde_json::to_value(val).ok()? {
        serde_json::Value::String(name) => Some(name),
        _ => None,
    }
}

/// Parse a unit variant from its serde name.
pub fn from_serde_str<T: DeserializeOwned>(name: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(name.to_owned())).ok()
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Writers currently replacing a file, keyed by path.
static WRITERS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = LazyLock::new(Mutex::default);

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Replace `path` with `data` so readers never observe a partial file.
///
/// The data is synced to `<name>.tmp` and renamed over `path`. The previous
/// contents, if any, are kept as `<name>.bak`.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AppError> {
    let writer = Arc::clone(WRITERS.lock().entry(path.to_path_buf()).or_default());
    let _exclusive = writer.lock();

    let tmp = sibling(path, ".tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }

    if path.exists() {
        if let Err(e) = fs::rename(path, sibling(path, ".bak")) {
            tracing::debug!(path = %path.display(), "no backup kept: {e}");
        }
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_json(&path, &serde_json::json!({ "n": 1 })).unwrap();
        write_json(&path, &serde_json::json!({ "n": 2 })).unwrap();

        let current: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(current["n"], 2);
        let backup: serde_json::Value = read_json(&dir.path().join("state.json.bak")).unwrap();
        assert_eq!(backup["n"], 1);
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn write_json_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nav").join("p.json");
        write_json(&path, &[1, 2, 3]).unwrap();
        let back: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
