//! Image file probing: format detection by magic number and content checksum.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::ImageError;

/// What the import and consolidation commands need to know about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub checksum: String,
    pub size: u64,
    pub mimetype: &'static str,
}

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"II*\x00", "image/tiff"),
    (b"MM\x00*", "image/tiff"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
];

fn sniff(bytes: &[u8]) -> Option<&'static str> {
    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| bytes.starts_with(magic)) {
        return Some(*mime);
    }
    match (bytes.get(0..4), bytes.get(8..12)) {
        (Some(b"RIFF"), Some(b"WEBP")) => Some("image/webp"),
        _ => None,
    }
}

pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Read and probe `path`. Relative paths resolve against `base`.
pub fn open(path: &Path, base: Option<&Path>) -> Result<ImageInfo, ImageError> {
    let path = match base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    };
    let display = path.display().to_string();
    let bytes = std::fs::read(&path).map_err(|source| ImageError::Read {
        path: display.clone(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(ImageError::Empty { path: display });
    }
    let mimetype = sniff(&bytes).ok_or(ImageError::Unsupported { path: display })?;
    Ok(ImageInfo {
        checksum: checksum(&bytes),
        size: bytes.len() as u64,
        mimetype,
        path,
    })
}

/// Async wrapper off the runtime threads.
pub async fn probe(path: PathBuf, base: Option<PathBuf>) -> Result<ImageInfo, ImageError> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || open(&path, base.as_deref()))
        .await
        .map_err(|e| ImageError::Read {
            path: display,
            source: std::io::Error::other(e.to_string()),
        })?
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_formats() {
        assert_eq!(sniff(b"\xFF\xD8\xFF\xE0rest"), Some("image/jpeg"));
        assert_eq!(sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff(b"plain text"), None);
    }

    #[test]
    fn open_reports_unsupported_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("a.txt");
        std::fs::write(&text, "hello").unwrap();
        assert!(matches!(open(&text, None), Err(ImageError::Unsupported { .. })));

        let empty = dir.path().join("b.jpg");
        std::fs::write(&empty, "").unwrap();
        assert!(matches!(open(&empty, None), Err(ImageError::Empty { .. })));

        assert!(matches!(
            open(Path::new("missing.png"), Some(dir.path())),
            Err(ImageError::Read { .. })
        ));
    }

    #[test]
    fn checksum_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        std::fs::write(&a, b"\x89PNG\r\n\x1a\nsame").unwrap();
        std::fs::write(&b, b"\x89PNG\r\n\x1a\nsame").unwrap();
        let ia = open(&a, None).unwrap();
        let ib = open(Path::new("b.png"), Some(dir.path())).unwrap();
        assert_eq!(ia.checksum, ib.checksum);
        assert_eq!(ia.checksum.len(), 64);
        assert_eq!(ia.mimetype, "image/png");
        assert_eq!(ib.path, b);
    }
}
