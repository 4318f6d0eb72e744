//! Local attachment storage
//!
//! Files land in the upload directory as `<unix_ts>_<suffix>_<name>` and are
//! addressed by clients as `/uploads/<file>`.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::lifecycle::store::FileStorage;
use crate::types::{AccoladeError, Result};

/// URL prefix under which stored files are served
pub const UPLOAD_URL_PREFIX: &str = "/uploads/";

/// Default attachment size limit (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub struct LocalFileStorage {
    root: PathBuf,
    max_bytes: usize,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

/// Reduce a client-supplied name to a safe single path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Read back a stored file by the name that follows `/uploads/`.
///
/// Names that do not survive sanitization unchanged are treated as missing.
pub async fn read_stored(root: &Path, name: &str) -> Result<Bytes> {
    if name.is_empty() || sanitize_file_name(name) != name {
        return Err(AccoladeError::NotFound(format!("file {}", name)));
    }
    match tokio::fs::read(root.join(name)).await {
        Ok(bytes) => Ok(Bytes::from(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AccoladeError::NotFound(format!("file {}", name)))
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn store(&self, file_name: &str, bytes: Bytes) -> Result<String> {
        if bytes.is_empty() {
            return Err(AccoladeError::ValidationFailed("file is empty".into()));
        }
        if bytes.len() > self.max_bytes {
            return Err(AccoladeError::ValidationFailed(format!(
                "file exceeds {} bytes",
                self.max_bytes
            )));
        }

        tokio::fs::create_dir_all(&self.root).await?;

        let suffix = Uuid::new_v4().simple().to_string();
        let stored = format!(
            "{}_{}_{}",
            chrono::Utc::now().timestamp(),
            &suffix[..8],
            sanitize_file_name(file_name)
        );
        let path = self.root.join(&stored);
        tokio::fs::write(&path, &bytes).await?;

        debug!(path = %path.display(), size = bytes.len(), "Attachment stored");
        Ok(format!("{}{}", UPLOAD_URL_PREFIX, stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("certificate.pdf"), "certificate.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\my cert.pdf"), "my_cert.pdf");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[tokio::test]
    async fn test_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path(), 1024);

        let url = storage
            .store("award.png", Bytes::from_static(b"png-bytes"))
            .await
            .unwrap();
        assert!(url.starts_with(UPLOAD_URL_PREFIX));
        assert!(url.ends_with("_award.png"));

        let name = url.trim_start_matches(UPLOAD_URL_PREFIX);
        let written = read_stored(dir.path(), name).await.unwrap();
        assert_eq!(&written[..], b"png-bytes");
    }

    #[tokio::test]
    async fn test_read_stored_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["../secret", "", "missing.txt"] {
            let err = read_stored(dir.path(), name).await.unwrap_err();
            assert!(matches!(err, AccoladeError::NotFound(_)), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_store_enforces_limits() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path(), 4);

        let err = storage.store("a.txt", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, AccoladeError::ValidationFailed(_)));

        let err = storage
            .store("a.txt", Bytes::from_static(b"too long"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccoladeError::ValidationFailed(_)));
    }
}
