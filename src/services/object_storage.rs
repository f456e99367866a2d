// src/services/object_storage.rs
//! Local-disk object store that speaks `gs://bucket/object` URIs.
//!
//! Objects live under `<root>/<bucket>/<object>`, so URIs handed out by this
//! store look exactly like bucket URIs and can be fed back into it (or into
//! any other [`ObjectStore`]) unchanged.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{ObjectStore, ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Resolves a `gs://` URI to its location on disk.
    pub fn path_for(&self, uri: &str) -> ServiceResult<PathBuf> {
        let (bucket, object) = parse_gcs_uri(uri)?;
        Ok(self.root.join(bucket).join(object))
    }
}

/// Splits `gs://bucket/path/to/object` into `("bucket", "path/to/object")`.
pub fn parse_gcs_uri(uri: &str) -> ServiceResult<(&str, &str)> {
    let invalid = || ServiceError::InvalidUri(uri.to_string());
    let rest = uri.strip_prefix("gs://").ok_or_else(invalid)?;
    let (bucket, object) = rest.split_once('/').ok_or_else(invalid)?;
    if bucket.is_empty() || object.is_empty() || !is_safe_relative(object) {
        return Err(invalid());
    }
    Ok((bucket, object))
}

fn is_safe_relative(path: &str) -> bool {
    !path.starts_with('/') && path.split('/').all(|segment| !segment.is_empty() && segment != "..")
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn store(
        &self,
        folder: &str,
        filename: &str,
        mime_type: &str,
        contents: Vec<u8>,
    ) -> ServiceResult<String> {
        let object = format!("{}/{}", folder.trim_matches('/'), filename);
        if !is_safe_relative(&object) {
            return Err(ServiceError::InvalidUri(object));
        }

        let path = self.root.join(&self.bucket).join(&object);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let size = contents.len();
        tokio::fs::write(&path, contents).await?;

        let uri = format!("gs://{}/{}", self.bucket, object);
        tracing::debug!(uri = %uri, mime_type = %mime_type, size_bytes = size, "stored object");
        Ok(uri)
    }

    async fn download(&self, uri: &str) -> ServiceResult<Vec<u8>> {
        let path = self.path_for(uri)?;
        read_object(&path, uri).await
    }
}

async fn read_object(path: &Path, uri: &str) -> ServiceResult<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ServiceError::NotFound(uri.to_string())),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gcs_uri() {
        assert_eq!(parse_gcs_uri("gs://bucket/p1.png").unwrap(), ("bucket", "p1.png"));
        assert_eq!(
            parse_gcs_uri("gs://bucket/retro_games_8bit_p1/image.png").unwrap(),
            ("bucket", "retro_games_8bit_p1/image.png")
        );
        assert!(parse_gcs_uri("https://example.com/p1.png").is_err());
        assert!(parse_gcs_uri("gs://bucket").is_err());
        assert!(parse_gcs_uri("gs://bucket/../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_store_then_download() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "genmedia-local");

        let uri = store
            .store("retro_games_8bit_p1", "image_1.png", "image/png", vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(uri, "gs://genmedia-local/retro_games_8bit_p1/image_1.png");
        assert!(dir.path().join("genmedia-local/retro_games_8bit_p1/image_1.png").exists());

        let bytes = store.download(&uri).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_download_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "genmedia-local");

        let err = store.download("gs://genmedia-local/nope.png").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "genmedia-local");

        let err = store.store("../outside", "x.png", "image/png", vec![]).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidUri(_)));
    }
}
