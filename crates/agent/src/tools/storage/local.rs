//! Object store over a local directory tree
//!
//! Every top-level directory under the root is a bucket; keys are relative
//! paths inside it. Presigned URLs are `file://` URLs carrying the method and
//! expiry as query parameters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::{ObjectRef, ObjectStore, PresignMethod, PutReceipt, StoreError, StoredObject};

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        if !is_single_segment(bucket) {
            return Err(StoreError::InvalidParams(format!(
                "Invalid bucket name: {}",
                bucket
            )));
        }
        let dir = self.root.join(bucket);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(StoreError::NoSuchBucket(bucket.to_string()))
        }
    }

    /// Resolve an object path, refusing keys that escape the bucket
    fn object_path(&self, object: &ObjectRef) -> Result<PathBuf, StoreError> {
        let bucket = self.bucket_dir(&object.bucket)?;
        let key = Path::new(&object.key);
        let valid = key.components().count() > 0
            && key
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidParams(format!(
                "Invalid object key: {}",
                object.key
            )));
        }
        Ok(bucket.join(key))
    }

    fn no_such_key(object: &ObjectRef) -> StoreError {
        StoreError::NoSuchKey {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
        }
    }
}

fn is_single_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Quoted content hash, in the style object stores report
fn etag(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let digest = format!("{:x}", hasher.finalize());
    format!("\"{}\"", &digest[..32])
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("txt") | Some("log") | Some("md") => "text/plain",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("html") | Some("htm") => "text/html",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut buckets = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    buckets.push(name.to_string());
                }
            }
        }
        buckets.sort();
        Ok(buckets)
    }

    async fn get_object(&self, object: &ObjectRef) -> Result<StoredObject, StoreError> {
        let path = self.object_path(object)?;
        if !path.is_file() {
            return Err(Self::no_such_key(object));
        }

        let body = tokio::fs::read(&path).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(StoredObject {
            content_type: content_type_for(&path).to_string(),
            size: body.len() as u64,
            etag: etag(&body),
            last_modified,
            body,
        })
    }

    async fn put_object(
        &self,
        object: &ObjectRef,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<PutReceipt, StoreError> {
        let path = self.object_path(object)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(
            "writing {} bytes ({}) to {:?}",
            body.len(),
            content_type,
            path
        );
        let tag = etag(&body);
        tokio::fs::write(&path, body).await?;

        Ok(PutReceipt {
            etag: tag,
            version_id: None,
        })
    }

    async fn presign(
        &self,
        object: &ObjectRef,
        method: PresignMethod,
        expires_in: u64,
    ) -> Result<String, StoreError> {
        let path = self.object_path(object)?;
        if method == PresignMethod::Get && !path.is_file() {
            return Err(Self::no_such_key(object));
        }

        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        };
        let mut url = Url::from_file_path(&absolute).map_err(|_| {
            StoreError::InvalidParams(format!("Cannot build URL for {:?}", absolute))
        })?;

        let expires_at = i64::try_from(expires_in)
            .ok()
            .and_then(|seconds| Utc::now().timestamp().checked_add(seconds))
            .ok_or_else(|| {
                StoreError::InvalidParams(format!("Expiration out of range: {}", expires_in))
            })?;
        url.query_pairs_mut()
            .append_pair("X-Method", method.as_str())
            .append_pair("X-Expires", &expires_at.to_string());

        Ok(url.to_string())
    }
}
