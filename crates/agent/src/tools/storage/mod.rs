//! Object storage tool
//!
//! One tool, many operations: the model picks an `operation` and the tool
//! routes it through an [`OperationRegistry`]. The merged parameter schema is
//! rebuilt from the registry, so pluggable operations show up automatically.

pub mod csv;
pub mod local;
pub mod operations;
pub mod pdf;
pub mod registry;

pub use local::LocalObjectStore;
pub use operations::BuiltinOperation;
pub use registry::{Operation, OperationRegistry};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::{ToolError, ToolOutput, ToolTrait};

pub const DEFAULT_PRESIGN_EXPIRATION: u64 = 604_800;
/// Longest validity accepted for a presigned URL (seven days)
pub const MAX_PRESIGN_EXPIRATION: u64 = 604_800;

/// Storage failures. `Display` is the message the model sees.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Bucket {0} not found")]
    NoSuchBucket(String),

    #[error("File {key} not found in bucket {bucket}")]
    NoSuchKey { bucket: String, key: String },

    #[error("{0}")]
    InvalidParams(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON format: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid PDF: {0}")]
    Pdf(#[from] lopdf::Error),
}

/// Object body plus metadata
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
}

#[derive(Debug, Clone)]
pub struct PutReceipt {
    pub etag: String,
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresignMethod {
    Get,
    Put,
}

impl PresignMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresignMethod::Get => "GET",
            PresignMethod::Put => "PUT",
        }
    }

    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(PresignMethod::Get),
            "PUT" => Some(PresignMethod::Put),
            _ => None,
        }
    }
}

/// Bucket + key locating one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Backend the storage operations run against
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<String>, StoreError>;

    async fn get_object(&self, object: &ObjectRef) -> Result<StoredObject, StoreError>;

    async fn put_object(
        &self,
        object: &ObjectRef,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<PutReceipt, StoreError>;

    async fn presign(
        &self,
        object: &ObjectRef,
        method: PresignMethod,
        expires_in: u64,
    ) -> Result<String, StoreError>;
}

/// Handle passed to every operation
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    presign_expiration: u64,
}

impl StorageClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            presign_expiration: DEFAULT_PRESIGN_EXPIRATION,
        }
    }

    pub fn with_presign_expiration(mut self, seconds: u64) -> Self {
        self.presign_expiration = seconds;
        self
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn presign_expiration(&self) -> u64 {
        self.presign_expiration
    }
}

/// The `analyze_storage` tool
pub struct StorageTool {
    client: StorageClient,
    registry: OperationRegistry,
}

impl StorageTool {
    /// Tool exposing every built-in operation
    pub fn new(client: StorageClient) -> Self {
        Self::with_registry(client, OperationRegistry::with_builtins())
    }

    pub fn with_registry(client: StorageClient, registry: OperationRegistry) -> Self {
        Self { client, registry }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn register_operation<O: Operation + 'static>(&mut self, operation: O) {
        self.registry.register(operation);
    }

    /// Validate the arguments and run the selected operation
    async fn dispatch(&self, args: &Map<String, Value>) -> ToolOutput {
        let Some(name) = args.get("operation").and_then(Value::as_str) else {
            return ToolOutput::error("Missing required parameter: operation");
        };

        let Some(operation) = self.registry.resolve(name) else {
            return ToolOutput::error(format!("Unknown operation: {}", name));
        };

        let object = match object_ref(args) {
            Some(object) => Some(object),
            None if operation.requires_object() => {
                return ToolOutput::error("Bucket and key are required for this operation");
            }
            None => None,
        };

        debug!("storage operation {} on {:?}", name, object);

        match operation.execute(&self.client, object.as_ref(), args).await {
            Ok(result) => ToolOutput::success(result),
            Err(e) => ToolOutput::error(e.to_string()),
        }
    }
}

fn object_ref(args: &Map<String, Value>) -> Option<ObjectRef> {
    let bucket = args.get("bucket").and_then(Value::as_str).unwrap_or("");
    let key = args.get("key").and_then(Value::as_str).unwrap_or("");
    if bucket.is_empty() || key.is_empty() {
        None
    } else {
        Some(ObjectRef::new(bucket, key))
    }
}

#[async_trait]
impl ToolTrait for StorageTool {
    fn name(&self) -> &str {
        "analyze_storage"
    }

    fn description(&self) -> &str {
        "Analyze files and buckets in object storage. Supports listing buckets, reading and writing objects, file metadata, CSV and PDF analysis and presigned URLs."
    }

    fn parameters(&self) -> Value {
        self.registry.merged_schema()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        match args {
            Value::Object(map) => Ok(self.dispatch(&map).await),
            Value::Null => Ok(self.dispatch(&Map::new()).await),
            other => Err(ToolError::InvalidArguments(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool() -> (tempfile::TempDir, StorageTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("reports")).unwrap();
        let client = StorageClient::new(Arc::new(LocalObjectStore::new(dir.path())));
        (dir, StorageTool::new(client))
    }

    #[test]
    fn test_presign_method_parse() {
        assert_eq!(PresignMethod::parse("get"), Some(PresignMethod::Get));
        assert_eq!(PresignMethod::parse("PUT"), Some(PresignMethod::Put));
        assert_eq!(PresignMethod::parse("DELETE"), None);
    }

    #[test]
    fn test_object_ref_requires_both_parts() {
        let args = json!({ "bucket": "b", "key": "" });
        assert!(object_ref(args.as_object().unwrap()).is_none());

        let args = json!({ "bucket": "b", "key": "k" });
        assert_eq!(
            object_ref(args.as_object().unwrap()),
            Some(ObjectRef::new("b", "k"))
        );
    }

    #[tokio::test]
    async fn test_missing_operation() {
        let (_dir, tool) = tool();
        let output = tool.execute(json!({})).await.unwrap();
        assert!(output.is_error());
        assert_eq!(
            output.content["error"],
            "Missing required parameter: operation"
        );
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let (_dir, tool) = tool();
        let output = tool
            .execute(json!({ "operation": "delete_everything" }))
            .await
            .unwrap();
        assert_eq!(output.content["error"], "Unknown operation: delete_everything");
    }

    #[tokio::test]
    async fn test_object_operations_require_bucket_and_key() {
        let (_dir, tool) = tool();
        let output = tool
            .execute(json!({ "operation": "read_text", "bucket": "reports" }))
            .await
            .unwrap();
        assert_eq!(
            output.content["error"],
            "Bucket and key are required for this operation"
        );
    }

    #[tokio::test]
    async fn test_list_buckets_needs_no_object() {
        let (_dir, tool) = tool();
        let output = tool
            .execute(json!({ "operation": "list_buckets" }))
            .await
            .unwrap();
        assert!(!output.is_error());
        assert_eq!(output.content, json!({ "buckets": ["reports"] }));
    }

    #[tokio::test]
    async fn test_non_object_arguments_rejected() {
        let (_dir, tool) = tool();
        let result = tool.execute(json!("list_buckets")).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
