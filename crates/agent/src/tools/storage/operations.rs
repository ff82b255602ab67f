//! Built-in storage operations

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use super::csv::{self, CsvOptions};
use super::pdf;
use super::registry::Operation;
use super::{ObjectRef, PresignMethod, StorageClient, StoreError, MAX_PRESIGN_EXPIRATION};

/// Largest `indent` accepted by `write_json`
pub const MAX_JSON_INDENT: u64 = 10;

/// The closed set of operations the storage tool ships with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOperation {
    ListBuckets,
    ReadText,
    GetFileInfo,
    AnalyzeCsv,
    AnalyzePdf,
    WriteText,
    WriteJson,
    GeneratePresignedUrl,
}

impl BuiltinOperation {
    pub const ALL: [BuiltinOperation; 8] = [
        BuiltinOperation::ListBuckets,
        BuiltinOperation::ReadText,
        BuiltinOperation::GetFileInfo,
        BuiltinOperation::AnalyzeCsv,
        BuiltinOperation::AnalyzePdf,
        BuiltinOperation::WriteText,
        BuiltinOperation::WriteJson,
        BuiltinOperation::GeneratePresignedUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinOperation::ListBuckets => "list_buckets",
            BuiltinOperation::ReadText => "read_text",
            BuiltinOperation::GetFileInfo => "get_file_info",
            BuiltinOperation::AnalyzeCsv => "analyze_csv",
            BuiltinOperation::AnalyzePdf => "analyze_pdf",
            BuiltinOperation::WriteText => "write_text",
            BuiltinOperation::WriteJson => "write_json",
            BuiltinOperation::GeneratePresignedUrl => "generate_presigned_url",
        }
    }

    fn schema(&self) -> Value {
        let object = json!({
            "bucket": { "type": "string", "description": "Bucket name" },
            "key": { "type": "string", "description": "Object key" }
        });

        let extra = match self {
            BuiltinOperation::ListBuckets => return json!({}),
            BuiltinOperation::ReadText
            | BuiltinOperation::GetFileInfo
            | BuiltinOperation::AnalyzePdf => json!({}),
            BuiltinOperation::AnalyzeCsv => json!({
                "sample_size": {
                    "type": "integer",
                    "description": "Number of rows to sample (optional)"
                },
                "specific_columns": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of specific columns to analyze (optional)"
                }
            }),
            BuiltinOperation::WriteText => json!({
                "params": {
                    "type": "object",
                    "properties": {
                        "content": { "type": "string", "description": "Text content to save" },
                        "content_type": {
                            "type": "string",
                            "description": "MIME type of the file (optional, defaults to text/plain)"
                        }
                    },
                    "required": ["content"]
                }
            }),
            BuiltinOperation::WriteJson => json!({
                "params": {
                    "type": "object",
                    "properties": {
                        "content": {
                            "type": ["object", "array", "string"],
                            "description": "JSON content to save (an object, an array or a JSON string)"
                        },
                        "indent": {
                            "type": "integer",
                            "minimum": 0,
                            "maximum": MAX_JSON_INDENT,
                            "description": "Number of spaces for indentation (optional, defaults to 2)"
                        }
                    },
                    "required": ["content"]
                }
            }),
            BuiltinOperation::GeneratePresignedUrl => json!({
                "params": {
                    "type": "object",
                    "properties": {
                        "expiration": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_PRESIGN_EXPIRATION,
                            "description": "URL expiration time in seconds (default: 604800, one week)"
                        },
                        "http_method": {
                            "type": "string",
                            "enum": ["GET", "PUT"],
                            "description": "HTTP method for the URL (default: GET)"
                        }
                    }
                }
            }),
        };

        let mut schema = object;
        if let (Some(target), Value::Object(extra)) = (schema.as_object_mut(), extra) {
            target.extend(extra);
        }
        schema
    }
}

#[async_trait]
impl Operation for BuiltinOperation {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn parameter_schema(&self) -> Map<String, Value> {
        match self.schema() {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn requires_object(&self) -> bool {
        !matches!(self, BuiltinOperation::ListBuckets)
    }

    async fn execute(
        &self,
        client: &StorageClient,
        object: Option<&ObjectRef>,
        args: &Map<String, Value>,
    ) -> Result<Value, StoreError> {
        if let BuiltinOperation::ListBuckets = self {
            return list_buckets(client).await;
        }

        let object = object.ok_or_else(|| {
            StoreError::InvalidParams("Bucket and key are required for this operation".to_string())
        })?;

        match self {
            BuiltinOperation::ListBuckets => list_buckets(client).await,
            BuiltinOperation::ReadText => read_text(client, object).await,
            BuiltinOperation::GetFileInfo => get_file_info(client, object).await,
            BuiltinOperation::AnalyzeCsv => analyze_csv(client, object, args).await,
            BuiltinOperation::AnalyzePdf => analyze_pdf(client, object).await,
            BuiltinOperation::WriteText => write_text(client, object, params(args)).await,
            BuiltinOperation::WriteJson => write_json(client, object, params(args)).await,
            BuiltinOperation::GeneratePresignedUrl => {
                generate_presigned_url(client, object, params(args)).await
            }
        }
    }
}

fn params(args: &Map<String, Value>) -> Option<&Map<String, Value>> {
    args.get("params").and_then(Value::as_object)
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

async fn list_buckets(client: &StorageClient) -> Result<Value, StoreError> {
    let buckets = client.store().list_buckets().await?;
    Ok(json!({ "buckets": buckets }))
}

async fn read_text(client: &StorageClient, object: &ObjectRef) -> Result<Value, StoreError> {
    let stored = client.store().get_object(object).await?;
    let content = String::from_utf8(stored.body)
        .map_err(|_| StoreError::InvalidParams("File is not valid UTF-8 text".to_string()))?;
    Ok(json!({
        "content": content,
        "content_type": stored.content_type,
        "size": stored.size
    }))
}

async fn get_file_info(client: &StorageClient, object: &ObjectRef) -> Result<Value, StoreError> {
    let stored = client.store().get_object(object).await?;
    Ok(json!({
        "content_type": stored.content_type,
        "size": stored.size,
        "last_modified": stored.last_modified.to_rfc3339(),
        "etag": stored.etag
    }))
}

/// `sample_size` and `specific_columns` are read from the top level, with
/// `params` accepted as a fallback.
async fn analyze_csv(
    client: &StorageClient,
    object: &ObjectRef,
    args: &Map<String, Value>,
) -> Result<Value, StoreError> {
    let lookup = move |name: &str| {
        args.get(name)
            .or_else(|| params(args).and_then(|p| p.get(name)))
            .filter(|v| !v.is_null())
    };

    let sample_size = match lookup("sample_size") {
        Some(value) => Some(value.as_u64().ok_or_else(|| {
            StoreError::InvalidParams("sample_size must be a non-negative integer".to_string())
        })? as usize),
        None => None,
    };

    let specific_columns = match lookup("specific_columns") {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        StoreError::InvalidParams(
                            "specific_columns must be a list of strings".to_string(),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(_) => {
            return Err(StoreError::InvalidParams(
                "specific_columns must be a list of strings".to_string(),
            ))
        }
        None => None,
    };

    let stored = client.store().get_object(object).await?;
    let mut report = csv::analyze(
        &stored.body,
        stored.size,
        &CsvOptions {
            sample_size,
            specific_columns,
        },
    )?;

    if let Some(map) = report.as_object_mut() {
        map.insert("analysis_timestamp".to_string(), json!(timestamp()));
    }
    Ok(report)
}

async fn analyze_pdf(client: &StorageClient, object: &ObjectRef) -> Result<Value, StoreError> {
    let stored = client.store().get_object(object).await?;
    let mut report = pdf::analyze(&stored.body, stored.size)?;

    if let Some(map) = report.as_object_mut() {
        map.insert("analysis_timestamp".to_string(), json!(timestamp()));
        map.insert("status".to_string(), json!("success"));
    }
    Ok(report)
}

fn receipt(receipt: super::PutReceipt) -> Value {
    json!({
        "status": "success",
        "etag": receipt.etag,
        "version_id": receipt.version_id,
        "timestamp": timestamp()
    })
}

async fn write_text(
    client: &StorageClient,
    object: &ObjectRef,
    params: Option<&Map<String, Value>>,
) -> Result<Value, StoreError> {
    let content = params
        .and_then(|p| p.get("content"))
        .ok_or_else(|| StoreError::InvalidParams("No content provided to save".to_string()))?;
    let content = content
        .as_str()
        .ok_or_else(|| StoreError::InvalidParams("Content must be a string".to_string()))?;
    let content_type = params
        .and_then(|p| p.get("content_type"))
        .and_then(Value::as_str)
        .unwrap_or("text/plain");

    let put = client
        .store()
        .put_object(object, content.as_bytes().to_vec(), content_type)
        .await?;
    Ok(receipt(put))
}

async fn write_json(
    client: &StorageClient,
    object: &ObjectRef,
    params: Option<&Map<String, Value>>,
) -> Result<Value, StoreError> {
    let content = params
        .and_then(|p| p.get("content"))
        .ok_or_else(|| StoreError::InvalidParams("No content provided to save".to_string()))?;

    let body = match content {
        Value::Object(_) | Value::Array(_) => {
            let indent = match params.and_then(|p| p.get("indent")) {
                None | Some(Value::Null) => 2,
                Some(value) => value
                    .as_u64()
                    .filter(|indent| *indent <= MAX_JSON_INDENT)
                    .ok_or_else(|| {
                        StoreError::InvalidParams(format!(
                            "indent must be an integer between 0 and {}",
                            MAX_JSON_INDENT
                        ))
                    })?,
            };
            to_indented_json(content, indent as usize)?
        }
        Value::String(text) => {
            serde_json::from_str::<Value>(text)?;
            text.clone()
        }
        _ => {
            return Err(StoreError::InvalidParams(
                "Content must be a JSON-serializable object or a JSON string".to_string(),
            ))
        }
    };

    let put = client
        .store()
        .put_object(object, body.into_bytes(), "application/json")
        .await?;
    Ok(receipt(put))
}

fn to_indented_json(value: &Value, indent: usize) -> Result<String, StoreError> {
    use serde::Serialize;

    let indent = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

async fn generate_presigned_url(
    client: &StorageClient,
    object: &ObjectRef,
    params: Option<&Map<String, Value>>,
) -> Result<Value, StoreError> {
    let expiration = match params.and_then(|p| p.get("expiration")) {
        None | Some(Value::Null) => client.presign_expiration(),
        Some(value) => value
            .as_u64()
            .filter(|seconds| (1..=MAX_PRESIGN_EXPIRATION).contains(seconds))
            .ok_or_else(|| {
                StoreError::InvalidParams(format!(
                    "expiration must be between 1 and {} seconds",
                    MAX_PRESIGN_EXPIRATION
                ))
            })?,
    };

    let method_name = params
        .and_then(|p| p.get("http_method"))
        .and_then(Value::as_str)
        .unwrap_or("GET");
    let method = PresignMethod::parse(method_name).ok_or_else(|| {
        StoreError::InvalidParams(format!(
            "Unsupported http_method: {} (expected GET or PUT)",
            method_name
        ))
    })?;

    let url = client.store().presign(object, method, expiration).await?;

    Ok(json!({
        "status": "success",
        "url": url,
        "expires_in": expiration,
        "http_method": method.as_str(),
        "timestamp": timestamp()
    }))
}
