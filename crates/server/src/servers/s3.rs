//! S3 tools over an allow-list of buckets, one object store per bucket.

use super::{markdown, non_empty};
use crate::config::S3Config;
use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use toolhouse_core::{to_local_iso, Mapping, ToolError, ToolResult};
use toolhouse_mcp::protocol::{CallToolResult, ToolSchema};
use toolhouse_mcp::tools::{
    json_schema_integer, json_schema_object, json_schema_string, parse_arguments, tool_schema,
    Tool, ToolRegistry,
};
use tracing::info;

pub const DEFAULT_PAGE_SIZE: usize = 10;
/// Largest page S3 returns from a single listing call.
pub const MAX_PAGE_SIZE: usize = 1000;

const SERVICE: &str = "S3";

fn upstream(error: object_store::Error) -> ToolError {
    ToolError::upstream(SERVICE, error)
}

/// The configured buckets and their stores.
#[derive(Clone)]
pub struct Buckets {
    stores: BTreeMap<String, Arc<dyn ObjectStore>>,
}

impl Buckets {
    /// Build one S3 store per configured bucket from the AWS environment and
    /// check each is reachable.
    pub async fn connect(config: &S3Config) -> anyhow::Result<Self> {
        if config.buckets.is_empty() {
            bail!("No buckets configured (set s3.buckets in the configuration file)");
        }

        let mut stores: Vec<(String, Arc<dyn ObjectStore>)> = Vec::new();
        for bucket in &config.buckets {
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(region) = &config.region {
                builder = builder.with_region(region);
            }
            let store = builder
                .build()
                .with_context(|| format!("Failed to configure bucket '{}'", bucket))?;

            store
                .list(None)
                .next()
                .await
                .transpose()
                .with_context(|| format!("Failed to access bucket '{}'", bucket))?;

            let store: Arc<dyn ObjectStore> = Arc::new(store);
            stores.push((bucket.clone(), store));
        }

        info!(buckets = stores.len(), "Successfully connected to AWS S3");
        Ok(Self::from_stores(stores))
    }

    pub fn from_stores(stores: impl IntoIterator<Item = (String, Arc<dyn ObjectStore>)>) -> Self {
        Self {
            stores: stores.into_iter().collect(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    fn store(&self, bucket: &str) -> ToolResult<&Arc<dyn ObjectStore>> {
        self.stores.get(bucket).ok_or_else(|| {
            ToolError::invalid_input(format!(
                "Unknown bucket '{}'. Available buckets: {}",
                bucket,
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// One page of objects after `after`, plus the token for the next page.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        page_size: usize,
        after: Option<&str>,
    ) -> ToolResult<(Vec<ObjectMeta>, Option<String>)> {
        let store = self.store(bucket)?;
        let prefix = prefix.map(ObjectPath::from);

        let listing = match after {
            Some(offset) => store.list_with_offset(prefix.as_ref(), &ObjectPath::from(offset)),
            None => store.list(prefix.as_ref()),
        };

        // One extra item tells us whether another page exists.
        let mut objects: Vec<ObjectMeta> = listing
            .take(page_size.saturating_add(1))
            .try_collect()
            .await
            .map_err(upstream)?;

        let next = if objects.len() > page_size {
            objects.truncate(page_size);
            objects.last().map(|o| o.location.to_string())
        } else {
            None
        };

        Ok((objects, next))
    }

    pub async fn upload(&self, bucket: &str, key: &str, data: Bytes) -> ToolResult<()> {
        let store = self.store(bucket)?;
        store
            .put(&ObjectPath::from(key), PutPayload::from(data))
            .await
            .map_err(upstream)?;
        Ok(())
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> ToolResult<()> {
        let store = self.store(bucket)?;
        let location = ObjectPath::from(key);

        match store.head(&location).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => {
                return Err(ToolError::not_found(format!(
                    "Object '{}' does not exist in bucket '{}'",
                    key, bucket
                )))
            }
            Err(e) => return Err(upstream(e)),
        }

        store.delete(&location).await.map_err(upstream)
    }
}

/// `<stem>-<unix seconds><.ext>`
pub fn default_object_key(file_path: &Path, unix_secs: i64) -> String {
    let stem = file_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    match file_path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, unix_secs, ext.to_string_lossy()),
        None => format!("{}-{}", stem, unix_secs),
    }
}

pub fn format_objects(objects: Vec<ObjectMeta>, next_page_token: Option<String>) -> Mapping {
    Mapping::new().with("next_page_token", next_page_token).with(
        "results",
        objects
            .into_iter()
            .map(|object| {
                Mapping::new()
                    .with("key", object.location.to_string())
                    .with("modified_at", to_local_iso(object.last_modified.timestamp_millis()))
                    .with("size_bytes", object.size)
            })
            .collect::<Vec<_>>(),
    )
}

/// Tool that lists the configured buckets
pub struct ListBucketsTool {
    buckets: Arc<Buckets>,
}

#[async_trait]
impl Tool for ListBucketsTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "list_buckets",
            "List Buckets",
            "List the S3 buckets this server can access.",
            true,
            json_schema_object(serde_json::json!({}), vec![]),
        )
    }

    async fn execute(&self, _arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let results: Vec<Mapping> = self
            .buckets
            .names()
            .map(|name| Mapping::new().with("name", name))
            .collect();
        markdown(&Mapping::new().with("results", results), &[])
    }
}

/// Tool that lists objects in a bucket
pub struct ListObjectsTool {
    buckets: Arc<Buckets>,
}

#[derive(Debug, Deserialize)]
struct ListObjectsArgs {
    bucket: String,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default = "default_page_size")]
    page_size: usize,
    #[serde(default)]
    next_page_token: Option<String>,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[async_trait]
impl Tool for ListObjectsTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "list_objects",
            "List Objects",
            "List the objects in a bucket, optionally under a prefix.",
            true,
            json_schema_object(
                serde_json::json!({
                    "bucket": json_schema_string("Bucket name"),
                    "prefix": json_schema_string("Only list keys under this prefix"),
                    "page_size": json_schema_integer("Maximum number of objects to return (default: 10)"),
                    "next_page_token": json_schema_string("Token for retrieving the next page of results")
                }),
                vec!["bucket"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: ListObjectsArgs = parse_arguments("list_objects", arguments)?;
        if !(1..=MAX_PAGE_SIZE).contains(&args.page_size) {
            return Err(ToolError::invalid_input(format!(
                "page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, args.page_size
            )));
        }
        let prefix = args.prefix.as_deref().filter(|p| !p.is_empty());
        let after = args.next_page_token.as_deref().filter(|t| !t.is_empty());

        info!(bucket = %args.bucket, prefix = ?prefix, page_size = args.page_size, "Listing objects");
        let (objects, next) = self
            .buckets
            .list_objects(&args.bucket, prefix, args.page_size, after)
            .await?;

        if objects.is_empty() {
            return Ok(CallToolResult::text(format!(
                "No objects found in bucket '{}'.",
                args.bucket
            )));
        }
        markdown(&format_objects(objects, next), &[])
    }
}

/// Tool that uploads a local file
pub struct UploadFileTool {
    buckets: Arc<Buckets>,
}

#[derive(Debug, Deserialize)]
struct UploadFileArgs {
    bucket: String,
    file_path: String,
    #[serde(default)]
    key: Option<String>,
}

#[async_trait]
impl Tool for UploadFileTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "upload_file",
            "Upload File",
            "Upload a local file to a bucket. The key defaults to the file name with a timestamp.",
            false,
            json_schema_object(
                serde_json::json!({
                    "bucket": json_schema_string("Bucket name"),
                    "file_path": json_schema_string("Path of the local file to upload"),
                    "key": json_schema_string("Object key to store the file under")
                }),
                vec!["bucket", "file_path"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: UploadFileArgs = parse_arguments("upload_file", arguments)?;
        let file_path = Path::new(non_empty(&args.file_path, "file_path")?);

        let is_file = tokio::fs::metadata(file_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ToolError::invalid_input(format!(
                "File not found: {}",
                file_path.display()
            )));
        }

        let key = match args.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => key.to_string(),
            None => default_object_key(file_path, chrono::Utc::now().timestamp()),
        };

        let data = tokio::fs::read(file_path).await.map_err(|e| {
            ToolError::invalid_input(format!("Failed to read {}: {}", file_path.display(), e))
        })?;

        info!(bucket = %args.bucket, key = %key, bytes = data.len(), "Uploading file");
        self.buckets
            .upload(&args.bucket, &key, Bytes::from(data))
            .await?;

        Ok(CallToolResult::text(format!(
            "File '{}' uploaded to bucket '{}' with key '{}'.",
            file_path.display(),
            args.bucket,
            key
        )))
    }
}

/// Tool that deletes one object
pub struct DeleteObjectTool {
    buckets: Arc<Buckets>,
}

#[derive(Debug, Deserialize)]
struct DeleteObjectArgs {
    bucket: String,
    key: String,
}

#[async_trait]
impl Tool for DeleteObjectTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "delete_object",
            "Delete Object",
            "Delete an object from a bucket.",
            false,
            json_schema_object(
                serde_json::json!({
                    "bucket": json_schema_string("Bucket name"),
                    "key": json_schema_string("Key of the object to delete")
                }),
                vec!["bucket", "key"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: DeleteObjectArgs = parse_arguments("delete_object", arguments)?;
        let key = non_empty(&args.key, "key")?;

        info!(bucket = %args.bucket, key = %key, "Deleting object");
        self.buckets.delete(&args.bucket, key).await?;

        Ok(CallToolResult::text(format!(
            "Object '{}' deleted from bucket '{}'.",
            key, args.bucket
        )))
    }
}

pub fn registry(buckets: Arc<Buckets>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ListBucketsTool {
        buckets: buckets.clone(),
    }));
    registry.register(Arc::new(ListObjectsTool {
        buckets: buckets.clone(),
    }));
    registry.register(Arc::new(UploadFileTool {
        buckets: buckets.clone(),
    }));
    registry.register(Arc::new(DeleteObjectTool { buckets }));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    async fn setup() -> (Arc<InMemory>, ToolRegistry) {
        let reports = Arc::new(InMemory::new());
        for key in ["2024/a.csv", "2024/b.csv", "2024/c.csv", "readme.txt"] {
            reports
                .put(&ObjectPath::from(key), PutPayload::from(Bytes::from_static(b"data")))
                .await
                .unwrap();
        }

        let buckets = Buckets::from_stores([
            ("reports".to_string(), reports.clone() as Arc<dyn ObjectStore>),
            ("uploads".to_string(), Arc::new(InMemory::new()) as Arc<dyn ObjectStore>),
        ]);
        (reports, registry(Arc::new(buckets)))
    }

    #[tokio::test]
    async fn test_list_buckets() {
        let (_, registry) = setup().await;
        let result = registry.call("list_buckets", serde_json::Value::Null).await;
        assert_eq!(
            result.joined_text(),
            "- **results**: \n\t- **name**: reports\n\t---\n\t- **name**: uploads\n\t---\n\n"
        );
    }

    #[tokio::test]
    async fn test_list_objects_pages() {
        let (_, registry) = setup().await;

        let first = registry
            .call(
                "list_objects",
                serde_json::json!({"bucket": "reports", "prefix": "2024", "page_size": 2}),
            )
            .await
            .joined_text();
        assert!(first.starts_with("- **next_page_token**: 2024/b.csv\n"));
        assert!(first.contains("\t- **key**: 2024/a.csv\n"));
        assert!(first.contains("\t- **size_bytes**: 4\n"));
        assert!(!first.contains("2024/c.csv"));

        let second = registry
            .call(
                "list_objects",
                serde_json::json!({
                    "bucket": "reports",
                    "prefix": "2024",
                    "page_size": 2,
                    "next_page_token": "2024/b.csv"
                }),
            )
            .await
            .joined_text();
        assert!(second.contains("\t- **key**: 2024/c.csv\n"));
        assert!(!second.contains("next_page_token"));
        assert!(!second.contains("readme.txt"));
    }

    #[tokio::test]
    async fn test_list_objects_page_size_bounds() {
        let (reports, registry) = setup().await;

        for page_size in [serde_json::json!(0), serde_json::json!(1001), serde_json::json!(u64::MAX)] {
            let result = registry
                .call(
                    "list_objects",
                    serde_json::json!({"bucket": "reports", "page_size": page_size}),
                )
                .await;
            assert_eq!(result.is_error, Some(true));
            assert!(result
                .joined_text()
                .starts_with("Error: Invalid input: page_size must be between 1 and 1000"));
        }

        let buckets = Buckets::from_stores([("reports".to_string(), reports as Arc<dyn ObjectStore>)]);
        let (objects, next) = buckets
            .list_objects("reports", None, usize::MAX, None)
            .await
            .unwrap();
        assert_eq!(objects.len(), 4);
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn test_list_objects_empty_and_unknown_bucket() {
        let (_, registry) = setup().await;

        let result = registry
            .call("list_objects", serde_json::json!({"bucket": "uploads"}))
            .await;
        assert_eq!(result.joined_text(), "No objects found in bucket 'uploads'.");

        let result = registry
            .call("list_objects", serde_json::json!({"bucket": "secrets"}))
            .await;
        assert_eq!(result.is_error, Some(true));
        assert!(result
            .joined_text()
            .contains("Unknown bucket 'secrets'. Available buckets: reports, uploads"));
    }

    #[tokio::test]
    async fn test_upload_file() {
        let (_, registry) = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, b"hello").unwrap();

        let result = registry
            .call(
                "upload_file",
                serde_json::json!({
                    "bucket": "uploads",
                    "file_path": file.to_string_lossy(),
                    "key": "docs/notes.txt"
                }),
            )
            .await;
        assert!(result.is_error.is_none());
        assert!(result
            .joined_text()
            .ends_with("uploaded to bucket 'uploads' with key 'docs/notes.txt'."));

        let listing = registry
            .call("list_objects", serde_json::json!({"bucket": "uploads"}))
            .await
            .joined_text();
        assert!(listing.contains("\t- **key**: docs/notes.txt\n"));
        assert!(listing.contains("\t- **size_bytes**: 5\n"));
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let (_, registry) = setup().await;
        let result = registry
            .call(
                "upload_file",
                serde_json::json!({"bucket": "uploads", "file_path": "/no/such/file.bin"}),
            )
            .await;
        assert_eq!(
            result.joined_text(),
            "Error: Invalid input: File not found: /no/such/file.bin"
        );
    }

    #[tokio::test]
    async fn test_delete_object() {
        let (reports, registry) = setup().await;

        let result = registry
            .call(
                "delete_object",
                serde_json::json!({"bucket": "reports", "key": "readme.txt"}),
            )
            .await;
        assert_eq!(
            result.joined_text(),
            "Object 'readme.txt' deleted from bucket 'reports'."
        );
        assert!(reports.head(&ObjectPath::from("readme.txt")).await.is_err());

        let result = registry
            .call(
                "delete_object",
                serde_json::json!({"bucket": "reports", "key": "readme.txt"}),
            )
            .await;
        assert_eq!(result.is_error, Some(true));
        assert!(result.joined_text().contains("does not exist"));

        let result = registry
            .call("delete_object", serde_json::json!({"bucket": "reports", "key": " "}))
            .await;
        assert_eq!(result.joined_text(), "Error: Invalid input: key cannot be empty");
    }

    #[test]
    fn test_default_object_key() {
        assert_eq!(
            default_object_key(Path::new("/tmp/report.final.pdf"), 1_700_000_000),
            "report.final-1700000000.pdf"
        );
        assert_eq!(
            default_object_key(Path::new("Makefile"), 42),
            "Makefile-42"
        );
    }
}
