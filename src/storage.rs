use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::Utc;
use s3::primitives::ByteStream;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::error::UploadError;

// 1. StorageService Contract
/// StorageService
///
/// Contract for the object storage bucket holding lost/found photos. The S3
/// client talks to MinIO locally and to Supabase Storage in production; the
/// mock keeps objects in memory for tests.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket if it does not exist yet. Only called in
    /// `Env::Local`.
    async fn ensure_bucket_exists(&self);

    /// Stores `bytes` under `key` and returns the key actually written.
    async fn upload_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, UploadError>;

    /// Publicly dereferenceable URL of a stored object.
    fn public_url(&self, key: &str) -> String;
}

// 2. The Real Implementation (S3/MinIO/Supabase)
/// S3StorageClient
///
/// `force_path_style(true)` is required by both MinIO and the Supabase
/// Storage gateway.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3StorageClient {
    /// new
    ///
    /// `public_base_url` is the prefix objects are served from, without the
    /// bucket segment (e.g. `{SUPABASE_URL}/storage/v1/object/public`).
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_base_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            // Already-exists lands here too.
            tracing::debug!(bucket = %self.bucket_name, "create_bucket: {:?}", e);
        }
    }

    async fn upload_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, UploadError> {
        let key = sanitize_key(key);

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("put_object error: {:?}", e);
                UploadError::new(e.to_string())
            })?;

        Ok(key)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.bucket_name, key)
    }
}

/// sanitize_key
///
/// Strips empty, `.` and `..` segments so a key can never escape the bucket.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 3. The Mock Implementation (For Unit Tests)
/// MockStorageService
///
/// Keeps uploaded objects in memory. `new_failing` rejects every upload.
#[derive(Default)]
pub struct MockStorageService {
    pub should_fail: bool,
    objects: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn upload_count(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn upload_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, UploadError> {
        if self.should_fail {
            return Err(UploadError::new("Mock Storage Error: Simulation requested"));
        }

        let key = sanitize_key(key);
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.clone(), bytes));
        Ok(key)
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://localhost:9000/mock-bucket/{}", key)
    }
}

/// StorageState
///
/// Shared handle to the storage backend held in application state.
pub type StorageState = Arc<dyn StorageService>;

/// UploadFile
///
/// A file picked by the user, as received from the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Lower-cased extension of the original file name, if it has a usable one.
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.file_name.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(ext)
    }
}

/// StorageUploader
///
/// Uploads one file under a fresh key and hands back its public URL.
#[derive(Clone)]
pub struct StorageUploader {
    storage: StorageState,
}

impl StorageUploader {
    pub fn new(storage: StorageState) -> Self {
        Self { storage }
    }

    /// upload
    ///
    /// Keys are `<millis>-<uuid>.<ext>`: submission time keeps them roughly
    /// ordered, the random suffix keeps two uploads in the same millisecond apart.
    pub async fn upload(&self, file: &UploadFile) -> Result<String, UploadError> {
        if file.bytes.is_empty() {
            return Err(UploadError::new("selected file is empty"));
        }

        let key = object_key(file);
        let stored = self
            .storage
            .upload_object(&key, file.bytes.clone(), &file.content_type)
            .await?;

        tracing::info!(key = %stored, size = file.bytes.len(), "image uploaded");
        Ok(self.storage.public_url(&stored))
    }
}

fn object_key(file: &UploadFile) -> String {
    let stem = format!(
        "{}-{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    );
    match file.extension() {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}
