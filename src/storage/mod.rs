//! Object storage for finished archives
//! Uses Apache Arrow object_store crate

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{
    Attribute, Attributes, ObjectStore, PutMultipartOpts, WriteMultipart, path::Path as StoragePath,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::{StorageConfig, StorageProvider};

const READ_BUFFER_BYTES: usize = 64 * 1024;
const MAX_CONCURRENT_PARTS: usize = 4;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage configuration invalid: {0}")]
    InvalidConfig(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata returned after upload
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub etag: Option<String>,
    pub size: u64,
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
    url_base: String,
    part_bytes: usize,
    /// LocalFileSystem rejects object attributes
    attributes_supported: bool,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self {
            url_base: format!("memory://{bucket}"),
            store,
            bucket,
            part_bytes: 8 * 1024 * 1024,
            attributes_supported: true,
        }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "bundlebox-local".to_string())
    }

    /// Build the configured backend
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let mut client = match config.provider {
            StorageProvider::Memory => {
                Self::new(Arc::new(InMemory::new()), config.bucket.clone())
            }
            StorageProvider::Local => {
                std::fs::create_dir_all(&config.root)?;
                let root = std::fs::canonicalize(&config.root)?;
                let store = LocalFileSystem::new_with_prefix(&root)?;

                let mut client = Self::new(Arc::new(store), config.bucket.clone());
                client.url_base = format!("file://{}", root.display());
                client.attributes_supported = false;
                client
            }
            StorageProvider::S3 => {
                let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key)
                else {
                    return Err(StorageError::InvalidConfig(
                        "S3 provider requires access and secret keys".to_string(),
                    ));
                };

                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(&config.bucket)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key);
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                }

                let mut client = Self::new(Arc::new(builder.build()?), config.bucket.clone());
                client.url_base = format!("s3://{}", config.bucket);
                client
            }
        };

        if let Some(public) = &config.public_base_url {
            client.url_base = public.trim_end_matches('/').to_string();
        }
        client.part_bytes = usize::try_from(config.upload_part_bytes.as_u64())
            .unwrap_or(usize::MAX)
            .max(5 * 1024 * 1024);

        Ok(client)
    }

    pub fn with_part_bytes(mut self, part_bytes: usize) -> Self {
        self.part_bytes = part_bytes.max(1);
        self
    }

    /// Where a stored object can be fetched from
    pub fn download_url(&self, key: &str) -> String {
        format!("{}/{}", self.url_base, key)
    }

    /// Stream `reader` into `key` as a multipart upload
    pub async fn upload_stream<R>(
        &self,
        key: &str,
        mut reader: R,
        content_type: &str,
    ) -> Result<UploadMetadata>
    where
        R: AsyncRead + Unpin,
    {
        let path = StoragePath::from(key);

        let mut attributes = Attributes::new();
        if self.attributes_supported {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let opts = PutMultipartOpts {
            attributes,
            ..Default::default()
        };

        let upload = self.store.put_multipart_opts(&path, opts).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, self.part_bytes);
        let mut buffer = vec![0u8; READ_BUFFER_BYTES];
        let mut size = 0u64;

        loop {
            let read = match reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e.into());
                }
            };
            if let Err(e) = writer.wait_for_capacity(MAX_CONCURRENT_PARTS).await {
                let _ = writer.abort().await;
                return Err(e.into());
            }
            writer.write(&buffer[..read]);
            size += read as u64;
        }

        let put_result = writer.finish().await?;

        tracing::info!(key, size, "Uploaded to storage");

        Ok(UploadMetadata {
            key: key.to_string(),
            etag: put_result.e_tag,
            size,
        })
    }

    /// Download from storage
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = StoragePath::from(key);

        let result = self.store.get(&path).await?;
        let bytes = result.bytes().await?;

        tracing::info!(key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes.to_vec())
    }

    /// Content type recorded for `key`, if the backend keeps one
    pub async fn content_type(&self, key: &str) -> Result<Option<String>> {
        let path = StoragePath::from(key);
        let result = self.store.get(&path).await?;
        Ok(result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.as_ref().to_string()))
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
