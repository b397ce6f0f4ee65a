use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::{info, warn};

use crate::config::S3Config;

/// Public object storage for profile and post images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `body` under `key` and returns its public URL.
    async fn upload_file(&self, body: Bytes, key: &str, content_type: &str) -> anyhow::Result<String>;
    async fn delete_file(&self, key: &str) -> anyhow::Result<()>;
    /// Inverse of the URL produced by `upload_file`; `None` for foreign URLs.
    fn key_from_url(&self, url: &str) -> Option<String>;

    /// Deletes the previous object (if any) before uploading the new one.
    async fn replace_file(
        &self,
        old_key: Option<&str>,
        body: Bytes,
        new_key: &str,
        content_type: &str,
    ) -> anyhow::Result<String> {
        if let Some(old) = old_key {
            self.delete_file(old).await?;
        }
        self.upload_file(body, new_key, content_type).await
    }
}

pub fn ext_from_mime(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    base_url: String,
}

/// Virtual-host URL for AWS, `endpoint/bucket` for a custom endpoint.
fn public_base_url(cfg: &S3Config) -> String {
    match &cfg.endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), cfg.bucket),
        None => format!("https://{}.s3.{}.amazonaws.com", cfg.bucket, cfg.region),
    }
}

impl S3Storage {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        let mut loader = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ));
        if let Some(endpoint) = &cfg.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let mut builder = S3ConfigBuilder::from(&shared);
        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        info!(bucket = %cfg.bucket, custom_endpoint = cfg.endpoint.is_some(), "s3 storage initialized");
        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: cfg.bucket.clone(),
            base_url: public_base_url(cfg),
        })
    }
}

#[async_trait]
impl BlobStore for S3Storage {
    async fn upload_file(&self, body: Bytes, key: &str, content_type: &str) -> anyhow::Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("s3 put_object {key}"))?;
        Ok(format!("{}/{}", self.base_url, key))
    }

    async fn delete_file(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("s3 delete_object {key}"))?;
        Ok(())
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        strip_base(&self.base_url, url)
    }
}

fn strip_base(base_url: &str, url: &str) -> Option<String> {
    let key = url.strip_prefix(base_url)?.strip_prefix('/')?;
    if key.is_empty() {
        warn!(url, "url has no object key");
        return None;
    }
    Some(key.to_string())
}
