use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::config::MediaConfig;

/// Reference to an uploaded asset: the storage key and a retrievable URL.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoredAsset {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait MediaClient: Send + Sync {
    async fn upload(
        &self,
        body: Bytes,
        content_type: &str,
        folder: &str,
    ) -> anyhow::Result<StoredAsset>;
    async fn delete(&self, id: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct MediaStore {
    client: Client,
    bucket: String,
    public_url: String,
}

impl MediaStore {
    pub async fn new(cfg: &MediaConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new("us-east-1".to_string()))
            .credentials_provider(Credentials::new(
                cfg.access_key.clone(),
                cfg.secret_key.clone(),
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_url: cfg.public_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MediaClient for MediaStore {
    async fn upload(
        &self,
        body: Bytes,
        content_type: &str,
        folder: &str,
    ) -> anyhow::Result<StoredAsset> {
        let ext = ext_from_mime(content_type).unwrap_or("bin");
        let key = format!("{}/{}.{}", folder, Uuid::new_v4(), ext);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("s3 put_object {}", key))?;
        let url = format!("{}/{}", self.public_url, key);
        Ok(StoredAsset { id: key, url })
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(id)
            .send()
            .await
            .with_context(|| format!("s3 delete_object {}", id))?;
        Ok(())
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "application/pdf" => Some("pdf"),
        _ => None,
    }
}
