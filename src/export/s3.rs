//! S3 object store.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use super::StoreError;
use super::uploader::ObjectStore;

/// Writes exports to an S3 bucket with `PutObject`.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    region: String,
}

impl S3Store {
    /// Builds a store from the default AWS credential chain.
    pub async fn from_env(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        let region = region.into();
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;
        Self::with_client(Client::new(&shared), bucket, region)
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    /// Target bucket.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Virtual-hosted-style URL of an object.
#[must_use]
pub fn object_url(bucket: &str, region: &str, key: &str) -> String {
    format!("https://{bucket}.s3.{region}.amazonaws.com/{key}")
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<Option<String>, StoreError> {
        debug!(bucket = %self.bucket, key, bytes = bytes.len(), "PutObject");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| StoreError::Request(DisplayErrorContext(e).to_string()))?;
        Ok(None)
    }

    fn public_url(&self, key: &str) -> String {
        object_url(&self.bucket, &self.region, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url() {
        assert_eq!(
            object_url("exports", "eu-west-1", "shop/reports/a_1.xlsx"),
            "https://exports.s3.eu-west-1.amazonaws.com/shop/reports/a_1.xlsx"
        );
    }
}
