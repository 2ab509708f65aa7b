use crate::store::ObjectStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

/// Object storage bound to one bucket, speaking the S3 protocol against the
/// provider's Spaces endpoint.
pub struct SpacesStore {
    client: S3Client,
    bucket: String,
}

impl SpacesStore {
    pub async fn connect(
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: String,
    ) -> Result<Self> {
        let endpoint = format!("https://{}.digitaloceanspaces.com", region);
        let credentials =
            aws_sdk_s3::config::Credentials::new(access_key, secret_key, None, None, "cloudexec");
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .load()
            .await;
        Ok(Self {
            client: S3Client::new(&config),
            bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for SpacesStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(obj) => {
                let body = obj
                    .body
                    .collect()
                    .await
                    .map_err(|e| anyhow!("failed to read body of {}: {:?}", key, e))?;
                Ok(Some(body.into_bytes().to_vec()))
            }
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                    // Some S3-compatible endpoints answer a bare 404 instead
                    // of a NoSuchKey error document.
                    || format!("{:?}", err).contains("NotFound");
                if missing {
                    Ok(None)
                } else {
                    Err(anyhow!("failed to get object {}: {:?}", key, err))
                }
            }
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| anyhow!("failed to put object {}: {:?}", key, e))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| anyhow!("failed to list objects under {}: {:?}", prefix, e))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            if response.is_truncated().unwrap_or(false) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("failed to delete object {}: {:?}", key, e))?;
        Ok(())
    }
}
