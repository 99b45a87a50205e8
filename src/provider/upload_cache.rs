use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use crate::provider::client::{ProviderClient, ProviderError};

#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        token: &str,
    ) -> Result<String, ProviderError>;
}

#[async_trait]
impl FileUploader for ProviderClient {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        token: &str,
    ) -> Result<String, ProviderError> {
        ProviderClient::upload(self, bytes, filename, token).await
    }
}

/// Content-addressed cache from image digest to provider file reference.
/// Identical bytes map to the same key regardless of filename or source
/// URL. The mutex is held across the lookup-upload-store sequence, so the
/// upload primitive runs at most once per digest.
pub struct UploadCache {
    uploader: Arc<dyn FileUploader>,
    entries: Mutex<HashMap<String, String>>,
}

impl UploadCache {
    pub fn new(uploader: Arc<dyn FileUploader>) -> Self {
        Self {
            uploader,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_upload(
        &self,
        bytes: &[u8],
        filename: &str,
        token: &str,
    ) -> Result<String, ProviderError> {
        let key = digest_key(bytes);
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(key.as_str()) {
            debug!(digest = %key, "reusing cached upload reference");
            return Ok(existing.clone());
        }

        let file_ref = self.uploader.upload(bytes.to_vec(), filename, token).await?;
        debug!(digest = %key, file_ref = %file_ref, "cached new upload reference");
        entries.insert(key, file_ref.clone());
        Ok(file_ref)
    }
}

fn digest_key(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
