use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::provider::auth::AccessTokenCache;
use crate::provider::client::{ProviderClient, ProviderError};
use crate::provider::parse::{parse_materials_map, parse_string_list};
use crate::provider::prompts::PromptCatalog;
use crate::provider::upload_cache::UploadCache;

/// Filename tagged onto provider uploads. The upload cache keys on the
/// content digest, so the name carries no identity.
const UPLOAD_FILENAME: &str = "image.jpg";

/// Vision predictions consumed by the analysis orchestrator. The provider
/// implementation composes the token cache, the upload cache and the chat
/// client; tests substitute scripted implementations.
#[async_trait]
pub trait VisionService: Send + Sync {
    async fn predict_main_objects(&self, image: &[u8]) -> Result<Vec<String>, ProviderError>;

    /// Returns an existing reference verbatim, or uploads through the
    /// content-addressed cache.
    async fn ensure_uploaded(
        &self,
        image: &[u8],
        existing_ref: Option<&str>,
    ) -> Result<String, ProviderError>;

    async fn predict_materials(
        &self,
        image: &[u8],
        items: &[String],
        existing_ref: Option<&str>,
    ) -> Result<HashMap<String, Vec<String>>, ProviderError>;
}

pub struct ProviderVisionService {
    client: Arc<ProviderClient>,
    tokens: AccessTokenCache,
    uploads: UploadCache,
    prompts: PromptCatalog,
}

impl ProviderVisionService {
    pub fn new(client: ProviderClient, prompts: PromptCatalog) -> Self {
        let client = Arc::new(client);
        Self {
            tokens: AccessTokenCache::new(client.clone()),
            uploads: UploadCache::new(client.clone()),
            client,
            prompts,
        }
    }
}

#[async_trait]
impl VisionService for ProviderVisionService {
    async fn predict_main_objects(&self, image: &[u8]) -> Result<Vec<String>, ProviderError> {
        let token = self.tokens.get_token().await?;
        let file_ref = self.ensure_uploaded(image, None).await?;

        let raw = self
            .client
            .chat(
                self.prompts.predict_objects.as_str(),
                std::slice::from_ref(&file_ref),
                token.as_str(),
            )
            .await?;

        let outcome = parse_string_list(raw.as_str());
        if let Some(reason) = outcome.degraded_reason() {
            warn!(reason, raw, "object prediction degraded to an empty list");
        }
        Ok(outcome.into_value())
    }

    async fn ensure_uploaded(
        &self,
        image: &[u8],
        existing_ref: Option<&str>,
    ) -> Result<String, ProviderError> {
        if let Some(existing) = existing_ref.map(str::trim).filter(|v| !v.is_empty()) {
            debug!(file_ref = existing, "reusing stored upload reference");
            return Ok(existing.to_string());
        }
        let token = self.tokens.get_token().await?;
        self.uploads
            .get_or_upload(image, UPLOAD_FILENAME, token.as_str())
            .await
    }

    async fn predict_materials(
        &self,
        image: &[u8],
        items: &[String],
        existing_ref: Option<&str>,
    ) -> Result<HashMap<String, Vec<String>>, ProviderError> {
        let token = self.tokens.get_token().await?;
        let file_ref = self.ensure_uploaded(image, existing_ref).await?;

        let prompt = self.prompts.render_materials_prompt(items);
        let raw = self
            .client
            .chat(
                prompt.as_str(),
                std::slice::from_ref(&file_ref),
                token.as_str(),
            )
            .await?;

        let outcome = parse_materials_map(raw.as_str());
        if let Some(reason) = outcome.degraded_reason() {
            warn!(reason, raw, "material prediction degraded to an empty map");
        }
        Ok(outcome.into_value())
    }
}
