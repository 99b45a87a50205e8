use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::db::analysis::{AnalysisRepoError, AnalysisStore, NewItem};
use crate::fetch::{DownloadError, ImageFetcher};
use crate::provider::{ProviderError, VisionService};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis request not found")]
    NotFound,

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("storage error: {0}")]
    Repo(rusqlite::Error),

    #[error("{0}")]
    Internal(String),
}

impl From<AnalysisRepoError> for AnalysisError {
    fn from(error: AnalysisRepoError) -> Self {
        match error {
            AnalysisRepoError::NotFound => Self::NotFound,
            AnalysisRepoError::Sqlite(source) => Self::Repo(source),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzeOutcome {
    pub request_id: i64,
    pub predicted_items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedItem {
    pub item_name: String,
    pub materials: Vec<String>,
}

/// Sequences fetch, upload resolution, chat and persistence into the two
/// public operations. All mutable state lives in the collaborators; one
/// instance serves every concurrent request.
pub struct AnalysisService {
    fetcher: Arc<dyn ImageFetcher>,
    vision: Arc<dyn VisionService>,
    store: Arc<AnalysisStore>,
}

impl AnalysisService {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        vision: Arc<dyn VisionService>,
        store: Arc<AnalysisStore>,
    ) -> Self {
        Self {
            fetcher,
            vision,
            store,
        }
    }

    pub async fn analyze(&self, image_url: &str) -> Result<AnalyzeOutcome, AnalysisError> {
        let bytes = self.fetcher.download(image_url).await?;
        let predicted = self.vision.predict_main_objects(bytes.as_slice()).await?;

        let raw_response = serde_json::to_string(&predicted)
            .map_err(|error| AnalysisError::Internal(format!("raw response encoding: {error}")))?;
        let url = image_url.to_string();
        let record = self
            .run_store(move |store| store.create_request(url.as_str(), raw_response.as_str()))
            .await?;

        info!(
            request_id = record.id,
            predicted = predicted.len(),
            "image analyzed"
        );
        Ok(AnalyzeOutcome {
            request_id: record.id,
            predicted_items: predicted,
        })
    }

    pub async fn confirm(
        &self,
        request_id: i64,
        confirmed_names: &[String],
    ) -> Result<Vec<ConfirmedItem>, AnalysisError> {
        let request = self
            .run_store(move |store| store.get_request(request_id))
            .await?;

        // The image is re-fetched even when an upload reference is already
        // stored; only the upload itself is skipped in that case.
        let bytes = self.fetcher.download(request.image_url.as_str()).await?;

        let file_ref = match request
            .uploaded_file_ref
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            Some(existing) => existing.to_string(),
            None => {
                let file_ref = self.vision.ensure_uploaded(bytes.as_slice(), None).await?;
                let to_persist = file_ref.clone();
                let won = self
                    .run_store(move |store| {
                        store.set_uploaded_file_ref(request_id, to_persist.as_str())
                    })
                    .await?;
                if !won {
                    debug!(
                        request_id,
                        "upload reference already persisted by a concurrent confirm"
                    );
                }
                file_ref
            }
        };

        let materials_map = self
            .vision
            .predict_materials(bytes.as_slice(), confirmed_names, Some(file_ref.as_str()))
            .await?;

        let mut response = Vec::with_capacity(confirmed_names.len());
        let mut new_items = Vec::with_capacity(confirmed_names.len());
        for name in confirmed_names {
            // Absent key means the provider said nothing about this item;
            // the response keeps the raw list, the store deduplicates.
            let materials = materials_map.get(name).cloned().unwrap_or_default();
            new_items.push(NewItem {
                name: name.clone(),
                materials: materials.clone(),
            });
            response.push(ConfirmedItem {
                item_name: name.clone(),
                materials,
            });
        }

        self.run_store(move |store| store.add_confirmed_items(request_id, new_items.as_slice()))
            .await?;

        info!(request_id, items = response.len(), "items confirmed");
        Ok(response)
    }

    async fn run_store<T, F>(&self, func: F) -> Result<T, AnalysisError>
    where
        T: Send + 'static,
        F: FnOnce(AnalysisStore) -> Result<T, AnalysisRepoError> + Send + 'static,
    {
        let store = (*self.store).clone();
        tokio::task::spawn_blocking(move || func(store))
            .await
            .map_err(|join_error| {
                AnalysisError::Internal(format!("storage task failed: {join_error}"))
            })?
            .map_err(AnalysisError::from)
    }
}
