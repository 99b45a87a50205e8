pub mod auth;
pub mod client;
pub mod parse;
pub mod prompts;
pub mod service;
pub mod upload_cache;

pub use client::{ProviderClient, ProviderError};
pub use service::{ProviderVisionService, VisionService};

const DEFAULT_AUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";
const DEFAULT_API_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1/chat/completions";
const DEFAULT_FILES_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1/files";
const DEFAULT_SCOPE: &str = "GIGACHAT_API_PERS";
const DEFAULT_MODEL: &str = "GigaChat";
const DEFAULT_UPLOAD_PURPOSE: &str = "general";

/// Connection settings for the remote vision/chat provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub auth_url: String,
    pub api_url: String,
    pub files_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub model: String,
    pub upload_purpose: String,
}

pub fn resolve_provider_config() -> ProviderConfig {
    select_provider_config(
        env_opt("MATERIA_PROVIDER_AUTH_URL").as_deref(),
        env_opt("MATERIA_PROVIDER_API_URL").as_deref(),
        env_opt("MATERIA_PROVIDER_FILES_URL").as_deref(),
        env_opt("MATERIA_PROVIDER_CLIENT_ID").as_deref(),
        env_opt("MATERIA_PROVIDER_CLIENT_SECRET").as_deref(),
        env_opt("MATERIA_PROVIDER_SCOPE").as_deref(),
        env_opt("MATERIA_PROVIDER_MODEL").as_deref(),
        env_opt("MATERIA_PROVIDER_UPLOAD_PURPOSE").as_deref(),
    )
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[allow(clippy::too_many_arguments)]
fn select_provider_config(
    auth_url: Option<&str>,
    api_url: Option<&str>,
    files_url: Option<&str>,
    client_id: Option<&str>,
    client_secret: Option<&str>,
    scope: Option<&str>,
    model: Option<&str>,
    upload_purpose: Option<&str>,
) -> ProviderConfig {
    ProviderConfig {
        auth_url: pick(auth_url, DEFAULT_AUTH_URL),
        api_url: pick(api_url, DEFAULT_API_URL),
        files_url: pick(files_url, DEFAULT_FILES_URL),
        client_id: pick(client_id, ""),
        client_secret: pick(client_secret, ""),
        scope: pick(scope, DEFAULT_SCOPE),
        model: pick(model, DEFAULT_MODEL),
        upload_purpose: pick(upload_purpose, DEFAULT_UPLOAD_PURPOSE),
    }
}

fn pick(value: Option<&str>, fallback: &str) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| String::from(fallback))
}
