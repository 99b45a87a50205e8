use base64::prelude::{Engine, BASE64_STANDARD};
use reqwest::header;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::provider::ProviderConfig;

/// Candidate field names for the upload reference, tried in order. The
/// provider has answered with several shapes over time; the first
/// structural match wins.
const FILE_REF_ROOT_FIELDS: [&str; 3] = ["url", "file_url", "id"];
const FILE_REF_DATA_FIELDS: [&str; 4] = ["url", "file_url", "file", "id"];

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("credential exchange failed: {0}")]
    Authentication(String),

    #[error("file upload failed ({status}): {body}")]
    Upload { status: u16, body: String },

    #[error("chat completion failed ({status}): {body}")]
    Chat { status: u16, body: String },

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Result of a successful credential exchange. The expiry fields are kept
/// raw because the provider expresses them three different ways; the token
/// cache derives an instant from whichever is present.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: Option<Value>,
    pub expires_at: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawTokenGrant {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(default)]
    expires_at: Option<Value>,
}

/// Low-level request/response plumbing for the provider's auth, file and
/// chat-completion endpoints. Holds no mutable state; the caches above it
/// own token and upload lifecycles.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_http(reqwest::Client::new(), config)
    }

    pub fn with_http(http: reqwest::Client, config: ProviderConfig) -> Self {
        Self { http, config }
    }

    /// Exchanges client credentials for a bearer token. Each attempt sends
    /// a fresh RqUID correlation header.
    pub async fn authenticate(&self) -> Result<TokenGrant, ProviderError> {
        let basic = BASE64_STANDARD.encode(format!(
            "{}:{}",
            self.config.client_id, self.config.client_secret
        ));
        let response = self
            .http
            .post(self.config.auth_url.as_str())
            .header(header::AUTHORIZATION, format!("Basic {basic}"))
            .header("RqUID", Uuid::new_v4().to_string())
            .form(&[("scope", self.config.scope.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Authentication(format!(
                "exchange returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let raw: RawTokenGrant = serde_json::from_str(body.as_str()).map_err(|error| {
            ProviderError::Authentication(format!("exchange returned invalid JSON: {error}"))
        })?;
        let access_token = raw
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ProviderError::Authentication(String::from(
                    "token response is missing access_token",
                ))
            })?;

        Ok(TokenGrant {
            access_token,
            expires_in: raw.expires_in,
            expires_at: raw.expires_at,
        })
    }

    /// Uploads a file and returns the provider-assigned reference.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        token: &str,
    ) -> Result<String, ProviderError> {
        let content_type = sniff_content_type(bytes.as_slice());
        debug!(
            url = %self.config.files_url,
            purpose = %self.config.upload_purpose,
            content_type,
            "uploading file to provider"
        );

        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = multipart::Form::new()
            .text("purpose", self.config.upload_purpose.clone())
            .text("filename", filename.to_string())
            .part("file", part);

        let response = self
            .http
            .post(self.config.files_url.as_str())
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Upload {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value =
            serde_json::from_str(body.as_str()).map_err(|_| ProviderError::Upload {
                status: status.as_u16(),
                body: body.clone(),
            })?;
        extract_file_ref(&payload).ok_or(ProviderError::Upload {
            status: status.as_u16(),
            body,
        })
    }

    /// Sends one user message with the given attachments and returns the
    /// first choice's message content.
    pub async fn chat(
        &self,
        prompt: &str,
        attachments: &[String],
        token: &str,
    ) -> Result<String, ProviderError> {
        let payload = chat_request_body(self.config.model.as_str(), prompt, attachments);
        debug!(url = %self.config.api_url, "sending chat completion request");

        let response = self
            .http
            .post(self.config.api_url.as_str())
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Chat {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = serde_json::from_str(body.as_str()).map_err(|_| ProviderError::Chat {
            status: status.as_u16(),
            body: body.clone(),
        })?;
        extract_chat_content(&value)
            .map(str::to_string)
            .ok_or(ProviderError::Chat {
                status: status.as_u16(),
                body,
            })
    }
}

fn chat_request_body(model: &str, prompt: &str, attachments: &[String]) -> Value {
    serde_json::json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": prompt,
            "attachments": attachments,
        }],
        "temperature": 0.1,
        "max_tokens": 300,
    })
}

fn sniff_content_type(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, ..] => "image/jpeg",
        [0x89, 0x50, ..] => "image/png",
        _ => "application/octet-stream",
    }
}

fn extract_file_ref(payload: &Value) -> Option<String> {
    for field in FILE_REF_ROOT_FIELDS {
        if let Some(value) = payload.get(field).and_then(Value::as_str) {
            return Some(value.to_string());
        }
    }
    let data = payload.get("data")?.as_object()?;
    for field in FILE_REF_DATA_FIELDS {
        if let Some(value) = data.get(field).and_then(Value::as_str) {
            return Some(value.to_string());
        }
    }
    None
}

fn extract_chat_content(payload: &Value) -> Option<&str> {
    payload
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}
