use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::provider::client::{ProviderClient, ProviderError, TokenGrant};

/// Safety margin subtracted from whatever expiry the provider reports.
const EXPIRY_MARGIN_SECS: i64 = 60;
/// Values above this are absolute Unix timestamps, not TTLs in seconds.
const EPOCH_THRESHOLD: i64 = 1_000_000_000;

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn authenticate(&self) -> Result<TokenGrant, ProviderError>;
}

#[async_trait]
impl TokenSource for ProviderClient {
    async fn authenticate(&self) -> Result<TokenGrant, ProviderError> {
        ProviderClient::authenticate(self).await
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Shared bearer-credential cache. The exchange runs while holding the
/// internal mutex, so concurrent callers wait for one winning refresh
/// instead of racing their own. A failed exchange leaves the cache
/// untouched and the next caller retries.
pub struct AccessTokenCache {
    source: Arc<dyn TokenSource>,
    state: Mutex<Option<CachedToken>>,
}

impl AccessTokenCache {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            state: Mutex::new(None),
        }
    }

    pub async fn get_token(&self) -> Result<String, ProviderError> {
        self.get_token_at(Utc::now()).await
    }

    async fn get_token_at(&self, now: DateTime<Utc>) -> Result<String, ProviderError> {
        let mut state = self.state.lock().await;
        if let Some(cached) = state.as_ref() {
            if now < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        let grant = self.source.authenticate().await?;
        let expires_at = derive_expiry(&grant, now);
        debug!(%expires_at, "refreshed provider access token");
        let token = grant.access_token;
        *state = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }
}

/// Derives the cache expiry from a token grant. The provider expresses
/// lifetime three ways: `expires_in` as seconds-to-live, `expires_at` as
/// either epoch seconds or a TTL (disambiguated by magnitude), or
/// `expires_at` as an ISO timestamp string.
fn derive_expiry(grant: &TokenGrant, now: DateTime<Utc>) -> DateTime<Utc> {
    let mut ttl_seconds: Option<i64> = None;
    let mut absolute: Option<DateTime<Utc>> = None;

    if let Some(value) = grant.expires_in.as_ref() {
        ttl_seconds = flexible_i64(value);
    }

    if ttl_seconds.is_none() {
        if let Some(value) = grant.expires_at.as_ref() {
            if let Some(n) = flexible_i64(value) {
                if n > EPOCH_THRESHOLD {
                    match Utc.timestamp_opt(n, 0).single() {
                        Some(instant) => absolute = Some(instant),
                        None => ttl_seconds = Some(n),
                    }
                } else {
                    ttl_seconds = Some(n);
                }
            } else if let Some(text) = value.as_str() {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                    absolute = Some(parsed.with_timezone(&Utc));
                }
            }
        }
    }

    if let Some(instant) = absolute {
        return instant - Duration::seconds(EXPIRY_MARGIN_SECS);
    }
    if let Some(ttl) = ttl_seconds {
        let seconds = (ttl - EXPIRY_MARGIN_SECS).max(0);
        return Duration::try_seconds(seconds)
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or_else(|| now + Duration::hours(1));
    }
    now + Duration::minutes(5)
}

fn flexible_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
