use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::analysis::AnalysisService;
use crate::api::analyze::{analyze_handler, confirm_handler};
use crate::db::analysis::AnalysisStore;
use crate::db::resolve_db_config;
use crate::fetch::HttpImageFetcher;
use crate::provider::prompts::PromptCatalog;
use crate::provider::{resolve_provider_config, ProviderClient, ProviderVisionService};

#[derive(Clone)]
pub struct AppState {
    pub service_name: &'static str,
    pub service_version: &'static str,
    pub started_unix_ms: u128,
    pub analysis: Arc<AnalysisService>,
}

impl AppState {
    pub fn new(analysis: Arc<AnalysisService>) -> Self {
        Self {
            service_name: "materia-backend-core",
            service_version: env!("CARGO_PKG_VERSION"),
            started_unix_ms: now_unix_ms(),
            analysis,
        }
    }
}

pub fn build_router() -> Router {
    let repo_root = default_repo_root();
    let db = resolve_db_config(repo_root.as_path());
    let store = Arc::new(AnalysisStore::new(db.app_db_path));
    store
        .initialize()
        .expect("analysis store should initialize schema");

    let provider = resolve_provider_config();
    if provider.client_id.is_empty() || provider.client_secret.is_empty() {
        warn!("provider credentials are not configured; provider calls will be rejected upstream");
    }
    let vision = ProviderVisionService::new(
        ProviderClient::new(provider),
        PromptCatalog::from_env(),
    );
    let analysis = Arc::new(AnalysisService::new(
        Arc::new(HttpImageFetcher::default()),
        Arc::new(vision),
        store,
    ));
    build_router_with_analysis(analysis)
}

pub fn build_router_with_analysis(analysis: Arc<AnalysisService>) -> Router {
    let state = AppState::new(analysis);
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/analyze/{requestId}/confirm", post(confirm_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = build_router();
    info!(bind = %addr, "starting materia-backend-core HTTP surface");
    axum::serve(listener, app).await
}

fn default_repo_root() -> PathBuf {
    let fallback = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    fallback.canonicalize().unwrap_or(fallback)
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "status": "ok",
            "service": state.service_name,
            "version": state.service_version,
            "started_unix_ms": state.started_unix_ms,
        })),
    )
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}
