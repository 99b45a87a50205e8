use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use materia_backend_core::analysis::AnalysisService;
use materia_backend_core::api::server::build_router_with_analysis;
use materia_backend_core::db::analysis::AnalysisStore;
use materia_backend_core::fetch::{DownloadError, ImageFetcher};
use materia_backend_core::provider::{ProviderError, VisionService};

struct StaticFetcher {
    bytes: Vec<u8>,
}

#[async_trait]
impl ImageFetcher for StaticFetcher {
    async fn download(&self, _url: &str) -> Result<Vec<u8>, DownloadError> {
        Ok(self.bytes.clone())
    }
}

struct ScriptedVision {
    objects: Vec<String>,
    materials: HashMap<String, Vec<String>>,
    upload_ref: String,
    calls: AtomicUsize,
}

impl ScriptedVision {
    fn new(objects: &[&str], materials: HashMap<String, Vec<String>>) -> Self {
        Self {
            objects: objects.iter().map(|v| v.to_string()).collect(),
            materials,
            upload_ref: String::from("file-ref-1"),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VisionService for ScriptedVision {
    async fn predict_main_objects(&self, _image: &[u8]) -> Result<Vec<String>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.clone())
    }

    async fn ensure_uploaded(
        &self,
        _image: &[u8],
        existing_ref: Option<&str>,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(existing_ref.unwrap_or(self.upload_ref.as_str()).to_string())
    }

    async fn predict_materials(
        &self,
        _image: &[u8],
        _items: &[String],
        _existing_ref: Option<&str>,
    ) -> Result<HashMap<String, Vec<String>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.materials.clone())
    }
}

fn test_store() -> Arc<AnalysisStore> {
    let suffix = Uuid::new_v4().to_string();
    let db = std::env::temp_dir()
        .join(format!("materia_endpoint_test_{suffix}"))
        .join("app.db");
    let store = Arc::new(AnalysisStore::new(db));
    store.initialize().expect("store should initialize");
    store
}

fn test_app(vision: Arc<ScriptedVision>, store: Arc<AnalysisStore>) -> Router {
    let service = AnalysisService::new(
        Arc::new(StaticFetcher {
            bytes: b"\xff\xd8jpeg".to_vec(),
        }),
        vision,
        store,
    );
    build_router_with_analysis(Arc::new(service))
}

async fn send_json(
    app: Router,
    method: Method,
    uri: &str,
    body: Body,
    expected_status: StatusCode,
) -> Value {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .expect("request should build");

    let response = app.oneshot(request).await.expect("request should succeed");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let payload: Value = serde_json::from_slice(bytes.as_ref()).expect("body should be json");
    assert_eq!(status, expected_status, "unexpected status: {payload}");
    payload
}

#[tokio::test]
async fn analyze_then_confirm_returns_predictions_and_materials() {
    let store = test_store();
    let mut materials = HashMap::new();
    materials.insert(
        String::from("chair"),
        vec![
            String::from("wood"),
            String::from("fabric"),
            String::from("wood"),
        ],
    );
    materials.insert(String::from("lamp"), vec![String::from("metal")]);
    let vision = Arc::new(ScriptedVision::new(&["chair", "lamp"], materials));
    let app = test_app(vision, store.clone());

    let analyzed = send_json(
        app.clone(),
        Method::POST,
        "/api/analyze",
        Body::from(r#"{"imageUrl":"http://img.example/photo.jpg"}"#),
        StatusCode::OK,
    )
    .await;
    assert_eq!(analyzed["ok"], json!(true));
    assert_eq!(analyzed["predictedItems"], json!(["chair", "lamp"]));
    let request_id = analyzed["requestId"]
        .as_i64()
        .expect("request id should be numeric");

    let confirmed = send_json(
        app,
        Method::POST,
        &format!("/api/analyze/{request_id}/confirm"),
        Body::from(r#"{"items":["chair","lamp"]}"#),
        StatusCode::OK,
    )
    .await;
    assert_eq!(confirmed["ok"], json!(true));
    assert_eq!(confirmed["items"][0]["itemName"], json!("chair"));
    // The response carries the provider output verbatim, duplicates included.
    assert_eq!(
        confirmed["items"][0]["materials"],
        json!(["wood", "fabric", "wood"])
    );
    assert_eq!(confirmed["items"][1]["materials"], json!(["metal"]));

    // Persistence deduplicates: chair links to wood and fabric only.
    let persisted = store.list_items(request_id).expect("items should list");
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted[0].materials, vec!["wood", "fabric"]);
    assert_eq!(store.count_materials().expect("count"), 3);
}

#[tokio::test]
async fn confirm_unknown_request_returns_not_found_without_provider_calls() {
    let vision = Arc::new(ScriptedVision::new(&[], HashMap::new()));
    let app = test_app(vision.clone(), test_store());

    let payload = send_json(
        app,
        Method::POST,
        "/api/analyze/4242/confirm",
        Body::from(r#"{"items":["chair"]}"#),
        StatusCode::NOT_FOUND,
    )
    .await;
    assert_eq!(payload["ok"], json!(false));
    assert_eq!(payload["error"], json!("Analysis request not found"));
    assert_eq!(payload["error_code"], json!("not_found"));
    assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn analyze_rejects_missing_and_malformed_image_urls() {
    let vision = Arc::new(ScriptedVision::new(&[], HashMap::new()));
    let app = test_app(vision.clone(), test_store());

    let missing = send_json(
        app.clone(),
        Method::POST,
        "/api/analyze",
        Body::from(r#"{}"#),
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(missing["ok"], json!(false));
    assert_eq!(missing["error_kind"], json!("validation"));

    let malformed = send_json(
        app,
        Method::POST,
        "/api/analyze",
        Body::from(r#"{"imageUrl":"not a url"}"#),
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(malformed["error_code"], json!("validation_error"));
    assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn confirm_rejects_an_empty_item_list() {
    let vision = Arc::new(ScriptedVision::new(&[], HashMap::new()));
    let store = test_store();
    let request = store
        .create_request("http://img.example/photo.jpg", "[]")
        .expect("seed request");
    let app = test_app(vision.clone(), store);

    let payload = send_json(
        app,
        Method::POST,
        &format!("/api/analyze/{}/confirm", request.id),
        Body::from(r#"{"items":[]}"#),
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(payload["ok"], json!(false));
    assert_eq!(payload["error_kind"], json!("validation"));
    assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn health_reports_service_identity() {
    let vision = Arc::new(ScriptedVision::new(&[], HashMap::new()));
    let app = test_app(vision, test_store());

    let payload = send_json(app, Method::GET, "/health", Body::empty(), StatusCode::OK).await;
    assert_eq!(payload["ok"], json!(true));
    assert_eq!(payload["service"], json!("materia-backend-core"));
    assert_eq!(payload["status"], json!("ok"));
}
