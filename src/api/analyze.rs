use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::api::error::ErrorKind;
use crate::api::handler_utils::{error_response, into_json, map_analysis_error, ApiObject};
use crate::api::server::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeRequestBody {
    #[serde(rename = "imageUrl", default)]
    pub image_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmRequestBody {
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestIdPath {
    #[serde(rename = "requestId")]
    pub request_id: i64,
}

#[derive(Debug, Clone, Serialize)]
struct AnalyzeResponse {
    ok: bool,
    #[serde(rename = "requestId")]
    request_id: i64,
    #[serde(rename = "predictedItems")]
    predicted_items: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ConfirmedItemPayload {
    #[serde(rename = "itemName")]
    item_name: String,
    materials: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ConfirmResponse {
    ok: bool,
    items: Vec<ConfirmedItemPayload>,
}

pub async fn analyze_handler(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequestBody>,
) -> ApiObject<Value> {
    let image_url = payload.image_url.trim();
    if image_url.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "validation_error",
            "Field 'imageUrl' is required",
        );
    }
    if Url::parse(image_url).is_err() {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "validation_error",
            "Field 'imageUrl' must be an absolute URL",
        );
    }

    match state.analysis.analyze(image_url).await {
        Ok(outcome) => (
            StatusCode::OK,
            into_json(AnalyzeResponse {
                ok: true,
                request_id: outcome.request_id,
                predicted_items: outcome.predicted_items,
            }),
        ),
        Err(error) => map_analysis_error(error, "Analysis request not found"),
    }
}

pub async fn confirm_handler(
    State(state): State<AppState>,
    Path(path): Path<RequestIdPath>,
    Json(payload): Json<ConfirmRequestBody>,
) -> ApiObject<Value> {
    if payload.items.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "validation_error",
            "Field 'items' must not be empty",
        );
    }

    match state
        .analysis
        .confirm(path.request_id, payload.items.as_slice())
        .await
    {
        Ok(items) => (
            StatusCode::OK,
            into_json(ConfirmResponse {
                ok: true,
                items: items
                    .into_iter()
                    .map(|item| ConfirmedItemPayload {
                        item_name: item.item_name,
                        materials: item.materials,
                    })
                    .collect(),
            }),
        ),
        Err(error) => map_analysis_error(error, "Analysis request not found"),
    }
}
