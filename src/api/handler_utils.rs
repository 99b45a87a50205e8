use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::analysis::AnalysisError;
use crate::api::error::ErrorKind;

pub type ApiObject<T> = (StatusCode, Json<T>);

#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

pub fn error_response(
    status: StatusCode,
    kind: ErrorKind,
    code: impl Into<String>,
    message: impl Into<String>,
) -> ApiObject<Value> {
    (
        status,
        into_json(ErrorResponse {
            ok: false,
            error: message.into(),
            error_kind: Some(kind),
            error_code: Some(code.into()),
        }),
    )
}

pub fn map_analysis_error(error: AnalysisError, not_found_message: &str) -> ApiObject<Value> {
    match error {
        AnalysisError::NotFound => error_response(
            StatusCode::NOT_FOUND,
            ErrorKind::Validation,
            "not_found",
            not_found_message,
        ),
        AnalysisError::Download(source) => error_response(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "image_download_failed",
            source.to_string(),
        ),
        AnalysisError::Provider(source) => error_response(
            StatusCode::BAD_GATEWAY,
            ErrorKind::Provider,
            "provider_error",
            source.to_string(),
        ),
        AnalysisError::Repo(source) => internal_error(format!("database error: {source}")),
        AnalysisError::Internal(message) => internal_error(message),
    }
}

pub fn internal_error(message: impl Into<String>) -> ApiObject<Value> {
    let detail = message.into();
    error!(detail = %detail, "internal api error");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Infra,
        "internal_error",
        "Internal server error",
    )
}

pub fn into_json(payload: impl Serialize) -> Json<Value> {
    Json(serde_json::to_value(payload).expect("api payload should serialize"))
}
