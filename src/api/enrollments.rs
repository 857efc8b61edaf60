use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::error;

use crate::api::ApiState;
use crate::database::enrollment_repository::Entitlement;
use crate::database::error::DatabaseError;
use crate::middleware::error::{get_request_id_from_headers, json_error_response, ErrorResponse};
use crate::services::reconciliation::ReconcileError;

/// Storage failures are logged with full detail here and reach the client
/// only as the sanitized store-error message.
fn storage_error_response(
    err: DatabaseError,
    request_id: Option<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    error!(error = %err, "enrollment lookup failed");
    let err = ReconcileError::Store(err);
    let status = StatusCode::from_u16(err.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorResponse::new(err.user_message(), request_id).retryable(err.is_retryable());
    (status, Json(body))
}

/// GET /api/enrollments/{subject_id}
pub async fn list_enrollments(
    State(state): State<ApiState>,
    Path(subject_id): Path<String>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Vec<Entitlement>>, (StatusCode, Json<ErrorResponse>)> {
    let request_id = get_request_id_from_headers(&headers);

    state
        .engine
        .list_entitlements(&subject_id)
        .await
        .map(Json)
        .map_err(|e| storage_error_response(e, request_id))
}

/// GET /api/enrollments/{subject_id}/{resource_id}
pub async fn get_enrollment(
    State(state): State<ApiState>,
    Path((subject_id, resource_id)): Path<(String, String)>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Entitlement>, (StatusCode, Json<ErrorResponse>)> {
    let request_id = get_request_id_from_headers(&headers);

    let entitlement = state
        .engine
        .get_entitlement(&subject_id, &resource_id)
        .await
        .map_err(|e| storage_error_response(e, request_id.clone()))?;

    entitlement.map(Json).ok_or_else(|| {
        json_error_response(StatusCode::NOT_FOUND, "Enrollment not found", request_id)
    })
}
