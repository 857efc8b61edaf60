use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use crate::api::ApiState;
use crate::database::enrollment_repository::Entitlement;
use crate::middleware::error::{get_request_id_from_headers, json_error_response, ErrorResponse};
use crate::services::reconciliation::ConfirmationClaim;

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub entitlement: Entitlement,
    pub already_existed: bool,
}

/// POST /api/payments/verify
///
/// Accepts an untrusted confirmation claim from the checkout flow. The claim
/// is validated structurally here, then handed to the reconciliation engine;
/// the engine's typed failures map to status codes without leaking secrets
/// or raw gateway responses.
pub async fn verify_payment(
    State(state): State<ApiState>,
    headers: axum::http::HeaderMap,
    Json(claim): Json<ConfirmationClaim>,
) -> Result<Json<VerifyPaymentResponse>, (StatusCode, Json<ErrorResponse>)> {
    let request_id = get_request_id_from_headers(&headers);

    if let Err(message) = claim.validate() {
        return Err(json_error_response(
            StatusCode::BAD_REQUEST,
            message,
            request_id,
        ));
    }

    let order_id = claim.order_id.clone();
    let outcome = state.engine.reconcile(claim).await.map_err(|e| {
        warn!(order_id = %order_id, error = %e, "payment reconciliation failed");
        let status = StatusCode::from_u16(e.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse::new(e.user_message(), request_id.clone())
            .retryable(e.is_retryable());
        (status, Json(body))
    })?;

    Ok(Json(VerifyPaymentResponse {
        entitlement: outcome.entitlement,
        already_existed: outcome.already_existed,
    }))
}
