use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::ApiState;
use crate::middleware::error::{get_request_id_from_headers, json_error_response, ErrorResponse};
use crate::services::reconciliation::CreateOrderInput;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub amount_minor_units: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub subject_id: String,
    pub resource_id: String,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

fn default_currency() -> String {
    "INR".to_string()
}

/// Structured order creation result. Checkout reads these fields directly;
/// nothing here ever needs to be scraped out of prose.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub gateway_order_id: Option<String>,
    pub amount_minor_units: i64,
    pub currency: String,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<crate::database::order_repository::Order> for OrderResponse {
    fn from(order: crate::database::order_repository::Order) -> Self {
        Self {
            order_id: order.order_id,
            gateway_order_id: order.gateway_order_id,
            amount_minor_units: order.amount_minor_units,
            currency: order.currency,
            status: order.status,
            created_at: order.created_at,
        }
    }
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<ApiState>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, (StatusCode, Json<ErrorResponse>)> {
    let request_id = get_request_id_from_headers(&headers);

    let order = state
        .engine
        .create_order(CreateOrderInput {
            amount_minor_units: payload.amount_minor_units,
            currency: payload.currency,
            subject_id: payload.subject_id,
            resource_id: payload.resource_id,
            notes: payload.notes,
        })
        .await
        .map_err(|e| {
            json_error_response(
                StatusCode::from_u16(e.http_status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                e.user_message(),
                request_id,
            )
        })?;

    Ok(Json(order.into()))
}

/// GET /api/orders/{order_id}
pub async fn get_order(
    State(state): State<ApiState>,
    Path(order_id): Path<String>,
    headers: axum::http::HeaderMap,
) -> Result<Json<OrderResponse>, (StatusCode, Json<ErrorResponse>)> {
    let request_id = get_request_id_from_headers(&headers);

    let order = state
        .engine
        .get_order_status(&order_id)
        .await
        .map_err(|e| {
            json_error_response(
                StatusCode::from_u16(e.http_status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                e.user_message(),
                request_id,
            )
        })?;

    Ok(Json(order.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_order_request_defaults_currency() {
        let payload = serde_json::json!({
            "amount_minor_units": 499900,
            "subject_id": "user_1",
            "resource_id": "course_1"
        });
        let request: CreateOrderRequest =
            serde_json::from_value(payload).expect("deserialization should succeed");
        assert_eq!(request.currency, "INR");
        assert!(request.notes.is_empty());
    }
}
