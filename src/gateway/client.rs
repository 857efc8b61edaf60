use crate::gateway::error::{GatewayError, GatewayResult};
use crate::gateway::types::{CreateGatewayOrder, GatewayOrder};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{info, warn};

/// The gateway is the only source of truth for "was this actually paid".
/// The reconciliation engine talks to it through this trait so tests can
/// substitute a scripted gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: CreateGatewayOrder) -> GatewayResult<GatewayOrder>;

    async fn get_order(&self, gateway_order_id: &str) -> GatewayResult<GatewayOrder>;
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for RazorpayConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            key_secret: String::new(),
            base_url: "https://api.razorpay.com/v1".to_string(),
            timeout_secs: 15,
        }
    }
}

impl RazorpayConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let key_id = std::env::var("RAZORPAY_KEY_ID").map_err(|_| GatewayError::Configuration {
            message: "RAZORPAY_KEY_ID environment variable is required".to_string(),
        })?;
        let key_secret =
            std::env::var("RAZORPAY_KEY_SECRET").map_err(|_| GatewayError::Configuration {
                message: "RAZORPAY_KEY_SECRET environment variable is required".to_string(),
            })?;

        Ok(Self {
            key_id,
            key_secret,
            base_url: std::env::var("RAZORPAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string()),
            timeout_secs: std::env::var("RAZORPAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(15),
        })
    }
}

/// Razorpay Orders API client. Basic-auth credentialed, bounded timeout,
/// single attempt per call: retry policy belongs to the caller so that
/// reconciliation stays idempotent and side-effect-bounded.
pub struct RazorpayGateway {
    config: RazorpayConfig,
    http: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Configuration {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> GatewayResult<Self> {
        Self::new(RazorpayConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> GatewayResult<T> {
        let mut request = self
            .http
            .request(method, url)
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret));
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable {
                message: if e.is_timeout() {
                    "gateway request timed out".to_string()
                } else {
                    format!("gateway request failed: {}", e)
                },
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            return serde_json::from_str::<T>(&text).map_err(|e| GatewayError::InvalidResponse {
                message: format!("invalid gateway JSON response: {}", e),
            });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GatewayError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if status.is_server_error() {
            warn!(status = %status, "gateway server error");
            return Err(GatewayError::Unavailable {
                message: format!("gateway returned HTTP {}", status),
            });
        }

        Err(GatewayError::Validation {
            status: status.as_u16(),
            message: extract_error_description(&text)
                .unwrap_or_else(|| format!("gateway returned HTTP {}", status)),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(&self, request: CreateGatewayOrder) -> GatewayResult<GatewayOrder> {
        if request.amount <= 0 {
            return Err(GatewayError::Validation {
                status: 0,
                message: "amount must be a positive number of minor units".to_string(),
            });
        }

        let payload = serde_json::json!({
            "amount": request.amount,
            "currency": request.currency,
            "receipt": request.receipt,
            "notes": request.notes,
        });

        let order: GatewayOrder = self
            .request_json(reqwest::Method::POST, &self.endpoint("/orders"), Some(&payload))
            .await?;
        info!(gateway_order_id = %order.id, amount = order.amount, "gateway order created");
        Ok(order)
    }

    async fn get_order(&self, gateway_order_id: &str) -> GatewayResult<GatewayOrder> {
        if gateway_order_id.trim().is_empty() {
            return Err(GatewayError::Validation {
                status: 0,
                message: "gateway order id is required".to_string(),
            });
        }
        self.request_json(
            reqwest::Method::GET,
            &self.endpoint(&format!("/orders/{}", gateway_order_id)),
            None,
        )
        .await
    }
}

/// Pull the human-readable description out of a gateway error body
/// (`{"error": {"code": ..., "description": ...}}`) without propagating the
/// rest of the body.
fn extract_error_description(body: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    parsed
        .get("error")
        .and_then(|e| e.get("description"))
        .and_then(|d| d.as_str())
        .map(|d| d.to_string())
}
