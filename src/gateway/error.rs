use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure taxonomy for the payment gateway client.
///
/// `Configuration` means the integration cannot even be constructed
/// (missing or invalid credentials in the environment); `Unauthorized`
/// means the gateway rejected the credentials it was given. Both are fatal
/// until an operator fixes them and never evidence that a payment failed.
/// `Unavailable` covers network errors, timeouts and 5xx responses and is
/// the only retryable variant.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("gateway configuration error: {message}")]
    Configuration { message: String },

    #[error("gateway rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("gateway unavailable: {message}")]
    Unavailable { message: String },

    #[error("gateway rejected request (HTTP {status}): {message}")]
    Validation { status: u16, message: String },

    #[error("invalid gateway response: {message}")]
    InvalidResponse { message: String },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable { .. })
    }

    /// Message safe to show a caller. Never includes raw gateway bodies.
    pub fn user_message(&self) -> &'static str {
        match self {
            GatewayError::Configuration { .. } => "Payment gateway integration is misconfigured",
            GatewayError::Unauthorized { .. } => "Payment gateway integration is misconfigured",
            GatewayError::Unavailable { .. } => "Payment gateway is temporarily unavailable",
            GatewayError::Validation { .. } => "Payment gateway rejected the request",
            GatewayError::InvalidResponse { .. } => "Payment gateway returned an invalid response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(GatewayError::Unavailable {
            message: "timeout".to_string()
        }
        .is_retryable());
        assert!(!GatewayError::Unauthorized { status: 401 }.is_retryable());
        assert!(!GatewayError::Configuration {
            message: "RAZORPAY_KEY_ID environment variable is required".to_string()
        }
        .is_retryable());
        assert!(!GatewayError::Validation {
            status: 400,
            message: "bad amount".to_string()
        }
        .is_retryable());
        assert!(!GatewayError::InvalidResponse {
            message: "truncated".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn user_messages_do_not_leak_details() {
        let err = GatewayError::Validation {
            status: 400,
            message: "raw gateway body with account details".to_string(),
        };
        assert!(!err.user_message().contains("account details"));
    }
}
