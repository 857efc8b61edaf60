//! Payment reconciliation engine.
//!
//! Turns an untrusted client-side payment confirmation into a durable
//! entitlement: verify the claim signature, re-fetch authoritative order
//! state from the gateway, enforce amount/currency/status, then apply the
//! conditional `created -> paid` transition and the atomic entitlement
//! insert. Every step is idempotent, so duplicate confirmations and retries
//! converge on the same single entitlement row.

use crate::database::enrollment_repository::{EnrollmentStore, Entitlement};
use crate::database::error::DatabaseError;
use crate::database::order_repository::{NewOrder, Order, OrderStatus, OrderStore};
use crate::gateway::client::PaymentGateway;
use crate::gateway::error::GatewayError;
use crate::gateway::signature::verify_claim_signature;
use crate::gateway::types::CreateGatewayOrder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Untrusted client-submitted assertion that a payment completed.
/// `claimed_amount` is advisory only and never used for authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationClaim {
    pub order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
    #[serde(default)]
    pub claimed_amount: Option<i64>,
}

impl ConfirmationClaim {
    /// Structural validation applied at the boundary, before the claim
    /// reaches the engine.
    pub fn validate(&self) -> Result<(), String> {
        if self.order_id.trim().is_empty() {
            return Err("order_id is required".to_string());
        }
        if self.gateway_payment_id.trim().is_empty() {
            return Err("gateway_payment_id is required".to_string());
        }
        if self.signature.trim().is_empty() {
            return Err("signature is required".to_string());
        }
        Ok(())
    }
}

/// Result of a successful reconciliation. `already_existed` is `true` when a
/// previous call (or a concurrent one) granted the entitlement first.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub entitlement: Entitlement,
    pub already_existed: bool,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("order not found: {order_id}")]
    OrderNotFound { order_id: String },

    #[error("invalid payment signature")]
    InvalidSignature,

    #[error("verification temporarily unavailable: {message}")]
    RetryableVerification { message: String },

    #[error("verification failed: {message}")]
    VerificationFailed { message: String },

    #[error("amount mismatch: order has {expected_minor_units} {expected_currency}, gateway reports {actual_minor_units} {actual_currency}")]
    AmountMismatch {
        expected_minor_units: i64,
        actual_minor_units: i64,
        expected_currency: String,
        actual_currency: String,
    },

    #[error("payment not completed: gateway reports status {status}")]
    PaymentNotCompleted { status: String },

    #[error("gateway credentials rejected")]
    GatewayUnauthorized,

    #[error("storage error: {0}")]
    Store(#[from] DatabaseError),
}

impl ReconcileError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::RetryableVerification { .. } => true,
            ReconcileError::Store(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            ReconcileError::OrderNotFound { .. } => 404,
            ReconcileError::InvalidSignature => 401,
            ReconcileError::RetryableVerification { .. } => 503,
            ReconcileError::VerificationFailed { .. } => 422,
            ReconcileError::AmountMismatch { .. } => 409,
            ReconcileError::PaymentNotCompleted { .. } => 409,
            ReconcileError::GatewayUnauthorized => 502,
            ReconcileError::Store(_) => 500,
        }
    }

    /// Message safe to show the end user. Distinguishes "payment failed"
    /// from "integration misconfigured" without exposing secrets or raw
    /// gateway responses.
    pub fn user_message(&self) -> String {
        match self {
            ReconcileError::OrderNotFound { .. } => "Order not found".to_string(),
            ReconcileError::InvalidSignature => "Payment confirmation could not be verified".to_string(),
            ReconcileError::RetryableVerification { .. } => {
                "Payment verification is temporarily unavailable. Please retry".to_string()
            }
            ReconcileError::VerificationFailed { .. } => "Payment verification failed".to_string(),
            ReconcileError::AmountMismatch { .. } => {
                "Paid amount does not match the order".to_string()
            }
            ReconcileError::PaymentNotCompleted { .. } => "Payment has not completed".to_string(),
            ReconcileError::GatewayUnauthorized => {
                "Payment system is misconfigured. Please contact support".to_string()
            }
            ReconcileError::Store(_) => "An internal error occurred".to_string(),
        }
    }
}

impl From<GatewayError> for ReconcileError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable { message } => {
                ReconcileError::RetryableVerification { message }
            }
            GatewayError::Unauthorized { .. } | GatewayError::Configuration { .. } => {
                ReconcileError::GatewayUnauthorized
            }
            GatewayError::Validation { message, .. } => {
                ReconcileError::VerificationFailed { message }
            }
            GatewayError::InvalidResponse { message } => {
                ReconcileError::VerificationFailed { message }
            }
        }
    }
}

/// Input for creating a payment intent. Subject and resource are snapshotted
/// into order metadata at creation time; the engine never queries the
/// catalog or user systems afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderInput {
    pub amount_minor_units: i64,
    pub currency: String,
    pub subject_id: String,
    pub resource_id: String,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum CreateOrderError {
    #[error("invalid order request: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("storage error: {0}")]
    Store(#[from] DatabaseError),
}

impl CreateOrderError {
    pub fn http_status_code(&self) -> u16 {
        match self {
            CreateOrderError::Validation { .. } => 400,
            CreateOrderError::Gateway(GatewayError::Unauthorized { .. }) => 502,
            CreateOrderError::Gateway(GatewayError::Unavailable { .. }) => 503,
            CreateOrderError::Gateway(_) => 502,
            CreateOrderError::Store(_) => 500,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            CreateOrderError::Validation { message } => message.clone(),
            CreateOrderError::Gateway(err) => err.user_message().to_string(),
            CreateOrderError::Store(_) => "An internal error occurred".to_string(),
        }
    }
}

pub struct ReconciliationEngine {
    orders: Arc<dyn OrderStore>,
    enrollments: Arc<dyn EnrollmentStore>,
    gateway: Arc<dyn PaymentGateway>,
    key_secret: String,
}

impl ReconciliationEngine {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        enrollments: Arc<dyn EnrollmentStore>,
        gateway: Arc<dyn PaymentGateway>,
        key_secret: String,
    ) -> Self {
        Self {
            orders,
            enrollments,
            gateway,
            key_secret,
        }
    }

    /// Create a payment intent: record the local order first, then register
    /// it with the gateway. A gateway failure leaves the local order without
    /// a `gateway_order_id`; such orders can never reconcile and fall under
    /// whatever external expiry policy the operator applies.
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<Order, CreateOrderError> {
        if input.amount_minor_units <= 0 {
            return Err(CreateOrderError::Validation {
                message: "amount_minor_units must be positive".to_string(),
            });
        }
        if input.currency.trim().is_empty() {
            return Err(CreateOrderError::Validation {
                message: "currency is required".to_string(),
            });
        }
        if input.subject_id.trim().is_empty() || input.resource_id.trim().is_empty() {
            return Err(CreateOrderError::Validation {
                message: "subject_id and resource_id are required".to_string(),
            });
        }

        let order_id = format!("order_{}", Uuid::new_v4().simple());

        let mut notes = input.notes;
        notes.insert("user_id".to_string(), input.subject_id.clone());
        notes.insert("course_id".to_string(), input.resource_id.clone());

        let order = self
            .orders
            .insert(NewOrder {
                order_id: order_id.clone(),
                amount_minor_units: input.amount_minor_units,
                currency: input.currency.clone(),
                metadata: serde_json::to_value(&notes).unwrap_or_default(),
            })
            .await?;

        let gateway_order = self
            .gateway
            .create_order(CreateGatewayOrder {
                amount: input.amount_minor_units,
                currency: input.currency,
                receipt: order_id.clone(),
                notes,
            })
            .await?;

        let order = self
            .orders
            .set_gateway_order_id(&order.order_id, &gateway_order.id)
            .await?;

        info!(
            order_id = %order.order_id,
            gateway_order_id = %gateway_order.id,
            amount_minor_units = order.amount_minor_units,
            "payment intent created"
        );
        Ok(order)
    }

    /// Reconcile a confirmation claim against authoritative gateway state.
    /// Safe to call repeatedly and concurrently for the same order.
    pub async fn reconcile(
        &self,
        claim: ConfirmationClaim,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let order = self
            .orders
            .find_by_id(&claim.order_id)
            .await?
            .ok_or_else(|| ReconcileError::OrderNotFound {
                order_id: claim.order_id.clone(),
            })?;

        // A bad signature may be an attacker probe, not evidence the real
        // payment failed: reject without touching the order.
        if !verify_claim_signature(
            &claim.order_id,
            &claim.gateway_payment_id,
            &claim.signature,
            &self.key_secret,
        ) {
            warn!(order_id = %claim.order_id, "confirmation claim failed signature verification");
            return Err(ReconcileError::InvalidSignature);
        }

        let gateway_order_id =
            order
                .gateway_order_id
                .as_deref()
                .ok_or_else(|| ReconcileError::VerificationFailed {
                    message: "order was never registered with the gateway".to_string(),
                })?;

        // Never trust client-supplied state: the gateway is the only source
        // of truth for whether this was actually paid.
        let gateway_order = self.gateway.get_order(gateway_order_id).await?;

        if !gateway_order.is_paid() {
            if gateway_order.is_terminal_failure() {
                self.orders
                    .transition_status(&order.order_id, OrderStatus::Created, OrderStatus::Failed)
                    .await?;
            }
            return Err(ReconcileError::PaymentNotCompleted {
                status: gateway_order.status,
            });
        }

        if gateway_order.amount != order.amount_minor_units
            || gateway_order.currency != order.currency
        {
            return Err(ReconcileError::AmountMismatch {
                expected_minor_units: order.amount_minor_units,
                actual_minor_units: gateway_order.amount,
                expected_currency: order.currency.clone(),
                actual_currency: gateway_order.currency,
            });
        }

        if let Some(claimed) = claim.claimed_amount {
            if claimed != order.amount_minor_units {
                // Advisory field only; the authoritative amount already
                // matched, so log the discrepancy and continue.
                warn!(
                    order_id = %order.order_id,
                    claimed_amount = claimed,
                    authoritative_amount = order.amount_minor_units,
                    "client-claimed amount disagrees with gateway"
                );
            }
        }

        let subject_id = order
            .subject_id()
            .ok_or_else(|| ReconcileError::VerificationFailed {
                message: "order metadata is missing user_id".to_string(),
            })?
            .to_string();
        let resource_id = order
            .resource_id()
            .ok_or_else(|| ReconcileError::VerificationFailed {
                message: "order metadata is missing course_id".to_string(),
            })?
            .to_string();

        let transitioned = self
            .orders
            .transition_status(&order.order_id, OrderStatus::Created, OrderStatus::Paid)
            .await?;
        if !transitioned {
            // Conditional update refused: re-read and decide. Already `paid`
            // means a duplicate confirmation and the grant below resolves
            // idempotently; any other terminal state must not be resurrected.
            let current = self
                .orders
                .find_by_id(&order.order_id)
                .await?
                .ok_or_else(|| ReconcileError::OrderNotFound {
                    order_id: order.order_id.clone(),
                })?;
            match current.status() {
                Ok(OrderStatus::Paid) => {}
                Ok(status) => {
                    return Err(ReconcileError::VerificationFailed {
                        message: format!("order is already in terminal state {}", status),
                    })
                }
                Err(message) => return Err(ReconcileError::VerificationFailed { message }),
            }
        }

        let grant = self
            .enrollments
            .grant(
                &subject_id,
                &resource_id,
                &order.order_id,
                order.amount_minor_units,
            )
            .await?;

        info!(
            order_id = %order.order_id,
            subject_id = %subject_id,
            resource_id = %resource_id,
            already_existed = grant.already_existed,
            "payment reconciled"
        );

        Ok(ReconcileOutcome {
            entitlement: grant.entitlement,
            already_existed: grant.already_existed,
        })
    }

    pub async fn get_order_status(&self, order_id: &str) -> Result<Order, ReconcileError> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ReconcileError::OrderNotFound {
                order_id: order_id.to_string(),
            })
    }

    pub async fn get_entitlement(
        &self,
        subject_id: &str,
        resource_id: &str,
    ) -> Result<Option<Entitlement>, DatabaseError> {
        self.enrollments.find(subject_id, resource_id).await
    }

    pub async fn list_entitlements(
        &self,
        subject_id: &str,
    ) -> Result<Vec<Entitlement>, DatabaseError> {
        self.enrollments.list_for_subject(subject_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_validation_rejects_missing_fields() {
        let claim = ConfirmationClaim {
            order_id: "order_1".to_string(),
            gateway_payment_id: "pay_1".to_string(),
            signature: "sig".to_string(),
            claimed_amount: None,
        };
        assert!(claim.validate().is_ok());

        let missing_sig = ConfirmationClaim {
            signature: "  ".to_string(),
            ..claim.clone()
        };
        assert!(missing_sig.validate().is_err());

        let missing_payment = ConfirmationClaim {
            gateway_payment_id: String::new(),
            ..claim
        };
        assert!(missing_payment.validate().is_err());
    }

    #[test]
    fn gateway_errors_map_to_reconcile_taxonomy() {
        let retryable: ReconcileError = GatewayError::Unavailable {
            message: "timeout".to_string(),
        }
        .into();
        assert!(matches!(
            retryable,
            ReconcileError::RetryableVerification { .. }
        ));
        assert!(retryable.is_retryable());

        let unauthorized: ReconcileError = GatewayError::Unauthorized { status: 401 }.into();
        assert!(matches!(unauthorized, ReconcileError::GatewayUnauthorized));
        assert!(!unauthorized.is_retryable());

        let permanent: ReconcileError = GatewayError::Validation {
            status: 400,
            message: "no such order".to_string(),
        }
        .into();
        assert!(matches!(
            permanent,
            ReconcileError::VerificationFailed { .. }
        ));
    }

    #[test]
    fn status_codes_distinguish_failure_classes() {
        assert_eq!(
            ReconcileError::OrderNotFound {
                order_id: "x".to_string()
            }
            .http_status_code(),
            404
        );
        assert_eq!(ReconcileError::InvalidSignature.http_status_code(), 401);
        assert_eq!(
            ReconcileError::RetryableVerification {
                message: "down".to_string()
            }
            .http_status_code(),
            503
        );
        assert_eq!(ReconcileError::GatewayUnauthorized.http_status_code(), 502);
    }

    #[test]
    fn user_messages_do_not_leak_internals() {
        let err = ReconcileError::VerificationFailed {
            message: "gateway body: {secret stuff}".to_string(),
        };
        assert!(!err.user_message().contains("secret"));

        let mismatch = ReconcileError::AmountMismatch {
            expected_minor_units: 499900,
            actual_minor_units: 400000,
            expected_currency: "INR".to_string(),
            actual_currency: "INR".to_string(),
        };
        assert_eq!(mismatch.user_message(), "Paid amount does not match the order");
    }
}
