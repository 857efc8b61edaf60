use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Order creation request sent to the gateway. Amount is always in minor
/// units (paise for INR); the gateway never sees floating point.
#[derive(Debug, Clone, Serialize)]
pub struct CreateGatewayOrder {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

/// Order as reported by the gateway. This is the authoritative record of
/// whether a payment actually completed: gateway-native `status` is one of
/// `created`, `attempted` or `paid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: i64,
}

impl GatewayOrder {
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }

    /// Whether the gateway reports a state the order can never leave.
    /// `created` and `attempted` are still in flight and must not be treated
    /// as failures.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self.status.as_str(), "failed" | "cancelled" | "expired")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_order_deserializes_from_api_json() {
        let payload = serde_json::json!({
            "id": "order_gw_9A33XWu170gUtm",
            "entity": "order",
            "amount": 499900,
            "amount_paid": 499900,
            "amount_due": 0,
            "currency": "INR",
            "receipt": "order_local_1",
            "status": "paid",
            "attempts": 1,
            "notes": {"course_id": "course_1", "user_id": "user_1"},
            "created_at": 1756166400
        });
        let order: GatewayOrder = serde_json::from_value(payload).expect("should deserialize");
        assert!(order.is_paid());
        assert_eq!(order.amount, 499900);
        assert_eq!(order.notes.get("course_id").map(String::as_str), Some("course_1"));
    }

    #[test]
    fn attempted_is_neither_paid_nor_terminal() {
        let order = GatewayOrder {
            id: "order_gw_1".to_string(),
            amount: 1000,
            amount_paid: 0,
            amount_due: 1000,
            currency: "INR".to_string(),
            status: "attempted".to_string(),
            receipt: None,
            notes: BTreeMap::new(),
            created_at: 0,
        };
        assert!(!order.is_paid());
        assert!(!order.is_terminal_failure());
    }
}
