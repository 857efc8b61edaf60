//! Services module for business logic and integrations

pub mod reconciliation;

pub use reconciliation::{
    ConfirmationClaim, CreateOrderError, CreateOrderInput, ReconcileError, ReconcileOutcome,
    ReconciliationEngine,
};
