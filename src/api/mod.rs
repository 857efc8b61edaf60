pub mod enrollments;
pub mod orders;
pub mod payments;

use crate::services::reconciliation::ReconciliationEngine;
use std::sync::Arc;

/// Shared state for the reconciliation API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<ReconciliationEngine>,
}
