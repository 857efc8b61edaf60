use crate::database::error::DatabaseError;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

/// Granted access right: proof that `subject_id` may access `resource_id`,
/// paid for by `order_id`. Rows are append-only and unique per
/// `(subject_id, resource_id, order_id)`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Entitlement {
    pub subject_id: String,
    pub resource_id: String,
    pub order_id: String,
    pub amount_paid_minor_units: i64,
    pub granted_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of an insert-if-absent: the stored entitlement plus whether it
/// predates this call.
#[derive(Debug, Clone)]
pub struct GrantOutcome {
    pub entitlement: Entitlement,
    pub already_existed: bool,
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Atomic insert-if-absent on `(subject_id, resource_id, order_id)`.
    /// Concurrent duplicate grants resolve to a single row; every caller
    /// gets the stored entitlement back.
    async fn grant(
        &self,
        subject_id: &str,
        resource_id: &str,
        order_id: &str,
        amount_paid_minor_units: i64,
    ) -> Result<GrantOutcome, DatabaseError>;

    async fn find(
        &self,
        subject_id: &str,
        resource_id: &str,
    ) -> Result<Option<Entitlement>, DatabaseError>;

    async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<Entitlement>, DatabaseError>;
}

pub struct PgEnrollmentRepository {
    pool: PgPool,
}

impl PgEnrollmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ENROLLMENT_COLUMNS: &str =
    "subject_id, resource_id, order_id, amount_paid_minor_units, granted_at";

#[async_trait]
impl EnrollmentStore for PgEnrollmentRepository {
    async fn grant(
        &self,
        subject_id: &str,
        resource_id: &str,
        order_id: &str,
        amount_paid_minor_units: i64,
    ) -> Result<GrantOutcome, DatabaseError> {
        // Single conditional write; ON CONFLICT DO NOTHING returns no row
        // when another writer already inserted, so losing the race is
        // detected without a read-then-write window.
        let inserted = sqlx::query_as::<_, Entitlement>(&format!(
            "INSERT INTO enrollments (subject_id, resource_id, order_id, amount_paid_minor_units) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (subject_id, resource_id, order_id) DO NOTHING \
             RETURNING {ENROLLMENT_COLUMNS}"
        ))
        .bind(subject_id)
        .bind(resource_id)
        .bind(order_id)
        .bind(amount_paid_minor_units)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if let Some(entitlement) = inserted {
            return Ok(GrantOutcome {
                entitlement,
                already_existed: false,
            });
        }

        let existing = sqlx::query_as::<_, Entitlement>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE subject_id = $1 AND resource_id = $2 AND order_id = $3"
        ))
        .bind(subject_id)
        .bind(resource_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::not_found("Entitlement", order_id))?;

        Ok(GrantOutcome {
            entitlement: existing,
            already_existed: true,
        })
    }

    async fn find(
        &self,
        subject_id: &str,
        resource_id: &str,
    ) -> Result<Option<Entitlement>, DatabaseError> {
        sqlx::query_as::<_, Entitlement>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE subject_id = $1 AND resource_id = $2 \
             ORDER BY granted_at ASC \
             LIMIT 1"
        ))
        .bind(subject_id)
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<Entitlement>, DatabaseError> {
        sqlx::query_as::<_, Entitlement>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE subject_id = $1 \
             ORDER BY granted_at DESC"
        ))
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
