//! Postgres implementation of PaymentRepository.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    IdempotencyKey, Payment, PaymentDetail, PaymentProviderRef, PersistedPayment, SessionId,
};
use crate::ports::{PaymentRepository, RepositoryError, RepositoryResult};

const SELECT_PAYMENT: &str = r#"
    SELECT p.id, p.amount, p.payment_type, p.status, p.expires_at, p.provider,
           p.external_payment_id, p.paid_at, p.notified_at, p.canceled_at, p.refunded_at,
           p.idempotency_key,
           p.session_id, p.created_at, p.updated_at, p.version,
           d.id AS detail_id, d.qr_code
    FROM payments p
    LEFT JOIN payment_details d ON d.payment_id = p.id
"#;

/// Postgres-backed payment repository. The QR code lives in `payment_details`.
#[derive(Clone)]
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: &str, bind: PaymentFilter<'_>) -> RepositoryResult<Option<Payment>> {
        let sql = format!("{} WHERE {}", SELECT_PAYMENT, filter);
        let query = sqlx::query_as::<_, PaymentRow>(&sql);
        let query = match bind {
            PaymentFilter::Id(id) => query.bind(id),
            PaymentFilter::Text(value) => query.bind(value),
        };

        let row = query.fetch_optional(&self.pool).await?;
        row.map(PaymentRow::into_domain).transpose()
    }

    async fn upsert_detail(
        tx: &mut Transaction<'_, Postgres>,
        row: &PaymentRow,
    ) -> RepositoryResult<()> {
        let (Some(detail_id), Some(qr_code)) = (row.detail_id, &row.qr_code) else {
            return Ok(());
        };

        sqlx::query(
            r#"
            INSERT INTO payment_details (id, payment_id, qr_code)
            VALUES ($1, $2, $3)
            ON CONFLICT (payment_id) DO UPDATE SET qr_code = EXCLUDED.qr_code
            "#,
        )
        .bind(detail_id)
        .bind(row.id)
        .bind(qr_code)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

enum PaymentFilter<'a> {
    Id(Uuid),
    Text(&'a str),
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn save(&self, payment: &Payment) -> RepositoryResult<()> {
        let row = PaymentRow::from_domain(payment);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, amount, payment_type, status, expires_at, provider, external_payment_id,
                paid_at, notified_at, canceled_at, refunded_at, idempotency_key, session_id,
                created_at, updated_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(row.id)
        .bind(&row.amount)
        .bind(&row.payment_type)
        .bind(&row.status)
        .bind(row.expires_at)
        .bind(&row.provider)
        .bind(&row.external_payment_id)
        .bind(row.paid_at)
        .bind(row.notified_at)
        .bind(row.canceled_at)
        .bind(row.refunded_at)
        .bind(row.idempotency_key)
        .bind(row.session_id)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.version)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Duplicate(row.idempotency_key.to_string())
            }
            other => RepositoryError::Database(other),
        })?;

        Self::upsert_detail(&mut tx, &row).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Payment>> {
        self.find_one("p.id = $1", PaymentFilter::Id(id)).await
    }

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> RepositoryResult<Option<Payment>> {
        self.find_one("p.idempotency_key = $1", PaymentFilter::Id(key.as_uuid()))
            .await
    }

    async fn find_by_external_payment_id(
        &self,
        external_payment_id: &str,
    ) -> RepositoryResult<Option<Payment>> {
        self.find_one(
            "p.external_payment_id = $1",
            PaymentFilter::Text(external_payment_id),
        )
        .await
    }

    async fn update(&self, payment: &Payment) -> RepositoryResult<()> {
        let row = PaymentRow::from_domain(payment);
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, provider = $3, external_payment_id = $4, paid_at = $5,
                notified_at = $6, canceled_at = $7, refunded_at = $8, updated_at = $9,
                version = version + 1
            WHERE id = $1 AND version = $10
            "#,
        )
        .bind(row.id)
        .bind(&row.status)
        .bind(&row.provider)
        .bind(&row.external_payment_id)
        .bind(row.paid_at)
        .bind(row.notified_at)
        .bind(row.canceled_at)
        .bind(row.refunded_at)
        .bind(row.updated_at)
        .bind(row.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT version FROM payments WHERE id = $1")
                    .bind(row.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Err(match exists {
                Some(_) => RepositoryError::Conflict {
                    id: row.id.to_string(),
                    expected: row.version,
                },
                None => RepositoryError::NotFound(row.id.to_string()),
            });
        }

        Self::upsert_detail(&mut tx, &row).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    amount: BigDecimal,
    payment_type: String,
    status: String,
    expires_at: DateTime<Utc>,
    provider: Option<String>,
    external_payment_id: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    notified_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    idempotency_key: Uuid,
    session_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
    detail_id: Option<Uuid>,
    qr_code: Option<String>,
}

impl PaymentRow {
    fn from_domain(payment: &Payment) -> Self {
        Self {
            id: payment.id(),
            amount: payment.amount().clone(),
            payment_type: payment.payment_type().as_str().to_string(),
            status: payment.status().as_str().to_string(),
            expires_at: payment.expires_at(),
            provider: payment.provider().map(|p| p.provider().as_str().to_string()),
            external_payment_id: payment
                .provider()
                .map(|p| p.external_payment_id().to_string()),
            paid_at: payment.paid_at(),
            notified_at: payment.notified_at(),
            canceled_at: payment.canceled_at(),
            refunded_at: payment.refunded_at(),
            idempotency_key: payment.idempotency_key().as_uuid(),
            session_id: payment.session_id().as_uuid(),
            created_at: payment.created_at(),
            updated_at: payment.updated_at(),
            version: payment.version(),
            detail_id: payment.detail().map(PaymentDetail::id),
            qr_code: payment.detail().map(|d| d.qr_code().to_string()),
        }
    }

    fn into_domain(self) -> RepositoryResult<Payment> {
        let corrupt = |e: crate::domain::PaymentError| {
            RepositoryError::Corrupt(format!("payment {}: {}", self.id, e))
        };

        let provider = match (&self.provider, &self.external_payment_id) {
            (Some(name), Some(external_id)) => Some(
                PaymentProviderRef::new(name.parse().map_err(corrupt)?, external_id.clone())
                    .map_err(corrupt)?,
            ),
            _ => None,
        };
        let detail = match (self.detail_id, &self.qr_code) {
            (Some(detail_id), Some(qr_code)) => Some(
                PaymentDetail::from_persistence(detail_id, self.id, qr_code.clone())
                    .map_err(corrupt)?,
            ),
            _ => None,
        };

        let state = PersistedPayment {
            id: self.id,
            amount: self.amount.clone(),
            payment_type: self.payment_type.parse().map_err(corrupt)?,
            status: self.status.parse().map_err(corrupt)?,
            expires_at: self.expires_at,
            provider,
            detail,
            paid_at: self.paid_at,
            notified_at: self.notified_at,
            canceled_at: self.canceled_at,
            refunded_at: self.refunded_at,
            idempotency_key: IdempotencyKey::new(self.idempotency_key).map_err(corrupt)?,
            session_id: SessionId::new(self.session_id).map_err(corrupt)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        };

        Payment::from_persistence(state).map_err(corrupt)
    }
}
