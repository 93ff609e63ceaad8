use chrono::Utc;
use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::is_unique_violation_on;
use crate::{
    db_types::{NewRefundRequest, OrderId, RefundRequest, RefundStatus, RefundUpdate},
    traits::StorageError,
};

/// Inserts a refund request. The one-active-request-per-order rule and idempotency id uniqueness are both unique
/// indexes, so concurrent inserts are arbitrated by the database.
pub async fn insert_refund_request(
    refund: NewRefundRequest,
    conn: &mut SqliteConnection,
) -> Result<RefundRequest, StorageError> {
    let idempotency_id = refund.idempotency_id.clone();
    let now = Utc::now();
    let rows: Vec<RefundRequest> = sqlx::query_as(
        r#"
            INSERT INTO refund_requests (
                id,
                order_id,
                buyer_id,
                seller_id,
                requested_amount,
                original_transfer_amount,
                currency,
                buyer_reason,
                finix_transfer_id,
                idempotency_id,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *;
        "#,
    )
    .bind(refund.id)
    .bind(refund.order_id.as_str())
    .bind(refund.buyer_id)
    .bind(refund.seller_id)
    .bind(refund.requested_amount)
    .bind(refund.original_transfer_amount)
    .bind(refund.currency)
    .bind(refund.buyer_reason)
    .bind(refund.finix_transfer_id)
    .bind(refund.idempotency_id)
    .bind(now)
    .bind(now)
    .fetch_all(conn)
    .await
    .map_err(|e| {
        if is_unique_violation_on(&e, "refund_requests.idempotency_id") {
            StorageError::DuplicateIdempotencyId(idempotency_id)
        } else if is_unique_violation_on(&e, "refund_requests.order_id") {
            StorageError::ActiveRefundExists
        } else {
            StorageError::from(e)
        }
    })?;
    rows.into_iter().next().ok_or_else(|| StorageError::from(sqlx::Error::RowNotFound))
}

pub async fn fetch_refund_request(id: &str, conn: &mut SqliteConnection) -> Result<Option<RefundRequest>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM refund_requests WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_active_refund_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<RefundRequest>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM refund_requests
            WHERE order_id = $1 AND status IN ('pending', 'return_requested', 'return_received')
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await
}

pub async fn fetch_refunds_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<RefundRequest>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM refund_requests WHERE order_id = $1 ORDER BY julianday(created_at) ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await
}

pub async fn fetch_refund_by_reversal_id(
    reversal_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<RefundRequest>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM refund_requests WHERE finix_reversal_id = $1")
        .bind(reversal_id)
        .fetch_optional(conn)
        .await
}

pub async fn update_refund_request(
    id: &str,
    update: RefundUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<RefundRequest>, StorageError> {
    let status_guard = update.status_guard();
    if status_guard.as_ref().is_some_and(|g| g.is_empty()) {
        debug!("🗃️ Refund request {id} cannot move to {:?} from any of {:?}", update.status, update.expected_status);
        return Ok(None);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE refund_requests SET updated_at = ");
    builder.push_bind(Utc::now());
    let mut changed = false;
    macro_rules! set_field {
        ($field:ident) => {
            if let Some(v) = update.$field {
                builder.push(concat!(", ", stringify!($field), " = "));
                builder.push_bind(v);
                changed = true;
            }
        };
    }
    set_field!(status);
    set_field!(seller_response_reason);
    set_field!(product_returned);
    set_field!(return_tracking_number);
    set_field!(product_return_confirmed);
    set_field!(finix_reversal_id);
    set_field!(approved_by);
    set_field!(approved_at);
    set_field!(denied_at);
    if !changed {
        debug!("🗃️ No fields to update for refund request {id}. Update request skipped.");
        return Err(StorageError::NoOp);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id.to_string());
    if let Some(guard) = status_guard {
        builder.push(" AND status IN (");
        let mut statuses = builder.separated(", ");
        for status in guard {
            statuses.push_bind(status);
        }
        statuses.push_unseparated(")");
    }
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows = builder.build_query_as::<RefundRequest>().fetch_all(conn).await?;
    Ok(rows.into_iter().next())
}

pub async fn delete_refund_request(
    id: &str,
    allowed: &[RefundStatus],
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    if allowed.is_empty() {
        return Ok(false);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM refund_requests WHERE id = ");
    builder.push_bind(id.to_string());
    builder.push(" AND status IN (");
    let mut statuses = builder.separated(", ");
    for status in allowed {
        statuses.push_bind(*status);
    }
    statuses.push_unseparated(")");
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected() > 0)
}
