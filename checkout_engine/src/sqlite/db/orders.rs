use chrono::Utc;
use log::{debug, trace};
use sqlx::{types::Json, QueryBuilder, Sqlite, SqliteConnection};

use super::is_unique_violation_on;
use crate::{
    db_types::{NewOrder, Order, OrderId, OrderUpdate},
    traits::StorageError,
};

/// Inserts a new order in `reserved` status. This is not atomic with anything else; embed the call in a transaction
/// and pass `&mut *tx` if you need that.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, StorageError> {
    let id = order.id.clone();
    let now = Utc::now();
    let rows: Vec<Order> = sqlx::query_as(
        r#"
            INSERT INTO orders (
                id,
                listing_id,
                buyer_id,
                seller_id,
                listing_snapshot,
                amount,
                currency,
                status,
                reserved_at,
                reservation_expires_at,
                fraud_session_id,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'reserved', $8, $9, $10, $11, $12)
            RETURNING *;
        "#,
    )
    .bind(order.id.as_str())
    .bind(order.listing_id)
    .bind(order.buyer_id)
    .bind(order.seller_id)
    .bind(Json(order.listing_snapshot))
    .bind(order.amount)
    .bind(order.currency)
    .bind(order.reserved_at)
    .bind(order.reservation_expires_at)
    .bind(order.fraud_session_id)
    .bind(now)
    .bind(now)
    .fetch_all(conn)
    .await
    .map_err(|e| {
        if is_unique_violation_on(&e, "orders.id") {
            StorageError::AlreadyExists(format!("Order {id}"))
        } else {
            StorageError::from(e)
        }
    })?;
    let order = rows.into_iter().next().ok_or_else(|| StorageError::from(sqlx::Error::RowNotFound))?;
    debug!("🗃️ Order {id} inserted");
    Ok(order)
}

pub async fn fetch_order(id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await
}

/// Most recently touched order whose `column` equals `value`. `column` is never user input.
async fn fetch_latest_by(
    column: &'static str,
    value: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let sql = format!("SELECT * FROM orders WHERE {column} = $1 ORDER BY julianday(updated_at) DESC LIMIT 1");
    sqlx::query_as(&sql).bind(value).fetch_optional(conn).await
}

pub async fn fetch_order_by_authorization_id(
    authorization_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    fetch_latest_by("finix_authorization_id", authorization_id, conn).await
}

pub async fn fetch_order_by_instrument_id(
    instrument_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    fetch_latest_by("finix_payment_instrument_id", instrument_id, conn).await
}

pub async fn fetch_order_by_transfer_id(
    transfer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    fetch_latest_by("finix_transfer_id", transfer_id, conn).await
}

pub async fn fetch_orders_for_listing(listing_id: &str, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE listing_id = $1 ORDER BY julianday(created_at) ASC")
        .bind(listing_id)
        .fetch_all(conn)
        .await
}

/// Applies the update as a single `UPDATE ... WHERE id = ? [AND <guards>] RETURNING *`. Returns `None` when the order
/// does not exist or a guard did not hold.
pub async fn update_order(
    id: &OrderId,
    update: OrderUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StorageError> {
    if update.is_empty() {
        debug!("🗃️ No fields to update for order {id}. Update request skipped.");
        return Err(StorageError::NoOp);
    }
    let status_guard = update.status_guard();
    if status_guard.as_ref().is_some_and(|g| g.is_empty()) {
        debug!("🗃️ Order {id} cannot move to {:?} from any of {:?}", update.status, update.expected_status);
        return Ok(None);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET updated_at = ");
    builder.push_bind(Utc::now());
    macro_rules! set_field {
        ($field:ident) => {
            if let Some(v) = update.$field {
                builder.push(concat!(", ", stringify!($field), " = "));
                builder.push_bind(v);
            }
        };
    }
    set_field!(status);
    set_field!(currency);
    set_field!(shipped_at);
    set_field!(delivered_at);
    set_field!(cancelled_at);
    set_field!(refunded_at);
    set_field!(paid_at);
    set_field!(finix_buyer_identity_id);
    set_field!(finix_payment_instrument_id);
    set_field!(finix_authorization_id);
    if update.clear_authorization {
        builder.push(", finix_authorization_id = NULL");
    }
    set_field!(finix_transfer_id);
    set_field!(payment_method);
    set_field!(tracking_number);
    set_field!(tracking_carrier);
    if let Some(patch) = update.metadata_patch {
        builder.push(", metadata = json_patch(metadata, ");
        builder.push_bind(Json(patch));
        builder.push(")");
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id.as_str().to_string());
    if let Some(guard) = status_guard {
        builder.push(" AND status IN (");
        let mut statuses = builder.separated(", ");
        for status in guard {
            statuses.push_bind(status);
        }
        statuses.push_unseparated(")");
    }
    if let Some(auth_id) = update.authorization_unset_or {
        builder.push(" AND (finix_authorization_id IS NULL OR finix_authorization_id = ");
        builder.push_bind(auth_id);
        builder.push(")");
    }
    if let Some(transfer_id) = update.transfer_unset_or {
        builder.push(" AND (finix_transfer_id IS NULL OR finix_transfer_id = ");
        builder.push_bind(transfer_id);
        builder.push(")");
    }
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows = builder.build_query_as::<Order>().fetch_all(conn).await?;
    Ok(rows.into_iter().next())
}

pub async fn delete_order(id: &OrderId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id.as_str()).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}
