use chrono::Utc;
use log::debug;
use sqlx::{types::Json, SqliteConnection};

use super::is_unique_violation_on;
use crate::{
    db_types::{Listing, NewListing, ReservationClaim},
    traits::StorageError,
};

pub async fn insert_listing(listing: NewListing, conn: &mut SqliteConnection) -> Result<Listing, StorageError> {
    let id = listing.id.clone();
    let now = Utc::now();
    let rows: Vec<Listing> = sqlx::query_as(
        r#"
            INSERT INTO listings (id, seller_id, brand, model, condition, price, currency, images, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(listing.id)
    .bind(listing.seller_id)
    .bind(listing.brand)
    .bind(listing.model)
    .bind(listing.condition)
    .bind(listing.price)
    .bind(listing.currency)
    .bind(Json(listing.images))
    .bind(now)
    .bind(now)
    .fetch_all(conn)
    .await
    .map_err(|e| {
        if is_unique_violation_on(&e, "listings.id") {
            StorageError::AlreadyExists(format!("Listing {id}"))
        } else {
            StorageError::from(e)
        }
    })?;
    rows.into_iter().next().ok_or_else(|| StorageError::from(sqlx::Error::RowNotFound))
}

pub async fn fetch_listing(listing_id: &str, conn: &mut SqliteConnection) -> Result<Option<Listing>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM listings WHERE id = $1").bind(listing_id).fetch_optional(conn).await
}

/// The single compare-and-set that decides which buyer gets a listing.
pub async fn conditional_reserve(claim: &ReservationClaim, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE listings SET
                reserved_until = $1,
                reserved_by_user_id = $2,
                reserved_by_order_id = $3,
                updated_at = $4
            WHERE id = $5
              AND status = 'active'
              AND (reserved_until IS NULL OR julianday(reserved_until) <= julianday($6))
        "#,
    )
    .bind(claim.reserved_until)
    .bind(&claim.buyer_id)
    .bind(claim.order_id.as_str())
    .bind(claim.now)
    .bind(&claim.listing_id)
    .bind(claim.now)
    .execute(conn)
    .await?;
    let claimed = result.rows_affected() == 1;
    debug!("🗃️ Reservation claim on listing {} for order {}: {claimed}", claim.listing_id, claim.order_id);
    Ok(claimed)
}

pub async fn hold_for_sale(listing_id: &str, order_id: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE listings SET status = 'pending_sale', updated_at = $1
            WHERE id = $2 AND reserved_by_order_id = $3 AND status = 'active'
        "#,
    )
    .bind(Utc::now())
    .bind(listing_id)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn release_reservation(
    listing_id: &str,
    order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE listings SET
                reserved_until = NULL,
                reserved_by_user_id = NULL,
                reserved_by_order_id = NULL,
                status = CASE WHEN status = 'pending_sale' THEN 'active' ELSE status END,
                updated_at = $1
            WHERE id = $2 AND reserved_by_order_id = $3
        "#,
    )
    .bind(Utc::now())
    .bind(listing_id)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn set_active(listing_id: &str, conn: &mut SqliteConnection) -> Result<Listing, StorageError> {
    let rows: Vec<Listing> = sqlx::query_as(
        r#"
            UPDATE listings SET
                status = 'active',
                reserved_until = NULL,
                reserved_by_user_id = NULL,
                reserved_by_order_id = NULL,
                updated_at = $1
            WHERE id = $2
            RETURNING *;
        "#,
    )
    .bind(Utc::now())
    .bind(listing_id)
    .fetch_all(conn)
    .await?;
    rows.into_iter().next().ok_or_else(|| StorageError::NotFound { entity: "Listing", id: listing_id.to_string() })
}

/// The reservation marker is kept on a sold listing as the record of who bought it. Its expiry is cleared.
pub async fn mark_sold(listing_id: &str, order_id: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE listings SET status = 'sold', reserved_until = NULL, updated_at = $1
            WHERE id = $2 AND reserved_by_order_id = $3 AND status IN ('active', 'pending_sale')
        "#,
    )
    .bind(Utc::now())
    .bind(listing_id)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
