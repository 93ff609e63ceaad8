use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{NewWebhookEvent, WebhookEvent},
    traits::StorageError,
};

/// Returns the stored event and whether this call inserted it.
pub async fn record_webhook_event(
    event: NewWebhookEvent,
    conn: &mut SqliteConnection,
) -> Result<(WebhookEvent, bool), StorageError> {
    let now = Utc::now();
    let inserted: Vec<WebhookEvent> = sqlx::query_as(
        r#"
            INSERT INTO webhook_events (event_id, entity, event_type, payload, received_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(&event.event_id)
    .bind(event.entity)
    .bind(event.event_type)
    .bind(Json(event.payload))
    .bind(now)
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;
    match inserted.into_iter().next() {
        Some(e) => Ok((e, true)),
        None => {
            debug!("🗃️ Webhook event {} has been seen before", event.event_id);
            let existing = fetch_webhook_event(&event.event_id, conn)
                .await?
                .ok_or_else(|| StorageError::NotFound { entity: "Webhook event", id: event.event_id.clone() })?;
            Ok((existing, false))
        },
    }
}

pub async fn fetch_webhook_event(event_id: &str, conn: &mut SqliteConnection) -> Result<Option<WebhookEvent>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM webhook_events WHERE event_id = $1").bind(event_id).fetch_optional(conn).await
}

/// Moves an event to `processing` and counts the attempt. Claimable events are `pending` ones, retryable `failed`
/// ones, and `processing` ones whose last update is older than `stale_before` (their worker is presumed dead).
pub async fn claim_webhook_event(
    event_id: &str,
    max_attempts: i64,
    stale_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookEvent>, sqlx::Error> {
    let rows: Vec<WebhookEvent> = sqlx::query_as(
        r#"
            UPDATE webhook_events SET status = 'processing', attempts = attempts + 1, updated_at = $1
            WHERE event_id = $2
              AND attempts < $3
              AND (
                status = 'pending'
                OR (status = 'failed' AND retryable = TRUE)
                OR (status = 'processing' AND julianday(updated_at) < julianday($4))
              )
            RETURNING *;
        "#,
    )
    .bind(Utc::now())
    .bind(event_id)
    .bind(max_attempts)
    .bind(stale_before)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().next())
}

pub async fn complete_webhook_event(
    event_id: &str,
    outcome: &str,
    conn: &mut SqliteConnection,
) -> Result<WebhookEvent, StorageError> {
    let rows: Vec<WebhookEvent> = sqlx::query_as(
        r#"
            UPDATE webhook_events SET status = 'processed', outcome = $1, last_error = NULL, retryable = FALSE, updated_at = $2
            WHERE event_id = $3
            RETURNING *;
        "#,
    )
    .bind(outcome)
    .bind(Utc::now())
    .bind(event_id)
    .fetch_all(conn)
    .await?;
    rows.into_iter().next().ok_or_else(|| StorageError::NotFound { entity: "Webhook event", id: event_id.to_string() })
}

pub async fn fail_webhook_event(
    event_id: &str,
    error: &str,
    retryable: bool,
    conn: &mut SqliteConnection,
) -> Result<WebhookEvent, StorageError> {
    let rows: Vec<WebhookEvent> = sqlx::query_as(
        r#"
            UPDATE webhook_events SET status = 'failed', last_error = $1, retryable = $2, updated_at = $3
            WHERE event_id = $4
            RETURNING *;
        "#,
    )
    .bind(error)
    .bind(retryable)
    .bind(Utc::now())
    .bind(event_id)
    .fetch_all(conn)
    .await?;
    rows.into_iter().next().ok_or_else(|| StorageError::NotFound { entity: "Webhook event", id: event_id.to_string() })
}

/// Events that still have attempts left and need another pass: retryable failures, plus `pending` and `processing`
/// events that have not been touched since `stale_before`. Oldest first.
pub async fn fetch_retryable_webhook_events(
    max_attempts: i64,
    stale_before: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookEvent>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM webhook_events
            WHERE attempts < $1
              AND (
                (status = 'failed' AND retryable = TRUE)
                OR (status IN ('pending', 'processing') AND julianday(updated_at) < julianday($2))
              )
            ORDER BY julianday(received_at) ASC
            LIMIT $3
        "#,
    )
    .bind(max_attempts)
    .bind(stale_before)
    .bind(limit)
    .fetch_all(conn)
    .await
}
