use chrono::Utc;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{AuditEntry, NewAuditEntry},
    traits::StorageError,
};

pub async fn append_audit_entry(entry: NewAuditEntry, conn: &mut SqliteConnection) -> Result<AuditEntry, StorageError> {
    let rows: Vec<AuditEntry> = sqlx::query_as(
        r#"
            INSERT INTO audit_log (actor_id, actor_role, action, resource_type, resource_id, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(entry.actor_id)
    .bind(entry.actor_role)
    .bind(entry.action)
    .bind(entry.resource_type)
    .bind(entry.resource_id)
    .bind(Json(entry.details))
    .bind(Utc::now())
    .fetch_all(conn)
    .await?;
    rows.into_iter().next().ok_or_else(|| StorageError::from(sqlx::Error::RowNotFound))
}

pub async fn fetch_audit_entries(
    resource_type: &str,
    resource_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<AuditEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM audit_log WHERE resource_type = $1 AND resource_id = $2 ORDER BY id ASC")
        .bind(resource_type)
        .bind(resource_id)
        .fetch_all(conn)
        .await
}
