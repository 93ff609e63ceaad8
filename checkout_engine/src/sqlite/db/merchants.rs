use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{MerchantOnboarding, OnboardingUpdate, ONBOARDING_APPROVED, ONBOARDING_PROVISIONING},
    traits::StorageError,
};

pub async fn fetch_approved_merchant(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<MerchantOnboarding>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM merchant_onboarding WHERE user_id = $1 AND onboarding_state = $2 AND merchant_id IS NOT NULL",
    )
    .bind(user_id)
    .bind(ONBOARDING_APPROVED)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_onboarding_for_user(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<MerchantOnboarding>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM merchant_onboarding WHERE user_id = $1").bind(user_id).fetch_optional(conn).await
}

pub async fn fetch_onboarding_by_identity(
    identity_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<MerchantOnboarding>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM merchant_onboarding WHERE identity_id = $1")
        .bind(identity_id)
        .fetch_optional(conn)
        .await
}

pub async fn upsert_onboarding_form(
    user_id: &str,
    form_id: &str,
    identity_id: &str,
    conn: &mut SqliteConnection,
) -> Result<MerchantOnboarding, sqlx::Error> {
    let now = Utc::now();
    let rows: Vec<MerchantOnboarding> = sqlx::query_as(
        r#"
            INSERT INTO merchant_onboarding (user_id, onboarding_form_id, identity_id, onboarding_state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                onboarding_form_id = excluded.onboarding_form_id,
                identity_id = excluded.identity_id,
                onboarding_state = excluded.onboarding_state,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(form_id)
    .bind(identity_id)
    .bind(ONBOARDING_PROVISIONING)
    .bind(now)
    .bind(now)
    .fetch_all(conn)
    .await?;
    rows.into_iter().next().ok_or(sqlx::Error::RowNotFound)
}

pub async fn update_onboarding(
    id: i64,
    update: OnboardingUpdate,
    conn: &mut SqliteConnection,
) -> Result<MerchantOnboarding, StorageError> {
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE merchant_onboarding SET updated_at = ");
    builder.push_bind(Utc::now());
    if let Some(v) = update.merchant_id {
        builder.push(", merchant_id = ");
        builder.push_bind(v);
    }
    if let Some(v) = update.verification_id {
        builder.push(", verification_id = ");
        builder.push_bind(v);
    }
    if let Some(v) = update.verification_state {
        builder.push(", verification_state = ");
        builder.push_bind(v);
    }
    if let Some(v) = update.onboarding_state {
        builder.push(", onboarding_state = ");
        builder.push_bind(v);
    }
    if let Some(v) = update.verified_at {
        builder.push(", verified_at = ");
        builder.push_bind(v);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");
    let rows = builder.build_query_as::<MerchantOnboarding>().fetch_all(conn).await?;
    rows.into_iter().next().ok_or_else(|| StorageError::NotFound { entity: "Merchant onboarding", id: id.to_string() })
}
