use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::UserProfile;

pub async fn fetch_user_profile(user_id: &str, conn: &mut SqliteConnection) -> Result<Option<UserProfile>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT user_id, first_name, last_name, email, phone, country, address, onboarding_address
            FROM user_profiles WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

pub async fn upsert_user_profile(profile: UserProfile, conn: &mut SqliteConnection) -> Result<UserProfile, sqlx::Error> {
    let rows: Vec<UserProfile> = sqlx::query_as(
        r#"
            INSERT INTO user_profiles (user_id, first_name, last_name, email, phone, country, address, onboarding_address, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                email = excluded.email,
                phone = excluded.phone,
                country = excluded.country,
                address = excluded.address,
                onboarding_address = excluded.onboarding_address,
                updated_at = excluded.updated_at
            RETURNING user_id, first_name, last_name, email, phone, country, address, onboarding_address;
        "#,
    )
    .bind(profile.user_id)
    .bind(profile.first_name)
    .bind(profile.last_name)
    .bind(profile.email)
    .bind(profile.phone)
    .bind(profile.country)
    .bind(profile.address)
    .bind(profile.onboarding_address)
    .bind(Utc::now())
    .fetch_all(conn)
    .await?;
    rows.into_iter().next().ok_or(sqlx::Error::RowNotFound)
}
