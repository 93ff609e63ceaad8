//! Seed data for integration tests.
use chrono::{Duration, Utc};
use sqlx::types::Json;

use crate::{
    db_types::{
        Listing,
        MerchantOnboarding,
        MinorUnits,
        NewListing,
        OnboardingUpdate,
        OrderId,
        PostalAddress,
        UserProfile,
        ONBOARDING_APPROVED,
    },
    traits::{ListingManagement, MerchantManagement, UserDirectory},
    SqliteDatabase,
};

pub async fn seed_listing(db: &SqliteDatabase, id: &str, seller_id: &str, price: i64) -> Listing {
    let listing = NewListing {
        id: id.to_string(),
        seller_id: seller_id.to_string(),
        brand: "Rolex".to_string(),
        model: "Submariner 16610".to_string(),
        condition: "excellent".to_string(),
        price: MinorUnits::from(price),
        currency: "USD".to_string(),
        images: vec![format!("https://img.example.com/{id}/1.jpg")],
    };
    db.insert_listing(listing).await.expect("Error seeding listing")
}

/// A seller whose merchant account has been provisioned and approved by the processor.
pub async fn seed_approved_merchant(db: &SqliteDatabase, seller_id: &str) -> MerchantOnboarding {
    let identity = format!("IDmerchant-{seller_id}");
    let form = format!("obf-{seller_id}");
    let onboarding =
        db.upsert_onboarding_form(seller_id, &form, &identity).await.expect("Error seeding onboarding form");
    let update = OnboardingUpdate {
        merchant_id: Some(format!("MU-{seller_id}")),
        onboarding_state: Some(ONBOARDING_APPROVED.to_string()),
        ..Default::default()
    };
    db.update_onboarding(onboarding.id, update).await.expect("Error approving merchant")
}

pub async fn seed_profile(db: &SqliteDatabase, user_id: &str, country: Option<&str>) -> UserProfile {
    let address = PostalAddress {
        line1: Some("1 Main Street".to_string()),
        city: Some("Springfield".to_string()),
        postal_code: Some("12345".to_string()),
        country: country.map(String::from),
        ..Default::default()
    };
    let profile = UserProfile {
        user_id: user_id.to_string(),
        first_name: Some("Alex".to_string()),
        last_name: Some("Buyer".to_string()),
        email: Some(format!("{user_id}@example.com")),
        country: country.map(String::from),
        address: Some(Json(address)),
        ..Default::default()
    };
    db.upsert_user_profile(profile).await.expect("Error seeding user profile")
}

/// Backdates an order's reservation horizon so that the next buyer-facing call sees it as lapsed. The listing marker
/// is backdated too, so that another buyer can claim the listing.
pub async fn lapse_reservation(db: &SqliteDatabase, order_id: &OrderId) {
    let past = Utc::now() - Duration::minutes(5);
    sqlx::query("UPDATE orders SET reservation_expires_at = $1 WHERE id = $2")
        .bind(past)
        .bind(order_id.as_str())
        .execute(db.pool())
        .await
        .expect("Error backdating order");
    sqlx::query("UPDATE listings SET reserved_until = $1 WHERE reserved_by_order_id = $2")
        .bind(past)
        .bind(order_id.as_str())
        .execute(db.pool())
        .await
        .expect("Error backdating listing");
}
