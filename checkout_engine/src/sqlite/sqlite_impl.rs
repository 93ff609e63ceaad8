//! `SqliteDatabase` is the concrete storage backend of the checkout engine.
//!
//! It implements all the storage traits defined in the [`crate::traits`] module by acquiring a connection from the
//! pool and delegating to the functions in [`super::db`].
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{audit, db_url, listings, merchants, new_pool, orders, refunds, users, webhook_events};
use crate::{
    db_types::{
        AuditEntry,
        Listing,
        MerchantOnboarding,
        NewAuditEntry,
        NewListing,
        NewOrder,
        NewRefundRequest,
        NewWebhookEvent,
        OnboardingUpdate,
        Order,
        OrderId,
        OrderUpdate,
        RefundRequest,
        RefundStatus,
        RefundUpdate,
        ReservationClaim,
        UserProfile,
        WebhookEvent,
    },
    traits::{
        AuditLog,
        ListingManagement,
        MerchantManagement,
        OrderManagement,
        RefundManagement,
        StorageError,
        UserDirectory,
        WebhookEventManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl OrderManagement for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(order, &mut conn).await
    }

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_authorization_id(&self, authorization_id: &str) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_authorization_id(authorization_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_instrument_id(&self, instrument_id: &str) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_instrument_id(instrument_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_transfer_id(&self, transfer_id: &str) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_transfer_id(transfer_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_orders_for_listing(&self, listing_id: &str) -> Result<Vec<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_for_listing(listing_id, &mut conn).await?;
        Ok(orders)
    }

    async fn update_order(&self, id: &OrderId, update: OrderUpdate) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::update_order(id, update, &mut conn).await?;
        if order.is_none() {
            trace!("🗃️ Conditional update of order {id} did not apply");
        }
        Ok(order)
    }

    async fn delete_order(&self, id: &OrderId) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let deleted = orders::delete_order(id, &mut conn).await?;
        Ok(deleted)
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

impl ListingManagement for SqliteDatabase {
    async fn insert_listing(&self, listing: NewListing) -> Result<Listing, StorageError> {
        let mut conn = self.pool.acquire().await?;
        listings::insert_listing(listing, &mut conn).await
    }

    async fn fetch_listing(&self, listing_id: &str) -> Result<Option<Listing>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let listing = listings::fetch_listing(listing_id, &mut conn).await?;
        Ok(listing)
    }

    async fn conditional_reserve(&self, claim: &ReservationClaim) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let claimed = listings::conditional_reserve(claim, &mut conn).await?;
        Ok(claimed)
    }

    async fn hold_for_sale(&self, listing_id: &str, order_id: &str) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let held = listings::hold_for_sale(listing_id, order_id, &mut conn).await?;
        Ok(held)
    }

    async fn release_reservation(&self, listing_id: &str, order_id: &str) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let released = listings::release_reservation(listing_id, order_id, &mut conn).await?;
        Ok(released)
    }

    async fn set_active(&self, listing_id: &str) -> Result<Listing, StorageError> {
        let mut conn = self.pool.acquire().await?;
        listings::set_active(listing_id, &mut conn).await
    }

    async fn mark_sold(&self, listing_id: &str, order_id: &str) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let sold = listings::mark_sold(listing_id, order_id, &mut conn).await?;
        Ok(sold)
    }
}

impl RefundManagement for SqliteDatabase {
    async fn insert_refund_request(&self, refund: NewRefundRequest) -> Result<RefundRequest, StorageError> {
        let mut conn = self.pool.acquire().await?;
        refunds::insert_refund_request(refund, &mut conn).await
    }

    async fn fetch_refund_request(&self, id: &str) -> Result<Option<RefundRequest>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let refund = refunds::fetch_refund_request(id, &mut conn).await?;
        Ok(refund)
    }

    async fn fetch_active_refund_for_order(&self, order_id: &OrderId) -> Result<Option<RefundRequest>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let refund = refunds::fetch_active_refund_for_order(order_id, &mut conn).await?;
        Ok(refund)
    }

    async fn fetch_refunds_for_order(&self, order_id: &OrderId) -> Result<Vec<RefundRequest>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let refunds = refunds::fetch_refunds_for_order(order_id, &mut conn).await?;
        Ok(refunds)
    }

    async fn fetch_refund_by_reversal_id(&self, reversal_id: &str) -> Result<Option<RefundRequest>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let refund = refunds::fetch_refund_by_reversal_id(reversal_id, &mut conn).await?;
        Ok(refund)
    }

    async fn update_refund_request(
        &self,
        id: &str,
        update: RefundUpdate,
    ) -> Result<Option<RefundRequest>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        refunds::update_refund_request(id, update, &mut conn).await
    }

    async fn delete_refund_request(&self, id: &str, allowed: &[RefundStatus]) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let deleted = refunds::delete_refund_request(id, allowed, &mut conn).await?;
        Ok(deleted)
    }
}

impl AuditLog for SqliteDatabase {
    async fn append_audit_entry(&self, entry: NewAuditEntry) -> Result<AuditEntry, StorageError> {
        let mut conn = self.pool.acquire().await?;
        audit::append_audit_entry(entry, &mut conn).await
    }

    async fn fetch_audit_entries(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Vec<AuditEntry>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let entries = audit::fetch_audit_entries(resource_type, resource_id, &mut conn).await?;
        Ok(entries)
    }
}

impl MerchantManagement for SqliteDatabase {
    async fn fetch_approved_merchant(&self, user_id: &str) -> Result<Option<MerchantOnboarding>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let merchant = merchants::fetch_approved_merchant(user_id, &mut conn).await?;
        Ok(merchant)
    }

    async fn fetch_onboarding_for_user(&self, user_id: &str) -> Result<Option<MerchantOnboarding>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let record = merchants::fetch_onboarding_for_user(user_id, &mut conn).await?;
        Ok(record)
    }

    async fn fetch_onboarding_by_identity(
        &self,
        identity_id: &str,
    ) -> Result<Option<MerchantOnboarding>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let record = merchants::fetch_onboarding_by_identity(identity_id, &mut conn).await?;
        Ok(record)
    }

    async fn upsert_onboarding_form(
        &self,
        user_id: &str,
        form_id: &str,
        identity_id: &str,
    ) -> Result<MerchantOnboarding, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let record = merchants::upsert_onboarding_form(user_id, form_id, identity_id, &mut conn).await?;
        debug!("🗃️ Onboarding form {form_id} recorded for user {user_id}");
        Ok(record)
    }

    async fn update_onboarding(&self, id: i64, update: OnboardingUpdate) -> Result<MerchantOnboarding, StorageError> {
        let mut conn = self.pool.acquire().await?;
        merchants::update_onboarding(id, update, &mut conn).await
    }
}

impl UserDirectory for SqliteDatabase {
    async fn fetch_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let profile = users::fetch_user_profile(user_id, &mut conn).await?;
        Ok(profile)
    }

    async fn upsert_user_profile(&self, profile: UserProfile) -> Result<UserProfile, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let profile = users::upsert_user_profile(profile, &mut conn).await?;
        Ok(profile)
    }
}

impl WebhookEventManagement for SqliteDatabase {
    async fn record_webhook_event(&self, event: NewWebhookEvent) -> Result<(WebhookEvent, bool), StorageError> {
        let mut conn = self.pool.acquire().await?;
        webhook_events::record_webhook_event(event, &mut conn).await
    }

    async fn fetch_webhook_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let event = webhook_events::fetch_webhook_event(event_id, &mut conn).await?;
        Ok(event)
    }

    async fn claim_webhook_event(
        &self,
        event_id: &str,
        max_attempts: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<WebhookEvent>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let event = webhook_events::claim_webhook_event(event_id, max_attempts, stale_before, &mut conn).await?;
        Ok(event)
    }

    async fn complete_webhook_event(&self, event_id: &str, outcome: &str) -> Result<WebhookEvent, StorageError> {
        let mut conn = self.pool.acquire().await?;
        webhook_events::complete_webhook_event(event_id, outcome, &mut conn).await
    }

    async fn fail_webhook_event(
        &self,
        event_id: &str,
        error: &str,
        retryable: bool,
    ) -> Result<WebhookEvent, StorageError> {
        let mut conn = self.pool.acquire().await?;
        webhook_events::fail_webhook_event(event_id, error, retryable, &mut conn).await
    }

    async fn fetch_retryable_webhook_events(
        &self,
        max_attempts: i64,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WebhookEvent>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let events =
            webhook_events::fetch_retryable_webhook_events(max_attempts, stale_before, limit, &mut conn).await?;
        Ok(events)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using `CKO_DATABASE_URL` or the default URL.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Applies any outstanding schema migrations. The migrations are embedded in the binary.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(format!("Could not run migrations. {e}")))?;
        info!("🗃️ Database schema is up to date");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
