use chrono::{DateTime, Utc};

use crate::{
    db_types::{NewWebhookEvent, WebhookEvent},
    traits::StorageError,
};

#[allow(async_fn_in_trait)]
pub trait WebhookEventManagement: Clone {
    /// Stores the event in `pending` status. If the event id is already known, the stored record is returned
    /// unchanged along with `false`.
    async fn record_webhook_event(&self, event: NewWebhookEvent) -> Result<(WebhookEvent, bool), StorageError>;

    async fn fetch_webhook_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, StorageError>;

    /// Atomically moves an event with fewer than `max_attempts` attempts to `processing` and bumps its attempt count.
    /// `pending` and retryable `failed` events can always be claimed. A `processing` event can only be claimed once
    /// its last update is older than `stale_before`. Returns `None` if the event cannot be claimed, e.g. because it
    /// has been processed or another worker holds it.
    async fn claim_webhook_event(
        &self,
        event_id: &str,
        max_attempts: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<WebhookEvent>, StorageError>;

    async fn complete_webhook_event(&self, event_id: &str, outcome: &str) -> Result<WebhookEvent, StorageError>;

    async fn fail_webhook_event(
        &self,
        event_id: &str,
        error: &str,
        retryable: bool,
    ) -> Result<WebhookEvent, StorageError>;

    /// Events that still have attempts left and need another pass, oldest first: retryable failures, and `pending` or
    /// `processing` events that have not been updated since `stale_before`.
    async fn fetch_retryable_webhook_events(
        &self,
        max_attempts: i64,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WebhookEvent>, StorageError>;
}
