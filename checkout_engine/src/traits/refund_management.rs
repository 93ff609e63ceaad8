use crate::{
    db_types::{NewRefundRequest, OrderId, RefundRequest, RefundStatus, RefundUpdate},
    traits::StorageError,
};

#[allow(async_fn_in_trait)]
pub trait RefundManagement: Clone {
    /// Inserts a new request in `pending` status.
    ///
    /// Fails with [`StorageError::ActiveRefundExists`] if the order already has a non-terminal request, and with
    /// [`StorageError::DuplicateIdempotencyId`] if the idempotency id has been used before. Both are enforced by the
    /// storage layer, not by a prior read.
    async fn insert_refund_request(&self, refund: NewRefundRequest) -> Result<RefundRequest, StorageError>;

    async fn fetch_refund_request(&self, id: &str) -> Result<Option<RefundRequest>, StorageError>;

    async fn fetch_active_refund_for_order(&self, order_id: &OrderId) -> Result<Option<RefundRequest>, StorageError>;

    async fn fetch_refunds_for_order(&self, order_id: &OrderId) -> Result<Vec<RefundRequest>, StorageError>;

    async fn fetch_refund_by_reversal_id(&self, reversal_id: &str) -> Result<Option<RefundRequest>, StorageError>;

    /// Conditional update, with the same `None` semantics as [`super::OrderManagement::update_order`].
    async fn update_refund_request(
        &self,
        id: &str,
        update: RefundUpdate,
    ) -> Result<Option<RefundRequest>, StorageError>;

    /// Hard-deletes the request if its status is one of `allowed`. Returns whether a row was removed.
    async fn delete_refund_request(&self, id: &str, allowed: &[RefundStatus]) -> Result<bool, StorageError>;
}
