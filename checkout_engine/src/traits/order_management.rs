use crate::{
    db_types::{NewOrder, Order, OrderId, OrderUpdate},
    traits::StorageError,
};

#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    async fn insert_order(&self, order: NewOrder) -> Result<Order, StorageError>;

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, StorageError>;

    async fn fetch_order_by_authorization_id(&self, authorization_id: &str) -> Result<Option<Order>, StorageError>;

    /// An instrument can be reused across orders; the most recently updated order wins.
    async fn fetch_order_by_instrument_id(&self, instrument_id: &str) -> Result<Option<Order>, StorageError>;

    async fn fetch_order_by_transfer_id(&self, transfer_id: &str) -> Result<Option<Order>, StorageError>;

    async fn fetch_orders_for_listing(&self, listing_id: &str) -> Result<Vec<Order>, StorageError>;

    /// Applies `update` to the order in a single conditional write.
    ///
    /// Returns `None` when the order does not exist, or when `update.expected_status` is non-empty and the order's
    /// current status is not in it. Callers must treat `None` as "someone else got there first" and re-read.
    async fn update_order(&self, id: &OrderId, update: OrderUpdate) -> Result<Option<Order>, StorageError>;

    /// Deletes an order that never took effect (a reservation that lost its race). Returns whether a row was removed.
    async fn delete_order(&self, id: &OrderId) -> Result<bool, StorageError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}
