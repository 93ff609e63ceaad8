use crate::{
    db_types::{Listing, NewListing, ReservationClaim},
    traits::StorageError,
};

/// The listing catalogue as far as checkout is concerned: price, seller, status and the reservation marker.
#[allow(async_fn_in_trait)]
pub trait ListingManagement: Clone {
    async fn insert_listing(&self, listing: NewListing) -> Result<Listing, StorageError>;

    async fn fetch_listing(&self, listing_id: &str) -> Result<Option<Listing>, StorageError>;

    /// Stamps the reservation marker in one conditional write. The write only succeeds if the listing is active and
    /// its marker is absent or lapsed at `claim.now`. Returns whether the claim took effect.
    async fn conditional_reserve(&self, claim: &ReservationClaim) -> Result<bool, StorageError>;

    /// Takes the listing off the market while the payment of `order_id` settles, provided that order still holds the
    /// marker and the listing is active.
    async fn hold_for_sale(&self, listing_id: &str, order_id: &str) -> Result<bool, StorageError>;

    /// Clears the reservation marker, but only if it is still held by `order_id`. A listing held for sale becomes
    /// active again.
    async fn release_reservation(&self, listing_id: &str, order_id: &str) -> Result<bool, StorageError>;

    /// Makes the listing sellable again: status `active`, marker cleared.
    async fn set_active(&self, listing_id: &str) -> Result<Listing, StorageError>;

    /// Marks the listing sold to `order_id`, provided that order still holds the marker and the listing is active or
    /// held for sale.
    async fn mark_sold(&self, listing_id: &str, order_id: &str) -> Result<bool, StorageError>;
}
