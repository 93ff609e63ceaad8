use crate::{db_types::UserProfile, traits::StorageError};

#[allow(async_fn_in_trait)]
pub trait UserDirectory: Clone {
    async fn fetch_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError>;

    async fn upsert_user_profile(&self, profile: UserProfile) -> Result<UserProfile, StorageError>;
}
