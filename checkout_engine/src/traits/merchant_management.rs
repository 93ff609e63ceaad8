use crate::{
    db_types::{MerchantOnboarding, OnboardingUpdate},
    traits::StorageError,
};

#[allow(async_fn_in_trait)]
pub trait MerchantManagement: Clone {
    /// The seller's approved merchant account, if they have one.
    async fn fetch_approved_merchant(&self, user_id: &str) -> Result<Option<MerchantOnboarding>, StorageError>;

    async fn fetch_onboarding_for_user(&self, user_id: &str) -> Result<Option<MerchantOnboarding>, StorageError>;

    async fn fetch_onboarding_by_identity(&self, identity_id: &str)
        -> Result<Option<MerchantOnboarding>, StorageError>;

    /// Records a completed onboarding form against the user, creating the tracking record if needed, and moves it to
    /// `PROVISIONING`.
    async fn upsert_onboarding_form(
        &self,
        user_id: &str,
        form_id: &str,
        identity_id: &str,
    ) -> Result<MerchantOnboarding, StorageError>;

    async fn update_onboarding(&self, id: i64, update: OnboardingUpdate) -> Result<MerchantOnboarding, StorageError>;
}
