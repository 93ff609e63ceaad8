mod api;
mod config;
mod error;
mod helpers;

mod data_objects;

pub use api::FinixApi;
pub use config::{FinixConfig, FinixEnvironment};
pub use data_objects::{
    Address,
    Authorization,
    EntityDetails,
    Identity,
    NewAuthorization,
    NewIdentity,
    NewPaymentInstrument,
    NewReversal,
    NewTransfer,
    PaymentInstrument,
    Tags,
    Transfer,
};
pub use error::FinixApiError;
pub use helpers::backoff_delay;
