//! Helpers for integration tests: throwaway SQLite databases, seed data, a scriptable in-memory processor and a fully
//! wired [`CheckoutSystem`].
pub mod fake_gateway;
pub mod prepare_env;
pub mod seeds;
pub mod system;

pub use fake_gateway::{FakeGateway, GatewayCall};
pub use system::{transfer_event, CheckoutSystem};
