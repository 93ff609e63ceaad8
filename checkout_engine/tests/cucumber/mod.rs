pub mod checkout_world;
pub mod setups;
pub mod steps;

pub use checkout_world::CheckoutWorld;
