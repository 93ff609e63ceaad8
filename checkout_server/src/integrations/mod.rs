pub mod finix;
pub mod notifier;
