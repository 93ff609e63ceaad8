//! Engine events.
//!
//! The APIs publish an event after every state change that someone outside the engine may care about (the seller
//! being told that their listing was reserved, a chat system message, and so on). Subscribers register closures on
//! [`EventHooks`]; [`EventHandlers`] turns them into channel-backed handlers and hands out [`EventProducers`] to the
//! APIs. Handlers run on their own tasks, so a slow or failing subscriber never holds up the operation that produced
//! the event.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers, HookFuture};
