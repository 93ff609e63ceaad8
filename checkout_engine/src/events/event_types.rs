use serde::{Deserialize, Serialize};

use crate::db_types::{Actor, Order, OrderStatusType, RefundRequest, RefundStatus};

/// A buyer has claimed a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReservedEvent {
    pub order: Order,
}

impl OrderReservedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// The processor accepted a payment for the order. Funds may not have moved yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSubmittedEvent {
    pub order: Order,
}

impl PaymentSubmittedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// The order moved along the fulfilment track (`shipped` or `completed`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFulfilmentEvent {
    pub order: Order,
    pub status: OrderStatusType,
}

impl OrderFulfilmentEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

/// The order ended without a sale: expired, cancelled, or failed at the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatusType,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundUpdatedEvent {
    pub refund: RefundRequest,
    /// Cancelled requests are deleted, so the status is carried separately.
    pub status: RefundStatus,
    pub actor: Actor,
}

impl RefundUpdatedEvent {
    pub fn new(refund: RefundRequest, actor: Actor) -> Self {
        let status = refund.status;
        Self { refund, status, actor }
    }

    pub fn cancelled(refund: RefundRequest, actor: Actor) -> Self {
        Self { refund, status: RefundStatus::Cancelled, actor }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderReserved(OrderReservedEvent),
    PaymentSubmitted(PaymentSubmittedEvent),
    OrderPaid(OrderPaidEvent),
    OrderFulfilment(OrderFulfilmentEvent),
    OrderAnnulled(OrderAnnulledEvent),
    RefundUpdated(RefundUpdatedEvent),
}
