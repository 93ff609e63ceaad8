use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderAnnulledEvent,
    OrderFulfilmentEvent,
    OrderPaidEvent,
    OrderReservedEvent,
    PaymentSubmittedEvent,
    RefundUpdatedEvent,
};

pub type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// One list of producers per event type. The APIs publish to every producer in the matching list.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_reserved_producer: Vec<EventProducer<OrderReservedEvent>>,
    pub payment_submitted_producer: Vec<EventProducer<PaymentSubmittedEvent>>,
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub order_fulfilment_producer: Vec<EventProducer<OrderFulfilmentEvent>>,
    pub order_annulled_producer: Vec<EventProducer<OrderAnnulledEvent>>,
    pub refund_updated_producer: Vec<EventProducer<RefundUpdatedEvent>>,
}

impl EventProducers {
    /// Adds every producer of `other` to this set.
    pub fn merge(&mut self, other: EventProducers) {
        self.order_reserved_producer.extend(other.order_reserved_producer);
        self.payment_submitted_producer.extend(other.payment_submitted_producer);
        self.order_paid_producer.extend(other.order_paid_producer);
        self.order_fulfilment_producer.extend(other.order_fulfilment_producer);
        self.order_annulled_producer.extend(other.order_annulled_producer);
        self.refund_updated_producer.extend(other.refund_updated_producer);
    }

    pub async fn publish_order_reserved(&self, event: OrderReservedEvent) {
        for producer in &self.order_reserved_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_payment_submitted(&self, event: PaymentSubmittedEvent) {
        for producer in &self.payment_submitted_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_paid(&self, event: OrderPaidEvent) {
        for producer in &self.order_paid_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_fulfilment(&self, event: OrderFulfilmentEvent) {
        for producer in &self.order_fulfilment_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_annulled(&self, event: OrderAnnulledEvent) {
        for producer in &self.order_annulled_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_refund_updated(&self, event: RefundUpdatedEvent) {
        for producer in &self.refund_updated_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_reserved: Option<EventHandler<OrderReservedEvent>>,
    pub on_payment_submitted: Option<EventHandler<PaymentSubmittedEvent>>,
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_order_fulfilment: Option<EventHandler<OrderFulfilmentEvent>>,
    pub on_order_annulled: Option<EventHandler<OrderAnnulledEvent>>,
    pub on_refund_updated: Option<EventHandler<RefundUpdatedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_reserved: hooks.on_order_reserved.map(|f| EventHandler::new(buffer_size, f)),
            on_payment_submitted: hooks.on_payment_submitted.map(|f| EventHandler::new(buffer_size, f)),
            on_order_paid: hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f)),
            on_order_fulfilment: hooks.on_order_fulfilment.map(|f| EventHandler::new(buffer_size, f)),
            on_order_annulled: hooks.on_order_annulled.map(|f| EventHandler::new(buffer_size, f)),
            on_refund_updated: hooks.on_refund_updated.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_reserved {
            result.order_reserved_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_submitted {
            result.payment_submitted_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_fulfilment {
            result.order_fulfilment_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_annulled {
            result.order_annulled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_updated {
            result.refund_updated_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns one task per configured handler. Each task ends when the last producer for it is dropped.
    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_reserved {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_payment_submitted {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_fulfilment {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_annulled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_refund_updated {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_reserved: Option<Handler<OrderReservedEvent>>,
    pub on_payment_submitted: Option<Handler<PaymentSubmittedEvent>>,
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_order_fulfilment: Option<Handler<OrderFulfilmentEvent>>,
    pub on_order_annulled: Option<Handler<OrderAnnulledEvent>>,
    pub on_refund_updated: Option<Handler<RefundUpdatedEvent>>,
}

impl EventHooks {
    pub fn on_order_reserved<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderReservedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_reserved = Some(Arc::new(f));
        self
    }

    pub fn on_payment_submitted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentSubmittedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_payment_submitted = Some(Arc::new(f));
        self
    }

    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_fulfilment<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderFulfilmentEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_fulfilment = Some(Arc::new(f));
        self
    }

    pub fn on_order_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAnnulledEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_annulled = Some(Arc::new(f));
        self
    }

    pub fn on_refund_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundUpdatedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_refund_updated = Some(Arc::new(f));
        self
    }
}
