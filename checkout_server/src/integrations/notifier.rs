//! Notification and chat wiring.
//!
//! The engine publishes events; this module turns them into user notifications and system messages in the order's
//! chat channel. Delivery is an HTTP POST of a small JSON document to `CKO_NOTIFICATION_URL`. With no URL configured,
//! the messages are only logged.
//!
//! Delivery failures are logged and swallowed. They never affect the operation that produced the event.
use std::time::Duration;

use checkout_engine::{
    db_types::{Order, OrderStatusType},
    events::{
        EventHandlers,
        EventHooks,
        OrderAnnulledEvent,
        OrderFulfilmentEvent,
        RefundUpdatedEvent,
    },
};
use log::*;
use reqwest::Client;
use serde_json::{json, Value};

pub const NOTIFICATION_EVENT_BUFFER_SIZE: usize = 25;
const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct Notifier {
    client: Client,
    url: Option<String>,
}

impl Notifier {
    pub fn new(url: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(NOTIFICATION_TIMEOUT).build()?;
        Ok(Self { client, url })
    }

    /// A notifier that only logs.
    pub fn log_only() -> Self {
        Self { client: Client::new(), url: None }
    }

    pub async fn notify(&self, user_id: &str, kind: &str, payload: Value) {
        let body = json!({ "kind": "notification", "user_id": user_id, "type": kind, "payload": payload });
        self.deliver(body).await;
    }

    pub async fn post_system_message(&self, channel_id: &str, event: &str, actor_id: &str) {
        let body = json!({ "kind": "system_message", "channel_id": channel_id, "event": event, "actor_id": actor_id });
        self.deliver(body).await;
    }

    async fn deliver(&self, body: Value) {
        let Some(url) = &self.url else {
            info!("📣️ {body}");
            return;
        };
        match self.client.post(url).json(&body).send().await {
            Ok(res) if res.status().is_success() => trace!("📣️ Delivered {body}"),
            Ok(res) => warn!("📣️ Notification endpoint answered {} for {body}", res.status()),
            Err(e) => warn!("📣️ Could not deliver {body}. {e}"),
        }
    }
}

/// The chat channel shared by the buyer and seller of an order.
pub fn channel_for(order: &Order) -> String {
    format!("order-{}", order.id)
}

fn order_payload(order: &Order) -> Value {
    json!({
        "order_id": order.id,
        "listing_id": order.listing_id,
        "status": order.status.to_string(),
        "amount": order.amount,
        "currency": order.currency,
    })
}

/// Subscribes the notifier to every engine event that a buyer or seller should hear about.
pub fn create_notification_handlers(notifier: Notifier) -> EventHandlers {
    let mut hooks = EventHooks::default();
    let n = notifier.clone();
    hooks.on_order_reserved(move |ev| {
        let n = n.clone();
        Box::pin(async move {
            let order = ev.order;
            n.notify(&order.seller_id, "order_reserved", order_payload(&order)).await;
            n.post_system_message(&channel_for(&order), "order_reserved", &order.buyer_id).await;
        })
    });
    let n = notifier.clone();
    hooks.on_payment_submitted(move |ev| {
        let n = n.clone();
        Box::pin(async move {
            let order = ev.order;
            n.notify(&order.seller_id, "payment_submitted", order_payload(&order)).await;
            n.post_system_message(&channel_for(&order), "payment_submitted", &order.buyer_id).await;
        })
    });
    let n = notifier.clone();
    hooks.on_order_paid(move |ev| {
        let n = n.clone();
        Box::pin(async move {
            let order = ev.order;
            n.notify(&order.seller_id, "order_paid", order_payload(&order)).await;
            n.notify(&order.buyer_id, "order_paid", order_payload(&order)).await;
        })
    });
    let n = notifier.clone();
    hooks.on_order_fulfilment(move |ev| {
        let n = n.clone();
        Box::pin(async move {
            let OrderFulfilmentEvent { order, status } = ev;
            let (recipient, actor, kind) = match status {
                OrderStatusType::Shipped => (&order.buyer_id, &order.seller_id, "order_shipped"),
                _ => (&order.seller_id, &order.buyer_id, "order_completed"),
            };
            let mut payload = order_payload(&order);
            payload["tracking_number"] = json!(order.tracking_number);
            payload["carrier"] = json!(order.tracking_carrier);
            n.notify(recipient, kind, payload).await;
            n.post_system_message(&channel_for(&order), kind, actor).await;
        })
    });
    let n = notifier.clone();
    hooks.on_order_annulled(move |ev| {
        let n = n.clone();
        Box::pin(async move {
            let OrderAnnulledEvent { order, status } = ev;
            let kind = format!("order_{status}");
            n.notify(&order.buyer_id, &kind, order_payload(&order)).await;
            n.notify(&order.seller_id, &kind, order_payload(&order)).await;
        })
    });
    hooks.on_refund_updated(move |ev| {
        let n = notifier.clone();
        Box::pin(async move {
            let RefundUpdatedEvent { refund, status, actor } = ev;
            let recipient = if actor.id == refund.buyer_id { &refund.seller_id } else { &refund.buyer_id };
            let kind = format!("refund_{status}");
            let payload = json!({
                "refund_id": refund.id,
                "order_id": refund.order_id,
                "amount": refund.requested_amount,
                "currency": refund.currency,
                "status": status.to_string(),
            });
            n.notify(recipient, &kind, payload).await;
            n.post_system_message(&format!("order-{}", refund.order_id), &kind, &actor.id).await;
        })
    });
    EventHandlers::new(NOTIFICATION_EVENT_BUFFER_SIZE, hooks)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn every_event_type_is_subscribed() {
        let handlers = create_notification_handlers(Notifier::log_only());
        let producers = handlers.producers();
        assert_eq!(producers.order_reserved_producer.len(), 1);
        assert_eq!(producers.payment_submitted_producer.len(), 1);
        assert_eq!(producers.order_paid_producer.len(), 1);
        assert_eq!(producers.order_fulfilment_producer.len(), 1);
        assert_eq!(producers.order_annulled_producer.len(), 1);
        assert_eq!(producers.refund_updated_producer.len(), 1);
    }
}
