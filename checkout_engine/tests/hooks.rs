use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use checkout_engine::{
    checkout_api::order_objects::ShippingDetails,
    db_types::{Actor, OrderStatusType, RefundStatus},
    events::{EventHandlers, EventHooks},
    test_utils::CheckoutSystem,
};
use log::*;

/// Collects a label for every event a hook sees.
#[derive(Default, Clone)]
struct HookCalls {
    calls: Arc<Mutex<Vec<String>>>,
}

impl HookCalls {
    fn record(&self, label: String) {
        self.calls.lock().unwrap().push(label);
    }

    fn snapshot(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Hooks run on their own tasks, so give them a moment to catch up.
    async fn wait_for(&self, count: usize) -> Vec<String> {
        for _ in 0..50 {
            if self.calls.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.snapshot()
    }
}

fn recording_hooks(calls: &HookCalls) -> EventHooks {
    let mut hooks = EventHooks::default();
    let c = calls.clone();
    hooks.on_order_reserved(move |ev| {
        let c = c.clone();
        Box::pin(async move { c.record(format!("reserved {}", ev.order.listing_id)) })
    });
    let c = calls.clone();
    hooks.on_payment_submitted(move |ev| {
        let c = c.clone();
        Box::pin(async move { c.record(format!("submitted {}", ev.order.status)) })
    });
    let c = calls.clone();
    hooks.on_order_paid(move |ev| {
        let c = c.clone();
        Box::pin(async move { c.record(format!("paid {}", ev.order.status)) })
    });
    let c = calls.clone();
    hooks.on_order_fulfilment(move |ev| {
        let c = c.clone();
        Box::pin(async move { c.record(format!("fulfilment {}", ev.status)) })
    });
    let c = calls.clone();
    hooks.on_order_annulled(move |ev| {
        let c = c.clone();
        Box::pin(async move { c.record(format!("annulled {}", ev.status)) })
    });
    let c = calls.clone();
    hooks.on_refund_updated(move |ev| {
        let c = c.clone();
        Box::pin(async move { c.record(format!("refund {}", ev.status)) })
    });
    hooks
}

async fn system_with_hooks(calls: &HookCalls) -> CheckoutSystem {
    let _ = env_logger::try_init();
    let handlers = EventHandlers::new(16, recording_hooks(calls));
    let producers = handlers.producers();
    handlers.start_handlers().await;
    CheckoutSystem::with_producers(producers).await
}

#[tokio::test]
async fn the_happy_path_publishes_each_step() {
    let calls = HookCalls::default();
    let system = system_with_hooks(&calls).await;
    system.listing("L", "seller", 12_500).await;
    let order = system.paid_order("L", "buyer").await;
    let shipping = ShippingDetails { tracking_number: "1Z999".into(), carrier: Some("UPS".into()) };
    system.orders.mark_shipped(&order.id, &Actor::seller("seller"), shipping).await.unwrap();
    let done = system.orders.confirm_delivery(&order.id, &Actor::buyer("buyer")).await.unwrap();
    assert_eq!(done.status, OrderStatusType::Completed);

    let seen = calls.wait_for(5).await;
    info!("🪝️ {seen:?}");
    // Each hook runs on its own task, so only the order within one event type is guaranteed
    let mut expected = vec![
        "reserved L",
        "submitted processing",
        "paid paid",
        "fulfilment shipped",
        "fulfilment completed",
    ];
    let mut seen_sorted = seen.clone();
    seen_sorted.sort();
    expected.sort();
    assert_eq!(seen_sorted, expected);
    let fulfilment = seen.iter().filter(|s| s.starts_with("fulfilment")).collect::<Vec<_>>();
    assert_eq!(fulfilment, vec!["fulfilment shipped", "fulfilment completed"]);
    system.tear_down().await;
}

#[tokio::test]
async fn cancellations_and_refunds_are_published() {
    let calls = HookCalls::default();
    let system = system_with_hooks(&calls).await;
    system.listing("L1", "seller", 12_500).await;
    system.listing("L2", "seller", 12_500).await;
    let buyer = Actor::buyer("buyer");

    let reserved = system.reservations.reserve("L1", "buyer").await.unwrap();
    system.orders.cancel_order(&reserved.id, &buyer).await.unwrap();

    let order = system.paid_order("L2", "buyer").await;
    let refund =
        system.refunds.request_refund(&order.id, &buyer, "Not as described in the listing", None, None).await.unwrap();
    system.refunds.cancel_refund_request(&refund.id, &buyer).await.unwrap();

    let seen = calls.wait_for(7).await;
    assert!(seen.contains(&"annulled cancelled".to_string()), "{seen:?}");
    let refunds = seen.iter().filter(|s| s.starts_with("refund")).cloned().collect::<Vec<_>>();
    let expected = vec![format!("refund {}", RefundStatus::Pending), format!("refund {}", RefundStatus::Cancelled)];
    assert_eq!(refunds, expected);
    assert_eq!(seen.iter().filter(|s| s.starts_with("reserved")).count(), 2);
    system.tear_down().await;
}
