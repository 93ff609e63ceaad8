//! A fully wired engine over a throwaway database and the [`FakeGateway`].
use serde_json::{json, Value};

use crate::{
    checkout_api::order_objects::{PaymentSource, PrefillOverrides},
    db_types::{MinorUnits, Order, OrderId},
    events::EventProducers,
    test_utils::{
        fake_gateway::FakeGateway,
        prepare_env::{drop_database, fresh_database},
        seeds::{seed_approved_merchant, seed_listing, seed_profile},
    },
    traits::{gateway_objects::GatewayState, OrderManagement},
    CheckoutApi,
    OrderFlowApi,
    RefundApi,
    ReservationApi,
    SqliteDatabase,
    WebhookApi,
};

pub struct CheckoutSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub gateway: FakeGateway,
    pub reservations: ReservationApi<SqliteDatabase>,
    pub checkout: CheckoutApi<SqliteDatabase, FakeGateway>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub refunds: RefundApi<SqliteDatabase, FakeGateway>,
    pub webhooks: WebhookApi<SqliteDatabase>,
}

impl std::fmt::Debug for CheckoutSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutSystem ({})", self.db_path)
    }
}

impl CheckoutSystem {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let db_path = fresh_database().await;
        let db = SqliteDatabase::new_with_url(&db_path, 5).await.expect("Error creating connection to database");
        let gateway = FakeGateway::new();
        Self {
            reservations: ReservationApi::new(db.clone(), producers.clone()),
            checkout: CheckoutApi::new(db.clone(), gateway.clone(), producers.clone()),
            orders: OrderFlowApi::new(db.clone(), producers.clone()),
            refunds: RefundApi::new(db.clone(), gateway.clone(), producers.clone()),
            webhooks: WebhookApi::new(db.clone(), producers),
            db_path,
            db,
            gateway,
        }
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.db.close().await {
            log::error!("🚀️ Failed to close database: {e}");
        }
        drop_database(&self.db_path).await;
    }

    /// Seeds an approved seller and one of their listings.
    pub async fn listing(&self, listing_id: &str, seller_id: &str, price: i64) {
        seed_approved_merchant(&self.db, seller_id).await;
        seed_listing(&self.db, listing_id, seller_id, price).await;
    }

    pub async fn order(&self, order_id: &OrderId) -> Order {
        self.db.fetch_order(order_id).await.expect("Error fetching order").expect("Order does not exist")
    }

    /// Reserves, tokenizes and pays for the listing with a card token. The order ends up in `processing`.
    pub async fn submitted_order(&self, listing_id: &str, buyer_id: &str) -> Order {
        seed_profile(&self.db, buyer_id, Some("US")).await;
        let order = self.reservations.reserve(listing_id, buyer_id).await.expect("Error reserving listing");
        let key = format!("checkout-{}", order.id);
        self.checkout
            .tokenization_config(&order.id, buyer_id, &key, PrefillOverrides::default())
            .await
            .expect("Error fetching tokenization config");
        let source = PaymentSource::Token { token: format!("TK-{buyer_id}"), address: None };
        self.checkout.process_payment(&order.id, buyer_id, &key, source).await.expect("Error processing payment")
    }

    /// Like [`Self::submitted_order`], then settles the transfer and delivers the `transfer.updated` webhook.
    pub async fn paid_order(&self, listing_id: &str, buyer_id: &str) -> Order {
        let order = self.submitted_order(listing_id, buyer_id).await;
        let transfer_id = order.finix_transfer_id.clone().expect("Submitted order has no transfer");
        self.settle(&transfer_id, order.amount).await;
        self.order(&order.id).await
    }

    /// Marks the transfer as succeeded at the processor and delivers the matching webhook.
    pub async fn settle(&self, transfer_id: &str, amount: MinorUnits) {
        self.gateway.settle_transfer(transfer_id, GatewayState::Succeeded);
        let event_id = format!("EV-{transfer_id}-settled");
        self.deliver(transfer_event(&event_id, "updated", transfer_id, "SUCCEEDED", amount.value())).await;
    }

    /// Records and processes a webhook payload, the way the server does.
    pub async fn deliver(&self, payload: Value) -> Option<crate::db_types::WebhookEvent> {
        let receipt = self.webhooks.receive(payload).await.expect("Error recording webhook");
        self.webhooks.process_event(&receipt.event.event_id).await.expect("Error processing webhook")
    }
}

pub fn transfer_event(event_id: &str, event_type: &str, transfer_id: &str, state: &str, amount: i64) -> Value {
    json!({
        "id": event_id,
        "type": event_type,
        "entity": "transfer",
        "_embedded": { "transfers": [ {
            "id": transfer_id,
            "state": state,
            "amount": amount,
            "currency": "USD",
            "type": "DEBIT",
        } ] }
    })
}
