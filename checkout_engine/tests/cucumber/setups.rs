use checkout_engine::test_utils::CheckoutSystem;
use cucumber::given;

use crate::cucumber::CheckoutWorld;

#[given("a fresh install")]
async fn fresh_database(world: &mut CheckoutWorld) {
    world.system = Some(CheckoutSystem::new().await);
}

#[given(expr = "seller '{word}' has listing {word} priced at {int} cents")]
async fn seller_listing(world: &mut CheckoutWorld, seller_id: String, listing_id: String, price: i64) {
    world.system().listing(&listing_id, &seller_id, price).await;
}
