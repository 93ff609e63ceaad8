use checkout_engine::{
    db_types::MinorUnits,
    traits::{
        gateway_objects::{
            BuyerIdentityRequest,
            ChargeRequest,
            GatewayAuthorization,
            GatewayError,
            GatewayIdentity,
            GatewayInstrument,
            GatewayTransfer,
            InstrumentRequest,
            Tags,
        },
        PaymentGateway,
    },
};
use mockall::mock;

mock! {
    pub Gateway {}
    impl Clone for Gateway {
        fn clone(&self) -> Self;
    }
    impl PaymentGateway for Gateway {
        fn application_id(&self) -> &str;
        fn environment(&self) -> &str;
        async fn create_buyer_identity(&self, request: BuyerIdentityRequest, idempotency_key: &str) -> Result<GatewayIdentity, GatewayError>;
        async fn create_payment_instrument(&self, request: InstrumentRequest, idempotency_key: &str) -> Result<GatewayInstrument, GatewayError>;
        async fn get_payment_instrument(&self, instrument_id: &str) -> Result<GatewayInstrument, GatewayError>;
        async fn authorize_payment(&self, request: ChargeRequest, idempotency_key: &str) -> Result<GatewayAuthorization, GatewayError>;
        async fn capture_payment(&self, authorization_id: &str, amount: MinorUnits, idempotency_key: &str) -> Result<GatewayAuthorization, GatewayError>;
        async fn create_transfer(&self, request: ChargeRequest, idempotency_key: &str) -> Result<GatewayTransfer, GatewayError>;
        async fn get_transfer(&self, transfer_id: &str) -> Result<GatewayTransfer, GatewayError>;
        async fn create_transfer_reversal(&self, transfer_id: &str, amount: MinorUnits, tags: Tags, idempotency_key: &str) -> Result<GatewayTransfer, GatewayError>;
        async fn void_authorization(&self, authorization_id: &str, idempotency_key: &str) -> Result<GatewayAuthorization, GatewayError>;
    }
}
