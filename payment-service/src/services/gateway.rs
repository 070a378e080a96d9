//! Payment-gateway boundary.

use anyhow::Result;
use async_trait::async_trait;

/// A gateway-side order awaiting checkout. Ephemeral: only the order id
/// is retained locally, as the payment's transaction reference.
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub order_id: String,
    /// Amount in the smallest currency unit (paise for INR).
    pub amount: u64,
    pub currency: String,
}

/// Narrow interface to the external payment processor: order creation
/// and cryptographic signature checks.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a new order for `amount` in the smallest currency unit.
    async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt: Option<String>,
    ) -> Result<GatewayOrder>;

    /// Validate the gateway signature over `(order_id, payment_id)`.
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> Result<bool>;

    /// Public key identifier the hosted checkout UI initializes with.
    fn key_id(&self) -> String;
}
