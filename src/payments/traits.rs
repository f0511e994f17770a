//! Payment gateway trait definitions
//!
//! Defines the common interface a gateway exposes to the host payment framework.

use crate::error::GatewayResult;
use crate::payments::types::{GatewayConfig, GatewayResponse, PaymentData};
use async_trait::async_trait;

/// Trait for payment gateway implementations
///
/// Every operation returns exactly one [`GatewayResponse`] whose `kind` matches
/// the operation. Declined or failed payments are reported through the
/// response; `Err` is reserved for failures the gateway cannot express as a
/// payment outcome, such as being unable to authenticate with the provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Capture (initiate) a payment
    ///
    /// For push-payment providers this sends the payment prompt to the
    /// customer's handset and returns once the provider has accepted the request.
    ///
    /// # Arguments
    /// * `payment` - Amount, currency, billing details and payment token
    /// * `config` - Connection parameters for the provider
    async fn capture(
        &self,
        payment: &PaymentData,
        config: &GatewayConfig,
    ) -> GatewayResult<GatewayResponse>;

    /// Confirm a previously captured payment
    async fn confirm(
        &self,
        payment: &PaymentData,
        config: &GatewayConfig,
    ) -> GatewayResult<GatewayResponse>;

    /// Void a payment that has not settled
    async fn void(
        &self,
        payment: &PaymentData,
        config: &GatewayConfig,
    ) -> GatewayResult<GatewayResponse>;

    /// Refund a settled payment
    async fn refund(
        &self,
        payment: &PaymentData,
        config: &GatewayConfig,
    ) -> GatewayResult<GatewayResponse>;

    /// Process a payment end to end
    ///
    /// Defaults to [`PaymentGateway::capture`].
    async fn process_payment(
        &self,
        payment: &PaymentData,
        config: &GatewayConfig,
    ) -> GatewayResult<GatewayResponse> {
        self.capture(payment, config).await
    }
}
