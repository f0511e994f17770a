//! M-Pesa push-payment gateway
//!
//! Adapts a generic payment-gateway interface (capture, confirm, void, refund)
//! to Safaricom's Lipa na M-Pesa Online API, with shared caching of the
//! provider's short-lived access tokens.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod payments;

pub use error::{GatewayError, GatewayResult};
pub use payments::plugin::MpesaPlugin;
pub use payments::providers::mpesa::{
    AccessToken, MpesaGateway, MpesaGatewayOptions, TokenProvider, UnintegratedOperationPolicy,
};
pub use payments::traits::PaymentGateway;
pub use payments::types::{
    BillingDetails, ConnectionParams, GatewayConfig, GatewayResponse, PaymentData,
    TransactionKind,
};
