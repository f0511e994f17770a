//! Payment provider implementations
//!
//! Concrete implementations of the PaymentGateway trait for different providers.

pub mod mpesa;

pub use mpesa::{MpesaGateway, MpesaGatewayOptions, UnintegratedOperationPolicy};
