//! Gateway contract types
//!
//! The data exchanged between the host payment framework and a gateway:
//! connection configuration in, payment data in, a normalized response out.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gateway configuration handed to every operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Display name of the gateway
    pub gateway_name: String,
    /// Whether payments are captured immediately after authorization
    pub auto_capture: bool,
    /// Provider connection parameters
    pub connection_params: ConnectionParams,
}

/// M-Pesa connection parameters
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Daraja application consumer key
    pub consumer_key: String,
    /// Daraja application consumer secret
    pub consumer_secret: String,
    /// API base URL (e.g. https://sandbox.safaricom.co.ke/)
    pub base_url: String,
    /// Business shortcode (paybill or till number)
    pub shortcode: String,
    /// Lipa na M-Pesa online passkey
    pub passkey: String,
    /// URL the provider calls with the final transaction result
    pub callback_url: String,
    /// Username used to authenticate initiator requests
    pub initiator_name: String,
    /// Security credential generated on the Safaricom portal
    pub initiator_security_credential: Option<String>,
}

impl ConnectionParams {
    /// Join an API path onto the configured base URL.
    ///
    /// Tolerates a trailing slash on the base URL and a leading slash on the path.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("consumer_key", &"[REDACTED]")
            .field("consumer_secret", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("shortcode", &self.shortcode)
            .field("passkey", &"[REDACTED]")
            .field("callback_url", &self.callback_url)
            .field("initiator_name", &self.initiator_name)
            .field(
                "initiator_security_credential",
                &self.initiator_security_credential.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Billing details of the paying customer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingDetails {
    /// Phone number registered with M-Pesa
    pub phone: String,
}

/// Payment data for a single gateway operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentData {
    /// Amount in major currency units
    pub amount: Decimal,
    /// Currency code (KES)
    pub currency: String,
    /// Billing details, when the checkout collected them
    pub billing: Option<BillingDetails>,
    /// Transaction token issued for this payment
    pub token: String,
    /// Caller-chosen reference, forwarded as the account reference so retries
    /// by the caller stay correlated
    pub reference: Option<String>,
}

/// Kind of transaction a response describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Capture,
    Confirm,
    Void,
    Refund,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture => f.write_str("capture"),
            Self::Confirm => f.write_str("confirm"),
            Self::Void => f.write_str("void"),
            Self::Refund => f.write_str("refund"),
        }
    }
}

/// Normalized outcome of a gateway operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub is_success: bool,
    /// The customer has to act (e.g. retry on their handset) before the
    /// payment can complete
    pub action_required: bool,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub currency: String,
    /// Provider checkout id when one was issued, otherwise the payment token
    pub transaction_id: String,
    pub error: Option<String>,
    /// Provider payload the response was derived from
    pub raw_response: Option<serde_json::Value>,
}

impl GatewayResponse {
    /// Response for `payment` with every outcome field at its neutral value.
    pub(crate) fn for_payment(kind: TransactionKind, payment: &PaymentData) -> Self {
        Self {
            is_success: false,
            action_required: false,
            kind,
            amount: payment.amount,
            currency: payment.currency.clone(),
            transaction_id: payment.token.clone(),
            error: None,
            raw_response: None,
        }
    }
}
