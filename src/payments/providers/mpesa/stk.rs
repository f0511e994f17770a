//! STK push (Lipa na M-Pesa Online) request and response shapes

use crate::payments::types::{ConnectionParams, PaymentData};
use base64::{prelude::BASE64_STANDARD, Engine};
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;

/// Path of the push-payment endpoint, relative to the base URL
pub const STK_PUSH_PATH: &str = "mpesa/stkpush/v1/processrequest";

pub const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";

pub const TRANSACTION_DESC: &str = "Mpesa payment";

/// Error text the provider returns when the bearer token is expired or unknown
pub const INVALID_ACCESS_TOKEN: &str = "Invalid Access Token";

const FALLBACK_ERROR: &str = "M-Pesa payment request failed";

// Safaricom subscriber numbers: 07xx / 01xx, with or without the 254 prefix.
static MSISDN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\+?254|0)?([17]\d{8})$").expect("MSISDN pattern is valid"));

/// Reasons a payment cannot be turned into an STK push request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("M-Pesa only accepts positive whole amounts, got {0}")]
    InvalidAmount(Decimal),

    #[error("A billing phone number is required for M-Pesa payments")]
    MissingPhone,

    #[error("'{0}' is not a valid M-Pesa phone number")]
    InvalidPhone(String),
}

/// Payload of the push-payment call
#[derive(Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    pub amount: u64,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

impl StkPushRequest {
    pub fn build(
        payment: &PaymentData,
        params: &ConnectionParams,
        now: DateTime<Utc>,
        account_reference: String,
    ) -> Result<Self, RequestError> {
        let amount = whole_amount(payment.amount)?;

        let raw_phone = payment
            .billing
            .as_ref()
            .map(|b| b.phone.trim())
            .filter(|p| !p.is_empty())
            .ok_or(RequestError::MissingPhone)?;
        let phone = normalize_phone(raw_phone)
            .ok_or_else(|| RequestError::InvalidPhone(raw_phone.to_string()))?;

        let timestamp = format_timestamp(now);
        Ok(Self {
            business_short_code: params.shortcode.clone(),
            password: lipa_password(&params.shortcode, &params.passkey, &timestamp),
            timestamp,
            transaction_type: TRANSACTION_TYPE.to_string(),
            amount,
            party_a: phone.clone(),
            party_b: params.shortcode.clone(),
            phone_number: phone,
            callback_url: params.callback_url.clone(),
            account_reference,
            transaction_desc: TRANSACTION_DESC.to_string(),
        })
    }

    /// Move the request to a new timestamp, re-deriving the password.
    pub fn restamp(&mut self, params: &ConnectionParams, now: DateTime<Utc>) {
        self.timestamp = format_timestamp(now);
        self.password = lipa_password(&params.shortcode, &params.passkey, &self.timestamp);
    }
}

impl fmt::Debug for StkPushRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StkPushRequest")
            .field("business_short_code", &self.business_short_code)
            .field("password", &"[REDACTED]")
            .field("timestamp", &self.timestamp)
            .field("amount", &self.amount)
            .field("account_reference", &self.account_reference)
            .finish_non_exhaustive()
    }
}

/// `YYYYMMDDHHmmss`, as the provider expects
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// `base64(shortcode + passkey + timestamp)`
pub fn lipa_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    BASE64_STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"))
}

/// Normalize a Kenyan mobile number to `2547XXXXXXXX` / `2541XXXXXXXX`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    MSISDN
        .captures(&compact)
        .map(|caps| format!("254{}", &caps[1]))
}

/// The caller's reference when supplied, otherwise a fresh one.
pub fn account_reference(payment: &PaymentData) -> String {
    payment
        .reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn whole_amount(amount: Decimal) -> Result<u64, RequestError> {
    if amount <= Decimal::ZERO || !amount.fract().is_zero() {
        return Err(RequestError::InvalidAmount(amount));
    }
    amount.to_u64().ok_or(RequestError::InvalidAmount(amount))
}

/// Result of a push-payment call as the adapter sees it
#[derive(Debug, Clone, PartialEq)]
pub enum StkPushOutcome {
    /// The provider accepted the request and prompted the customer
    Accepted {
        checkout_request_id: String,
        raw: Value,
    },
    /// The request failed, at the provider or on the way there
    Rejected {
        /// Set when the provider issued an id before rejecting the request
        checkout_request_id: Option<String>,
        error_message: Option<String>,
        status: Option<u16>,
        raw: Option<Value>,
    },
}

impl StkPushOutcome {
    /// Classify an HTTP response.
    ///
    /// Never fails: a body that is not JSON, or JSON of an unexpected shape,
    /// yields `Rejected` with whatever message could be recovered.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let raw = serde_json::from_str::<Value>(body).ok();
        let field = |name: &str| {
            raw.as_ref()
                .and_then(|v| v.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let checkout_request_id = field("CheckoutRequestID").filter(|id| !id.is_empty());
        let response_code = field("ResponseCode");
        let accepted =
            status.is_success() && response_code.as_deref().map_or(true, |c| c == "0");

        match (accepted, checkout_request_id, raw.clone()) {
            (true, Some(checkout_request_id), Some(raw)) => Self::Accepted {
                checkout_request_id,
                raw,
            },
            (_, checkout_request_id, _) => Self::Rejected {
                checkout_request_id,
                error_message: field("errorMessage").or_else(|| {
                    response_code
                        .filter(|c| c != "0")
                        .and(field("ResponseDescription"))
                }),
                status: Some(status.as_u16()),
                raw,
            },
        }
    }

    /// Request never produced a readable response.
    pub fn transport_failure(err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("{}: request timed out", FALLBACK_ERROR)
        } else {
            format!("{}: {}", FALLBACK_ERROR, err)
        };
        Self::Rejected {
            checkout_request_id: None,
            error_message: Some(message),
            status: None,
            raw: None,
        }
    }

    pub fn is_invalid_token(&self) -> bool {
        matches!(
            self,
            Self::Rejected { error_message: Some(message), .. } if message == INVALID_ACCESS_TOKEN
        )
    }

    /// Error text to surface to the caller, with a fallback when the
    /// provider gave none.
    pub fn error_text(&self) -> Option<String> {
        match self {
            Self::Accepted { .. } => None,
            Self::Rejected {
                error_message: Some(message),
                ..
            } if !message.is_empty() => Some(message.clone()),
            Self::Rejected {
                status: Some(status),
                ..
            } => Some(format!("{} (HTTP {})", FALLBACK_ERROR, status)),
            Self::Rejected { .. } => Some(FALLBACK_ERROR.to_string()),
        }
    }
}
