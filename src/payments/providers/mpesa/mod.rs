//! M-Pesa payment gateway
//!
//! Integrates Safaricom's Lipa na M-Pesa Online (STK push) API. A capture
//! sends a payment prompt to the customer's handset and returns as soon as the
//! provider accepts the request; the final outcome arrives later through the
//! callback URL, which this crate does not handle.
//!
//! Confirm, void and refund have no provider endpoint behind them yet. They are
//! answered locally according to [`UnintegratedOperationPolicy`].

pub mod auth;
pub mod stk;

pub use auth::{AccessToken, TokenProvider};
pub use stk::{StkPushOutcome, StkPushRequest};

use crate::cache::cache::ttl;
use crate::cache::{Cache, InMemoryCache};
use crate::error::{GatewayError, GatewayResult};
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{GatewayConfig, GatewayResponse, PaymentData, TransactionKind};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Retries allowed after the provider reports the access token invalid
const MAX_TOKEN_RETRIES: u32 = 1;

/// How confirm, void and refund answer while no provider endpoint backs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnintegratedOperationPolicy {
    /// Report success and tag the response as not integrated.
    ///
    /// Suits hosts that reconcile push payments from the provider callback.
    #[default]
    Acknowledge,
    /// Report failure with an explanatory error
    Reject,
}

impl FromStr for UnintegratedOperationPolicy {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acknowledge" => Ok(Self::Acknowledge),
            "reject" => Ok(Self::Reject),
            other => Err(GatewayError::configuration(format!(
                "unknown unintegrated operation policy '{}', expected 'acknowledge' or 'reject'",
                other
            ))),
        }
    }
}

/// Adapter-level settings that are not part of the gateway configuration
#[derive(Debug, Clone)]
pub struct MpesaGatewayOptions {
    /// How long a fetched access token is reused
    pub token_ttl: Duration,
    /// Timeout applied to every provider request
    pub request_timeout: Duration,
    pub unintegrated_operations: UnintegratedOperationPolicy,
}

impl Default for MpesaGatewayOptions {
    fn default() -> Self {
        Self {
            token_ttl: ttl::MPESA_ACCESS_TOKEN,
            request_timeout: Duration::from_secs(30),
            unintegrated_operations: UnintegratedOperationPolicy::default(),
        }
    }
}

/// M-Pesa payment gateway
pub struct MpesaGateway {
    client: Client,
    tokens: TokenProvider,
    options: MpesaGatewayOptions,
}

impl MpesaGateway {
    /// Create a gateway that keeps access tokens in `store`
    pub fn new(
        store: Arc<dyn Cache<AccessToken>>,
        options: MpesaGatewayOptions,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| {
                GatewayError::configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        let tokens = TokenProvider::new(client.clone(), store, options.token_ttl);

        Ok(Self {
            client,
            tokens,
            options,
        })
    }

    /// Create a gateway with a process-local token store
    pub fn with_memory_cache(options: MpesaGatewayOptions) -> GatewayResult<Self> {
        Self::new(Arc::new(InMemoryCache::new()), options)
    }

    async fn send_stk_push(
        &self,
        url: &str,
        token: &AccessToken,
        request: &StkPushRequest,
    ) -> StkPushOutcome {
        let result = self
            .client
            .post(url)
            .bearer_auth(token.as_str())
            .json(request)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                match response.text().await {
                    Ok(body) => StkPushOutcome::from_response(status, &body),
                    Err(e) => StkPushOutcome::transport_failure(&e),
                }
            }
            Err(e) => StkPushOutcome::transport_failure(&e),
        }
    }

    fn unintegrated(&self, kind: TransactionKind, payment: &PaymentData) -> GatewayResponse {
        let mut response = GatewayResponse::for_payment(kind, payment);
        response.raw_response = Some(serde_json::json!({
            "integrated": false,
            "operation": kind,
        }));

        match self.options.unintegrated_operations {
            UnintegratedOperationPolicy::Acknowledge => {
                warn!(
                    %kind,
                    token = %payment.token,
                    "M-Pesa {} is not integrated with the provider, acknowledging locally",
                    kind
                );
                response.is_success = true;
            }
            UnintegratedOperationPolicy::Reject => {
                warn!(%kind, token = %payment.token, "Rejecting unintegrated M-Pesa operation");
                response.error = Some(format!(
                    "{} is not supported by the M-Pesa push-payment integration",
                    kind
                ));
            }
        }

        response
    }
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    #[instrument(skip_all, fields(token = %payment.token))]
    async fn capture(
        &self,
        payment: &PaymentData,
        config: &GatewayConfig,
    ) -> GatewayResult<GatewayResponse> {
        let params = &config.connection_params;
        let mut response = GatewayResponse::for_payment(TransactionKind::Capture, payment);

        let mut request = match StkPushRequest::build(
            payment,
            params,
            Utc::now(),
            stk::account_reference(payment),
        ) {
            Ok(request) => request,
            Err(e) => {
                warn!("Cannot initiate M-Pesa payment: {}", e);
                response.error = Some(e.to_string());
                return Ok(response);
            }
        };

        info!(
            amount = %payment.amount,
            currency = %payment.currency,
            reference = %request.account_reference,
            "Initiating M-Pesa STK push"
        );

        let url = params.endpoint(stk::STK_PUSH_PATH);
        let mut token = self.tokens.get_token(config).await?;
        let mut retries = 0;

        let outcome = loop {
            let outcome = self.send_stk_push(&url, &token, &request).await;
            if outcome.is_invalid_token() && retries < MAX_TOKEN_RETRIES {
                warn!("M-Pesa rejected the access token, refreshing and retrying");
                token = self.tokens.refresh(config, &token).await?;
                request.restamp(params, Utc::now());
                retries += 1;
                continue;
            }
            break outcome;
        };

        response.error = outcome.error_text();
        match outcome {
            StkPushOutcome::Accepted {
                checkout_request_id,
                raw,
            } => {
                info!(
                    checkout_request_id = %checkout_request_id,
                    "M-Pesa STK push accepted"
                );
                response.is_success = true;
                response.transaction_id = checkout_request_id;
                response.raw_response = Some(raw);
            }
            StkPushOutcome::Rejected {
                checkout_request_id,
                status,
                raw,
                ..
            } => {
                // The prompt may have reached the handset regardless, so the
                // customer has to be asked before anything is retried.
                warn!(
                    status = ?status,
                    checkout_request_id = checkout_request_id.as_deref().unwrap_or_default(),
                    error = response.error.as_deref().unwrap_or_default(),
                    "Error initiating M-Pesa payment"
                );
                response.action_required = true;
                if let Some(id) = checkout_request_id {
                    response.transaction_id = id;
                }
                response.raw_response = raw;
            }
        }

        Ok(response)
    }

    async fn confirm(
        &self,
        payment: &PaymentData,
        _config: &GatewayConfig,
    ) -> GatewayResult<GatewayResponse> {
        Ok(self.unintegrated(TransactionKind::Confirm, payment))
    }

    async fn void(
        &self,
        payment: &PaymentData,
        _config: &GatewayConfig,
    ) -> GatewayResult<GatewayResponse> {
        Ok(self.unintegrated(TransactionKind::Void, payment))
    }

    async fn refund(
        &self,
        payment: &PaymentData,
        _config: &GatewayConfig,
    ) -> GatewayResult<GatewayResponse> {
        Ok(self.unintegrated(TransactionKind::Refund, payment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{BillingDetails, ConnectionParams};
    use rust_decimal_macros::dec;

    fn config() -> GatewayConfig {
        GatewayConfig {
            gateway_name: "Mpesa".to_string(),
            auto_capture: false,
            connection_params: ConnectionParams {
                base_url: "http://127.0.0.1:1".to_string(),
                shortcode: "174379".to_string(),
                ..Default::default()
            },
        }
    }

    fn payment() -> PaymentData {
        PaymentData {
            amount: dec!(250),
            currency: "KES".to_string(),
            billing: Some(BillingDetails {
                phone: "0712345678".to_string(),
            }),
            token: "tok_abc".to_string(),
            reference: None,
        }
    }

    fn gateway(policy: UnintegratedOperationPolicy) -> MpesaGateway {
        MpesaGateway::with_memory_cache(MpesaGatewayOptions {
            unintegrated_operations: policy,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "Acknowledge".parse::<UnintegratedOperationPolicy>().unwrap(),
            UnintegratedOperationPolicy::Acknowledge
        );
        assert_eq!(
            " reject ".parse::<UnintegratedOperationPolicy>().unwrap(),
            UnintegratedOperationPolicy::Reject
        );
        assert!("ignore".parse::<UnintegratedOperationPolicy>().is_err());
    }

    #[test]
    fn test_default_options() {
        let options = MpesaGatewayOptions::default();
        assert_eq!(options.token_ttl, Duration::from_secs(450));
        assert_eq!(options.request_timeout, Duration::from_secs(30));
        assert_eq!(
            options.unintegrated_operations,
            UnintegratedOperationPolicy::Acknowledge
        );
    }

    #[tokio::test]
    async fn test_acknowledged_operations_echo_payment() {
        let gateway = gateway(UnintegratedOperationPolicy::Acknowledge);
        let payment = payment();

        let confirm = gateway.confirm(&payment, &config()).await.unwrap();
        let void = gateway.void(&payment, &config()).await.unwrap();
        let refund = gateway.refund(&payment, &config()).await.unwrap();

        for (response, kind) in [
            (confirm, TransactionKind::Confirm),
            (void, TransactionKind::Void),
            (refund, TransactionKind::Refund),
        ] {
            assert!(response.is_success);
            assert!(!response.action_required);
            assert_eq!(response.kind, kind);
            assert_eq!(response.error, None);
            assert_eq!(response.transaction_id, "tok_abc");
            assert_eq!(response.amount, dec!(250));
            assert_eq!(response.currency, "KES");
            let raw = response.raw_response.unwrap();
            assert_eq!(raw["integrated"], false);
            assert_eq!(raw["operation"], kind.to_string());
        }
    }

    #[tokio::test]
    async fn test_rejected_operations_report_error() {
        let gateway = gateway(UnintegratedOperationPolicy::Reject);
        let response = gateway.refund(&payment(), &config()).await.unwrap();

        assert!(!response.is_success);
        assert_eq!(response.kind, TransactionKind::Refund);
        assert_eq!(
            response.error.as_deref(),
            Some("refund is not supported by the M-Pesa push-payment integration")
        );
        assert_eq!(response.transaction_id, "tok_abc");
    }

    #[tokio::test]
    async fn test_invalid_payment_fails_before_contacting_provider() {
        let gateway = gateway(UnintegratedOperationPolicy::Acknowledge);
        let mut payment = payment();
        payment.amount = dec!(99.5);

        // The base URL is unreachable: reaching the token fetch would be an Err.
        let response = gateway.capture(&payment, &config()).await.unwrap();
        assert!(!response.is_success);
        assert!(!response.action_required);
        assert_eq!(response.kind, TransactionKind::Capture);
        assert_eq!(response.transaction_id, "tok_abc");
        assert_eq!(response.amount, dec!(99.5));
        assert!(response.error.unwrap().contains("whole amounts"));
    }

    #[tokio::test]
    async fn test_credential_failure_propagates() {
        let gateway = gateway(UnintegratedOperationPolicy::Acknowledge);
        let err = gateway.capture(&payment(), &config()).await.unwrap_err();
        assert!(err.is_credential());
    }
}
