//! Host-facing M-Pesa plugin
//!
//! Wraps [`MpesaGateway`] the way the host payment framework consumes it: an
//! inactive plugin passes every call through untouched, secrets never leave
//! the plugin, and only public fields are exposed to the storefront.

use crate::error::GatewayResult;
use crate::payments::providers::mpesa::MpesaGateway;
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{ConnectionParams, GatewayConfig, GatewayResponse, PaymentData};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const GATEWAY_NAME: &str = "Mpesa";

/// Placeholder shown instead of a secret value
pub const REDACTED_FORM: &str = "[REDACTED]";

const SECRET_FIELDS: [&str; 4] = [
    "Consumer key",
    "Consumer secret",
    "Online passkey",
    "Initiator security credential",
];

/// A named configuration value as shown in the host's admin surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationField {
    pub name: String,
    pub value: String,
}

/// A public payment setting handed to the storefront
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfigField {
    pub field: String,
    pub value: String,
}

pub struct MpesaPlugin {
    active: bool,
    config: GatewayConfig,
    gateway: MpesaGateway,
}

impl MpesaPlugin {
    pub fn new(active: bool, connection_params: ConnectionParams, gateway: MpesaGateway) -> Self {
        Self {
            active,
            config: GatewayConfig {
                gateway_name: GATEWAY_NAME.to_string(),
                auto_capture: false,
                connection_params,
            },
            gateway,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn gateway_config(&self) -> &GatewayConfig {
        &self.config
    }

    pub async fn capture_payment(
        &self,
        payment: &PaymentData,
        previous_value: Option<GatewayResponse>,
    ) -> GatewayResult<Option<GatewayResponse>> {
        if !self.active {
            return Ok(previous_value);
        }
        self.gateway.capture(payment, &self.config).await.map(Some)
    }

    pub async fn confirm_payment(
        &self,
        payment: &PaymentData,
        previous_value: Option<GatewayResponse>,
    ) -> GatewayResult<Option<GatewayResponse>> {
        if !self.active {
            return Ok(previous_value);
        }
        self.gateway.confirm(payment, &self.config).await.map(Some)
    }

    pub async fn refund_payment(
        &self,
        payment: &PaymentData,
        previous_value: Option<GatewayResponse>,
    ) -> GatewayResult<Option<GatewayResponse>> {
        if !self.active {
            return Ok(previous_value);
        }
        self.gateway.refund(payment, &self.config).await.map(Some)
    }

    pub async fn void_payment(
        &self,
        payment: &PaymentData,
        previous_value: Option<GatewayResponse>,
    ) -> GatewayResult<Option<GatewayResponse>> {
        if !self.active {
            return Ok(previous_value);
        }
        self.gateway.void(payment, &self.config).await.map(Some)
    }

    pub async fn process_payment(
        &self,
        payment: &PaymentData,
        previous_value: Option<GatewayResponse>,
    ) -> GatewayResult<Option<GatewayResponse>> {
        if !self.active {
            return Ok(previous_value);
        }
        self.gateway
            .process_payment(payment, &self.config)
            .await
            .map(Some)
    }

    /// Fresh client token for the storefront
    pub fn get_client_token(&self, previous_value: Option<String>) -> Option<String> {
        if !self.active {
            return previous_value;
        }
        Some(Uuid::new_v4().to_string())
    }

    /// Public settings the storefront needs to render the payment form
    pub fn get_payment_config(
        &self,
        previous_value: Option<Vec<PaymentConfigField>>,
    ) -> Option<Vec<PaymentConfigField>> {
        if !self.active {
            return previous_value;
        }
        let params = &self.config.connection_params;
        Some(vec![
            PaymentConfigField {
                field: "shortcode".to_string(),
                value: params.shortcode.clone(),
            },
            PaymentConfigField {
                field: "callback_url".to_string(),
                value: params.callback_url.clone(),
            },
        ])
    }

    /// Current configuration with secret values redacted
    pub fn configuration(&self) -> Vec<ConfigurationField> {
        let mut fields = configuration_fields(&self.config.connection_params);
        hide_secret_fields(&mut fields);
        fields
    }

    /// Configuration a freshly installed plugin starts from
    pub fn default_configuration() -> Vec<ConfigurationField> {
        configuration_fields(&ConnectionParams {
            base_url: "https://sandbox.safaricom.co.ke/".to_string(),
            shortcode: "174379".to_string(),
            initiator_name: "apitest425".to_string(),
            ..Default::default()
        })
    }
}

fn configuration_fields(params: &ConnectionParams) -> Vec<ConfigurationField> {
    [
        ("Consumer key", params.consumer_key.as_str()),
        ("Consumer secret", params.consumer_secret.as_str()),
        ("Base URL", params.base_url.as_str()),
        ("Business shortcode", params.shortcode.as_str()),
        ("Online passkey", params.passkey.as_str()),
        ("Callback URL", params.callback_url.as_str()),
        (
            "Initiator security credential",
            params.initiator_security_credential.as_deref().unwrap_or(""),
        ),
        ("Initiator name", params.initiator_name.as_str()),
    ]
    .into_iter()
    .map(|(name, value)| ConfigurationField {
        name: name.to_string(),
        value: value.to_string(),
    })
    .collect()
}

fn hide_secret_fields(fields: &mut [ConfigurationField]) {
    for field in fields {
        // Empty values stay empty so the admin can tell what is unset
        if SECRET_FIELDS.contains(&field.name.as_str()) && !field.value.is_empty() {
            field.value = REDACTED_FORM.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::providers::mpesa::MpesaGatewayOptions;
    use crate::payments::types::{BillingDetails, TransactionKind};
    use rust_decimal_macros::dec;

    fn params() -> ConnectionParams {
        ConnectionParams {
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            shortcode: "174379".to_string(),
            passkey: "pk".to_string(),
            callback_url: "https://shop.example/callback".to_string(),
            initiator_name: "apitest425".to_string(),
            initiator_security_credential: None,
        }
    }

    fn plugin(active: bool) -> MpesaPlugin {
        let gateway = MpesaGateway::with_memory_cache(MpesaGatewayOptions::default()).unwrap();
        MpesaPlugin::new(active, params(), gateway)
    }

    fn payment() -> PaymentData {
        PaymentData {
            amount: dec!(100),
            currency: "KES".to_string(),
            billing: Some(BillingDetails {
                phone: "0712345678".to_string(),
            }),
            token: "tok".to_string(),
            reference: None,
        }
    }

    #[tokio::test]
    async fn test_inactive_plugin_passes_previous_value_through() {
        let plugin = plugin(false);
        assert!(!plugin.is_active());

        let result = plugin.capture_payment(&payment(), None).await.unwrap();
        assert_eq!(result, None);
        assert_eq!(plugin.get_client_token(Some("prev".to_string())).as_deref(), Some("prev"));
        assert_eq!(plugin.get_payment_config(None), None);
    }

    #[tokio::test]
    async fn test_active_plugin_dispatches_to_gateway() {
        let plugin = plugin(true);
        let response = plugin.void_payment(&payment(), None).await.unwrap().unwrap();
        assert_eq!(response.kind, TransactionKind::Void);
        assert!(response.is_success);

        let response = plugin.confirm_payment(&payment(), None).await.unwrap().unwrap();
        assert_eq!(response.kind, TransactionKind::Confirm);
    }

    #[test]
    fn test_payment_config_exposes_public_fields_only() {
        let config = plugin(true).get_payment_config(None).unwrap();
        assert_eq!(
            config,
            vec![
                PaymentConfigField {
                    field: "shortcode".to_string(),
                    value: "174379".to_string(),
                },
                PaymentConfigField {
                    field: "callback_url".to_string(),
                    value: "https://shop.example/callback".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_client_token_is_uuid() {
        let token = plugin(true).get_client_token(None).unwrap();
        assert!(Uuid::parse_str(&token).is_ok());
    }

    #[test]
    fn test_configuration_redacts_secrets() {
        let fields = plugin(true).configuration();
        let value = |name: &str| {
            fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.value.clone())
                .unwrap()
        };

        assert_eq!(value("Consumer key"), REDACTED_FORM);
        assert_eq!(value("Consumer secret"), REDACTED_FORM);
        assert_eq!(value("Online passkey"), REDACTED_FORM);
        assert_eq!(value("Initiator security credential"), "");
        assert_eq!(value("Business shortcode"), "174379");
        assert_eq!(value("Base URL"), "http://127.0.0.1:1");
    }

    #[test]
    fn test_default_configuration() {
        let defaults = MpesaPlugin::default_configuration();
        assert_eq!(defaults.len(), 8);
        assert!(defaults.contains(&ConfigurationField {
            name: "Base URL".to_string(),
            value: "https://sandbox.safaricom.co.ke/".to_string(),
        }));
        assert!(defaults.contains(&ConfigurationField {
            name: "Initiator name".to_string(),
            value: "apitest425".to_string(),
        }));
    }
}
