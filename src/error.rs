use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that escape a gateway operation.
///
/// Provider rejections and transport failures on the payment call are not
/// represented here: they are folded into a
/// [`GatewayResponse`](crate::payments::types::GatewayResponse) with
/// `is_success = false`. Token store failures degrade to a cache miss. Only
/// failures the caller must handle end up as `Err`.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The access token could not be obtained
    #[error("Credential error: {message}")]
    Credential { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl GatewayError {
    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Credential { .. })
    }
}
