//! Cache key builders
//!
//! Keys are versioned so a format change never reads a stale layout.

use std::fmt;

const VERSION: &str = "v1";

pub mod mpesa {
    use super::*;
    use sha2::{Digest, Sha256};

    /// Key under which the bearer token for one set of API credentials is stored.
    ///
    /// The shortcode stays readable; the base URL and consumer key only enter
    /// through a fingerprint, so sandbox and production apps sharing a
    /// shortcode never share a token.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct AccessTokenKey {
        shortcode: String,
        fingerprint: String,
    }

    impl AccessTokenKey {
        pub fn new(shortcode: &str, base_url: &str, consumer_key: &str) -> Self {
            let mut hasher = Sha256::new();
            hasher.update(base_url.trim_end_matches('/').as_bytes());
            hasher.update([0u8]);
            hasher.update(consumer_key.as_bytes());
            let digest = hasher.finalize();

            Self {
                shortcode: shortcode.to_string(),
                fingerprint: hex::encode(&digest[..8]),
            }
        }
    }

    impl fmt::Display for AccessTokenKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "{}:mpesa:access_token:{}:{}",
                VERSION, self.shortcode, self.fingerprint
            )
        }
    }
}
