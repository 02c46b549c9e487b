//! Consumer configuration

use crate::ssrf::SsrfPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Relying-party verification settings
///
/// Every field has a default, so partial documents deserialize:
///
/// ```rust
/// use openid_consumer::ConsumerConfig;
///
/// let config: ConsumerConfig =
///     serde_json::from_str(r#"{ "openid1_nonce_arg": "janrain_nonce" }"#)?;
/// assert_eq!(config.openid1_nonce_arg, "janrain_nonce");
/// assert_eq!(config.openid1_claimed_id_arg, "openid1_claimed_id");
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Bare query parameter carrying the RP-minted nonce in OpenID 1 return_to URLs
    #[serde(default = "default_openid1_nonce_arg")]
    pub openid1_nonce_arg: String,

    /// Bare query parameter carrying the claimed identifier in OpenID 1 return_to URLs
    #[serde(default = "default_openid1_claimed_id_arg")]
    pub openid1_claimed_id_arg: String,

    /// HTTP settings for `check_authentication`
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_openid1_nonce_arg() -> String {
    "rp_nonce".to_string()
}

fn default_openid1_claimed_id_arg() -> String {
    "openid1_claimed_id".to_string()
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            openid1_nonce_arg: default_openid1_nonce_arg(),
            openid1_claimed_id_arg: default_openid1_claimed_id_arg(),
            http: HttpConfig::default(),
        }
    }
}

/// HTTP client settings for direct requests to the OP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// User agent sent to OPs
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Largest accepted response body in bytes (default: 10 KB)
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,

    /// Which targets direct requests may reach
    #[serde(default)]
    pub ssrf: SsrfPolicy,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("openid-consumer/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_response_size() -> usize {
    10 * 1024
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            max_response_size: default_max_response_size(),
            ssrf: SsrfPolicy::default(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConsumerConfig::default();
        assert_eq!(config.openid1_nonce_arg, "rp_nonce");
        assert_eq!(config.openid1_claimed_id_arg, "openid1_claimed_id");
        assert_eq!(config.http.timeout, Duration::from_secs(30));
        assert!(config.http.user_agent.starts_with("openid-consumer/"));
        assert_eq!(config.http.max_response_size, 10 * 1024);
        assert!(!config.http.ssrf.allow_internal_targets);
    }

    #[test]
    fn test_outbound_limits_configurable() {
        let config: ConsumerConfig = serde_json::from_str(
            r#"{ "http": { "max_response_size": 2048, "ssrf": { "allow_internal_targets": true } } }"#,
        )
        .unwrap();
        assert_eq!(config.http.max_response_size, 2048);
        assert_eq!(config.http.ssrf, SsrfPolicy::permissive());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ConsumerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ConsumerConfig::default());
    }

    #[test]
    fn test_timeout_in_seconds() {
        let config: ConsumerConfig =
            serde_json::from_str(r#"{ "http": { "timeout": 5 } }"#).unwrap();
        assert_eq!(config.http.timeout, Duration::from_secs(5));
        assert!(config.http.user_agent.starts_with("openid-consumer/"));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["http"]["timeout"], 5);
    }
}
