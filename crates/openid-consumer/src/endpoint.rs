//! Service endpoints and the discovery seam
//!
//! A [`ServiceEndpoint`] binds an identifier to the OP that may assert it.
//! Endpoints are immutable values: "changing" one produces a new value, so an
//! endpoint remembered by the caller is never altered by verification.

use async_trait::async_trait;
use openid_message::{OPENID1_NS, OPENID2_NS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type URI of an OpenID 2.0 claimed-identifier service
pub const OPENID_2_0_TYPE: &str = "http://specs.openid.net/auth/2.0/signon";

/// Type URI of an OpenID 2.0 OP-identifier service
pub const OPENID_IDP_2_0_TYPE: &str = "http://specs.openid.net/auth/2.0/server";

/// Type URI of an OpenID 1.1 service
pub const OPENID_1_1_TYPE: &str = "http://openid.net/signon/1.1";

/// Type URI of an OpenID 1.0 service
pub const OPENID_1_0_TYPE: &str = "http://openid.net/signon/1.0";

/// Strip a `#fragment` from an identifier
pub fn defragment(identifier: &str) -> &str {
    identifier
        .split_once('#')
        .map_or(identifier, |(base, _)| base)
}

/// Discovered or asserted identity binding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Identifier the user claims
    pub claimed_id: Option<String>,
    /// OP-local identifier (delegate), if different from the claimed id
    pub local_id: Option<String>,
    /// OP endpoint URL
    pub server_url: Option<String>,
    /// Advertised service type URIs
    pub type_uris: Vec<String>,
}

impl ServiceEndpoint {
    /// Create an endpoint
    pub fn new(
        claimed_id: Option<String>,
        local_id: Option<String>,
        server_url: Option<String>,
        type_uris: Vec<String>,
    ) -> Self {
        Self {
            claimed_id,
            local_id,
            server_url,
            type_uris,
        }
    }

    /// Endpoint for an OP identifier: no user identity, only the OP URL
    pub fn from_op_endpoint_url(op_endpoint: impl Into<String>) -> Self {
        Self {
            claimed_id: None,
            local_id: None,
            server_url: Some(op_endpoint.into()),
            type_uris: vec![OPENID_IDP_2_0_TYPE.to_string()],
        }
    }

    /// Whether the endpoint advertises `type_uri`
    pub fn uses_extension(&self, type_uri: &str) -> bool {
        self.type_uris.iter().any(|t| t == type_uri)
    }

    /// Whether this is an OP-identifier endpoint
    pub fn is_op_identifier(&self) -> bool {
        self.uses_extension(OPENID_IDP_2_0_TYPE)
    }

    /// Effective OP-local identifier: the delegate, or the claimed id
    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref().or(self.claimed_id.as_deref())
    }

    /// Protocol namespace this endpoint prefers
    pub fn preferred_namespace(&self) -> &'static str {
        if self.uses_extension(OPENID_2_0_TYPE) || self.is_op_identifier() {
            OPENID2_NS
        } else {
            OPENID1_NS
        }
    }

    /// Claimed id with any fragment removed
    pub fn defragged_claimed_id(&self) -> Option<&str> {
        self.claimed_id.as_deref().map(defragment)
    }

    /// Copy of this endpoint with another claimed id
    #[must_use]
    pub fn with_claimed_id(&self, claimed_id: Option<String>) -> Self {
        Self {
            claimed_id,
            ..self.clone()
        }
    }

    /// Copy of this endpoint with other type URIs
    #[must_use]
    pub fn with_type_uris<I, S>(&self, type_uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            type_uris: type_uris.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }
}

/// Discovery collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// The identifier is not something discovery can resolve
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Fetching discovery documents failed
    #[error("discovery fetch failed: {0}")]
    Fetch(String),
}

/// Resolves an identifier to candidate OP endpoints
///
/// Implementations own the discovery protocol (Yadis/XRDS, HTML links) and
/// its timeouts. Endpoints are returned in preference order.
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Discover endpoints for `identifier`; an empty list is not an error
    async fn discover(&self, identifier: &str) -> Result<Vec<ServiceEndpoint>, DiscoveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defragment() {
        assert_eq!(defragment("https://alice.example.com/#frag"), "https://alice.example.com/");
        assert_eq!(defragment("https://alice.example.com/"), "https://alice.example.com/");
        assert_eq!(defragment("=xri#"), "=xri");
    }

    #[test]
    fn test_local_id_falls_back_to_claimed_id() {
        let endpoint = ServiceEndpoint::new(
            Some("https://alice.example.com/".to_string()),
            None,
            Some("https://op.example.com/".to_string()),
            vec![OPENID_2_0_TYPE.to_string()],
        );
        assert_eq!(endpoint.local_id(), Some("https://alice.example.com/"));

        let delegated = ServiceEndpoint {
            local_id: Some("https://op.example.com/u/alice".to_string()),
            ..endpoint
        };
        assert_eq!(delegated.local_id(), Some("https://op.example.com/u/alice"));
    }

    #[test]
    fn test_op_identifier_endpoint() {
        let endpoint = ServiceEndpoint::from_op_endpoint_url("https://op.example.com/");
        assert!(endpoint.is_op_identifier());
        assert_eq!(endpoint.claimed_id, None);
        assert_eq!(endpoint.preferred_namespace(), OPENID2_NS);
    }

    #[test]
    fn test_preferred_namespace_openid1() {
        let endpoint = ServiceEndpoint::default().with_type_uris([OPENID_1_1_TYPE]);
        assert_eq!(endpoint.preferred_namespace(), OPENID1_NS);
    }

    #[test]
    fn test_with_claimed_id_leaves_original_untouched() {
        let original = ServiceEndpoint::from_op_endpoint_url("https://op.example.com/");
        let updated = original.with_claimed_id(Some("https://bob.example.com/#x".to_string()));
        assert_eq!(original.claimed_id, None);
        assert_eq!(updated.defragged_claimed_id(), Some("https://bob.example.com/"));
        assert_eq!(updated.server_url, original.server_url);
    }
}
