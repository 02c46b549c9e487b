//! Verification error taxonomy
//!
//! Every failure is terminal for the response being verified. Failures split
//! into two kinds:
//!
//! - **Protocol violations** - the assertion is rejected (tampering, replay,
//!   stale or mismatched information, an unreachable or refusing OP)
//! - **Configuration faults** - the calling integration handed the verifier
//!   something it cannot work with (unknown namespace, OpenID 1 response with
//!   no remembered claimed identifier, malformed expected return URL)

use openid_message::MessageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a [`VerificationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The assertion was rejected
    ProtocolViolation,
    /// The caller misconfigured the verifier
    Configuration,
}

/// Reasons a positive assertion is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// A field required for this protocol version is absent
    #[error("Missing required field {0}")]
    MissingField(String),

    /// A message could not be read or encoded
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A field that must be covered by the signature is not listed in `signed`
    #[error("\"{0}\" not signed")]
    UnsignedField(String),

    /// `return_to` disagrees with the message arguments or the expected URL
    #[error("return_to mismatch: {0}")]
    ReturnToMismatch(String),

    /// The association used to sign the response has expired
    #[error("Association with {server_url} expired")]
    AssociationExpired {
        /// OP server URL
        server_url: String,
    },

    /// Local signature verification failed
    #[error("Bad signature in response from {server_url}: {reason}")]
    BadSignature {
        /// OP server URL
        server_url: String,
        /// Failure detail
        reason: String,
    },

    /// Remote `check_authentication` did not confirm the signature
    #[error("check_authentication with {server_url} failed: {reason}")]
    CheckAuthFailed {
        /// OP server URL
        server_url: String,
        /// Failure detail (including transport errors)
        reason: String,
    },

    /// No replay nonce in the response
    #[error("Nonce missing from response")]
    MissingNonce,

    /// The nonce does not have the timestamp + salt shape
    #[error("Malformed nonce: {0:?}")]
    MalformedNonce(String),

    /// The nonce ledger refused the nonce
    #[error("Nonce already used or out of range: {0:?}")]
    NonceReplayed(String),

    /// `claimed_id` and `identity` must be both present or both absent
    #[error("Inconsistent identifiers: {0}")]
    InconsistentIdentifiers(String),

    /// The discovery collaborator failed
    #[error("Discovery failed for {identifier}: {reason}")]
    DiscoveryFailed {
        /// Identifier discovery ran on
        identifier: String,
        /// Failure detail
        reason: String,
    },

    /// Discovered or remembered information contradicts the assertion
    #[error("Endpoint mismatch: {0}")]
    EndpointMismatch(String),

    /// Discovery returned no endpoints at all
    #[error("No OpenID information found at {identifier}")]
    NoOpenIdInformation {
        /// Identifier discovery ran on
        identifier: String,
    },

    /// Discovery returned endpoints but none corroborated the assertion
    #[error("No matching endpoint found after discovering {identifier}")]
    NoMatchingEndpoint {
        /// Identifier discovery ran on
        identifier: String,
    },

    /// The calling integration is misconfigured
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl VerificationError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            _ => ErrorKind::ProtocolViolation,
        }
    }

    /// Whether the assertion itself was rejected
    pub fn is_protocol_violation(&self) -> bool {
        self.kind() == ErrorKind::ProtocolViolation
    }

    /// Whether the caller misconfigured the verifier
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<MessageError> for VerificationError {
    fn from(err: MessageError) -> Self {
        match err {
            MessageError::MissingField { key, .. } => Self::MissingField(key),
            other => Self::MalformedMessage(other.to_string()),
        }
    }
}

/// Result alias for verification
pub type Result<T> = std::result::Result<T, VerificationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use openid_message::Namespace;

    #[test]
    fn test_kind_classification() {
        assert!(VerificationError::MissingNonce.is_protocol_violation());
        assert!(VerificationError::configuration("no claimed id").is_configuration());
        assert_eq!(
            VerificationError::NoOpenIdInformation {
                identifier: "https://alice.example.com/".to_string()
            }
            .kind(),
            ErrorKind::ProtocolViolation
        );
    }

    #[test]
    fn test_missing_field_conversion_names_field() {
        let err: VerificationError = MessageError::MissingField {
            namespace: Namespace::OpenId,
            key: "op_endpoint".to_string(),
        }
        .into();
        assert_eq!(err, VerificationError::MissingField("op_endpoint".to_string()));
        assert_eq!(err.to_string(), "Missing required field op_endpoint");
    }
}
