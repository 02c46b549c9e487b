//! Protocol namespaces and the closed set of protocol fields.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace URI of OpenID 1.0 messages (also implied when `openid.ns` is absent)
pub const OPENID1_NS: &str = "http://openid.net/signon/1.0";

/// Namespace URI some OpenID 1.1 providers send explicitly
pub const OPENID11_NS: &str = "http://openid.net/signon/1.1";

/// Namespace URI of OpenID 2.0 messages
pub const OPENID2_NS: &str = "http://specs.openid.net/auth/2.0";

/// Prefix of every protocol argument in post/query form
pub const OPENID_PREFIX: &str = "openid.";

/// Which namespace a field lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Namespace {
    /// Unqualified query parameters (anything without the `openid.` prefix)
    Bare,
    /// The message's own protocol namespace
    OpenId,
    /// An extension namespace declared with `openid.ns.<alias>`
    Uri(String),
}

/// Major protocol version of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// OpenID 1.0 / 1.1
    OpenId1,
    /// OpenID 2.0
    OpenId2,
}

impl ProtocolVersion {
    /// Map a namespace URI to a protocol version.
    ///
    /// Returns `None` for URIs that are not an OpenID protocol namespace.
    pub fn from_namespace(uri: &str) -> Option<Self> {
        match uri {
            OPENID1_NS | OPENID11_NS => Some(Self::OpenId1),
            OPENID2_NS => Some(Self::OpenId2),
            _ => None,
        }
    }

    /// Canonical namespace URI for this version
    pub fn namespace(self) -> &'static str {
        match self {
            Self::OpenId1 => OPENID1_NS,
            Self::OpenId2 => OPENID2_NS,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenId1 => f.write_str("OpenID 1.x"),
            Self::OpenId2 => f.write_str("OpenID 2.0"),
        }
    }
}

/// Protocol-namespace fields this library reads or writes.
///
/// Typed access goes through this enumeration; fields outside it stay
/// reachable through the string-keyed accessors on [`crate::Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// `openid.mode`
    Mode,
    /// `openid.return_to`
    ReturnTo,
    /// `openid.assoc_handle`
    AssocHandle,
    /// `openid.sig`
    Sig,
    /// `openid.signed`
    Signed,
    /// `openid.op_endpoint`
    OpEndpoint,
    /// `openid.identity`
    Identity,
    /// `openid.claimed_id`
    ClaimedId,
    /// `openid.response_nonce`
    ResponseNonce,
    /// `openid.invalidate_handle`
    InvalidateHandle,
    /// `openid.is_valid` (check_authentication responses)
    IsValid,
    /// `error` (direct-response errors)
    Error,
    /// `error_code` (direct-response errors)
    ErrorCode,
}

impl Field {
    /// Key of the field inside its namespace (without the `openid.` prefix)
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mode => "mode",
            Self::ReturnTo => "return_to",
            Self::AssocHandle => "assoc_handle",
            Self::Sig => "sig",
            Self::Signed => "signed",
            Self::OpEndpoint => "op_endpoint",
            Self::Identity => "identity",
            Self::ClaimedId => "claimed_id",
            Self::ResponseNonce => "response_nonce",
            Self::InvalidateHandle => "invalidate_handle",
            Self::IsValid => "is_valid",
            Self::Error => "error",
            Self::ErrorCode => "error_code",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
