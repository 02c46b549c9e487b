//! # OpenID Message
//!
//! Namespace-aware representation of OpenID 1.x and 2.0 protocol messages.
//!
//! ## Overview
//!
//! - [`Message`] - fields partitioned into the protocol namespace, extension
//!   namespaces and the bare (non-`openid.`) query parameters
//! - [`Field`] - closed enumeration of the protocol fields read by relying parties
//! - [`ProtocolVersion`] - OpenID 1.x vs 2.0, derived from `openid.ns`
//! - [`kvform`] - key-value form encoding used by direct responses and signatures
//!
//! ## Example
//!
//! ```rust
//! use openid_message::{Field, Message, ProtocolVersion};
//!
//! let response = Message::from_kv_form("ns:http://specs.openid.net/auth/2.0\nis_valid:true\n")?;
//! assert_eq!(response.protocol_version(), Some(ProtocolVersion::OpenId2));
//! assert_eq!(response.get(Field::IsValid), Some("true"));
//! # Ok::<(), openid_message::MessageError>(())
//! ```

pub mod error;
pub mod kvform;
pub mod message;
pub mod namespace;

#[doc(inline)]
pub use error::{MessageError, Result};
#[doc(inline)]
pub use message::Message;
#[doc(inline)]
pub use namespace::{
    Field, Namespace, OPENID_PREFIX, OPENID1_NS, OPENID2_NS, OPENID11_NS, ProtocolVersion,
};
