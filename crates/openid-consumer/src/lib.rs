//! # OpenID Consumer
//!
//! Relying-party verification of OpenID 1.x and 2.0 positive assertions.
//!
//! ## Features
//!
//! - **Assertion verification** - [`IdResVerifier`] runs field, return URL,
//!   signature, replay and discovery checks in a fixed order
//! - **Associations** - HMAC-SHA1 and HMAC-SHA256 shared secrets with
//!   constant-time signature checks
//! - **Stores** - [`OpenIdStore`] trait with a concurrent in-memory
//!   implementation
//! - **Direct requests** - `check_authentication` over HTTP via
//!   [`HttpKvPoster`], with size-capped responses and an [`SsrfPolicy`]
//!   refusing internal targets
//! - **Audit trail** - one structured record per verification under the
//!   `audit::openid` tracing target
//!
//! Discovery itself (Yadis, XRDS, HTML) is not part of this crate; supply a
//! [`Discoverer`].
//!
//! ## Error kinds
//!
//! Every [`VerificationError`] is either a protocol violation (reject the
//! login) or a configuration fault (fix the integration), see
//! [`VerificationError::kind`].

pub mod association;
pub mod audit;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod idres;
pub mod kvpost;
pub mod nonce;
pub mod ssrf;
pub mod store;

#[doc(inline)]
pub use association::{Association, AssociationType};
#[doc(inline)]
pub use config::{ConsumerConfig, HttpConfig};
#[doc(inline)]
pub use endpoint::{Discoverer, ServiceEndpoint};
#[doc(inline)]
pub use error::{ErrorKind, Result, VerificationError};
#[doc(inline)]
pub use idres::{IdResVerifier, IdResVerifierBuilder, VerificationResult};
#[doc(inline)]
pub use kvpost::{HttpKvPoster, KvPoster, TransportError};
#[doc(inline)]
pub use nonce::{Nonce, make_nonce};
#[doc(inline)]
pub use ssrf::{SsrfError, SsrfPolicy};
#[doc(inline)]
pub use store::{MemoryStore, OpenIdStore};
