//! Positive assertion (`id_res`) verification
//!
//! A verification run checks, in order:
//!
//! 1. required fields are present and the required ones are signed
//! 2. `return_to` agrees with the delivered arguments and the expected URL
//! 3. the signature, locally or through `check_authentication`
//! 4. the replay nonce
//! 5. the asserted identity against discovered information
//!
//! Any failure ends the run. Each run owns its state, so one
//! [`IdResVerifier`] can be shared across tasks.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use openid_consumer::{IdResVerifier, MemoryStore, ServiceEndpoint};
//! # use openid_consumer::{Discoverer, endpoint::DiscoveryError};
//! # struct MyDiscoverer;
//! # #[async_trait::async_trait]
//! # impl Discoverer for MyDiscoverer {
//! #     async fn discover(&self, _: &str) -> Result<Vec<ServiceEndpoint>, DiscoveryError> { Ok(vec![]) }
//! # }
//! # async fn example(message: openid_message::Message) -> Result<(), Box<dyn std::error::Error>> {
//! let verifier = IdResVerifier::builder()
//!     .discoverer(Arc::new(MyDiscoverer))
//!     .store(Arc::new(MemoryStore::new()))
//!     .build()?;
//!
//! let result = verifier
//!     .verify(&message, Some("https://rp.example.com/finish"), None)
//!     .await?;
//! println!("verified {:?}", result.claimed_id());
//! # Ok(())
//! # }
//! ```

mod corroborate;
mod fields;
mod replay;
mod return_to;
mod signature;
mod version;

use crate::audit::{AuditLogger, VerificationEvent};
use crate::config::ConsumerConfig;
use crate::endpoint::{Discoverer, ServiceEndpoint};
use crate::error::{Result, VerificationError};
use crate::kvpost::{HttpKvPoster, KvPoster};
use crate::store::OpenIdStore;
use openid_message::{Field, Message, OPENID_PREFIX};
use std::sync::Arc;
use tracing::{debug, instrument};
use version::VersionRules;

/// Outcome of a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    endpoint: ServiceEndpoint,
    message: Message,
    signed_fields: Vec<String>,
}

impl VerificationResult {
    /// Corroborated endpoint
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Consume the result, keeping the endpoint (e.g. to remember in a session)
    pub fn into_endpoint(self) -> ServiceEndpoint {
        self.endpoint
    }

    /// Verified response
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Signed field names, each prefixed with `openid.`, in signing order
    pub fn signed_fields(&self) -> &[String] {
        &self.signed_fields
    }

    /// Verified claimed identifier; `None` for OP-identifier responses
    pub fn claimed_id(&self) -> Option<&str> {
        self.endpoint.claimed_id.as_deref()
    }

    /// Whether the field with logical name `name` (e.g. `sreg.email`) is signed
    pub fn is_signed(&self, name: &str) -> bool {
        self.signed_fields
            .iter()
            .any(|field| field.strip_prefix(OPENID_PREFIX) == Some(name))
    }

    /// Value of `name` if, and only if, it is covered by the signature
    pub fn signed_value(&self, name: &str) -> Option<&str> {
        if self.is_signed(name) {
            self.message.get_aliased_arg(name)
        } else {
            None
        }
    }
}

/// Verifies positive assertions
#[derive(Clone)]
pub struct IdResVerifier {
    config: ConsumerConfig,
    store: Option<Arc<dyn OpenIdStore>>,
    discoverer: Arc<dyn Discoverer>,
    poster: Arc<dyn KvPoster>,
    audit: AuditLogger,
}

impl std::fmt::Debug for IdResVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdResVerifier")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("discoverer", &"<dyn Discoverer>")
            .field("poster", &"<dyn KvPoster>")
            .field("audit", &self.audit)
            .finish()
    }
}

impl IdResVerifier {
    /// Start building a verifier
    pub fn builder() -> IdResVerifierBuilder {
        IdResVerifierBuilder::default()
    }

    /// Configuration in use
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Verify a positive assertion
    ///
    /// `expected_return_to` is the URL the RP is listening on; `known_endpoint`
    /// is the endpoint remembered in the session when authentication began.
    /// The known endpoint is never modified; the result carries its own copy.
    ///
    /// # Errors
    ///
    /// Returns the first check that fails. [`VerificationError::kind`]
    /// separates rejected assertions from misconfiguration.
    #[instrument(skip_all, fields(claimed_id = message.get(Field::ClaimedId)))]
    pub async fn verify(
        &self,
        message: &Message,
        expected_return_to: Option<&str>,
        known_endpoint: Option<&ServiceEndpoint>,
    ) -> Result<VerificationResult> {
        let outcome = self.run(message, expected_return_to, known_endpoint).await;

        let event = match &outcome {
            Ok(result) => VerificationEvent::AssertionVerified {
                claimed_id: result.claimed_id().map(str::to_string),
                server_url: result.endpoint.server_url.clone(),
                signed_fields: result.signed_fields.len(),
            },
            Err(e) => VerificationEvent::AssertionRejected {
                claimed_id: message
                    .get(Field::ClaimedId)
                    .or_else(|| message.get(Field::Identity))
                    .map(str::to_string),
                server_url: message
                    .get(Field::OpEndpoint)
                    .map(str::to_string)
                    .or_else(|| known_endpoint.and_then(|k| k.server_url.clone())),
                reason: e.to_string(),
                configuration_fault: e.is_configuration(),
            },
        };
        self.audit.log(event);

        outcome
    }

    async fn run(
        &self,
        message: &Message,
        expected_return_to: Option<&str>,
        known_endpoint: Option<&ServiceEndpoint>,
    ) -> Result<VerificationResult> {
        let version = message.protocol_version().ok_or_else(|| {
            VerificationError::configuration(format!(
                "Unknown protocol namespace {}",
                message.namespace()
            ))
        })?;
        debug!(version = %version, "Verifying positive assertion");

        let mut run = IdResRun {
            verifier: self,
            message,
            rules: version::rules_for(version),
            known_endpoint,
            resolved: None,
        };

        let signed = fields::check_for_fields(message, run.rules)?;
        let checked = return_to::verify_return_to(message, expected_return_to)?;
        let binding = run.check_signature(checked).await?;
        run.check_nonce(&binding).await?;
        let endpoint = run.resolve_endpoint().await?;

        if endpoint.server_url.as_deref() != Some(binding.server_url.as_str()) {
            return Err(VerificationError::EndpointMismatch(format!(
                "Signature was verified against {} but the corroborated endpoint is {}",
                binding.server_url,
                endpoint.server_url.as_deref().unwrap_or("(none)"),
            )));
        }

        Ok(VerificationResult {
            endpoint,
            message: message.clone(),
            signed_fields: signed
                .into_iter()
                .map(|name| format!("{OPENID_PREFIX}{name}"))
                .collect(),
        })
    }
}

/// State of one verification run
pub(crate) struct IdResRun<'a> {
    verifier: &'a IdResVerifier,
    message: &'a Message,
    rules: &'static dyn VersionRules,
    known_endpoint: Option<&'a ServiceEndpoint>,
    /// Corroborated endpoint, once resolved
    resolved: Option<ServiceEndpoint>,
}

/// Builder for [`IdResVerifier`]
#[derive(Default)]
pub struct IdResVerifierBuilder {
    config: Option<ConsumerConfig>,
    store: Option<Arc<dyn OpenIdStore>>,
    discoverer: Option<Arc<dyn Discoverer>>,
    poster: Option<Arc<dyn KvPoster>>,
    audit: Option<AuditLogger>,
}

impl IdResVerifierBuilder {
    /// Verification settings (default: [`ConsumerConfig::default`])
    #[must_use]
    pub fn config(mut self, config: ConsumerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Association and nonce store; without one every signature is checked
    /// remotely and nonces are not recorded
    #[must_use]
    pub fn store(mut self, store: Arc<dyn OpenIdStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Discovery collaborator (required)
    #[must_use]
    pub fn discoverer(mut self, discoverer: Arc<dyn Discoverer>) -> Self {
        self.discoverer = Some(discoverer);
        self
    }

    /// Direct-request transport (default: [`HttpKvPoster`] from the config)
    #[must_use]
    pub fn poster(mut self, poster: Arc<dyn KvPoster>) -> Self {
        self.poster = Some(poster);
        self
    }

    /// Audit logger (default: [`AuditLogger::default`])
    #[must_use]
    pub fn audit_logger(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build the verifier
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no discoverer was given or the
    /// default HTTP transport cannot be created.
    pub fn build(self) -> Result<IdResVerifier> {
        let config = self.config.unwrap_or_default();
        let discoverer = self
            .discoverer
            .ok_or_else(|| VerificationError::configuration("A discoverer is required"))?;
        let poster: Arc<dyn KvPoster> = match self.poster {
            Some(poster) => poster,
            None => Arc::new(HttpKvPoster::new(&config.http).map_err(|e| {
                VerificationError::configuration(format!("Cannot create HTTP transport: {e}"))
            })?),
        };

        Ok(IdResVerifier {
            config,
            store: self.store,
            discoverer,
            poster,
            audit: self.audit.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{DiscoveryError, OPENID_2_0_TYPE};
    use async_trait::async_trait;

    struct NoDiscovery;

    #[async_trait]
    impl Discoverer for NoDiscovery {
        async fn discover(&self, _identifier: &str) -> std::result::Result<Vec<ServiceEndpoint>, DiscoveryError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_builder_requires_discoverer() {
        let err = IdResVerifier::builder().build().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_builder_defaults() {
        let verifier = IdResVerifier::builder()
            .discoverer(Arc::new(NoDiscovery))
            .build()
            .unwrap();
        assert_eq!(verifier.config(), &ConsumerConfig::default());
        assert!(verifier.store.is_none());
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_configuration_fault() {
        let verifier = IdResVerifier::builder()
            .discoverer(Arc::new(NoDiscovery))
            .build()
            .unwrap();
        let message = Message::from_post_args([("openid.ns", "http://example.com/not-openid")]).unwrap();
        let err = verifier.verify(&message, None, None).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_result_signed_accessors() {
        let message = Message::from_post_args([
            ("openid.ns", openid_message::OPENID2_NS),
            ("openid.ns.sreg", "http://openid.net/extensions/sreg/1.1"),
            ("openid.sreg.email", "alice@example.com"),
            ("openid.sreg.nickname", "alice"),
        ])
        .unwrap();
        let result = VerificationResult {
            endpoint: ServiceEndpoint::new(
                Some("https://alice.example.com/".to_string()),
                None,
                Some("https://op.example.com/".to_string()),
                vec![OPENID_2_0_TYPE.to_string()],
            ),
            message,
            signed_fields: vec!["openid.ns.sreg".to_string(), "openid.sreg.email".to_string()],
        };

        assert_eq!(result.claimed_id(), Some("https://alice.example.com/"));
        assert!(result.is_signed("sreg.email"));
        assert_eq!(result.signed_value("sreg.email"), Some("alice@example.com"));
        assert_eq!(result.signed_value("sreg.nickname"), None);
    }
}
