//! Identity corroboration against discovered information
//!
//! A positive assertion only names an identity; the endpoint that backs it
//! must be confirmed either from the endpoint remembered in the session
//! (re-verified here) or by running discovery again.

use super::IdResRun;
use crate::endpoint::{ServiceEndpoint, defragment};
use crate::error::{Result, VerificationError};
use openid_message::OPENID2_NS;
use tracing::{debug, info, warn};

/// Endpoint information reconstructed from the assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Candidate {
    /// OpenID 2 response with no user identity; the OP endpoint is the result
    OpIdentifier(ServiceEndpoint),

    /// Asserted identity that must be corroborated
    Identity {
        /// Candidate endpoint as asserted
        endpoint: ServiceEndpoint,
        /// Type URIs to retry with, in order, after a type mismatch
        retry_types: &'static [&'static str],
        /// Copy the asserted claimed id (fragment included) onto the result
        restore_claimed_id: bool,
    },
}

/// Outcome of checking one candidate against one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Corroboration {
    Matched,
    /// The endpoint does not advertise a candidate type URI
    TypeMismatch(String),
    Mismatch(String),
}

impl Corroboration {
    fn reason(&self) -> Option<String> {
        match self {
            Self::Matched => None,
            Self::TypeMismatch(type_uri) => Some(format!("Type mismatch: {type_uri} not advertised")),
            Self::Mismatch(reason) => Some(reason.clone()),
        }
    }
}

/// Check `candidate` against `endpoint`
///
/// # Errors
///
/// A configuration fault when an OpenID 2 candidate carries no server URL;
/// every other disagreement is reported through the returned outcome.
pub(crate) fn verify_single(
    candidate: &ServiceEndpoint,
    endpoint: &ServiceEndpoint,
) -> Result<Corroboration> {
    if let Some(missing) = candidate
        .type_uris
        .iter()
        .find(|type_uri| !endpoint.uses_extension(type_uri))
    {
        return Ok(Corroboration::TypeMismatch(missing.clone()));
    }

    if candidate.defragged_claimed_id() != endpoint.defragged_claimed_id() {
        return Ok(Corroboration::Mismatch(format!(
            "Claimed ID does not match (different subjects!), Expected {}, got {}",
            candidate.defragged_claimed_id().unwrap_or("(none)"),
            endpoint.defragged_claimed_id().unwrap_or("(none)"),
        )));
    }

    if candidate.local_id() != endpoint.local_id() {
        return Ok(Corroboration::Mismatch(format!(
            "local_id mismatch. Expected {}, got {}",
            candidate.local_id().unwrap_or("(none)"),
            endpoint.local_id().unwrap_or("(none)"),
        )));
    }

    match candidate.server_url.as_deref() {
        None if candidate.preferred_namespace() == OPENID2_NS => Err(VerificationError::configuration(
            "OpenID 2 candidate endpoint has no server URL",
        )),
        None => Ok(Corroboration::Matched),
        Some(server_url) if endpoint.server_url.as_deref() != Some(server_url) => {
            Ok(Corroboration::Mismatch(format!(
                "OP Endpoint mismatch. Expected {server_url}, got {}",
                endpoint.server_url.as_deref().unwrap_or("(none)"),
            )))
        }
        Some(_) => Ok(Corroboration::Matched),
    }
}

/// Candidate endpoints to try in order: as asserted, then each retry type
fn variants(endpoint: &ServiceEndpoint, retry_types: &[&str]) -> Vec<ServiceEndpoint> {
    std::iter::once(endpoint.clone())
        .chain(
            retry_types
                .iter()
                .map(|type_uri| endpoint.with_type_uris([*type_uri])),
        )
        .collect()
}

impl IdResRun<'_> {
    /// Endpoint backing the assertion, resolved at most once per run
    pub(super) async fn resolve_endpoint(&mut self) -> Result<ServiceEndpoint> {
        if let Some(endpoint) = &self.resolved {
            return Ok(endpoint.clone());
        }
        let endpoint = self.verify_discovery_results().await?;
        self.resolved = Some(endpoint.clone());
        Ok(endpoint)
    }

    async fn verify_discovery_results(&self) -> Result<ServiceEndpoint> {
        let candidate =
            self.rules
                .build_candidate(self.message, &self.verifier.config, self.known_endpoint)?;

        let (endpoint, retry_types, restore_claimed_id) = match candidate {
            Candidate::OpIdentifier(endpoint) => return Ok(endpoint),
            Candidate::Identity {
                endpoint,
                retry_types,
                restore_claimed_id,
            } => (endpoint, retry_types, restore_claimed_id),
        };
        let candidates = variants(&endpoint, retry_types);

        let resolved = match self.known_endpoint {
            Some(known) => match Self::corroborate_known(&candidates, known)? {
                None => known.clone(),
                Some(reason) => {
                    info!(
                        reason = %reason,
                        "Remembered endpoint does not match the assertion, attempting discovery"
                    );
                    self.discover_and_select(&candidates).await?
                }
            },
            None => {
                debug!("No pre-discovered information supplied");
                self.discover_and_select(&candidates).await?
            }
        };

        if restore_claimed_id && resolved.claimed_id != endpoint.claimed_id {
            return Ok(resolved.with_claimed_id(endpoint.claimed_id.clone()));
        }
        Ok(resolved)
    }

    /// Check the remembered endpoint; `None` means it corroborates
    fn corroborate_known(
        candidates: &[ServiceEndpoint],
        known: &ServiceEndpoint,
    ) -> Result<Option<String>> {
        let mut last_reason = None;
        for candidate in candidates {
            match verify_single(candidate, known)? {
                Corroboration::Matched => return Ok(None),
                outcome @ Corroboration::TypeMismatch(_) => last_reason = outcome.reason(),
                outcome @ Corroboration::Mismatch(_) => return Ok(outcome.reason()),
            }
        }
        Ok(last_reason)
    }

    async fn discover_and_select(&self, candidates: &[ServiceEndpoint]) -> Result<ServiceEndpoint> {
        let identifier = candidates
            .first()
            .and_then(|candidate| candidate.claimed_id.as_deref())
            .ok_or_else(|| VerificationError::configuration("Candidate endpoint has no claimed identifier"))?;

        info!(identifier = identifier, "Performing discovery");
        let services = self
            .verifier
            .discoverer
            .discover(defragment(identifier))
            .await
            .map_err(|e| VerificationError::DiscoveryFailed {
                identifier: identifier.to_string(),
                reason: e.to_string(),
            })?;

        if services.is_empty() {
            return Err(VerificationError::NoOpenIdInformation {
                identifier: identifier.to_string(),
            });
        }

        let mut mismatches = 0usize;
        for candidate in candidates {
            let mut type_mismatch_seen = false;
            for service in &services {
                let outcome = verify_single(candidate, service)?;
                if outcome == Corroboration::Matched {
                    debug!(
                        server_url = ?service.server_url,
                        "Discovered endpoint corroborates the assertion"
                    );
                    return Ok(service.clone());
                }
                type_mismatch_seen |= matches!(outcome, Corroboration::TypeMismatch(_));
                if let Some(reason) = outcome.reason() {
                    info!(
                        identifier = identifier,
                        server_url = ?service.server_url,
                        " * Endpoint mismatch: {reason}"
                    );
                    mismatches += 1;
                }
            }
            if !type_mismatch_seen {
                break;
            }
        }

        warn!(
            identifier = identifier,
            mismatches = mismatches,
            "No discovered endpoint matches the assertion"
        );
        Err(VerificationError::NoMatchingEndpoint {
            identifier: identifier.to_string(),
        })
    }
}
