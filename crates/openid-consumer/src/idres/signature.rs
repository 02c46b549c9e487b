//! Signature verification
//!
//! With a store holding the association the response was signed with, the
//! signature is checked locally. Otherwise the OP is asked to vouch for it
//! with a `check_authentication` direct request.

use super::IdResRun;
use super::return_to::ReturnToVerified;
use crate::audit::VerificationEvent;
use crate::error::{Result, VerificationError};
use openid_message::{Field, Message, OPENID2_NS, ProtocolVersion};
use tracing::{debug, info, warn};

/// OP server URL the signature was verified against
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignatureBinding {
    pub server_url: String,
}

impl IdResRun<'_> {
    /// Verify the response signature
    ///
    /// Requires return_to integrity to be established first: a
    /// `check_authentication` request must never be sent on behalf of a
    /// response whose return URL was not checked.
    pub(super) async fn check_signature(&mut self, _checked: ReturnToVerified) -> Result<SignatureBinding> {
        let server_url = self.signer_url().await?;
        let handle = self.message.require(Field::AssocHandle)?;

        let association = match &self.verifier.store {
            Some(store) => store.get_association(&server_url, handle).await,
            None => {
                debug!("No store configured, using check_authentication");
                None
            }
        };

        match association {
            None => {
                debug!(server_url = %server_url, handle = handle, "No association found, using check_authentication");
                self.check_auth(&server_url).await?;
            }
            Some(association) if association.expires_in() <= 0 => {
                return Err(VerificationError::AssociationExpired { server_url });
            }
            Some(association) => match association.check_message_signature(self.message) {
                Ok(true) => debug!(server_url = %server_url, handle = handle, "Signature verified locally"),
                Ok(false) => {
                    return Err(VerificationError::BadSignature {
                        server_url,
                        reason: "signature mismatch".to_string(),
                    });
                }
                Err(e) => {
                    return Err(VerificationError::BadSignature {
                        server_url,
                        reason: e.to_string(),
                    });
                }
            },
        }

        Ok(SignatureBinding { server_url })
    }

    /// Server URL the signature is bound to
    ///
    /// OpenID 1 responses do not name their OP, so the remembered endpoint is
    /// used, or the endpoint resolved by discovery corroboration.
    async fn signer_url(&mut self) -> Result<String> {
        if let Some(server_url) = self.rules.asserted_server_url(self.message) {
            return Ok(server_url.to_string());
        }
        if let Some(known) = self.known_endpoint {
            return known
                .server_url
                .clone()
                .ok_or_else(|| VerificationError::configuration("Known endpoint has no server URL"));
        }
        debug!("OpenID 1 response without a known endpoint, resolving the OP by discovery");
        self.resolve_endpoint().await?.server_url.ok_or_else(|| {
            VerificationError::EndpointMismatch("Discovered endpoint has no server URL".to_string())
        })
    }

    async fn check_auth(&self, server_url: &str) -> Result<()> {
        info!(server_url = server_url, "Using OpenID check_authentication");
        let request = create_check_auth_request(self.message, self.rules.version()).map_err(|reason| {
            VerificationError::CheckAuthFailed {
                server_url: server_url.to_string(),
                reason,
            }
        })?;

        let response = self
            .verifier
            .poster
            .post(&request, server_url)
            .await
            .map_err(|e| VerificationError::CheckAuthFailed {
                server_url: server_url.to_string(),
                reason: e.to_string(),
            })?;

        self.process_check_auth_response(&response, server_url).await
    }

    async fn process_check_auth_response(&self, response: &Message, server_url: &str) -> Result<()> {
        if let Some(handle) = response.get(Field::InvalidateHandle) {
            match &self.verifier.store {
                Some(store) => {
                    store.remove_association(server_url, handle).await;
                    self.verifier.audit.log(VerificationEvent::AssociationInvalidated {
                        server_url: server_url.to_string(),
                        handle: handle.to_string(),
                    });
                }
                None => warn!(
                    server_url = server_url,
                    handle = handle,
                    "Unexpectedly got invalidate_handle without a store"
                ),
            }
        }

        let is_valid = response.get(Field::IsValid).unwrap_or("false");
        if is_valid != "true" {
            return Err(VerificationError::CheckAuthFailed {
                server_url: server_url.to_string(),
                reason: "Server responds that the check_authentication call is not valid".to_string(),
            });
        }
        Ok(())
    }
}

/// Build the `check_authentication` request for a response
///
/// Carries the signature fields and every signed field, in the response's
/// protocol namespace, with `mode` replaced.
pub(crate) fn create_check_auth_request(
    message: &Message,
    version: ProtocolVersion,
) -> std::result::Result<Message, String> {
    let signed = super::fields::parse_signed_list(message.get(Field::Signed).unwrap_or_default());
    let mut pairs: Vec<(&str, &str)> = Vec::new();
    if version == ProtocolVersion::OpenId2 {
        pairs.push(("ns", OPENID2_NS));
    }

    for field in [Field::AssocHandle, Field::Sig, Field::Signed, Field::InvalidateHandle] {
        if let Some(value) = message.get(field) {
            pairs.push((field.as_str(), value));
        }
    }

    for name in &signed {
        let value = message.get_aliased_arg(name).ok_or_else(|| {
            format!("Could not generate check_authentication request: missing signed field {name:?}")
        })?;
        pairs.push((name.as_str(), value));
    }

    pairs.push((Field::Mode.as_str(), "check_authentication"));

    Message::from_openid_args(pairs)
        .map_err(|e| format!("Could not generate check_authentication request: {e}"))
}
