//! Protocol-version rules
//!
//! OpenID 1 and 2 differ in which fields are required, where the replay nonce
//! lives, which server URL binds the signature, and how the asserted identity
//! is reconstructed. Each version implements [`VersionRules`] once; the
//! pipeline picks the rules at entry and never branches on the version again.

use super::corroborate::Candidate;
use crate::config::ConsumerConfig;
use crate::endpoint::{OPENID_1_0_TYPE, OPENID_1_1_TYPE, OPENID_2_0_TYPE, ServiceEndpoint};
use crate::error::{Result, VerificationError};
use openid_message::{Field, Message, Namespace, ProtocolVersion};

const BASIC_FIELDS: [Field; 4] = [Field::ReturnTo, Field::AssocHandle, Field::Sig, Field::Signed];

/// Where a response's replay nonce came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NonceClaim<'m> {
    /// Server identity the nonce is recorded under
    pub server_url: String,
    /// Raw nonce value
    pub nonce: &'m str,
}

/// Version-specific verification rules
pub(crate) trait VersionRules: Send + Sync {
    /// Version these rules implement
    fn version(&self) -> ProtocolVersion;

    /// Fields that must be present
    fn required_fields(&self) -> &'static [Field];

    /// Fields that, when present, must be listed in `openid.signed`
    fn required_signed(&self) -> &'static [Field];

    /// OP server URL asserted by the message itself, if the version carries one
    fn asserted_server_url<'m>(&self, message: &'m Message) -> Option<&'m str>;

    /// Extract the replay nonce; `signer_url` is the server the signature was bound to
    fn extract_nonce<'m>(
        &self,
        message: &'m Message,
        config: &ConsumerConfig,
        signer_url: &str,
    ) -> Result<NonceClaim<'m>>;

    /// Reconstruct the endpoint information the assertion claims
    fn build_candidate(
        &self,
        message: &Message,
        config: &ConsumerConfig,
        known_endpoint: Option<&ServiceEndpoint>,
    ) -> Result<Candidate>;
}

/// Rules for a protocol version
pub(crate) fn rules_for(version: ProtocolVersion) -> &'static dyn VersionRules {
    match version {
        ProtocolVersion::OpenId1 => &OpenId1Rules,
        ProtocolVersion::OpenId2 => &OpenId2Rules,
    }
}

/// OpenID 1.0 / 1.1
pub(crate) struct OpenId1Rules;

impl VersionRules for OpenId1Rules {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::OpenId1
    }

    fn required_fields(&self) -> &'static [Field] {
        const FIELDS: [Field; 5] = [
            BASIC_FIELDS[0],
            BASIC_FIELDS[1],
            BASIC_FIELDS[2],
            BASIC_FIELDS[3],
            Field::Identity,
        ];
        &FIELDS
    }

    fn required_signed(&self) -> &'static [Field] {
        &[Field::ReturnTo, Field::Identity]
    }

    fn asserted_server_url<'m>(&self, _message: &'m Message) -> Option<&'m str> {
        None
    }

    fn extract_nonce<'m>(
        &self,
        message: &'m Message,
        config: &ConsumerConfig,
        _signer_url: &str,
    ) -> Result<NonceClaim<'m>> {
        // The RP minted this nonce itself, so it is recorded under no server
        let nonce = message
            .get_arg(&Namespace::Bare, &config.openid1_nonce_arg)
            .ok_or(VerificationError::MissingNonce)?;
        Ok(NonceClaim {
            server_url: String::new(),
            nonce,
        })
    }

    fn build_candidate(
        &self,
        message: &Message,
        config: &ConsumerConfig,
        known_endpoint: Option<&ServiceEndpoint>,
    ) -> Result<Candidate> {
        let claimed_id = match message.get_arg(&Namespace::Bare, &config.openid1_claimed_id_arg) {
            Some(claimed_id) => claimed_id.to_string(),
            None => known_endpoint
                .and_then(|endpoint| endpoint.claimed_id.clone())
                .ok_or_else(|| {
                    VerificationError::configuration(
                        "OpenID 1 responses need the claimed identifier, either passed through \
                         as a return_to parameter or remembered in the session and supplied \
                         as the known endpoint",
                    )
                })?,
        };
        let local_id = message.require(Field::Identity)?;

        Ok(Candidate::Identity {
            endpoint: ServiceEndpoint::new(
                Some(claimed_id),
                Some(local_id.to_string()),
                None,
                vec![OPENID_1_1_TYPE.to_string()],
            ),
            retry_types: &[OPENID_1_0_TYPE],
            restore_claimed_id: false,
        })
    }
}

/// OpenID 2.0
pub(crate) struct OpenId2Rules;

impl VersionRules for OpenId2Rules {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::OpenId2
    }

    fn required_fields(&self) -> &'static [Field] {
        const FIELDS: [Field; 5] = [
            BASIC_FIELDS[0],
            BASIC_FIELDS[1],
            BASIC_FIELDS[2],
            BASIC_FIELDS[3],
            Field::OpEndpoint,
        ];
        &FIELDS
    }

    fn required_signed(&self) -> &'static [Field] {
        &[
            Field::ReturnTo,
            Field::Identity,
            Field::ResponseNonce,
            Field::ClaimedId,
            Field::AssocHandle,
        ]
    }

    fn asserted_server_url<'m>(&self, message: &'m Message) -> Option<&'m str> {
        message.get(Field::OpEndpoint)
    }

    fn extract_nonce<'m>(
        &self,
        message: &'m Message,
        _config: &ConsumerConfig,
        signer_url: &str,
    ) -> Result<NonceClaim<'m>> {
        let nonce = message
            .get(Field::ResponseNonce)
            .ok_or(VerificationError::MissingNonce)?;
        Ok(NonceClaim {
            server_url: signer_url.to_string(),
            nonce,
        })
    }

    fn build_candidate(
        &self,
        message: &Message,
        _config: &ConsumerConfig,
        _known_endpoint: Option<&ServiceEndpoint>,
    ) -> Result<Candidate> {
        let op_endpoint = message.require(Field::OpEndpoint)?;
        match (message.get(Field::ClaimedId), message.get(Field::Identity)) {
            (None, Some(_)) => Err(VerificationError::InconsistentIdentifiers(
                "openid.identity is present without openid.claimed_id".to_string(),
            )),
            (Some(_), None) => Err(VerificationError::InconsistentIdentifiers(
                "openid.claimed_id is present without openid.identity".to_string(),
            )),
            // No user identity asserted: only the OP itself is vouched for
            (None, None) => Ok(Candidate::OpIdentifier(
                ServiceEndpoint::from_op_endpoint_url(op_endpoint),
            )),
            (Some(claimed_id), Some(identity)) => Ok(Candidate::Identity {
                endpoint: ServiceEndpoint::new(
                    Some(claimed_id.to_string()),
                    Some(identity.to_string()),
                    Some(op_endpoint.to_string()),
                    vec![OPENID_2_0_TYPE.to_string()],
                ),
                retry_types: &[],
                restore_claimed_id: true,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openid_message::OPENID2_NS;

    fn openid2(args: &[(&str, &str)]) -> Message {
        let mut all = vec![("openid.ns", OPENID2_NS)];
        all.extend_from_slice(args);
        Message::from_post_args(all).unwrap()
    }

    #[test]
    fn test_rules_dispatch() {
        assert_eq!(rules_for(ProtocolVersion::OpenId1).version(), ProtocolVersion::OpenId1);
        assert_eq!(rules_for(ProtocolVersion::OpenId2).version(), ProtocolVersion::OpenId2);
        assert!(OpenId2Rules.required_fields().contains(&Field::OpEndpoint));
        assert!(!OpenId2Rules.required_fields().contains(&Field::Identity));
        assert!(OpenId1Rules.required_fields().contains(&Field::Identity));
        assert_eq!(OpenId1Rules.required_signed().len(), 2);
    }

    #[test]
    fn test_openid2_nonce_bound_to_signer() {
        let message = openid2(&[("openid.response_nonce", "2024-05-01T12:00:00Zabc")]);
        let claim = OpenId2Rules
            .extract_nonce(&message, &ConsumerConfig::default(), "https://op.example.com/")
            .unwrap();
        assert_eq!(claim.server_url, "https://op.example.com/");
        assert_eq!(claim.nonce, "2024-05-01T12:00:00Zabc");
    }

    #[test]
    fn test_openid1_nonce_from_bare_namespace() {
        let message = Message::from_post_args([("rp_nonce", "2024-05-01T12:00:00Zabc")]).unwrap();
        let claim = OpenId1Rules
            .extract_nonce(&message, &ConsumerConfig::default(), "https://op.example.com/")
            .unwrap();
        assert_eq!(claim.server_url, "");
    }

    #[test]
    fn test_missing_nonce() {
        let message = openid2(&[]);
        assert_eq!(
            OpenId2Rules
                .extract_nonce(&message, &ConsumerConfig::default(), "x")
                .unwrap_err(),
            VerificationError::MissingNonce
        );
    }

    #[test]
    fn test_openid2_op_identifier_candidate() {
        let message = openid2(&[("openid.op_endpoint", "https://op.example.com/")]);
        let candidate = OpenId2Rules
            .build_candidate(&message, &ConsumerConfig::default(), None)
            .unwrap();
        assert!(matches!(candidate, Candidate::OpIdentifier(ref e) if e.is_op_identifier()));
    }

    #[test]
    fn test_openid1_claimed_id_from_known_endpoint() {
        let message = Message::from_post_args([("openid.identity", "https://op.example.com/u/alice")])
            .unwrap();
        let known = ServiceEndpoint::new(
            Some("https://alice.example.com/".to_string()),
            None,
            Some("https://op.example.com/".to_string()),
            vec![OPENID_1_1_TYPE.to_string()],
        );
        let candidate = OpenId1Rules
            .build_candidate(&message, &ConsumerConfig::default(), Some(&known))
            .unwrap();
        let Candidate::Identity { endpoint, retry_types, .. } = candidate else {
            panic!("expected identity candidate");
        };
        assert_eq!(endpoint.claimed_id.as_deref(), Some("https://alice.example.com/"));
        assert_eq!(endpoint.server_url, None);
        assert_eq!(retry_types, &[OPENID_1_0_TYPE]);
    }

    #[test]
    fn test_openid1_without_claimed_id_is_configuration_fault() {
        let message = Message::from_post_args([("openid.identity", "https://op.example.com/u/alice")])
            .unwrap();
        let err = OpenId1Rules
            .build_candidate(&message, &ConsumerConfig::default(), None)
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
