//! Structured audit records for verification decisions
//!
//! Every verification produces one record under the `audit::openid` tracing
//! target, so accepted and rejected assertions can be reviewed after the fact.
//! Association invalidations requested by OPs are recorded as well.
//!
//! ```rust
//! use openid_consumer::audit::{AuditLogger, VerificationEvent};
//!
//! let logger = AuditLogger::privacy_focused("rp.example.com");
//! logger.log(VerificationEvent::AssertionRejected {
//!     claimed_id: Some("https://alice.example.com/".to_string()),
//!     server_url: None,
//!     reason: "Nonce already used or out of range".to_string(),
//!     configuration_fault: false,
//! });
//! ```

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Audit logger for verification events
#[derive(Debug, Clone)]
pub struct AuditLogger {
    /// Service name for event attribution
    service_name: String,
    /// Whether to hash user identifiers
    hash_identifiers: bool,
}

impl AuditLogger {
    /// Create a new audit logger with the given service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            hash_identifiers: false,
        }
    }

    /// Create a logger that hashes user identifiers
    pub fn privacy_focused(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            hash_identifiers: true,
        }
    }

    /// Builder method to configure identifier hashing
    pub fn with_identifier_hashing(mut self, hash: bool) -> Self {
        self.hash_identifiers = hash;
        self
    }

    /// Record an event and return the record that was logged
    pub fn log(&self, event: VerificationEvent) -> AuditRecord {
        let record = AuditRecord {
            id: Uuid::now_v7(),
            timestamp: SystemTime::now(),
            service: self.service_name.clone(),
            event,
        };

        match &record.event {
            VerificationEvent::AssertionVerified {
                claimed_id,
                server_url,
                signed_fields,
            } => {
                info!(
                    target: "audit::openid",
                    audit_id = %record.id,
                    event_type = "assertion_verified",
                    claimed_id = ?claimed_id.as_deref().map(|c| self.maybe_hash(c)),
                    server_url = ?server_url,
                    signed_fields = *signed_fields,
                    service = %self.service_name,
                    "Assertion verified"
                );
            }
            VerificationEvent::AssertionRejected {
                claimed_id,
                server_url,
                reason,
                configuration_fault,
            } => {
                if *configuration_fault {
                    error!(
                        target: "audit::openid",
                        audit_id = %record.id,
                        event_type = "verifier_misconfigured",
                        claimed_id = ?claimed_id.as_deref().map(|c| self.maybe_hash(c)),
                        server_url = ?server_url,
                        reason = %reason,
                        service = %self.service_name,
                        "Assertion could not be verified: configuration fault"
                    );
                } else {
                    warn!(
                        target: "audit::openid",
                        audit_id = %record.id,
                        event_type = "assertion_rejected",
                        claimed_id = ?claimed_id.as_deref().map(|c| self.maybe_hash(c)),
                        server_url = ?server_url,
                        reason = %reason,
                        service = %self.service_name,
                        "Assertion rejected"
                    );
                }
            }
            VerificationEvent::AssociationInvalidated { server_url, handle } => {
                info!(
                    target: "audit::openid",
                    audit_id = %record.id,
                    event_type = "association_invalidated",
                    server_url = %server_url,
                    handle = %handle,
                    service = %self.service_name,
                    "Association invalidated by OP"
                );
            }
        }

        record
    }

    fn maybe_hash(&self, value: &str) -> String {
        if self.hash_identifiers {
            let hash = blake3::hash(value.as_bytes());
            format!("blake3:{}", &hash.to_hex()[..16])
        } else {
            value.to_string()
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new("openid-consumer")
    }
}

/// Verification event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerificationEvent {
    /// A positive assertion passed every check
    AssertionVerified {
        /// Verified claimed identifier (absent for OP-identifier responses)
        claimed_id: Option<String>,
        /// OP endpoint that asserted it
        server_url: Option<String>,
        /// Number of signed fields
        signed_fields: usize,
    },

    /// A positive assertion was rejected
    AssertionRejected {
        /// Claimed identifier, if the response carried one
        claimed_id: Option<String>,
        /// OP endpoint, if known
        server_url: Option<String>,
        /// Rejection reason
        reason: String,
        /// Whether the cause was caller misconfiguration
        configuration_fault: bool,
    },

    /// An OP asked the RP to drop an association
    AssociationInvalidated {
        /// OP endpoint
        server_url: String,
        /// Handle being invalidated
        handle: String,
    },
}

/// Audit record wrapping an event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique audit record ID
    pub id: Uuid,
    /// Timestamp of the event
    #[serde(with = "system_time_serde")]
    pub timestamp: SystemTime,
    /// Service that generated the event
    pub service: String,
    /// The audit event
    pub event: VerificationEvent,
}

mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_secs(secs))
    }
}
