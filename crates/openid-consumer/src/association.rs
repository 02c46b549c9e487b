//! Shared-secret associations and message signatures
//!
//! An association is the HMAC key an RP and OP negotiated earlier, identified
//! by `(server_url, handle)`. The signature of a message is the base64 HMAC of
//! the key-value form of every field listed in `openid.signed`, in order.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use openid_message::{Field, Message, kvform};
use secrecy::{ExposeSecret, SecretVec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Association signing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssociationError {
    /// The message has no `openid.signed` list
    #[error("message has no signed list")]
    MissingSignedList,

    /// The message has no `openid.sig`
    #[error("message has no signature")]
    MissingSignature,

    /// A field named in the signed list is absent
    #[error("signed field {0:?} is missing from the message")]
    MissingSignedField(String),

    /// The signed fields cannot be encoded as key-value form
    #[error("cannot encode signed fields: {0}")]
    Encoding(String),

    /// The association's handle differs from the message's
    #[error("association handle {expected:?} does not match message handle {found:?}")]
    HandleMismatch {
        /// Handle of the association
        expected: String,
        /// Handle carried by the message
        found: String,
    },
}

/// HMAC algorithm of an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationType {
    /// `HMAC-SHA1`
    #[serde(rename = "HMAC-SHA1")]
    HmacSha1,
    /// `HMAC-SHA256`
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
}

impl AssociationType {
    /// Protocol name of the algorithm
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HmacSha1 => "HMAC-SHA1",
            Self::HmacSha256 => "HMAC-SHA256",
        }
    }

    /// Secret length the algorithm expects
    pub fn secret_len(self) -> usize {
        match self {
            Self::HmacSha1 => 20,
            Self::HmacSha256 => 32,
        }
    }

    fn mac(self, secret: &[u8], data: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length
        match self {
            Self::HmacSha1 => {
                let mut mac = <Hmac<sha1::Sha1>>::new_from_slice(secret)
                    .unwrap_or_else(|_| unreachable!("HMAC takes keys of any length"));
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            Self::HmacSha256 => {
                let mut mac = <Hmac<sha2::Sha256>>::new_from_slice(secret)
                    .unwrap_or_else(|_| unreachable!("HMAC takes keys of any length"));
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }
}

/// A shared-secret association with an OP
pub struct Association {
    handle: String,
    secret: SecretVec<u8>,
    issued: SystemTime,
    lifetime: Duration,
    assoc_type: AssociationType,
}

// Manual Debug impl to keep the secret out of logs
impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("handle", &self.handle)
            .field("secret", &"<redacted>")
            .field("issued", &self.issued)
            .field("lifetime", &self.lifetime)
            .field("assoc_type", &self.assoc_type)
            .finish()
    }
}

impl Clone for Association {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            secret: SecretVec::new(self.secret.expose_secret().clone()),
            issued: self.issued,
            lifetime: self.lifetime,
            assoc_type: self.assoc_type,
        }
    }
}

impl Association {
    /// Create an association issued at `issued`
    pub fn new(
        handle: impl Into<String>,
        secret: Vec<u8>,
        issued: SystemTime,
        lifetime: Duration,
        assoc_type: AssociationType,
    ) -> Self {
        Self {
            handle: handle.into(),
            secret: SecretVec::new(secret),
            issued,
            lifetime,
            assoc_type,
        }
    }

    /// Create an association issued now
    pub fn from_expires_in(
        handle: impl Into<String>,
        secret: Vec<u8>,
        expires_in: Duration,
        assoc_type: AssociationType,
    ) -> Self {
        Self::new(handle, secret, SystemTime::now(), expires_in, assoc_type)
    }

    /// Association handle
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// HMAC algorithm
    pub fn assoc_type(&self) -> AssociationType {
        self.assoc_type
    }

    /// When the association was issued
    pub fn issued(&self) -> SystemTime {
        self.issued
    }

    /// Lifetime granted by the OP
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Whole seconds until expiry as of `now`; zero or negative once expired
    pub fn expires_in_at(&self, now: SystemTime) -> i64 {
        let to_secs = |t: SystemTime| -> i64 {
            match t.duration_since(UNIX_EPOCH) {
                Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
                Err(e) => -i64::try_from(e.duration().as_secs()).unwrap_or(i64::MAX),
            }
        };
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        to_secs(self.issued)
            .saturating_add(lifetime)
            .saturating_sub(to_secs(now))
    }

    /// Whole seconds until expiry; zero or negative once expired
    pub fn expires_in(&self) -> i64 {
        self.expires_in_at(SystemTime::now())
    }

    /// Compute the signature over `signed_list` in `message`
    ///
    /// # Errors
    ///
    /// Returns an error if a listed field is absent or cannot be encoded.
    pub fn sign(&self, message: &Message, signed_list: &[&str]) -> Result<String, AssociationError> {
        let mut pairs = Vec::with_capacity(signed_list.len());
        for name in signed_list {
            let value = message
                .get_aliased_arg(name)
                .ok_or_else(|| AssociationError::MissingSignedField((*name).to_string()))?;
            pairs.push((*name, value));
        }
        let body = kvform::encode(pairs).map_err(|e| AssociationError::Encoding(e.to_string()))?;
        let mac = self
            .assoc_type
            .mac(self.secret.expose_secret(), body.as_bytes());
        Ok(STANDARD.encode(mac))
    }

    /// Add `assoc_handle`, `signed` and `sig` to `message`, signing `fields`
    /// (plus `assoc_handle` and `signed` themselves, as OPs do)
    ///
    /// # Errors
    ///
    /// Returns an error if a listed field is absent or cannot be encoded.
    pub fn sign_message(&self, message: &mut Message, fields: &[&str]) -> Result<(), AssociationError> {
        message.set(Field::AssocHandle, self.handle.clone());
        let mut signed: Vec<&str> = fields.to_vec();
        for extra in [Field::AssocHandle.as_str(), Field::Signed.as_str()] {
            if !signed.contains(&extra) {
                signed.push(extra);
            }
        }
        message.set(Field::Signed, signed.join(","));
        let sig = self.sign(message, &signed)?;
        message.set(Field::Sig, sig);
        Ok(())
    }

    /// Check the `sig` of a message against this association
    ///
    /// Comparison is constant-time.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be checked at all (no signed
    /// list, no signature, wrong handle, missing signed field).
    pub fn check_message_signature(&self, message: &Message) -> Result<bool, AssociationError> {
        if let Some(found) = message.get(Field::AssocHandle)
            && found != self.handle
        {
            return Err(AssociationError::HandleMismatch {
                expected: self.handle.clone(),
                found: found.to_string(),
            });
        }
        let signed = message
            .get(Field::Signed)
            .ok_or(AssociationError::MissingSignedList)?;
        let sig = message
            .get(Field::Sig)
            .ok_or(AssociationError::MissingSignature)?;
        let signed_list: Vec<&str> = if signed.is_empty() {
            Vec::new()
        } else {
            signed.split(',').collect()
        };
        let expected = self.sign(message, &signed_list)?;
        Ok(expected.as_bytes().ct_eq(sig.as_bytes()).into())
    }
}
