//! Replay protection

use super::IdResRun;
use super::signature::SignatureBinding;
use crate::error::{Result, VerificationError};
use crate::nonce::split_nonce;
use tracing::{debug, warn};

impl IdResRun<'_> {
    /// Check the response nonce and record it as used
    ///
    /// Runs after signature verification, so a forged response never burns a
    /// legitimate nonce.
    pub(super) async fn check_nonce(&self, binding: &SignatureBinding) -> Result<()> {
        let claim = self
            .rules
            .extract_nonce(self.message, &self.verifier.config, &binding.server_url)?;

        let (timestamp, salt) =
            split_nonce(claim.nonce).map_err(|_| VerificationError::MalformedNonce(claim.nonce.to_string()))?;

        let Some(store) = &self.verifier.store else {
            debug!("No store configured, nonce not checked for replay");
            return Ok(());
        };

        if !store.use_nonce(&claim.server_url, timestamp, &salt).await {
            warn!(
                server_url = %claim.server_url,
                nonce = claim.nonce,
                "Nonce already used or out of range"
            );
            return Err(VerificationError::NonceReplayed(claim.nonce.to_string()));
        }
        Ok(())
    }
}
