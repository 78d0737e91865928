// src/wallet/local_provider.rs
//! Local-key signing provider.
//!
//! Headless deployments have no interactive wallet; this provider
//! derives its single account from the configured private key and
//! approves every authorization request it is shown, since the key
//! holder is the operator. Interactive providers implement the same
//! [`SigningProvider`] trait and may decline.

use crate::error::SessionError;
use crate::models::identity::Identity;
use crate::wallet::signing_session::{SignatureRequest, SigningProvider};
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};

/// Signing provider backed by a locally-held key.
pub struct LocalKeyProvider {
    identity: Identity,
    chain_id: u64,
}

impl LocalKeyProvider {
    /// Derives the provider's account from a hex private key.
    ///
    /// # Errors
    /// Fails when the key is malformed.
    pub fn new(private_key: &str, chain_id: u64) -> anyhow::Result<Self> {
        let wallet: LocalWallet = private_key.trim_start_matches("0x").parse()?;
        Ok(LocalKeyProvider {
            identity: Identity::from(wallet.address()),
            chain_id,
        })
    }
}

#[async_trait]
impl SigningProvider for LocalKeyProvider {
    async fn request_accounts(&self) -> Result<Vec<Identity>, SessionError> {
        Ok(vec![self.identity])
    }

    async fn chain_id(&self) -> Result<u64, SessionError> {
        Ok(self.chain_id)
    }

    async fn approve(&self, request: &SignatureRequest) -> Result<(), SessionError> {
        log::debug!(
            "authorizing issuance to {} (gas ceiling {})",
            request.recipient,
            request.gas_ceiling
        );
        Ok(())
    }
}
