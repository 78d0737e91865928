// src/services/role_authority.rs
//! Issuer-role authorization gate.
//!
//! Authorization is owned entirely by the ledger; this service is a
//! read-through with no local persistence, so a grant or revoke is
//! visible on the very next check and there is nothing to invalidate
//! when the signing identity changes. Reads fail closed: an identity is
//! treated as not-authorized whenever the answer cannot be obtained.

use crate::contracts::CredentialLedger;
use crate::error::RoleError;
use crate::models::identity::Identity;
use ethers_core::types::H256;
use std::sync::Arc;

/// Answers "may this identity issue credentials right now?".
pub struct RoleAuthority {
    ledger: Arc<dyn CredentialLedger>,
}

impl RoleAuthority {
    pub fn new(ledger: Arc<dyn CredentialLedger>) -> Self {
        RoleAuthority { ledger }
    }

    /// Fresh ledger read of the issuer-role grant.
    ///
    /// Never returns `true` on a failed read: a transport error is
    /// logged and reported as not-authorized.
    pub async fn is_issuer(&self, identity: &Identity) -> bool {
        match self.ledger.has_issuer_role(identity).await {
            Ok(granted) => granted,
            Err(e) => {
                log::warn!(
                    "issuer role read for {} failed, treating as unauthorized: {}",
                    identity,
                    e
                );
                false
            }
        }
    }

    /// Grants the issuer role to `identity`.
    ///
    /// The ledger enforces that only an existing issuer may grant; its
    /// rejection surfaces as [`RoleError::Unauthorized`].
    pub async fn grant(&self, identity: &Identity) -> Result<H256, RoleError> {
        let tx = self.ledger.grant_issuer(identity).await?;
        log::info!("issuer role granted to {} in 0x{:x}", identity, tx);
        Ok(tx)
    }

    /// Revokes the issuer role from `identity`; same access rule as
    /// [`Self::grant`].
    pub async fn revoke(&self, identity: &Identity) -> Result<H256, RoleError> {
        let tx = self.ledger.revoke_issuer(identity).await?;
        log::info!("issuer role revoked from {} in 0x{:x}", identity, tx);
        Ok(tx)
    }
}
