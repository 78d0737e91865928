// src/contracts/mod.rs
//! The consumed ledger interface.
//!
//! The credential registry contract is an external collaborator: its
//! storage, access control and event emission are assumed correct and
//! are reached only through the fixed call/event surface modeled by
//! [`CredentialLedger`]. All operations are asynchronous and classify
//! their failures into [`LedgerError`] before returning.

pub mod credential_registry;

use crate::error::LedgerError;
use crate::models::credential::TokenId;
use crate::models::identity::Identity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers_core::types::{H256, U256};

/// The issuance event recorded by the ledger when a token is minted.
///
/// Carries everything the read side needs to reconstruct a credential
/// record: the assigned token id, recipient, submitting issuer, the
/// content reference and the ledger timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuanceEvent {
    pub token_id: TokenId,
    pub holder: Identity,
    pub issuer: Identity,
    pub content_ref: String,
    /// Ledger block timestamp; absent only if the event carried an
    /// out-of-range value.
    pub issued_at: Option<DateTime<Utc>>,
}

/// Outcome of waiting for a submitted transaction to settle.
///
/// `event` is parsed from the settled transaction's own log only —
/// historical logs are never scanned here, so a `None` means the
/// transaction settled without emitting an issuance event.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub tx_hash: H256,
    pub event: Option<IssuanceEvent>,
}

/// Fixed call/event surface of the credential registry contract.
#[async_trait]
pub trait CredentialLedger: Send + Sync {
    /// Fresh read of the issuer-role grant for `identity`.
    async fn has_issuer_role(&self, identity: &Identity) -> Result<bool, LedgerError>;

    /// Grants the issuer role. The contract enforces that only an
    /// existing issuer may call this; a revert means unauthorized.
    async fn grant_issuer(&self, identity: &Identity) -> Result<H256, LedgerError>;

    /// Revokes the issuer role; same access rule as [`Self::grant_issuer`].
    async fn revoke_issuer(&self, identity: &Identity) -> Result<H256, LedgerError>;

    /// Estimates the gas cost of issuing to `recipient`.
    async fn estimate_issue(
        &self,
        recipient: &Identity,
        content_ref: &str,
    ) -> Result<U256, LedgerError>;

    /// Submits the issuing transaction for inclusion. Returns once the
    /// network has accepted it — not once it is final.
    async fn submit_issue(
        &self,
        recipient: &Identity,
        content_ref: &str,
        gas_limit: U256,
    ) -> Result<H256, LedgerError>;

    /// Waits until `tx_hash` settles and returns its parsed issuance
    /// event, if the settled log contained one. May block indefinitely
    /// under congestion; callers race it against a cancel signal.
    async fn await_settlement(&self, tx_hash: H256) -> Result<Settlement, LedgerError>;

    /// Token ids issued by `identity`.
    async fn tokens_of_issuer(&self, identity: &Identity) -> Result<Vec<TokenId>, LedgerError>;

    /// Token ids currently held by `identity`.
    async fn tokens_of_holder(&self, identity: &Identity) -> Result<Vec<TokenId>, LedgerError>;

    /// Stored content reference of a token.
    async fn content_ref_of(&self, token: &TokenId) -> Result<String, LedgerError>;

    /// Current owner of a token.
    async fn holder_of(&self, token: &TokenId) -> Result<Identity, LedgerError>;

    /// Historical lookup of the issuance event for `token`. `Ok(None)`
    /// means the query succeeded but no event was found.
    async fn issuance_event(&self, token: &TokenId) -> Result<Option<IssuanceEvent>, LedgerError>;

    /// Marks a token revoked. Content is never mutated.
    async fn revoke_credential(&self, token: &TokenId) -> Result<H256, LedgerError>;

    /// Revocation status flag of a token.
    async fn is_revoked(&self, token: &TokenId) -> Result<bool, LedgerError>;
}
