// src/services/registry_reader.rs
//! Read-side reconciliation of issued credentials.
//!
//! Builds displayable, timestamped record sets for the issuer and
//! holder perspectives by correlating the ledger's per-identity token
//! indexes with historical issuance events. Per-token lookups are
//! independent and run in parallel; a token whose required lookups fail
//! is dropped from the result (and counted) rather than failing the
//! whole call, so callers can distinguish "empty" from "partial".
//!
//! Every full pass reconciles into the shared [`RegistryCache`], keyed
//! by token id. Records appended locally by the orchestrator are
//! provisional until such a pass re-observes them; reconciliation
//! replaces them in place, which is what guarantees a
//! cancelled-then-settled attempt never yields a duplicate entry.

use crate::contracts::CredentialLedger;
use crate::error::LedgerError;
use crate::models::credential::{CredentialRecord, TokenId};
use crate::models::identity::Identity;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Presentation order for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    /// Ascending token id — issuance order. The default.
    IssuanceOrder,
    /// Reverse-chronological (descending token id).
    NewestFirst,
}

/// Result of one listing pass.
#[derive(Debug, Clone)]
pub struct RegistryListing {
    pub records: Vec<CredentialRecord>,
    /// Tokens whose per-item lookups failed and were left out.
    pub dropped: usize,
}

/// Shared in-memory record cache, keyed by token id.
///
/// Cleared wholesale on a network switch — cross-network token ids are
/// not comparable.
#[derive(Default)]
pub struct RegistryCache {
    records: RwLock<HashMap<TokenId, CredentialRecord>>,
}

impl RegistryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a locally-assembled record after a successful issuance
    /// attempt, without a full registry pass. Ignored if the token is
    /// already known — a full pass outranks a local append.
    pub async fn append_provisional(&self, record: CredentialRecord) {
        let mut records = self.records.write().await;
        records.entry(record.token_id).or_insert(CredentialRecord {
            provisional: true,
            ..record
        });
    }

    /// Replaces cached entries with re-observed, authoritative ones.
    pub async fn reconcile(&self, confirmed: &[CredentialRecord]) {
        let mut records = self.records.write().await;
        for record in confirmed {
            records.insert(
                record.token_id,
                CredentialRecord {
                    provisional: false,
                    ..record.clone()
                },
            );
        }
    }

    pub async fn get(&self, token: &TokenId) -> Option<CredentialRecord> {
        self.records.read().await.get(token).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[derive(Clone, Copy)]
enum Perspective {
    Issuer,
    Holder,
}

/// Assembles credential listings from the ledger.
pub struct RegistryReader {
    ledger: Arc<dyn CredentialLedger>,
    cache: Arc<RegistryCache>,
}

impl RegistryReader {
    pub fn new(ledger: Arc<dyn CredentialLedger>, cache: Arc<RegistryCache>) -> Self {
        RegistryReader { ledger, cache }
    }

    /// Records issued by `identity`.
    pub async fn list_for_issuer(
        &self,
        identity: &Identity,
        order: ListOrder,
    ) -> Result<RegistryListing, LedgerError> {
        let tokens = self.ledger.tokens_of_issuer(identity).await?;
        self.assemble(identity, tokens, Perspective::Issuer, order)
            .await
    }

    /// Records currently held by `identity`.
    pub async fn list_for_holder(
        &self,
        identity: &Identity,
        order: ListOrder,
    ) -> Result<RegistryListing, LedgerError> {
        let tokens = self.ledger.tokens_of_holder(identity).await?;
        self.assemble(identity, tokens, Perspective::Holder, order)
            .await
    }

    async fn assemble(
        &self,
        identity: &Identity,
        tokens: Vec<TokenId>,
        perspective: Perspective,
        order: ListOrder,
    ) -> Result<RegistryListing, LedgerError> {
        let total = tokens.len();

        // Independent per-token lookups, fan-in keyed by token id.
        let lookups = tokens
            .into_iter()
            .map(|token| self.fetch_record(*identity, token, perspective));
        let mut records: Vec<CredentialRecord> =
            join_all(lookups).await.into_iter().flatten().collect();

        let dropped = total - records.len();
        if dropped > 0 {
            log::warn!(
                "registry pass for {} dropped {} of {} tokens",
                identity,
                dropped,
                total
            );
        }

        self.cache.reconcile(&records).await;

        records.sort_by_key(|r| r.token_id);
        if order == ListOrder::NewestFirst {
            records.reverse();
        }

        Ok(RegistryListing { records, dropped })
    }

    /// Per-token lookup. `None` means the token was dropped.
    async fn fetch_record(
        &self,
        identity: Identity,
        token: TokenId,
        perspective: Perspective,
    ) -> Option<CredentialRecord> {
        let content_ref = match self.ledger.content_ref_of(&token).await {
            Ok(content_ref) => content_ref,
            Err(e) => {
                log::warn!("dropping token {}: content ref lookup failed: {}", token, e);
                return None;
            }
        };

        let holder = match perspective {
            // The index already asserts ownership for the holder view.
            Perspective::Holder => identity,
            Perspective::Issuer => match self.ledger.holder_of(&token).await {
                Ok(holder) => holder,
                Err(e) => {
                    log::warn!("dropping token {}: holder lookup failed: {}", token, e);
                    return None;
                }
            },
        };

        let revoked = match self.ledger.is_revoked(&token).await {
            Ok(revoked) => revoked,
            Err(e) => {
                // Without the status flag a revoked credential could
                // render as valid; drop instead.
                log::warn!("dropping token {}: revocation lookup failed: {}", token, e);
                return None;
            }
        };

        // Event lookup failure degrades the record, it does not drop it:
        // issued_at is allowed to be absent, never fabricated.
        let event = match self.ledger.issuance_event(&token).await {
            Ok(event) => event,
            Err(e) => {
                log::warn!("degraded read for token {}: event lookup failed: {}", token, e);
                None
            }
        };

        let issuer = match perspective {
            Perspective::Issuer => Some(event.as_ref().map(|ev| ev.issuer).unwrap_or(identity)),
            Perspective::Holder => event.as_ref().map(|ev| ev.issuer),
        };

        Some(CredentialRecord {
            token_id: token,
            holder,
            issuer,
            content_ref,
            issued_at: event.and_then(|ev| ev.issued_at),
            revoked,
            provisional: false,
        })
    }
}
