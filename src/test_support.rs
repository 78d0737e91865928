// src/test_support.rs
//! In-memory mock collaborators for tests.
//!
//! One mock per external capability boundary: ledger, content store,
//! signing provider. Behavior toggles simulate the partial failures the
//! orchestrator and readers must tolerate.

use crate::contracts::{CredentialLedger, IssuanceEvent, Settlement};
use crate::error::{LedgerError, SessionError, UploadError};
use crate::models::credential::TokenId;
use crate::models::identity::Identity;
use crate::storage::content_uploader::ContentUploader;
use crate::wallet::signing_session::{SignatureRequest, SigningProvider};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ethers_core::types::{H256, U256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Clone)]
struct MockToken {
    issuer: Identity,
    holder: Identity,
    content_ref: String,
    issued_at: Option<DateTime<Utc>>,
    revoked: bool,
}

/// Scriptable in-memory ledger.
pub struct MockLedger {
    tokens: Mutex<HashMap<TokenId, MockToken>>,
    settlements: Mutex<HashMap<H256, Settlement>>,
    roles: Mutex<HashSet<Identity>>,
    forgotten_events: Mutex<HashSet<TokenId>>,
    failing_content_refs: Mutex<HashSet<TokenId>>,
    signer: Mutex<Identity>,
    next_token_id: AtomicU64,
    submit_count: AtomicUsize,
    fail_role_reads: AtomicBool,
    revert_role_admin: AtomicBool,
    fail_token_index: AtomicBool,
    hold_settlement: AtomicBool,
    omit_event: AtomicBool,
    estimate_error: Mutex<Option<LedgerError>>,
    submit_error: Mutex<Option<LedgerError>>,
}

impl MockLedger {
    pub fn new() -> Self {
        MockLedger {
            tokens: Mutex::new(HashMap::new()),
            settlements: Mutex::new(HashMap::new()),
            roles: Mutex::new(HashSet::new()),
            forgotten_events: Mutex::new(HashSet::new()),
            failing_content_refs: Mutex::new(HashSet::new()),
            signer: Mutex::new(Identity::from(ethers_core::types::Address::zero())),
            next_token_id: AtomicU64::new(1),
            submit_count: AtomicUsize::new(0),
            fail_role_reads: AtomicBool::new(false),
            revert_role_admin: AtomicBool::new(false),
            fail_token_index: AtomicBool::new(false),
            hold_settlement: AtomicBool::new(false),
            omit_event: AtomicBool::new(false),
            estimate_error: Mutex::new(None),
            submit_error: Mutex::new(None),
        }
    }

    // ----- scripting -----

    pub fn grant_role(&self, identity: &Identity) {
        self.roles.lock().unwrap().insert(*identity);
    }

    pub fn revoke_role(&self, identity: &Identity) {
        self.roles.lock().unwrap().remove(identity);
    }

    /// Identity recorded as issuer on tokens minted through
    /// [`CredentialLedger::submit_issue`].
    pub fn set_signer(&self, identity: Identity) {
        *self.signer.lock().unwrap() = identity;
    }

    pub fn set_next_token_id(&self, id: u64) {
        self.next_token_id.store(id, Ordering::SeqCst);
    }

    pub fn fail_role_reads(&self) {
        self.fail_role_reads.store(true, Ordering::SeqCst);
    }

    pub fn revert_role_admin(&self) {
        self.revert_role_admin.store(true, Ordering::SeqCst);
    }

    pub fn fail_token_index(&self) {
        self.fail_token_index.store(true, Ordering::SeqCst);
    }

    /// Park every settlement wait forever (cancellation tests).
    pub fn hold_settlement(&self) {
        self.hold_settlement.store(true, Ordering::SeqCst);
    }

    /// Settle without an issuance event in the log.
    pub fn omit_settlement_event(&self) {
        self.omit_event.store(true, Ordering::SeqCst);
    }

    pub fn fail_estimate_with(&self, err: LedgerError) {
        *self.estimate_error.lock().unwrap() = Some(err);
    }

    pub fn fail_submit_with(&self, err: LedgerError) {
        *self.submit_error.lock().unwrap() = Some(err);
    }

    pub fn fail_content_ref_for(&self, token: TokenId) {
        self.failing_content_refs.lock().unwrap().insert(token);
    }

    /// Make the historical event for `token` unlocatable.
    pub fn forget_event(&self, token: TokenId) {
        self.forgotten_events.lock().unwrap().insert(token);
    }

    /// Seeds an already-settled token.
    pub fn seed_token(
        &self,
        token: TokenId,
        issuer: Identity,
        holder: Identity,
        content_ref: &str,
        issued_at: Option<DateTime<Utc>>,
    ) {
        self.tokens.lock().unwrap().insert(
            token,
            MockToken {
                issuer,
                holder,
                content_ref: content_ref.to_string(),
                issued_at,
                revoked: false,
            },
        );
    }

    pub fn revoke_token(&self, token: &TokenId) {
        if let Some(entry) = self.tokens.lock().unwrap().get_mut(token) {
            entry.revoked = true;
        }
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    fn event_for(&self, token: &TokenId) -> Option<IssuanceEvent> {
        let tokens = self.tokens.lock().unwrap();
        let entry = tokens.get(token)?;
        Some(IssuanceEvent {
            token_id: *token,
            holder: entry.holder,
            issuer: entry.issuer,
            content_ref: entry.content_ref.clone(),
            issued_at: entry.issued_at,
        })
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialLedger for MockLedger {
    async fn has_issuer_role(&self, identity: &Identity) -> Result<bool, LedgerError> {
        if self.fail_role_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("role read failed".into()));
        }
        Ok(self.roles.lock().unwrap().contains(identity))
    }

    async fn grant_issuer(&self, identity: &Identity) -> Result<H256, LedgerError> {
        if self.revert_role_admin.load(Ordering::SeqCst) {
            return Err(LedgerError::Revert("caller is missing role".into()));
        }
        self.grant_role(identity);
        Ok(H256::zero())
    }

    async fn revoke_issuer(&self, identity: &Identity) -> Result<H256, LedgerError> {
        if self.revert_role_admin.load(Ordering::SeqCst) {
            return Err(LedgerError::Revert("caller is missing role".into()));
        }
        self.revoke_role(identity);
        Ok(H256::zero())
    }

    async fn estimate_issue(
        &self,
        _recipient: &Identity,
        _content_ref: &str,
    ) -> Result<U256, LedgerError> {
        if let Some(err) = self.estimate_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(U256::from(100_000u64))
    }

    async fn submit_issue(
        &self,
        recipient: &Identity,
        content_ref: &str,
        _gas_limit: U256,
    ) -> Result<H256, LedgerError> {
        if let Some(err) = self.submit_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.submit_count.fetch_add(1, Ordering::SeqCst);

        let id = self.next_token_id.fetch_add(1, Ordering::SeqCst);
        let token = TokenId::from(id);
        let tx_hash = H256::from_low_u64_be(id);

        // The chain will settle this mint whether or not anyone keeps
        // waiting for it.
        self.seed_token(
            token,
            *self.signer.lock().unwrap(),
            *recipient,
            content_ref,
            Utc.timestamp_opt(1_700_000_000 + id as i64, 0).single(),
        );

        let event = if self.omit_event.load(Ordering::SeqCst) {
            None
        } else {
            self.event_for(&token)
        };
        self.settlements
            .lock()
            .unwrap()
            .insert(tx_hash, Settlement { tx_hash, event });

        Ok(tx_hash)
    }

    async fn await_settlement(&self, tx_hash: H256) -> Result<Settlement, LedgerError> {
        if self.hold_settlement.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.settlements
            .lock()
            .unwrap()
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| LedgerError::Transport("unknown transaction".into()))
    }

    async fn tokens_of_issuer(&self, identity: &Identity) -> Result<Vec<TokenId>, LedgerError> {
        if self.fail_token_index.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("index unavailable".into()));
        }
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| t.issuer == *identity)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn tokens_of_holder(&self, identity: &Identity) -> Result<Vec<TokenId>, LedgerError> {
        if self.fail_token_index.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("index unavailable".into()));
        }
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| t.holder == *identity)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn content_ref_of(&self, token: &TokenId) -> Result<String, LedgerError> {
        if self.failing_content_refs.lock().unwrap().contains(token) {
            return Err(LedgerError::Transport("content ref unavailable".into()));
        }
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .map(|t| t.content_ref.clone())
            .ok_or_else(|| LedgerError::Revert("unknown token".into()))
    }

    async fn holder_of(&self, token: &TokenId) -> Result<Identity, LedgerError> {
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .map(|t| t.holder)
            .ok_or_else(|| LedgerError::Revert("unknown token".into()))
    }

    async fn issuance_event(&self, token: &TokenId) -> Result<Option<IssuanceEvent>, LedgerError> {
        if self.forgotten_events.lock().unwrap().contains(token) {
            return Ok(None);
        }
        Ok(self.event_for(token))
    }

    async fn revoke_credential(&self, token: &TokenId) -> Result<H256, LedgerError> {
        self.revoke_token(token);
        Ok(H256::zero())
    }

    async fn is_revoked(&self, token: &TokenId) -> Result<bool, LedgerError> {
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .map(|t| t.revoked)
            .ok_or_else(|| LedgerError::Revert("unknown token".into()))
    }
}

/// Scriptable content uploader.
pub struct MockUploader {
    default_cid: String,
    scripted: Mutex<VecDeque<Result<String, UploadError>>>,
    call_count: AtomicUsize,
    last_ok: Mutex<Option<String>>,
}

impl MockUploader {
    /// Uploader that always returns `cid` unless scripted otherwise.
    pub fn returning(cid: &str) -> Self {
        MockUploader {
            default_cid: cid.to_string(),
            scripted: Mutex::new(VecDeque::new()),
            call_count: AtomicUsize::new(0),
            last_ok: Mutex::new(None),
        }
    }

    /// Queues the outcome of the next call; queued outcomes are
    /// consumed in order before the default applies again.
    pub fn push_result(&self, result: Result<String, UploadError>) {
        self.scripted.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_returned(&self) -> Option<String> {
        self.last_ok.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentUploader for MockUploader {
    async fn upload(&self, _bytes: &[u8], _mime_hint: &str) -> Result<String, UploadError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let result = self
            .scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.default_cid.clone()));
        if let Ok(cid) = &result {
            *self.last_ok.lock().unwrap() = Some(cid.clone());
        }
        result
    }
}

/// Scriptable signing provider.
pub struct MockProvider {
    accounts: Vec<Identity>,
    chain_id: u64,
    reject: AtomicBool,
    approvals: AtomicUsize,
}

impl MockProvider {
    pub fn new(accounts: Vec<Identity>, chain_id: u64) -> Self {
        MockProvider {
            accounts,
            chain_id,
            reject: AtomicBool::new(false),
            approvals: AtomicUsize::new(0),
        }
    }

    /// Decline every authorization request from now on.
    pub fn reject_approvals(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }

    pub fn approvals(&self) -> usize {
        self.approvals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningProvider for MockProvider {
    async fn request_accounts(&self) -> Result<Vec<Identity>, SessionError> {
        if self.accounts.is_empty() {
            return Err(SessionError::ProviderUnavailable);
        }
        Ok(self.accounts.clone())
    }

    async fn chain_id(&self) -> Result<u64, SessionError> {
        Ok(self.chain_id)
    }

    async fn approve(&self, _request: &SignatureRequest) -> Result<(), SessionError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(SessionError::UserRejected);
        }
        self.approvals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
