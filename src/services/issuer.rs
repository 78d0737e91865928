// src/services/issuer.rs
//! Issuance orchestration.
//!
//! The core state machine: given a recipient and a credential document,
//! drive upload → gas estimation → signature → submission →
//! confirmation → event-log token resolution → verification reference,
//! tolerating partial failure at every step. Each attempt is one
//! [`IssuanceAttempt`] advancing strictly sequentially; independent
//! attempts may run concurrently and share nothing mutable.
//!
//! Retry policy: failures strictly before the signature boundary may be
//! retried automatically at most once, and only for idempotent steps
//! (upload on timeout, estimation on transport error). Nothing at or
//! after `AwaitingSignature` is ever retried automatically — silently
//! re-submitting a ledger-mutating call risks duplicate issuance.

use crate::contracts::CredentialLedger;
use crate::error::{IssueError, LedgerError, SessionError, UploadError};
use crate::models::credential::CredentialRecord;
use crate::models::identity::Identity;
use crate::services::registry_reader::RegistryCache;
use crate::services::role_authority::RoleAuthority;
use crate::storage::content_uploader::ContentUploader;
use crate::utils::reference::{build_reference, VerificationReference};
use crate::wallet::signing_session::{SignatureRequest, SigningSession};
use ethers_core::types::{H256, U256};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Delay before re-entering the settlement wait after a transport blip.
const CONFIRM_RETRY_DELAY: Duration = Duration::from_secs(2);

const PDF_MAGIC: &[u8] = b"%PDF";
const DEFAULT_MIME: &str = "application/pdf";

/// Phases of one issuance attempt.
///
/// `Failed` is reachable from every non-terminal phase and carries the
/// classified reason; `Done` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum IssuancePhase {
    Idle,
    Validating,
    Uploading,
    EstimatingGas,
    AwaitingSignature,
    Submitted,
    Confirming,
    TokenResolved,
    Done,
    Failed(IssueError),
}

/// Input of one issuance attempt.
#[derive(Debug, Clone)]
pub struct IssuanceRequest {
    pub recipient: String,
    pub file: Vec<u8>,
    pub mime_type: String,
    /// Content ref from a prior attempt whose upload succeeded. When
    /// set, the upload step is skipped — the file was already durably
    /// stored and re-pinning it would only duplicate storage.
    pub reuse_content_ref: Option<String>,
}

/// Observable state of one attempt: phase subscription, cancel signal,
/// and the uploaded content ref (exposed so a failed attempt can be
/// retried without re-uploading).
///
/// Ephemeral: created on submission, dead after a terminal phase. Never
/// resumed — a new attempt must be started.
pub struct IssuanceAttempt {
    phase_tx: watch::Sender<IssuancePhase>,
    cancel_tx: watch::Sender<bool>,
    history: Mutex<Vec<IssuancePhase>>,
    content_ref: Mutex<Option<String>>,
}

impl IssuanceAttempt {
    pub fn new() -> Self {
        let (phase_tx, _) = watch::channel(IssuancePhase::Idle);
        let (cancel_tx, _) = watch::channel(false);
        IssuanceAttempt {
            phase_tx,
            cancel_tx,
            history: Mutex::new(vec![IssuancePhase::Idle]),
            content_ref: Mutex::new(None),
        }
    }

    /// Live phase subscription.
    pub fn subscribe(&self) -> watch::Receiver<IssuancePhase> {
        self.phase_tx.subscribe()
    }

    /// Current phase.
    pub fn phase(&self) -> IssuancePhase {
        self.phase_tx.borrow().clone()
    }

    /// Every phase this attempt has passed through, in order.
    pub fn history(&self) -> Vec<IssuancePhase> {
        self.history.lock().expect("phase history poisoned").clone()
    }

    /// Content ref uploaded by this attempt, if the upload completed.
    pub fn content_ref(&self) -> Option<String> {
        self.content_ref.lock().expect("content ref poisoned").clone()
    }

    /// Stops the `Confirming` wait. The in-flight transaction is not
    /// rolled back and may still settle on the ledger.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    fn set_phase(&self, phase: IssuancePhase) {
        log::debug!("issuance attempt phase: {:?}", phase);
        self.history.lock().expect("phase history poisoned").push(phase.clone());
        self.phase_tx.send_replace(phase);
    }

    fn record_content_ref(&self, content_ref: &str) {
        *self.content_ref.lock().expect("content ref poisoned") = Some(content_ref.to_string());
    }

    /// Resolves once [`Self::cancel`] has been called.
    async fn cancelled(&self) {
        let mut rx = self.cancel_tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for IssuanceAttempt {
    fn default() -> Self {
        Self::new()
    }
}

/// A successfully issued credential.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub record: CredentialRecord,
    pub reference: VerificationReference,
    pub tx_hash: H256,
}

/// Drives issuance attempts against the injected collaborators.
pub struct IssuanceOrchestrator {
    ledger: Arc<dyn CredentialLedger>,
    uploader: Arc<dyn ContentUploader>,
    roles: Arc<RoleAuthority>,
    session: Arc<SigningSession>,
    cache: Arc<RegistryCache>,
    origin_base: String,
}

impl IssuanceOrchestrator {
    pub fn new(
        ledger: Arc<dyn CredentialLedger>,
        uploader: Arc<dyn ContentUploader>,
        roles: Arc<RoleAuthority>,
        session: Arc<SigningSession>,
        cache: Arc<RegistryCache>,
        origin_base: &str,
    ) -> Self {
        IssuanceOrchestrator {
            ledger,
            uploader,
            roles,
            session,
            cache,
            origin_base: origin_base.trim_end_matches('/').to_string(),
        }
    }

    /// Runs one attempt to completion.
    ///
    /// On failure the attempt ends in `Failed(reason)` with the reason
    /// also returned; the caller decides whether re-initiation makes
    /// sense ([`IssueError::retriable`]).
    pub async fn issue(
        &self,
        request: IssuanceRequest,
        attempt: &IssuanceAttempt,
    ) -> Result<IssuedCredential, IssueError> {
        match self.run(request, attempt).await {
            Ok(issued) => Ok(issued),
            Err(e) => {
                log::warn!("issuance attempt failed ({}): {}", e.code(), e);
                attempt.set_phase(IssuancePhase::Failed(e.clone()));
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: IssuanceRequest,
        attempt: &IssuanceAttempt,
    ) -> Result<IssuedCredential, IssueError> {
        // Validating: local checks only, no network calls, no side
        // effects. A failure here leaves nothing to clean up.
        attempt.set_phase(IssuancePhase::Validating);
        let recipient = Identity::parse(&request.recipient).map_err(IssueError::InvalidInput)?;
        let mime = if request.mime_type.is_empty() {
            DEFAULT_MIME.to_string()
        } else {
            request.mime_type.clone()
        };
        if request.reuse_content_ref.is_none() {
            validate_document(&request.file, &mime)?;
        }

        // Role gate before any storage or ledger mutation. Fail-closed:
        // a read error is already `false` here.
        let issuer = self.session.current_identity().ok_or(IssueError::Unauthorized)?;
        if !self.roles.is_issuer(&issuer).await {
            return Err(IssueError::Unauthorized);
        }

        // Uploading (skipped when a prior attempt's ref is reused). One
        // automatic retry on timeout only — re-uploading identical
        // bytes is safe, a rejection is not transient.
        let content_ref = match request.reuse_content_ref {
            Some(reused) => {
                log::debug!("reusing content ref {} from a prior attempt", reused);
                reused
            }
            None => {
                attempt.set_phase(IssuancePhase::Uploading);
                self.upload_with_retry(&request.file, &mime).await?
            }
        };
        attempt.record_content_ref(&content_ref);

        // EstimatingGas: also the pre-check that catches a stale role
        // grant before any wallet prompt is shown.
        attempt.set_phase(IssuancePhase::EstimatingGas);
        let estimate = self.estimate_with_retry(&recipient, &content_ref).await?;

        // AwaitingSignature: estimate scaled by the fixed safety
        // margin (x1.2). No automatic retry at or past this point.
        attempt.set_phase(IssuancePhase::AwaitingSignature);
        let gas_ceiling = estimate + estimate / 5;
        self.session
            .approve(&SignatureRequest {
                recipient,
                content_ref: content_ref.clone(),
                gas_ceiling,
            })
            .await
            .map_err(|e| match e {
                SessionError::UserRejected => IssueError::UserRejected,
                other => IssueError::SubmissionFailed(other.to_string()),
            })?;

        let tx_hash = self
            .ledger
            .submit_issue(&recipient, &content_ref, gas_ceiling)
            .await
            .map_err(|e| IssueError::SubmissionFailed(e.to_string()))?;
        attempt.set_phase(IssuancePhase::Submitted);
        log::info!("issuance submitted in 0x{:x}", tx_hash);

        // Confirming: externally paced, possibly unbounded; the only
        // cancellable wait. Transport blips do not abort it.
        attempt.set_phase(IssuancePhase::Confirming);
        let settlement = loop {
            tokio::select! {
                biased;
                _ = attempt.cancelled() => {
                    log::info!("stopped waiting for 0x{:x}; it may still settle", tx_hash);
                    return Err(IssueError::Cancelled);
                }
                result = self.ledger.await_settlement(tx_hash) => match result {
                    Ok(settlement) => break settlement,
                    Err(LedgerError::Transport(msg)) => {
                        log::warn!("settlement wait interrupted, retrying: {}", msg);
                        tokio::time::sleep(CONFIRM_RETRY_DELAY).await;
                    }
                    Err(LedgerError::Revert(msg)) => {
                        return Err(IssueError::SubmissionFailed(msg));
                    }
                },
            }
        };

        // TokenResolved: the settled transaction's own log must carry
        // the issuance event; its absence is a data-integrity anomaly.
        let event = match settlement.event {
            Some(event) => event,
            None => {
                log::error!(
                    "settled transaction 0x{:x} carries no issuance event",
                    tx_hash
                );
                return Err(IssueError::EventNotFound(format!("0x{:x}", tx_hash)));
            }
        };
        attempt.set_phase(IssuancePhase::TokenResolved);

        // Done: derive the reference and append the provisional record
        // without re-querying the registry.
        let reference = build_reference(&event.token_id.to_string(), &self.origin_base);
        let record = CredentialRecord {
            token_id: event.token_id,
            holder: event.holder,
            issuer: Some(event.issuer),
            content_ref,
            issued_at: event.issued_at,
            revoked: false,
            provisional: true,
        };
        self.cache.append_provisional(record.clone()).await;
        attempt.set_phase(IssuancePhase::Done);
        log::info!(
            "credential {} issued to {}, verifiable at {}",
            record.token_id,
            record.holder,
            reference.url
        );

        Ok(IssuedCredential {
            record,
            reference,
            tx_hash,
        })
    }

    async fn upload_with_retry(&self, file: &[u8], mime: &str) -> Result<String, IssueError> {
        match self.uploader.upload(file, mime).await {
            Err(UploadError::Timeout) => {
                log::warn!("upload timed out, retrying once");
                self.uploader.upload(file, mime).await.map_err(IssueError::from)
            }
            other => other.map_err(IssueError::from),
        }
    }

    async fn estimate_with_retry(
        &self,
        recipient: &Identity,
        content_ref: &str,
    ) -> Result<U256, IssueError> {
        let result = match self.ledger.estimate_issue(recipient, content_ref).await {
            Err(LedgerError::Transport(msg)) => {
                log::warn!("gas estimation failed in transport, retrying once: {}", msg);
                self.ledger.estimate_issue(recipient, content_ref).await
            }
            other => other,
        };

        result.map_err(|e| match &e {
            LedgerError::Revert(msg) if is_role_revert(msg) => IssueError::Unauthorized,
            _ => IssueError::EstimationFailed(e.to_string()),
        })
    }
}

/// Whether a revert message denotes a missing issuer role.
fn is_role_revert(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    msg.contains("role") || msg.contains("unauthorized") || msg.contains("not authorized")
}

fn validate_document(file: &[u8], mime: &str) -> Result<(), IssueError> {
    if file.is_empty() {
        return Err(IssueError::InvalidInput("empty credential document".into()));
    }
    if mime != DEFAULT_MIME || !file.starts_with(PDF_MAGIC) {
        return Err(IssueError::InvalidInput(
            "credential document must be a PDF".into(),
        ));
    }
    Ok(())
}
