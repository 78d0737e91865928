// src/error.rs
//! Error types for the credential system.
//!
//! Every network-bound collaborator classifies its own failures into a
//! small typed error before anything reaches a caller: the ledger into
//! [`LedgerError`], the content store into [`UploadError`], the signing
//! provider into [`SessionError`]. The issuance state machine folds all
//! of these into the user-facing [`IssueError`] taxonomy, so raw
//! transport errors never leak out of the orchestration layer.

use thiserror::Error;

/// Errors raised by the ledger boundary.
///
/// `Transport` covers RPC/network failures where the call may never have
/// reached the contract; `Revert` means the contract itself rejected the
/// call (access control, unknown token, malformed arguments).
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("contract reverted: {0}")]
    Revert(String),
}

/// Errors raised by the content-store boundary.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// The remote store answered and said no (quota, auth, malformed payload).
    #[error("upload rejected by content store: {0}")]
    Rejected(String),

    /// The store never answered within the deadline.
    #[error("content store did not respond in time")]
    Timeout,
}

/// Errors raised by the signing-provider boundary.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("signing provider declined the request")]
    UserRejected,

    #[error("no signing provider is available")]
    ProviderUnavailable,

    #[error("signing provider error: {0}")]
    Transport(String),
}

/// Errors from role grant/revoke administration.
///
/// A contract revert on these calls means the caller lacks the issuer
/// role itself and is surfaced as `Unauthorized`, never as a generic
/// ledger failure.
#[derive(Debug, Clone, Error)]
pub enum RoleError {
    #[error("caller is not authorized to administer issuer roles")]
    Unauthorized,

    #[error("role operation failed: {0}")]
    Ledger(String),
}

impl From<LedgerError> for RoleError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Revert(_) => RoleError::Unauthorized,
            LedgerError::Transport(msg) => RoleError::Ledger(msg),
        }
    }
}

/// The user-facing issuance failure taxonomy.
///
/// Each member maps to exactly one notification class so a caller can
/// decide between "retry" (`UploadFailed`, `UploadTimeout`,
/// `SubmissionFailed`, `UserRejected`, `Cancelled`), "fix input"
/// (`InvalidInput`, `Unauthorized`) and "contact support"
/// (`EventNotFound`).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IssueError {
    /// Local validation failure; no side effect has occurred.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The current identity does not hold the issuer role. Also raised
    /// fail-closed when the role read itself errors.
    #[error("current identity is not an authorized issuer")]
    Unauthorized,

    /// Content store rejected the upload; no ledger call has occurred.
    #[error("content upload failed: {0}")]
    UploadFailed(String),

    /// Content store did not respond; no ledger call has occurred.
    #[error("content upload timed out")]
    UploadTimeout,

    /// Gas estimation failed for a reason other than a missing role.
    #[error("gas estimation failed: {0}")]
    EstimationFailed(String),

    /// The signer declined; the uploaded content ref remains reusable.
    #[error("signature request was declined")]
    UserRejected,

    /// The network rejected the transaction before inclusion.
    #[error("transaction submission failed: {0}")]
    SubmissionFailed(String),

    /// The transaction settled but its log carried no issuance event.
    /// A data-integrity anomaly, not a transient failure.
    #[error("issuance event not found in settled transaction {0}")]
    EventNotFound(String),

    /// The user stopped waiting for settlement. The transaction itself
    /// may still settle on the ledger.
    #[error("confirmation wait was cancelled")]
    Cancelled,
}

impl IssueError {
    /// Stable machine-readable code for API payloads and logs.
    pub fn code(&self) -> &'static str {
        match self {
            IssueError::InvalidInput(_) => "invalid_input",
            IssueError::Unauthorized => "unauthorized",
            IssueError::UploadFailed(_) => "upload_failed",
            IssueError::UploadTimeout => "upload_timeout",
            IssueError::EstimationFailed(_) => "estimation_failed",
            IssueError::UserRejected => "user_rejected",
            IssueError::SubmissionFailed(_) => "submission_failed",
            IssueError::EventNotFound(_) => "event_not_found",
            IssueError::Cancelled => "cancelled",
        }
    }

    /// Whether re-initiating the attempt is a sensible next step.
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            IssueError::UploadFailed(_)
                | IssueError::UploadTimeout
                | IssueError::SubmissionFailed(_)
                | IssueError::UserRejected
                | IssueError::Cancelled
        )
    }
}

impl From<UploadError> for IssueError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Rejected(msg) => IssueError::UploadFailed(msg),
            UploadError::Timeout => IssueError::UploadTimeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_errors_keep_their_distinction() {
        assert_eq!(
            IssueError::from(UploadError::Rejected("quota".into())),
            IssueError::UploadFailed("quota".into())
        );
        assert_eq!(IssueError::from(UploadError::Timeout), IssueError::UploadTimeout);
    }

    #[test]
    fn revert_on_role_admin_is_unauthorized() {
        let err = RoleError::from(LedgerError::Revert("missing role".into()));
        assert!(matches!(err, RoleError::Unauthorized));

        let err = RoleError::from(LedgerError::Transport("rpc down".into()));
        assert!(matches!(err, RoleError::Ledger(_)));
    }

    #[test]
    fn retriable_set_matches_taxonomy() {
        assert!(IssueError::UserRejected.retriable());
        assert!(IssueError::SubmissionFailed("gossip".into()).retriable());
        assert!(!IssueError::Unauthorized.retriable());
        assert!(!IssueError::EventNotFound("0xabc".into()).retriable());
    }
}
