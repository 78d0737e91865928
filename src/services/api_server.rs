// src/services/api_server.rs
//! HTTP surface of the credential system.
//!
//! Thin presentational glue over the orchestration core: issuance,
//! the public verification endpoint, issuer/holder listings, role
//! administration and session introspection. Every issuance failure is
//! rendered as exactly one `{error, message, retriable}` body so the
//! caller can decide between retrying, fixing input, or escalating.
//!
//! Endpoints:
//! - `POST /issue-credential`
//! - `GET  /verify/:token_id`
//! - `GET  /credentials/issuer/:address`
//! - `GET  /credentials/holder/:address`
//! - `POST /revoke-credential`
//! - `POST /roles/grant`, `POST /roles/revoke`
//! - `GET  /session`

use crate::contracts::CredentialLedger;
use crate::error::{IssueError, LedgerError, RoleError};
use crate::models::credential::{CredentialRecord, TokenId};
use crate::models::identity::Identity;
use crate::services::issuer::{IssuanceAttempt, IssuanceOrchestrator, IssuanceRequest};
use crate::services::registry_reader::{ListOrder, RegistryReader};
use crate::services::role_authority::RoleAuthority;
use crate::storage::content_uploader::gateway_url;
use crate::utils::reference::build_reference;
use crate::wallet::signing_session::SigningSession;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

// API request and response structures

/// Request payload for issuing a credential.
#[derive(Serialize, Deserialize)]
struct IssueCredentialRequest {
    recipient: String,
    /// Credential document, base64-encoded.
    file_base64: String,
    mime_type: Option<String>,
    /// Content ref from a prior attempt, to skip re-upload.
    content_ref: Option<String>,
}

/// Response for a completed issuance.
#[derive(Serialize, Deserialize)]
struct IssueCredentialResponse {
    token_id: String,
    holder: String,
    content_ref: String,
    issued_at: Option<DateTime<Utc>>,
    verification_url: String,
    qr_payload: String,
    tx_hash: String,
}

/// Uniform error body; `retriable` tells the caller whether offering
/// a retry makes sense.
#[derive(Serialize, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
    retriable: bool,
}

/// Public verification view of one credential.
#[derive(Serialize, Deserialize)]
struct VerifyCredentialResponse {
    token_id: String,
    content_ref: String,
    document_url: String,
    holder: String,
    issuer: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    revoked: bool,
}

/// One listed credential, with its derived verification reference.
#[derive(Serialize, Deserialize)]
struct ListedCredential {
    token_id: String,
    holder: String,
    issuer: Option<String>,
    content_ref: String,
    document_url: String,
    issued_at: Option<DateTime<Utc>>,
    revoked: bool,
    provisional: bool,
    verification_url: String,
}

/// Response for listing operations; `dropped` distinguishes an empty
/// registry from a partial read.
#[derive(Serialize, Deserialize)]
struct ListCredentialsResponse {
    records: Vec<ListedCredential>,
    dropped: usize,
}

/// Request payload for role administration.
#[derive(Serialize, Deserialize)]
struct RoleChangeRequest {
    address: String,
}

/// Request payload for revoking a credential.
#[derive(Serialize, Deserialize)]
struct RevokeCredentialRequest {
    token_id: String,
}

/// Response carrying a transaction hash.
#[derive(Serialize, Deserialize)]
struct TxResponse {
    tx_hash: String,
}

/// Response describing the signing session.
#[derive(Serialize, Deserialize)]
struct SessionResponse {
    identity: Option<String>,
    chain_id: Option<u64>,
    is_issuer: bool,
}

/// API server state containing all service dependencies.
#[derive(Clone)]
pub struct ApiServer {
    orchestrator: Arc<IssuanceOrchestrator>,
    reader: Arc<RegistryReader>,
    roles: Arc<RoleAuthority>,
    session: Arc<SigningSession>,
    ledger: Arc<dyn CredentialLedger>,
    origin_base: String,
    gateway_base: String,
}

impl ApiServer {
    pub fn new(
        orchestrator: Arc<IssuanceOrchestrator>,
        reader: Arc<RegistryReader>,
        roles: Arc<RoleAuthority>,
        session: Arc<SigningSession>,
        ledger: Arc<dyn CredentialLedger>,
        origin_base: &str,
        gateway_base: &str,
    ) -> Self {
        ApiServer {
            orchestrator,
            reader,
            roles,
            session,
            ledger,
            origin_base: origin_base.trim_end_matches('/').to_string(),
            gateway_base: gateway_base.to_string(),
        }
    }

    /// Starts the HTTP server.
    pub async fn run(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/issue-credential", post(Self::issue_credential_handler))
            .route("/verify/:token_id", get(Self::verify_credential_handler))
            .route("/credentials/issuer/:address", get(Self::list_issuer_handler))
            .route("/credentials/holder/:address", get(Self::list_holder_handler))
            .route("/revoke-credential", post(Self::revoke_credential_handler))
            .route("/roles/grant", post(Self::grant_role_handler))
            .route("/roles/revoke", post(Self::revoke_role_handler))
            .route("/session", get(Self::session_handler))
            .route("/session/disconnect", post(Self::disconnect_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self.clone()));

        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("API server listening on {}", addr);
        axum::serve(listener, app).await?;
        Ok(())
    }

    // =====================
    // Issuance
    // =====================

    /// Runs one issuance attempt to completion.
    ///
    /// # Endpoint
    /// POST /issue-credential
    async fn issue_credential_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<IssueCredentialRequest>,
    ) -> Response {
        let file = match base64::decode(&payload.file_base64) {
            Ok(bytes) => bytes,
            Err(_) => {
                return issue_error_response(&IssueError::InvalidInput(
                    "file_base64 is not valid base64".into(),
                ))
            }
        };

        let request = IssuanceRequest {
            recipient: payload.recipient,
            file,
            mime_type: payload.mime_type.unwrap_or_default(),
            reuse_content_ref: payload.content_ref,
        };

        let attempt = IssuanceAttempt::new();
        match state.orchestrator.issue(request, &attempt).await {
            Ok(issued) => (
                StatusCode::OK,
                Json(IssueCredentialResponse {
                    token_id: issued.record.token_id.to_string(),
                    holder: issued.record.holder.to_string(),
                    content_ref: issued.record.content_ref,
                    issued_at: issued.record.issued_at,
                    verification_url: issued.reference.url,
                    qr_payload: issued.reference.qr_payload,
                    tx_hash: format!("0x{:x}", issued.tx_hash),
                }),
            )
                .into_response(),
            Err(e) => issue_error_response(&e),
        }
    }

    // =====================
    // Verification
    // =====================

    /// Resolves a token to its content reference and issuance metadata.
    /// This is the view the QR-encoded verification reference opens.
    ///
    /// # Endpoint
    /// GET /verify/:token_id
    async fn verify_credential_handler(
        Path(token_id): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        let token = match TokenId::parse(&token_id) {
            Ok(token) => token,
            Err(msg) => return simple_error(StatusCode::BAD_REQUEST, "invalid_input", &msg),
        };

        let content_ref = match state.ledger.content_ref_of(&token).await {
            Ok(content_ref) => content_ref,
            Err(e) => return ledger_read_error(&token, &e),
        };
        let holder = match state.ledger.holder_of(&token).await {
            Ok(holder) => holder,
            Err(e) => return ledger_read_error(&token, &e),
        };
        let revoked = match state.ledger.is_revoked(&token).await {
            Ok(revoked) => revoked,
            Err(e) => return ledger_read_error(&token, &e),
        };
        // Metadata is best-effort: an unlocatable event degrades the
        // view, it does not hide the credential.
        let event = state.ledger.issuance_event(&token).await.unwrap_or(None);

        (
            StatusCode::OK,
            Json(VerifyCredentialResponse {
                token_id: token.to_string(),
                document_url: gateway_url(&content_ref, &state.gateway_base),
                content_ref,
                holder: holder.to_string(),
                issuer: event.as_ref().map(|ev| ev.issuer.to_string()),
                issued_at: event.and_then(|ev| ev.issued_at),
                revoked,
            }),
        )
            .into_response()
    }

    // =====================
    // Listings
    // =====================

    /// Credentials issued by an identity.
    ///
    /// # Endpoint
    /// GET /credentials/issuer/:address?order=desc
    async fn list_issuer_handler(
        Path(address): Path<String>,
        Query(params): Query<HashMap<String, String>>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        let identity = match Identity::parse(&address) {
            Ok(identity) => identity,
            Err(msg) => return simple_error(StatusCode::BAD_REQUEST, "invalid_input", &msg),
        };

        match state
            .reader
            .list_for_issuer(&identity, list_order(&params))
            .await
        {
            Ok(listing) => state.listing_response(listing.records, listing.dropped),
            Err(e) => simple_error(StatusCode::BAD_GATEWAY, "ledger_error", &e.to_string()),
        }
    }

    /// Credentials held by an identity.
    ///
    /// # Endpoint
    /// GET /credentials/holder/:address?order=desc
    async fn list_holder_handler(
        Path(address): Path<String>,
        Query(params): Query<HashMap<String, String>>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        let identity = match Identity::parse(&address) {
            Ok(identity) => identity,
            Err(msg) => return simple_error(StatusCode::BAD_REQUEST, "invalid_input", &msg),
        };

        match state
            .reader
            .list_for_holder(&identity, list_order(&params))
            .await
        {
            Ok(listing) => state.listing_response(listing.records, listing.dropped),
            Err(e) => simple_error(StatusCode::BAD_GATEWAY, "ledger_error", &e.to_string()),
        }
    }

    fn listing_response(&self, records: Vec<CredentialRecord>, dropped: usize) -> Response {
        let records = records
            .into_iter()
            .map(|record| {
                let reference =
                    build_reference(&record.token_id.to_string(), &self.origin_base);
                ListedCredential {
                    token_id: record.token_id.to_string(),
                    holder: record.holder.to_string(),
                    issuer: record.issuer.map(|i| i.to_string()),
                    document_url: gateway_url(&record.content_ref, &self.gateway_base),
                    content_ref: record.content_ref,
                    issued_at: record.issued_at,
                    revoked: record.revoked,
                    provisional: record.provisional,
                    verification_url: reference.url,
                }
            })
            .collect();

        (
            StatusCode::OK,
            Json(ListCredentialsResponse { records, dropped }),
        )
            .into_response()
    }

    // =====================
    // Administration
    // =====================

    /// Marks a credential revoked.
    ///
    /// # Endpoint
    /// POST /revoke-credential
    async fn revoke_credential_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RevokeCredentialRequest>,
    ) -> Response {
        let token = match TokenId::parse(&payload.token_id) {
            Ok(token) => token,
            Err(msg) => return simple_error(StatusCode::BAD_REQUEST, "invalid_input", &msg),
        };

        match state.ledger.revoke_credential(&token).await {
            Ok(tx_hash) => tx_response(tx_hash),
            Err(LedgerError::Revert(msg)) => {
                simple_error(StatusCode::FORBIDDEN, "unauthorized", &msg)
            }
            Err(e) => simple_error(StatusCode::BAD_GATEWAY, "ledger_error", &e.to_string()),
        }
    }

    /// Grants the issuer role to an address.
    ///
    /// # Endpoint
    /// POST /roles/grant
    async fn grant_role_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RoleChangeRequest>,
    ) -> Response {
        Self::role_change(&state, &payload.address, true).await
    }

    /// Revokes the issuer role from an address.
    ///
    /// # Endpoint
    /// POST /roles/revoke
    async fn revoke_role_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RoleChangeRequest>,
    ) -> Response {
        Self::role_change(&state, &payload.address, false).await
    }

    async fn role_change(state: &ApiServer, address: &str, grant: bool) -> Response {
        let identity = match Identity::parse(address) {
            Ok(identity) => identity,
            Err(msg) => return simple_error(StatusCode::BAD_REQUEST, "invalid_input", &msg),
        };

        let result = if grant {
            state.roles.grant(&identity).await
        } else {
            state.roles.revoke(&identity).await
        };

        match result {
            Ok(tx_hash) => tx_response(tx_hash),
            Err(RoleError::Unauthorized) => simple_error(
                StatusCode::FORBIDDEN,
                "unauthorized",
                "only an authorized issuer may administer roles",
            ),
            Err(RoleError::Ledger(msg)) => {
                simple_error(StatusCode::BAD_GATEWAY, "ledger_error", &msg)
            }
        }
    }

    // =====================
    // Session
    // =====================

    /// Current signing identity and a fresh issuer-role answer.
    ///
    /// # Endpoint
    /// GET /session
    async fn session_handler(State(state): State<Arc<ApiServer>>) -> Response {
        let identity = state.session.current_identity();
        let is_issuer = match &identity {
            Some(identity) => state.roles.is_issuer(identity).await,
            None => false,
        };

        (
            StatusCode::OK,
            Json(SessionResponse {
                identity: identity.map(|i| i.to_string()),
                chain_id: state.session.current_network(),
                is_issuer,
            }),
        )
            .into_response()
    }

    /// Drops the active signing identity.
    ///
    /// # Endpoint
    /// POST /session/disconnect
    async fn disconnect_handler(State(state): State<Arc<ApiServer>>) -> Response {
        state.session.disconnect();
        (
            StatusCode::OK,
            Json(SessionResponse {
                identity: None,
                chain_id: state.session.current_network(),
                is_issuer: false,
            }),
        )
            .into_response()
    }
}

fn list_order(params: &HashMap<String, String>) -> ListOrder {
    match params.get("order").map(String::as_str) {
        Some("desc") | Some("newest") => ListOrder::NewestFirst,
        _ => ListOrder::IssuanceOrder,
    }
}

fn tx_response(tx_hash: ethers_core::types::H256) -> Response {
    (
        StatusCode::OK,
        Json(TxResponse {
            tx_hash: format!("0x{:x}", tx_hash),
        }),
    )
        .into_response()
}

fn simple_error(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: code.to_string(),
            message: message.to_string(),
            retriable: false,
        }),
    )
        .into_response()
}

fn ledger_read_error(token: &TokenId, err: &LedgerError) -> Response {
    match err {
        LedgerError::Revert(_) => simple_error(
            StatusCode::NOT_FOUND,
            "not_found",
            &format!("no credential with token id {}", token),
        ),
        LedgerError::Transport(msg) => {
            simple_error(StatusCode::BAD_GATEWAY, "ledger_error", msg)
        }
    }
}

/// Maps each issuance failure to its one distinguishable status.
fn issue_error_response(err: &IssueError) -> Response {
    let status = match err {
        IssueError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        IssueError::Unauthorized => StatusCode::FORBIDDEN,
        IssueError::UploadFailed(_) => StatusCode::BAD_GATEWAY,
        IssueError::UploadTimeout => StatusCode::GATEWAY_TIMEOUT,
        IssueError::EstimationFailed(_) => StatusCode::BAD_GATEWAY,
        IssueError::UserRejected => StatusCode::CONFLICT,
        IssueError::SubmissionFailed(_) => StatusCode::BAD_GATEWAY,
        IssueError::EventNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
        IssueError::Cancelled => StatusCode::CONFLICT,
    };

    (
        status,
        Json(ErrorBody {
            error: err.code().to_string(),
            message: err.to_string(),
            retriable: err.retriable(),
        }),
    )
        .into_response()
}
