// src/storage/content_uploader.rs
//! Content-addressable storage boundary.
//!
//! The uploader is a distinct, swappable capability: it takes raw bytes
//! and returns a content identifier once the bytes are durably stored.
//! It performs no retries of its own — retry policy belongs to the
//! issuance orchestrator, which knows which steps are idempotent.

use crate::error::UploadError;
use async_trait::async_trait;

/// Durable content storage returning content-derived identifiers.
#[async_trait]
pub trait ContentUploader: Send + Sync {
    /// Stores `bytes` and returns their content identifier
    /// (an `ipfs://…` URI).
    ///
    /// # Errors
    /// - [`UploadError::Rejected`] when the remote store refuses the
    ///   payload (quota, auth failure, malformed request)
    /// - [`UploadError::Timeout`] when the store does not respond
    async fn upload(&self, bytes: &[u8], mime_hint: &str) -> Result<String, UploadError>;
}

/// Rewrites an `ipfs://` content ref into a dereferenceable gateway URL.
///
/// Refs that are not `ipfs://` URIs pass through unchanged.
pub fn gateway_url(content_ref: &str, gateway_base: &str) -> String {
    match content_ref.strip_prefix("ipfs://") {
        Some(hash) => format!("{}/ipfs/{}", gateway_base.trim_end_matches('/'), hash),
        None => content_ref.to_string(),
    }
}
