// src/utils/reference.rs
//! Verification reference derivation.
//!
//! Maps a token identifier to the stable, externally-dereferenceable
//! verification locator and its machine-scannable payload. Pure: no
//! network, no ledger, byte-identical output for identical input.

use serde::Serialize;

/// A shareable verification locator for one issued credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReference {
    /// Dereferenceable URL of the public verification view.
    pub url: String,

    /// Payload to encode into a QR code. The same URL: scanners open it
    /// directly.
    pub qr_payload: String,
}

/// Derives the verification reference for a token.
///
/// `url` is `origin_base + "/verify/" + token_id`; the origin base is
/// used verbatim, so it should carry no trailing slash.
pub fn build_reference(token_id: &str, origin_base: &str) -> VerificationReference {
    let url = format!("{}/verify/{}", origin_base, token_id);
    VerificationReference {
        qr_payload: url.clone(),
        url,
    }
}
