// src/models/credential.rs
//! Credential token identifiers and records.
//!
//! A [`TokenId`] is the ledger-assigned, monotonic identifier of one
//! issued credential. It is serialized as a decimal string because the
//! underlying value is a 256-bit integer and JSON numbers cannot carry
//! it without precision loss.
//!
//! A [`CredentialRecord`] is the reconciled, displayable representation
//! of one issued token, assembled by the registry reader or appended
//! provisionally by the issuance orchestrator immediately after a
//! successful attempt.

use crate::models::identity::Identity;
use chrono::{DateTime, Utc};
use ethers_core::types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Unique, ledger-assigned credential token identifier.
///
/// Never reused; exactly one issuance event exists per id. Ordering is
/// numeric, which is issuance order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(U256);

impl TokenId {
    pub fn new(value: U256) -> Self {
        TokenId(value)
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    /// Parses a decimal string form.
    pub fn parse(s: &str) -> Result<Self, String> {
        U256::from_dec_str(s.trim())
            .map(TokenId)
            .map_err(|_| format!("malformed token id: {}", s))
    }
}

impl From<u64> for TokenId {
    fn from(value: u64) -> Self {
        TokenId(U256::from(value))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // U256 displays in decimal
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TokenId::parse(s)
    }
}

impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TokenId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// One issued credential, as displayed to issuers and holders.
///
/// `token_id`, `content_ref` and `issuer` are immutable once minted.
/// `issued_at` comes from the ledger's issuance event and is left
/// absent on a degraded read rather than fabricated. `issuer` is only
/// recoverable from that same event, so it is likewise absent when the
/// event cannot be located.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub token_id: TokenId,

    /// Current owner of the token.
    pub holder: Identity,

    /// Identity that submitted the issuing transaction, recovered from
    /// the issuance event.
    pub issuer: Option<Identity>,

    /// Content identifier returned by the uploader at issuance time.
    pub content_ref: String,

    /// Timestamp recorded by the ledger's issuance event.
    pub issued_at: Option<DateTime<Utc>>,

    /// Revocation status flag; content is never mutated on revocation.
    #[serde(default)]
    pub revoked: bool,

    /// Set on records appended locally after a successful attempt,
    /// cleared when a full registry pass re-observes the token.
    #[serde(default)]
    pub provisional: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_id_serializes_as_decimal_string() {
        let id = TokenId::from(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"7\"");
        let back: TokenId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn token_id_survives_values_beyond_f64_precision() {
        let s = "123456789012345678901234567890";
        let id = TokenId::parse(s).unwrap();
        assert_eq!(id.to_string(), s);
    }

    #[test]
    fn token_id_orders_numerically() {
        let mut ids = vec![TokenId::from(10), TokenId::from(2), TokenId::from(7)];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(|t| t.to_string()).collect();
        assert_eq!(rendered, vec!["2", "7", "10"]);
    }

    #[test]
    fn token_id_rejects_non_decimal() {
        assert!(TokenId::parse("0x07").is_err());
        assert!(TokenId::parse("seven").is_err());
    }
}
