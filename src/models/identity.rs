// src/models/identity.rs
//! Ledger identity type.
//!
//! An [`Identity`] is an externally-verifiable address naming a
//! participant (issuer or holder). Parsing validates the 0x-hex form;
//! equality compares the parsed address, so two renderings of the same
//! address in different letter case are equal.

use ethers_core::types::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An address-like identity on the ledger.
///
/// Immutable once observed. Displayed as a lowercase `0x…` hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity(Address);

impl Identity {
    /// Parses an identity from its hex form, accepting any letter case.
    ///
    /// # Errors
    /// Returns a human-readable message when the string is not a
    /// well-formed 20-byte hex address.
    pub fn parse(s: &str) -> Result<Self, String> {
        Address::from_str(s.trim())
            .map(Identity)
            .map_err(|_| format!("malformed address: {}", s))
    }

    /// The underlying ledger address.
    pub fn address(&self) -> Address {
        self.0
    }
}

impl From<Address> for Identity {
    fn from(addr: Address) -> Self {
        Identity(addr)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl FromStr for Identity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identity::parse(s)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Identity::parse(&s).map_err(serde::de::Error::custom)
    }
}
