// src/config.rs
//! Startup configuration.
//!
//! All configuration is read once from the environment (optionally via a
//! `.env` file) when the process starts. There is no hot reload: a
//! changed contract address or storage credential requires a restart.
//!
//! ## Environment Variables
//! - `RPC_URL` — ledger JSON-RPC endpoint
//! - `CREDENTIAL_REGISTRY_ADDRESS` — deployed CredentialRegistry contract
//! - `PRIVATE_KEY` — hex key for the local signing provider
//! - `PINATA_API_KEY` / `PINATA_SECRET_KEY` — content-store credentials
//! - `ORIGIN_BASE` — origin used to build verification references
//! - `BIND_ADDR` — (optional) HTTP bind address, default `127.0.0.1:3000`
//! - `PINATA_API_BASE` — (optional) content-store endpoint override
//! - `IPFS_GATEWAY_BASE` — (optional) HTTP gateway for `ipfs://` refs

use anyhow::{Context, Result};
use std::net::SocketAddr;

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_PINATA_API_BASE: &str = "https://api.pinata.cloud";
const DEFAULT_GATEWAY_BASE: &str = "https://gateway.pinata.cloud";

/// Immutable process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub registry_address: String,
    pub private_key: String,
    pub pinata_api_key: String,
    pub pinata_secret_key: String,
    pub pinata_api_base: String,
    pub gateway_base: String,
    /// Origin for verification references, e.g. `https://app.example`.
    /// Trailing slashes are trimmed so derived URLs stay canonical.
    pub origin_base: String,
    pub bind: SocketAddr,
}

impl Config {
    /// Loads configuration from the environment.
    ///
    /// # Errors
    /// Returns an error naming the first missing or malformed variable.
    pub fn from_env() -> Result<Self> {
        let require = |key: &str| -> Result<String> {
            std::env::var(key).with_context(|| format!("{} must be set", key))
        };

        let bind: SocketAddr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND.to_string())
            .parse()
            .context("BIND_ADDR is not a valid socket address")?;

        let origin_base = require("ORIGIN_BASE")?
            .trim_end_matches('/')
            .to_string();

        Ok(Config {
            rpc_url: require("RPC_URL")?,
            registry_address: require("CREDENTIAL_REGISTRY_ADDRESS")?,
            private_key: require("PRIVATE_KEY")?,
            pinata_api_key: require("PINATA_API_KEY")?,
            pinata_secret_key: require("PINATA_SECRET_KEY")?,
            pinata_api_base: std::env::var("PINATA_API_BASE")
                .unwrap_or_else(|_| DEFAULT_PINATA_API_BASE.to_string()),
            gateway_base: std::env::var("IPFS_GATEWAY_BASE")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_BASE.to_string()),
            origin_base,
            bind,
        })
    }
}
