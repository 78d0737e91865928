// src/main.rs

//! # Academic Credential Token System - Main Entry Point
//!
//! Issues, tracks and verifies academic-credential tokens anchored on
//! an EVM ledger, with the credential documents pinned to IPFS through
//! a Pinata-style endpoint.
//!
//! ## Architecture Overview
//! 1. **Blockchain Layer**: `EvmClient` + `CredentialRegistry` for the
//!    on-chain registry contract
//! 2. **Services Layer**: issuance orchestration, registry reads, role
//!    authorization, and the HTTP API
//! 3. **Storage Layer**: Pinata uploader for off-chain documents
//! 4. **Wallet Layer**: signing session over a local-key provider
//!
//! Configuration is read once at startup; see [`config`].

use crate::blockchain::evm_client::EvmClient;
use crate::config::Config;
use crate::contracts::credential_registry::CredentialRegistry;
use crate::contracts::CredentialLedger;
use crate::services::api_server::ApiServer;
use crate::services::issuer::IssuanceOrchestrator;
use crate::services::registry_reader::{RegistryCache, RegistryReader};
use crate::services::role_authority::RoleAuthority;
use crate::storage::pinata::PinataUploader;
use crate::wallet::local_provider::LocalKeyProvider;
use crate::wallet::signing_session::SigningSession;
use anyhow::Context;
use dotenv::dotenv;
use std::sync::Arc;

// Module declarations (organized by functional domain)
mod blockchain; // ledger connectivity
mod config; // startup configuration
mod contracts; // credential registry interface
mod error; // error taxonomy
mod models; // data structures
mod services; // business logic and API
mod storage; // off-chain content storage
mod utils; // helper functions
mod wallet; // signing session and providers

#[cfg(test)]
mod test_support;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env()?;

    // Connect to the ledger and bind the registry contract
    let client = EvmClient::new(&config.rpc_url, &config.private_key)
        .await
        .context("failed to connect to the ledger")?;
    let chain_id = client.chain_id();
    let ledger: Arc<dyn CredentialLedger> = Arc::new(
        CredentialRegistry::new(client, &config.registry_address)
            .context("failed to bind the credential registry contract")?,
    );

    // Signing session over the local key provider
    let provider = Arc::new(
        LocalKeyProvider::new(&config.private_key, chain_id)
            .context("failed to initialize the signing provider")?,
    );
    let session = Arc::new(SigningSession::new(provider));
    session
        .request_connect()
        .await
        .context("failed to connect the signing session")?;

    let roles = Arc::new(RoleAuthority::new(ledger.clone()));
    let cache = Arc::new(RegistryCache::new());
    let uploader = Arc::new(PinataUploader::new(
        &config.pinata_api_base,
        &config.pinata_api_key,
        &config.pinata_secret_key,
    ));

    // A network switch is a hard reset: cross-network token ids are
    // not comparable, so the registry cache is cleared wholesale. The
    // role authority keeps no state to reset.
    let mut network_rx = session.subscribe_network();
    let reset_cache = cache.clone();
    tokio::spawn(async move {
        while network_rx.changed().await.is_ok() {
            log::warn!("network switched, clearing registry cache");
            reset_cache.clear().await;
        }
    });

    // Identity changes carry no cached state here (role reads are
    // always fresh), so they are only surfaced in the log.
    let mut identity_rx = session.subscribe_identity();
    tokio::spawn(async move {
        while identity_rx.changed().await.is_ok() {
            match *identity_rx.borrow_and_update() {
                Some(identity) => log::info!("active signing identity is now {}", identity),
                None => log::info!("signing session disconnected"),
            }
        }
    });

    let orchestrator = Arc::new(IssuanceOrchestrator::new(
        ledger.clone(),
        uploader,
        roles.clone(),
        session.clone(),
        cache.clone(),
        &config.origin_base,
    ));
    let reader = Arc::new(RegistryReader::new(ledger.clone(), cache));

    let api_server = ApiServer::new(
        orchestrator,
        reader,
        roles,
        session,
        ledger,
        &config.origin_base,
        &config.gateway_base,
    );

    api_server.run(config.bind).await
}
