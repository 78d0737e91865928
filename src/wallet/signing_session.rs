// src/wallet/signing_session.rs
//! Signing session.
//!
//! One explicitly-owned object holds the current account identity and
//! the capability to authorize ledger-mutating calls. Components that
//! need the identity receive the session by injection; identity and
//! network changes are delivered through `watch` subscriptions instead
//! of ambient shared state.
//!
//! A network switch is a hard reset, not an incremental update:
//! identifiers are not comparable across networks, so dependent caches
//! must be rebuilt. The session only reports the switch; `main` wires
//! the subscriber that clears dependent state.

use crate::error::SessionError;
use crate::models::identity::Identity;
use async_trait::async_trait;
use ethers_core::types::U256;
use std::sync::Arc;
use tokio::sync::watch;

/// A transaction the signer is asked to authorize, with its computed
/// cost ceiling.
#[derive(Debug, Clone)]
pub struct SignatureRequest {
    pub recipient: Identity,
    pub content_ref: String,
    pub gas_ceiling: U256,
}

/// The external wallet/signing capability.
///
/// Holds keys and approves or declines transactions; everything else in
/// the system treats it as opaque.
#[async_trait]
pub trait SigningProvider: Send + Sync {
    /// Asks the provider for its accounts, prompting a connection if
    /// needed.
    async fn request_accounts(&self) -> Result<Vec<Identity>, SessionError>;

    /// The provider's active chain.
    async fn chain_id(&self) -> Result<u64, SessionError>;

    /// Asks the provider to authorize one transaction. A decline is
    /// [`SessionError::UserRejected`]; once the prompt is shown it
    /// cannot be withdrawn programmatically.
    async fn approve(&self, request: &SignatureRequest) -> Result<(), SessionError>;
}

/// The current signing identity and its change notifications.
pub struct SigningSession {
    provider: Arc<dyn SigningProvider>,
    identity_tx: watch::Sender<Option<Identity>>,
    network_tx: watch::Sender<Option<u64>>,
}

impl SigningSession {
    pub fn new(provider: Arc<dyn SigningProvider>) -> Self {
        let (identity_tx, _) = watch::channel(None);
        let (network_tx, _) = watch::channel(None);
        SigningSession {
            provider,
            identity_tx,
            network_tx,
        }
    }

    /// The active identity, if connected.
    pub fn current_identity(&self) -> Option<Identity> {
        *self.identity_tx.borrow()
    }

    /// The active chain, if known.
    pub fn current_network(&self) -> Option<u64> {
        *self.network_tx.borrow()
    }

    /// Connects to the signing provider and records the resulting
    /// identity and network.
    ///
    /// # Errors
    /// - [`SessionError::UserRejected`] when the provider declines
    /// - [`SessionError::ProviderUnavailable`] when none is present
    pub async fn request_connect(&self) -> Result<Identity, SessionError> {
        let accounts = self.provider.request_accounts().await?;
        let identity = accounts
            .into_iter()
            .next()
            .ok_or(SessionError::UserRejected)?;
        let chain = self.provider.chain_id().await?;

        self.network_tx.send_replace(Some(chain));
        self.identity_tx.send_replace(Some(identity));
        log::info!("signing session connected as {}", identity);
        Ok(identity)
    }

    /// Subscribe to identity changes (including disconnects).
    pub fn subscribe_identity(&self) -> watch::Receiver<Option<Identity>> {
        self.identity_tx.subscribe()
    }

    /// Subscribe to network switches.
    pub fn subscribe_network(&self) -> watch::Receiver<Option<u64>> {
        self.network_tx.subscribe()
    }

    /// Records a provider-reported account change. An empty account
    /// list is a disconnect.
    pub fn accounts_changed(&self, accounts: Vec<Identity>) {
        let next = accounts.into_iter().next();
        if next != self.current_identity() {
            log::info!("signing identity changed to {:?}", next.map(|i| i.to_string()));
            self.identity_tx.send_replace(next);
        }
    }

    /// Records a provider-reported network switch.
    pub fn network_changed(&self, chain_id: u64) {
        if self.current_network() != Some(chain_id) {
            log::warn!("network switched to chain {}, dependent state must reload", chain_id);
            self.network_tx.send_replace(Some(chain_id));
        }
    }

    /// Drops the active identity.
    pub fn disconnect(&self) {
        self.identity_tx.send_replace(None);
    }

    /// Forwards one authorization request to the provider.
    pub async fn approve(&self, request: &SignatureRequest) -> Result<(), SessionError> {
        self.provider.approve(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider {
        accounts: Vec<Identity>,
        chain: u64,
    }

    #[async_trait]
    impl SigningProvider for StaticProvider {
        async fn request_accounts(&self) -> Result<Vec<Identity>, SessionError> {
            if self.accounts.is_empty() {
                return Err(SessionError::UserRejected);
            }
            Ok(self.accounts.clone())
        }

        async fn chain_id(&self) -> Result<u64, SessionError> {
            Ok(self.chain)
        }

        async fn approve(&self, _request: &SignatureRequest) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn identity(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    #[tokio::test]
    async fn connect_records_identity_and_network() {
        let id = identity("0x00000000000000000000000000000000000000aa");
        let session = SigningSession::new(Arc::new(StaticProvider {
            accounts: vec![id],
            chain: 11155111,
        }));

        assert!(session.current_identity().is_none());
        let connected = session.request_connect().await.unwrap();
        assert_eq!(connected, id);
        assert_eq!(session.current_network(), Some(11155111));
    }

    #[tokio::test]
    async fn identity_change_notifies_subscribers() {
        let a = identity("0x00000000000000000000000000000000000000aa");
        let b = identity("0x00000000000000000000000000000000000000bb");
        let session = SigningSession::new(Arc::new(StaticProvider {
            accounts: vec![a],
            chain: 1,
        }));
        session.request_connect().await.unwrap();

        let mut rx = session.subscribe_identity();
        rx.borrow_and_update();

        session.accounts_changed(vec![b]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(b));

        // disconnect via empty account list
        session.accounts_changed(vec![]);
        assert_eq!(*rx.borrow_and_update(), None);
    }

    #[tokio::test]
    async fn network_switch_notifies_once_per_chain() {
        let session = SigningSession::new(Arc::new(StaticProvider {
            accounts: vec![identity("0x00000000000000000000000000000000000000aa")],
            chain: 1,
        }));
        session.request_connect().await.unwrap();

        let mut rx = session.subscribe_network();
        rx.borrow_and_update();

        session.network_changed(1); // no-op: same chain
        assert!(!rx.has_changed().unwrap());

        session.network_changed(5);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(5));
    }
}
