// src/contracts/credential_registry.rs
//! Credential Registry smart contract interface.
//!
//! On-chain implementation of [`CredentialLedger`] over the deployed
//! CredentialRegistry contract: token issuance and revocation, role
//! administration, per-identity token indexes, and issuance-event
//! queries. The ABI is included at compile time.

use crate::blockchain::evm_client::{load_abi, EvmClient};
use crate::contracts::{CredentialLedger, IssuanceEvent, Settlement};
use crate::error::LedgerError;
use crate::models::credential::TokenId;
use crate::models::identity::Identity;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ethers::providers::Middleware;
use ethers_core::abi::{RawLog, Token};
use ethers_core::types::{Address, BlockNumber, Filter, Log, H256, U256};
use std::str::FromStr;

const ABI: &[u8] = include_bytes!("abi/CredentialRegistry.json");
const ISSUED_EVENT: &str = "CredentialIssued";

/// Credential Registry contract wrapper.
pub struct CredentialRegistry {
    client: EvmClient,
    address: Address,
}

impl CredentialRegistry {
    /// Binds the wrapper to a deployed contract.
    ///
    /// # Errors
    /// Fails when the address string is malformed.
    pub fn new(client: EvmClient, contract_address: &str) -> Result<Self, LedgerError> {
        let address = Address::from_str(contract_address)
            .map_err(|e| LedgerError::Transport(format!("invalid contract address: {}", e)))?;
        Ok(CredentialRegistry { client, address })
    }

    /// Parses a raw ledger log into an issuance event, if it is one.
    fn parse_issued_event(&self, log: &Log) -> Option<IssuanceEvent> {
        if log.address != self.address {
            return None;
        }

        let abi = load_abi(ABI).ok()?;
        let event = abi.event(ISSUED_EVENT).ok()?;
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        let parsed = event.parse_log(raw).ok()?;

        let mut token_id = None;
        let mut holder = None;
        let mut issuer = None;
        let mut content_ref = None;
        let mut timestamp = None;

        for param in parsed.params {
            match (param.name.as_str(), param.value) {
                ("tokenId", Token::Uint(v)) => token_id = Some(TokenId::new(v)),
                ("holder", Token::Address(a)) => holder = Some(Identity::from(a)),
                ("issuer", Token::Address(a)) => issuer = Some(Identity::from(a)),
                ("contentRef", Token::String(s)) => content_ref = Some(s),
                ("timestamp", Token::Uint(v)) => timestamp = Some(v),
                _ => {}
            }
        }

        Some(IssuanceEvent {
            token_id: token_id?,
            holder: holder?,
            issuer: issuer?,
            content_ref: content_ref?,
            issued_at: timestamp.and_then(ledger_timestamp),
        })
    }

    fn issued_event_signature(&self) -> Result<H256, LedgerError> {
        let abi = load_abi(ABI)?;
        let event = abi
            .event(ISSUED_EVENT)
            .map_err(|e| LedgerError::Transport(format!("ABI missing {}: {}", ISSUED_EVENT, e)))?;
        Ok(event.signature())
    }
}

/// Converts a ledger block timestamp to UTC; out-of-range values yield
/// `None` rather than a fabricated date.
fn ledger_timestamp(seconds: U256) -> Option<DateTime<Utc>> {
    if seconds > U256::from(i64::MAX as u64) {
        return None;
    }
    Utc.timestamp_opt(seconds.as_u64() as i64, 0).single()
}

#[async_trait]
impl CredentialLedger for CredentialRegistry {
    async fn has_issuer_role(&self, identity: &Identity) -> Result<bool, LedgerError> {
        let role: H256 = self
            .client
            .query_contract(self.address, ABI, "ISSUER_ROLE", ())
            .await?;
        self.client
            .query_contract(self.address, ABI, "hasRole", (role, identity.address()))
            .await
    }

    async fn grant_issuer(&self, identity: &Identity) -> Result<H256, LedgerError> {
        self.client
            .send_transaction(self.address, ABI, "addInstitution", identity.address(), None)
            .await
    }

    async fn revoke_issuer(&self, identity: &Identity) -> Result<H256, LedgerError> {
        self.client
            .send_transaction(self.address, ABI, "removeInstitution", identity.address(), None)
            .await
    }

    async fn estimate_issue(
        &self,
        recipient: &Identity,
        content_ref: &str,
    ) -> Result<U256, LedgerError> {
        self.client
            .estimate_gas(
                self.address,
                ABI,
                "issueCredential",
                (recipient.address(), content_ref.to_string()),
            )
            .await
    }

    async fn submit_issue(
        &self,
        recipient: &Identity,
        content_ref: &str,
        gas_limit: U256,
    ) -> Result<H256, LedgerError> {
        self.client
            .send_transaction(
                self.address,
                ABI,
                "issueCredential",
                (recipient.address(), content_ref.to_string()),
                Some(gas_limit),
            )
            .await
    }

    async fn await_settlement(&self, tx_hash: H256) -> Result<Settlement, LedgerError> {
        let receipt = self.client.await_receipt(tx_hash).await?;

        // Scan only the settled transaction's own log.
        let event = receipt
            .logs
            .iter()
            .find_map(|log| self.parse_issued_event(log));

        Ok(Settlement { tx_hash, event })
    }

    async fn tokens_of_issuer(&self, identity: &Identity) -> Result<Vec<TokenId>, LedgerError> {
        let ids: Vec<U256> = self
            .client
            .query_contract(self.address, ABI, "getIssuerCredentials", identity.address())
            .await?;
        Ok(ids.into_iter().map(TokenId::new).collect())
    }

    async fn tokens_of_holder(&self, identity: &Identity) -> Result<Vec<TokenId>, LedgerError> {
        let ids: Vec<U256> = self
            .client
            .query_contract(self.address, ABI, "getHolderCredentials", identity.address())
            .await?;
        Ok(ids.into_iter().map(TokenId::new).collect())
    }

    async fn content_ref_of(&self, token: &TokenId) -> Result<String, LedgerError> {
        self.client
            .query_contract(self.address, ABI, "tokenURI", token.value())
            .await
    }

    async fn holder_of(&self, token: &TokenId) -> Result<Identity, LedgerError> {
        let addr: Address = self
            .client
            .query_contract(self.address, ABI, "holderOf", token.value())
            .await?;
        Ok(Identity::from(addr))
    }

    async fn issuance_event(&self, token: &TokenId) -> Result<Option<IssuanceEvent>, LedgerError> {
        let signature = self.issued_event_signature()?;
        let mut token_topic = [0u8; 32];
        token.value().to_big_endian(&mut token_topic);

        let filter = Filter::new()
            .address(self.address)
            .topic0(signature)
            .topic1(H256::from(token_topic))
            .from_block(BlockNumber::Earliest);

        let logs = self
            .client
            .provider()
            .get_logs(&filter)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(logs.iter().find_map(|log| self.parse_issued_event(log)))
    }

    async fn revoke_credential(&self, token: &TokenId) -> Result<H256, LedgerError> {
        self.client
            .send_transaction(self.address, ABI, "revokeCredential", token.value(), None)
            .await
    }

    async fn is_revoked(&self, token: &TokenId) -> Result<bool, LedgerError> {
        self.client
            .query_contract(self.address, ABI, "isRevoked", token.value())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_timestamp_converts_in_range_values() {
        let ts = ledger_timestamp(U256::from(1_700_000_000u64)).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn ledger_timestamp_refuses_out_of_range_values() {
        assert!(ledger_timestamp(U256::MAX).is_none());
    }

    #[test]
    fn abi_carries_the_issuance_event() {
        let abi = load_abi(ABI).unwrap();
        let event = abi.event(ISSUED_EVENT).unwrap();
        assert_eq!(event.inputs.len(), 5);
        assert!(event.inputs[0].indexed);
        assert!(event.inputs[1].indexed);
    }
}
