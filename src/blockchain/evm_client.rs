// src/blockchain/evm_client.rs
//! EVM ledger client.
//!
//! Provides the low-level interface to the ledger: a JSON-RPC provider
//! for reads, a signing middleware for state-mutating calls, and
//! generic query/send/estimate helpers that load a contract ABI and
//! invoke a method by name. Contract wrappers build on these helpers
//! rather than talking to the provider directly.

use crate::error::LedgerError;
use ethers::contract::{Contract, ContractError};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider, ProviderError};
use ethers::signers::{LocalWallet, Signer};
use ethers_core::abi::{Abi, Detokenize, Tokenize};
use ethers_core::types::{Address, TransactionReceipt, H256, U256, U64};
use std::sync::Arc;
use std::time::Duration;

/// Interval between settlement polls.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

type EvmMiddleware = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Ledger client holding the read provider and the signing middleware.
#[derive(Clone)]
pub struct EvmClient {
    /// Read-only JSON-RPC provider.
    provider: Arc<Provider<Http>>,
    /// Provider wrapped with the local signer for mutating calls.
    signer: Arc<EvmMiddleware>,
    /// Address derived from the signing key.
    address: Address,
    chain_id: u64,
}

impl EvmClient {
    /// Connects to the ledger and prepares the signing middleware.
    ///
    /// # Arguments
    /// * `rpc_url` - JSON-RPC endpoint URL
    /// * `private_key` - hex-encoded key, with or without `0x` prefix
    ///
    /// # Errors
    /// Fails when the RPC endpoint is unreachable, the chain id cannot
    /// be read, or the key is malformed.
    pub async fn new(rpc_url: &str, private_key: &str) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        let chain_id = provider.get_chainid().await?.as_u64();

        let wallet: LocalWallet = private_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()?
            .with_chain_id(chain_id);
        let address = wallet.address();

        let signer = Arc::new(SignerMiddleware::new(provider.clone(), wallet));

        Ok(EvmClient {
            provider: Arc::new(provider),
            signer,
            address,
            chain_id,
        })
    }

    /// Address of the signing identity.
    #[allow(dead_code)]
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Shared read provider, for log queries.
    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }

    /// Queries a contract view method (read-only).
    ///
    /// # Arguments
    /// * `contract_address` - target contract
    /// * `abi` - contract ABI bytes
    /// * `method` - method name
    /// * `params` - method parameters
    pub async fn query_contract<R: Detokenize>(
        &self,
        contract_address: Address,
        abi: &[u8],
        method: &str,
        params: impl Tokenize,
    ) -> Result<R, LedgerError> {
        let abi = load_abi(abi)?;
        let contract = Contract::new(contract_address, abi, self.provider.clone());

        contract
            .method::<_, R>(method, params)
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .call()
            .await
            .map_err(|e| classify_contract_error(&e))
    }

    /// Estimates the gas cost of a state-mutating method.
    pub async fn estimate_gas(
        &self,
        contract_address: Address,
        abi: &[u8],
        method: &str,
        params: impl Tokenize,
    ) -> Result<U256, LedgerError> {
        let abi = load_abi(abi)?;
        let contract = Contract::new(contract_address, abi, self.signer.clone());

        contract
            .method::<_, ()>(method, params)
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .estimate_gas()
            .await
            .map_err(|e| classify_contract_error(&e))
    }

    /// Sends a state-mutating transaction and returns its hash once the
    /// network has accepted it for inclusion. Settlement is a separate
    /// step ([`Self::await_receipt`]).
    ///
    /// # Arguments
    /// * `gas_limit` - explicit ceiling; `None` lets the node estimate
    pub async fn send_transaction(
        &self,
        contract_address: Address,
        abi: &[u8],
        method: &str,
        params: impl Tokenize,
        gas_limit: Option<U256>,
    ) -> Result<H256, LedgerError> {
        let abi = load_abi(abi)?;
        let contract = Contract::new(contract_address, abi, self.signer.clone());

        let mut call = contract
            .method::<_, ()>(method, params)
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        if let Some(limit) = gas_limit {
            call = call.gas(limit);
        }

        let pending = call
            .send()
            .await
            .map_err(|e| classify_contract_error(&e))?;
        Ok(*pending)
    }

    /// Polls until the transaction settles and returns its receipt.
    ///
    /// Blocks indefinitely under congestion; callers that need to stop
    /// waiting race this future against a cancel signal and drop it.
    /// A settled-but-reverted transaction is reported as a revert.
    pub async fn await_receipt(&self, tx_hash: H256) -> Result<TransactionReceipt, LedgerError> {
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| classify_provider_error(&e))?;

            if let Some(receipt) = receipt {
                if receipt.status == Some(U64::zero()) {
                    return Err(LedgerError::Revert(format!(
                        "transaction 0x{:x} reverted on settlement",
                        tx_hash
                    )));
                }
                return Ok(receipt);
            }

            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

/// Loads an ABI from its JSON bytes.
pub fn load_abi(bytes: &[u8]) -> Result<Abi, LedgerError> {
    Abi::load(bytes).map_err(|e| LedgerError::Transport(format!("invalid ABI: {}", e)))
}

fn classify_contract_error<M: Middleware>(err: &ContractError<M>) -> LedgerError {
    let msg = err.to_string();
    if matches!(err, ContractError::Revert(_)) || msg.to_lowercase().contains("revert") {
        LedgerError::Revert(msg)
    } else {
        LedgerError::Transport(msg)
    }
}

fn classify_provider_error(err: &ProviderError) -> LedgerError {
    let msg = err.to_string();
    if msg.to_lowercase().contains("revert") {
        LedgerError::Revert(msg)
    } else {
        LedgerError::Transport(msg)
    }
}
