//! Trait interfaces for the wallet's external collaborators.
//!
//! - [`PrivacyEngine`]: shielded-pool engine (proofs, scans, shield txs)
//! - [`ChainAccount`]: public-chain account reads and writes
//! - [`KeyValueStore`]: persisted local state (`wallet_id`, `salt`, `password_verifier`)
//!
//! The controller only ever talks to these traits; concrete engines and RPC
//! clients live outside this workspace.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::amount::Amount;
use crate::error::{AdapterError, StoreError};
use crate::types::{
    BalanceEvent, ChainRef, EncryptionKey, EngineConfig, FeeData, GasDetails, PrivateIdentity,
    ScanProgress, SeedPhrase, ShieldPlan, TxRef, UnsignedTransaction, WalletId,
};

/// Handler invoked by the engine whenever a private balance scan produces
/// new balances. Runs outside the controller's call stack.
pub type BalanceUpdateHandler = Box<dyn Fn(BalanceEvent) + Send + Sync>;

/// Handler invoked by the engine during a merkle-tree scan.
pub type ScanProgressHandler = Box<dyn Fn(ScanProgress) + Send + Sync>;

/// Opaque shielded-pool engine.
///
/// Engines are process-wide singletons: `start` is called once, and each
/// `on_*` registration replaces any previous handler of that type.
#[async_trait]
pub trait PrivacyEngine: Send + Sync {
    /// Boot the engine (database, artifacts, POI nodes).
    async fn start(&self, config: &EngineConfig) -> Result<(), AdapterError>;

    /// Create a shielded wallet bound to `key` from `mnemonic`.
    ///
    /// `creation_blocks` maps network names to the block the wallet was
    /// created at, so scans can skip older history.
    async fn create_identity(
        &self,
        key: &EncryptionKey,
        mnemonic: &SeedPhrase,
        creation_blocks: &HashMap<String, u64>,
    ) -> Result<PrivateIdentity, AdapterError>;

    /// Load a previously created wallet.
    async fn load_identity(
        &self,
        key: &EncryptionKey,
        id: &WalletId,
    ) -> Result<PrivateIdentity, AdapterError>;

    /// Decrypt the mnemonic stored with a wallet.
    async fn recover_seed(
        &self,
        key: &EncryptionKey,
        id: &WalletId,
    ) -> Result<SeedPhrase, AdapterError>;

    /// Start a private balance scan. Results arrive through the balance
    /// update handler, not the return value.
    async fn refresh_private_balances(
        &self,
        chain: &ChainRef,
        id: &WalletId,
    ) -> Result<(), AdapterError>;

    /// Estimate the gas limit of a shield transaction.
    async fn estimate_shield_gas(
        &self,
        chain: &ChainRef,
        plan: &ShieldPlan,
        gas: &GasDetails,
    ) -> Result<Amount, AdapterError>;

    /// Build the unsigned shield transaction with the given fee fields.
    async fn build_shield_transaction(
        &self,
        chain: &ChainRef,
        plan: &ShieldPlan,
        gas: &GasDetails,
    ) -> Result<UnsignedTransaction, AdapterError>;

    fn on_balance_update(&self, handler: BalanceUpdateHandler);

    fn on_utxo_scan_progress(&self, handler: ScanProgressHandler);

    fn on_txid_scan_progress(&self, handler: ScanProgressHandler);
}

/// Public-chain account access.
///
/// Balance reads return human decimal strings, as RPC helpers usually do.
#[async_trait]
pub trait ChainAccount: Send + Sync {
    async fn token_balance(
        &self,
        token: &str,
        owner: &str,
        decimals: u8,
    ) -> Result<String, AdapterError>;

    async fn native_balance(&self, owner: &str) -> Result<String, AdapterError>;

    async fn token_symbol(&self, token: &str) -> Result<String, AdapterError>;

    async fn allowance(
        &self,
        token: &str,
        owner: &str,
        spender: &str,
    ) -> Result<Amount, AdapterError>;

    /// Sign and broadcast an ERC-20 `approve`.
    async fn approve(
        &self,
        signer: &SeedPhrase,
        token: &str,
        spender: &str,
        amount: &Amount,
    ) -> Result<TxRef, AdapterError>;

    async fn fee_data(&self) -> Result<FeeData, AdapterError>;

    /// Sign with the account derived from `signer` and broadcast.
    async fn send_transaction(
        &self,
        signer: &SeedPhrase,
        tx: &UnsignedTransaction,
    ) -> Result<TxRef, AdapterError>;
}

/// String-valued persisted store.
///
/// Multi-key writes and removals must be atomic: either every entry changes
/// or none does.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError>;

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.remove_many(&[key])
    }

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}
