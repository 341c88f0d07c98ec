//! In-memory fakes of the external collaborators.
//!
//! Enabled with the `testing` feature. [`FakeEngine`] derives wallet ids
//! deterministically from the mnemonic and checks the encryption key on
//! load; [`FakeChain`] keeps balances, symbols and allowances in maps and
//! records every write. Both support failure injection.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::amount::Amount;
use crate::constants::NATIVE_DECIMALS;
use crate::error::AdapterError;
use crate::traits::{BalanceUpdateHandler, ChainAccount, PrivacyEngine, ScanProgressHandler};
use crate::types::{
    BalanceEvent, ChainRef, EncryptionKey, EngineConfig, Erc20Amount, FeeData, GasDetails,
    PrivateIdentity, ScanProgress, SeedPhrase, ShieldPlan, TxRef, UnsignedTransaction, WalletId,
};

const FAKE_ADDRESS_CONTEXT: &str = "ghost-fake-engine-private-address-v1";

struct StoredIdentity {
    key_hex: String,
    mnemonic: SeedPhrase,
    private_address: String,
}

#[derive(Default)]
struct EngineState {
    start_failures: VecDeque<AdapterError>,
    start_delay: Duration,
    identities: HashMap<WalletId, StoredIdentity>,
    create_failures: VecDeque<AdapterError>,
    refresh_calls: Vec<WalletId>,
    refresh_failures: VecDeque<AdapterError>,
    private_balances: HashMap<WalletId, Vec<Erc20Amount>>,
    gas_estimate: Amount,
    built: Vec<(ShieldPlan, GasDetails)>,
}

#[derive(Default)]
struct Handlers {
    balance: Option<BalanceUpdateHandler>,
    utxo: Option<ScanProgressHandler>,
    txid: Option<ScanProgressHandler>,
    registrations: [usize; 3],
}

/// In-memory privacy engine.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
    handlers: Mutex<Handlers>,
    start_calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        let engine = Self::default();
        engine.state.lock().gas_estimate = Amount::from(250_000u64);
        engine
    }

    /// Make `start` sleep before completing, to widen race windows.
    pub fn with_start_delay(self, delay: Duration) -> Self {
        self.state.lock().start_delay = delay;
        self
    }

    /// Fail the next `start` call with `err`.
    pub fn fail_next_start(&self, err: AdapterError) {
        self.state.lock().start_failures.push_back(err);
    }

    /// Fail the next `create_identity` call with `err`.
    pub fn fail_next_create(&self, err: AdapterError) {
        self.state.lock().create_failures.push_back(err);
    }

    /// Fail the next private refresh with `err`.
    pub fn fail_next_refresh(&self, err: AdapterError) {
        self.state.lock().refresh_failures.push_back(err);
    }

    /// Balances reported through the handler whenever `id` is refreshed.
    pub fn set_private_balances(&self, id: &WalletId, amounts: Vec<Erc20Amount>) {
        self.state.lock().private_balances.insert(id.clone(), amounts);
    }

    pub fn set_gas_estimate(&self, gas: Amount) {
        self.state.lock().gas_estimate = gas;
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> Vec<WalletId> {
        self.state.lock().refresh_calls.clone()
    }

    /// Shield transactions built so far with the fee fields used.
    pub fn built_transactions(&self) -> Vec<(ShieldPlan, GasDetails)> {
        self.state.lock().built.clone()
    }

    /// Registration counts for (balance, UTXO scan, TXID scan) handlers.
    pub fn handler_registrations(&self) -> [usize; 3] {
        self.handlers.lock().registrations
    }

    /// Wallet id this engine assigns to `mnemonic`.
    pub fn wallet_id_for(mnemonic: &SeedPhrase) -> WalletId {
        WalletId::new(blake3::hash(mnemonic.as_str().as_bytes()).to_hex().to_string())
    }

    /// Push a balance event through the registered handler.
    pub fn emit_balance(&self, event: BalanceEvent) {
        if let Some(handler) = self.handlers.lock().balance.as_ref() {
            handler(event);
        }
    }

    pub fn emit_utxo_progress(&self, progress: ScanProgress) {
        if let Some(handler) = self.handlers.lock().utxo.as_ref() {
            handler(progress);
        }
    }

    pub fn emit_txid_progress(&self, progress: ScanProgress) {
        if let Some(handler) = self.handlers.lock().txid.as_ref() {
            handler(progress);
        }
    }

    fn check_key(&self, key: &EncryptionKey, id: &WalletId) -> Result<(), AdapterError> {
        let state = self.state.lock();
        let stored = state
            .identities
            .get(id)
            .ok_or_else(|| AdapterError::NotFound(format!("wallet {id}")))?;
        if stored.key_hex != key.to_hex() {
            return Err(AdapterError::Rejected("invalid encryption key".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PrivacyEngine for FakeEngine {
    async fn start(&self, _config: &EngineConfig) -> Result<(), AdapterError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().start_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.state.lock().start_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn create_identity(
        &self,
        key: &EncryptionKey,
        mnemonic: &SeedPhrase,
        _creation_blocks: &HashMap<String, u64>,
    ) -> Result<PrivateIdentity, AdapterError> {
        if let Some(err) = self.state.lock().create_failures.pop_front() {
            return Err(err);
        }
        let id = Self::wallet_id_for(mnemonic);
        let derived = blake3::derive_key(FAKE_ADDRESS_CONTEXT, mnemonic.as_str().as_bytes());
        let private_address = format!("0zk{}", hex::encode(derived));
        self.state.lock().identities.insert(
            id.clone(),
            StoredIdentity {
                key_hex: key.to_hex(),
                mnemonic: mnemonic.clone(),
                private_address: private_address.clone(),
            },
        );
        Ok(PrivateIdentity {
            id,
            private_address,
        })
    }

    async fn load_identity(
        &self,
        key: &EncryptionKey,
        id: &WalletId,
    ) -> Result<PrivateIdentity, AdapterError> {
        self.check_key(key, id)?;
        let state = self.state.lock();
        let stored = &state.identities[id];
        Ok(PrivateIdentity {
            id: id.clone(),
            private_address: stored.private_address.clone(),
        })
    }

    async fn recover_seed(
        &self,
        key: &EncryptionKey,
        id: &WalletId,
    ) -> Result<SeedPhrase, AdapterError> {
        self.check_key(key, id)?;
        Ok(self.state.lock().identities[id].mnemonic.clone())
    }

    async fn refresh_private_balances(
        &self,
        chain: &ChainRef,
        id: &WalletId,
    ) -> Result<(), AdapterError> {
        let event = {
            let mut state = self.state.lock();
            state.refresh_calls.push(id.clone());
            if let Some(err) = state.refresh_failures.pop_front() {
                return Err(err);
            }
            state.private_balances.get(id).map(|amounts| BalanceEvent {
                wallet_id: id.clone(),
                chain: chain.clone(),
                erc20_amounts: amounts.clone(),
            })
        };
        if let Some(event) = event {
            self.emit_balance(event);
        }
        Ok(())
    }

    async fn estimate_shield_gas(
        &self,
        _chain: &ChainRef,
        _plan: &ShieldPlan,
        _gas: &GasDetails,
    ) -> Result<Amount, AdapterError> {
        Ok(self.state.lock().gas_estimate.clone())
    }

    async fn build_shield_transaction(
        &self,
        chain: &ChainRef,
        plan: &ShieldPlan,
        gas: &GasDetails,
    ) -> Result<UnsignedTransaction, AdapterError> {
        let digest = blake3::hash(
            format!("{}:{}:{}", plan.recipient_private_address, plan.asset, plan.amount).as_bytes(),
        );
        let value = if plan.asset.is_native() {
            plan.amount.clone()
        } else {
            Amount::zero()
        };
        self.state.lock().built.push((plan.clone(), gas.clone()));
        Ok(UnsignedTransaction {
            chain_id: chain.chain_id,
            to: plan.contract.clone(),
            data: format!("0x{}", digest.to_hex()),
            value,
            gas: gas.clone(),
        })
    }

    fn on_balance_update(&self, handler: BalanceUpdateHandler) {
        let mut handlers = self.handlers.lock();
        handlers.balance = Some(handler);
        handlers.registrations[0] += 1;
    }

    fn on_utxo_scan_progress(&self, handler: ScanProgressHandler) {
        let mut handlers = self.handlers.lock();
        handlers.utxo = Some(handler);
        handlers.registrations[1] += 1;
    }

    fn on_txid_scan_progress(&self, handler: ScanProgressHandler) {
        let mut handlers = self.handlers.lock();
        handlers.txid = Some(handler);
        handlers.registrations[2] += 1;
    }
}

/// An `approve` call recorded by [`FakeChain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalCall {
    pub token: String,
    pub spender: String,
    pub amount: Amount,
}

#[derive(Default)]
struct ChainState {
    token_balances: HashMap<(String, String), Amount>,
    native_balances: HashMap<String, Amount>,
    symbols: HashMap<String, String>,
    allowances: HashMap<(String, String), Amount>,
    fee_data: FeeData,
    read_failures: u32,
    read_calls: usize,
    approve_failure: Option<AdapterError>,
    send_failure: Option<AdapterError>,
    approvals: Vec<ApprovalCall>,
    sent: Vec<UnsignedTransaction>,
}

impl ChainState {
    fn read(&mut self) -> Result<(), AdapterError> {
        self.read_calls += 1;
        if self.read_failures > 0 {
            self.read_failures -= 1;
            return Err(AdapterError::Transient("rpc unavailable".into()));
        }
        Ok(())
    }

    fn next_tx_ref(&self) -> TxRef {
        let n = (self.approvals.len() + self.sent.len()) as u64;
        TxRef::new(format!("0x{}", blake3::hash(&n.to_le_bytes()).to_hex()))
    }
}

/// In-memory public chain.
///
/// Allowances are tracked per (token, spender); the fake does not derive
/// owner addresses from signers.
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<ChainState>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fee_data(self, fee_data: FeeData) -> Self {
        self.state.lock().fee_data = fee_data;
        self
    }

    pub fn set_fee_data(&self, fee_data: FeeData) {
        self.state.lock().fee_data = fee_data;
    }

    pub fn set_token_balance(&self, token: &str, owner: &str, amount: Amount) {
        self.state
            .lock()
            .token_balances
            .insert((token.to_lowercase(), owner.to_lowercase()), amount);
    }

    pub fn set_native_balance(&self, owner: &str, amount: Amount) {
        self.state
            .lock()
            .native_balances
            .insert(owner.to_lowercase(), amount);
    }

    pub fn set_symbol(&self, token: &str, symbol: &str) {
        self.state
            .lock()
            .symbols
            .insert(token.to_lowercase(), symbol.to_string());
    }

    pub fn set_allowance(&self, token: &str, spender: &str, amount: Amount) {
        self.state
            .lock()
            .allowances
            .insert((token.to_lowercase(), spender.to_lowercase()), amount);
    }

    /// Fail the next `n` read calls with a transient error.
    pub fn fail_reads(&self, n: u32) {
        self.state.lock().read_failures = n;
    }

    pub fn fail_next_approve(&self, err: AdapterError) {
        self.state.lock().approve_failure = Some(err);
    }

    pub fn fail_next_send(&self, err: AdapterError) {
        self.state.lock().send_failure = Some(err);
    }

    pub fn read_calls(&self) -> usize {
        self.state.lock().read_calls
    }

    pub fn approvals(&self) -> Vec<ApprovalCall> {
        self.state.lock().approvals.clone()
    }

    pub fn sent_transactions(&self) -> Vec<UnsignedTransaction> {
        self.state.lock().sent.clone()
    }
}

#[async_trait]
impl ChainAccount for FakeChain {
    async fn token_balance(
        &self,
        token: &str,
        owner: &str,
        decimals: u8,
    ) -> Result<String, AdapterError> {
        let mut state = self.state.lock();
        state.read()?;
        let amount = state
            .token_balances
            .get(&(token.to_lowercase(), owner.to_lowercase()))
            .cloned()
            .unwrap_or_default();
        Ok(amount.format_units(decimals))
    }

    async fn native_balance(&self, owner: &str) -> Result<String, AdapterError> {
        let mut state = self.state.lock();
        state.read()?;
        let amount = state
            .native_balances
            .get(&owner.to_lowercase())
            .cloned()
            .unwrap_or_default();
        Ok(amount.format_units(NATIVE_DECIMALS))
    }

    async fn token_symbol(&self, token: &str) -> Result<String, AdapterError> {
        let mut state = self.state.lock();
        state.read()?;
        state
            .symbols
            .get(&token.to_lowercase())
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(format!("symbol of {token}")))
    }

    async fn allowance(
        &self,
        token: &str,
        _owner: &str,
        spender: &str,
    ) -> Result<Amount, AdapterError> {
        let mut state = self.state.lock();
        state.read()?;
        Ok(state
            .allowances
            .get(&(token.to_lowercase(), spender.to_lowercase()))
            .cloned()
            .unwrap_or_default())
    }

    async fn approve(
        &self,
        _signer: &SeedPhrase,
        token: &str,
        spender: &str,
        amount: &Amount,
    ) -> Result<TxRef, AdapterError> {
        let mut state = self.state.lock();
        if let Some(err) = state.approve_failure.take() {
            return Err(err);
        }
        let tx_ref = state.next_tx_ref();
        state
            .allowances
            .insert((token.to_lowercase(), spender.to_lowercase()), amount.clone());
        state.approvals.push(ApprovalCall {
            token: token.to_string(),
            spender: spender.to_string(),
            amount: amount.clone(),
        });
        Ok(tx_ref)
    }

    async fn fee_data(&self) -> Result<FeeData, AdapterError> {
        let mut state = self.state.lock();
        state.read()?;
        Ok(state.fee_data.clone())
    }

    async fn send_transaction(
        &self,
        _signer: &SeedPhrase,
        tx: &UnsignedTransaction,
    ) -> Result<TxRef, AdapterError> {
        let mut state = self.state.lock();
        if let Some(err) = state.send_failure.take() {
            return Err(err);
        }
        let tx_ref = state.next_tx_ref();
        state.sent.push(tx.clone());
        Ok(tx_ref)
    }
}
