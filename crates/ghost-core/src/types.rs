//! Core wallet types shared by the controller and the adapters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::amount::Amount;
use crate::constants::ENCRYPTION_KEY_LEN;

/// Opaque wallet handle issued by the privacy engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletId(String);

impl WalletId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a broadcast transaction (its hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxRef(String);

impl TxRef {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The network a call is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainRef {
    /// Engine-facing network name, e.g. `Ethereum_Sepolia`.
    pub name: String,
    /// EVM chain id.
    pub chain_id: u64,
}

/// A token held by an account: the chain's native currency or an ERC-20.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetRef {
    Native,
    Erc20(String),
}

impl AssetRef {
    /// Whether this is the chain's native currency.
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }

    /// Contract address for ERC-20 tokens.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Native => None,
            Self::Erc20(addr) => Some(addr),
        }
    }

    /// Case-insensitive match against a contract address.
    pub fn matches_address(&self, address: &str) -> bool {
        self.address()
            .is_some_and(|own| own.eq_ignore_ascii_case(address))
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Erc20(addr) => f.write_str(addr),
        }
    }
}

/// A configured ERC-20 token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
}

/// Balance of one token in one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub symbol: String,
    pub asset: AssetRef,
    pub decimals: u8,
    /// Base units.
    pub amount: Amount,
}

impl TokenBalance {
    /// Human-readable amount, e.g. `"1.25"`.
    pub fn display_amount(&self) -> String {
        self.amount.format_units(self.decimals)
    }
}

/// Token balances of one account, keyed by symbol.
///
/// When two different assets report the same symbol, the later one is keyed
/// by its contract address instead so neither is lost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMap {
    entries: BTreeMap<String, TokenBalance>,
}

impl BalanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a balance under its symbol, falling back to the asset address
    /// on a symbol collision. Returns the key used.
    pub fn insert(&mut self, balance: TokenBalance) -> String {
        let key = match self.entries.get(&balance.symbol) {
            Some(existing) if existing.asset != balance.asset => balance.asset.to_string(),
            _ => balance.symbol.clone(),
        };
        self.entries.insert(key.clone(), balance);
        key
    }

    pub fn get(&self, key: &str) -> Option<&TokenBalance> {
        self.entries.get(key)
    }

    /// Find the balance of a given asset regardless of its key.
    pub fn find_asset(&self, asset: &AssetRef) -> Option<&TokenBalance> {
        self.entries.values().find(|b| &b.asset == asset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TokenBalance)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

/// Symmetric key derived from the user's password. Never persisted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; ENCRYPTION_KEY_LEN],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; ENCRYPTION_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Raw key bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; ENCRYPTION_KEY_LEN] {
        &self.bytes
    }

    /// Hex form, as engines expect it.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for EncryptionKey {}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// BIP-39 mnemonic phrase backing both identities. Memory only.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SeedPhrase {
    phrase: String,
}

impl SeedPhrase {
    /// Wrap an already-validated phrase.
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.phrase
    }

    pub fn word_count(&self) -> usize {
        self.phrase.split_whitespace().count()
    }
}

impl PartialEq for SeedPhrase {
    fn eq(&self, other: &Self) -> bool {
        self.phrase == other.phrase
    }
}

impl Eq for SeedPhrase {}

impl fmt::Debug for SeedPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedPhrase")
            .field("words", &self.word_count())
            .field("phrase", &"[REDACTED]")
            .finish()
    }
}

/// Shielded-pool identity returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateIdentity {
    pub id: WalletId,
    /// Shielded address (`0zk...`).
    pub private_address: String,
}

/// One ERC-20 balance inside an engine balance update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20Amount {
    pub token_address: String,
    pub amount: Amount,
}

/// Private balance update pushed by the engine after a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEvent {
    pub wallet_id: WalletId,
    pub chain: ChainRef,
    pub erc20_amounts: Vec<Erc20Amount>,
}

/// The engine runs two independent merkle-tree scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanPhase {
    Utxo,
    Txid,
}

/// Lifecycle of one scan phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Started,
    Updated,
    Complete,
    Incomplete,
}

/// Scan progress pushed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub chain: ChainRef,
    pub status: ScanStatus,
    /// Fraction in `0.0..=1.0`.
    pub progress: f64,
}

/// Everything the engine may push asynchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Balance(BalanceEvent),
    Scan { phase: ScanPhase, progress: ScanProgress },
}

/// Fee fields for a transaction, one variant per pricing scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GasDetails {
    /// Single gas price (EVM gas types 0 and 1).
    Legacy {
        gas_type: u8,
        gas_limit: Amount,
        gas_price: Amount,
    },
    /// Priority-fee pricing (EVM gas type 2).
    PriorityFee {
        gas_limit: Amount,
        max_fee_per_gas: Amount,
        max_priority_fee_per_gas: Amount,
    },
}

impl GasDetails {
    pub fn gas_limit(&self) -> &Amount {
        match self {
            Self::Legacy { gas_limit, .. } | Self::PriorityFee { gas_limit, .. } => gas_limit,
        }
    }

    /// Same pricing with a different gas limit.
    pub fn with_gas_limit(self, limit: Amount) -> Self {
        match self {
            Self::Legacy {
                gas_type,
                gas_price,
                ..
            } => Self::Legacy {
                gas_type,
                gas_limit: limit,
                gas_price,
            },
            Self::PriorityFee {
                max_fee_per_gas,
                max_priority_fee_per_gas,
                ..
            } => Self::PriorityFee {
                gas_limit: limit,
                max_fee_per_gas,
                max_priority_fee_per_gas,
            },
        }
    }
}

/// Current fee market as reported by the chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeData {
    pub gas_price: Option<Amount>,
    pub max_fee_per_gas: Option<Amount>,
    pub max_priority_fee_per_gas: Option<Amount>,
}

/// What to move into the shielded pool and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldPlan {
    /// Shielded-pool contract receiving the funds.
    pub contract: String,
    /// Public account the funds leave.
    pub from_public_address: String,
    /// Shielded address the funds arrive at.
    pub recipient_private_address: String,
    pub asset: AssetRef,
    /// Base units.
    pub amount: Amount,
}

/// A transaction ready to be signed by the public identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub to: String,
    /// Hex calldata with `0x` prefix.
    pub data: String,
    /// Native value attached, in wei.
    pub value: Amount,
    pub gas: GasDetails,
}

/// Settings handed to the privacy engine at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wallet implementation name, visible in private transaction history.
    /// At most 16 lowercase characters.
    pub wallet_source: String,
    /// Engine database location.
    pub db_path: String,
    /// Forward engine debug logs.
    pub debug: bool,
    /// Use native proving artifacts instead of WASM.
    pub use_native_artifacts: bool,
    /// Skip merkle-tree syncs and private balance scans (shield-only apps).
    pub skip_merkletree_scans: bool,
    /// Proof-of-innocence aggregator nodes, in priority order.
    pub poi_node_urls: Vec<String>,
    /// Verbose logging for private balance and TXID scans.
    pub verbose_scan_logging: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wallet_source: "ghost wallet".to_string(),
            db_path: "engine.db".to_string(),
            debug: false,
            use_native_artifacts: false,
            skip_merkletree_scans: false,
            poi_node_urls: vec!["https://poi-node.terminal-wallet.com".to_string()],
            verbose_scan_logging: false,
        }
    }
}
