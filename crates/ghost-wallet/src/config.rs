//! Wallet configuration.
//!
//! [`WalletConfig::default`] is the Ethereum Sepolia preset. Deployments
//! overlay it with `GHOST_*` environment variables through
//! [`WalletConfig::from_env`], which validates the result.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ghost_core::constants::{
    EVM_GAS_TYPE_PRIORITY_FEE, MAX_WALLET_SOURCE_LEN, NATIVE_DECIMALS, NATIVE_SYMBOL,
    SEPOLIA_CHAIN_ID, SEPOLIA_CREATION_BLOCK, SEPOLIA_NETWORK_NAME, SEPOLIA_SHIELD_CONTRACT,
};
use ghost_core::types::{ChainRef, EngineConfig, TokenInfo};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::kdf::KdfParams;
use crate::keys::is_valid_address;
use crate::retry::RetryPolicy;

/// Default lifetime of an approval ticket.
const DEFAULT_APPROVAL_TTL: Duration = Duration::from_secs(15 * 60);

/// Wrapped ether on Sepolia.
const SEPOLIA_WETH: &str = "0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14";

/// The chain the wallet operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Engine-facing network name.
    pub name: String,
    pub chain_id: u64,
    /// Shielded-pool contract; also the spender of token approvals.
    pub shield_contract: String,
    /// First block a new wallet needs to scan from.
    pub creation_block: u64,
    /// EVM transaction type used to price shield transactions.
    pub evm_gas_type: u8,
    pub native_symbol: String,
    pub native_decimals: u8,
    /// ERC-20 tokens shown in the public balance map.
    pub tokens: Vec<TokenInfo>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: SEPOLIA_NETWORK_NAME.to_string(),
            chain_id: SEPOLIA_CHAIN_ID,
            shield_contract: SEPOLIA_SHIELD_CONTRACT.to_string(),
            creation_block: SEPOLIA_CREATION_BLOCK,
            evm_gas_type: EVM_GAS_TYPE_PRIORITY_FEE,
            native_symbol: NATIVE_SYMBOL.to_string(),
            native_decimals: NATIVE_DECIMALS,
            tokens: vec![TokenInfo {
                symbol: "WETH".to_string(),
                address: SEPOLIA_WETH.to_string(),
                decimals: 18,
            }],
        }
    }
}

impl NetworkConfig {
    pub fn chain_ref(&self) -> ChainRef {
        ChainRef {
            name: self.name.clone(),
            chain_id: self.chain_id,
        }
    }

    /// Creation block per network name, as the engine expects it.
    pub fn creation_blocks(&self) -> HashMap<String, u64> {
        HashMap::from([(self.name.clone(), self.creation_block)])
    }

    /// Configured token with this contract address (case-insensitive).
    pub fn token(&self, address: &str) -> Option<&TokenInfo> {
        self.tokens
            .iter()
            .find(|t| t.address.eq_ignore_ascii_case(address))
    }
}

/// Everything the controller needs besides its adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    pub network: NetworkConfig,
    pub kdf: KdfParams,
    pub retry: RetryPolicy,
    pub engine: EngineConfig,
    /// Root directory for the persisted store and the engine database.
    pub data_dir: PathBuf,
    /// How long an approval ticket stays valid.
    pub approval_ttl: Duration,
}

impl Default for WalletConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ghost");
        let engine = EngineConfig {
            db_path: data_dir.join("engine.db").to_string_lossy().into_owned(),
            ..EngineConfig::default()
        };
        Self {
            network: NetworkConfig::default(),
            kdf: KdfParams::default(),
            retry: RetryPolicy::default(),
            engine,
            data_dir,
            approval_ttl: DEFAULT_APPROVAL_TTL,
        }
    }
}

impl WalletConfig {
    /// Defaults overlaid with `GHOST_*` environment variables.
    pub fn from_env() -> Result<Self, WalletError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, then validated.
    ///
    /// | variable | field |
    /// |----------|-------|
    /// | `GHOST_DATA_DIR` | `data_dir` (also moves the engine db) |
    /// | `GHOST_NETWORK_NAME` | `network.name` |
    /// | `GHOST_CHAIN_ID` | `network.chain_id` |
    /// | `GHOST_SHIELD_CONTRACT` | `network.shield_contract` |
    /// | `GHOST_CREATION_BLOCK` | `network.creation_block` |
    /// | `GHOST_EVM_GAS_TYPE` | `network.evm_gas_type` |
    /// | `GHOST_TOKENS` | `network.tokens`, as `SYMBOL:0xaddr:decimals,...` |
    /// | `GHOST_KDF_KEY_ITERATIONS` | `kdf.key_iterations` |
    /// | `GHOST_KDF_VERIFIER_ITERATIONS` | `kdf.verifier_iterations` |
    /// | `GHOST_RETRY_MAX_ATTEMPTS` | `retry.max_attempts` |
    /// | `GHOST_CALL_TIMEOUT_MS` | `retry.call_timeout` |
    /// | `GHOST_APPROVAL_TTL_SECS` | `approval_ttl` |
    /// | `GHOST_WALLET_SOURCE` | `engine.wallet_source` |
    /// | `GHOST_POI_NODES` | `engine.poi_node_urls`, comma-separated |
    /// | `GHOST_ENGINE_DEBUG` | `engine.debug` |
    /// | `GHOST_SKIP_MERKLETREE_SCANS` | `engine.skip_merkletree_scans` |
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WalletError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(dir) = lookup("GHOST_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
            cfg.engine.db_path = cfg.data_dir.join("engine.db").to_string_lossy().into_owned();
        }
        if let Some(name) = lookup("GHOST_NETWORK_NAME") {
            cfg.network.name = name;
        }
        if let Some(v) = parse_var(&lookup, "GHOST_CHAIN_ID")? {
            cfg.network.chain_id = v;
        }
        if let Some(addr) = lookup("GHOST_SHIELD_CONTRACT") {
            cfg.network.shield_contract = addr;
        }
        if let Some(v) = parse_var(&lookup, "GHOST_CREATION_BLOCK")? {
            cfg.network.creation_block = v;
        }
        if let Some(v) = parse_var(&lookup, "GHOST_EVM_GAS_TYPE")? {
            cfg.network.evm_gas_type = v;
        }
        if let Some(list) = lookup("GHOST_TOKENS") {
            cfg.network.tokens = parse_token_list(&list)?;
        }
        if let Some(v) = parse_var(&lookup, "GHOST_KDF_KEY_ITERATIONS")? {
            cfg.kdf.key_iterations = v;
        }
        if let Some(v) = parse_var(&lookup, "GHOST_KDF_VERIFIER_ITERATIONS")? {
            cfg.kdf.verifier_iterations = v;
        }
        if let Some(v) = parse_var(&lookup, "GHOST_RETRY_MAX_ATTEMPTS")? {
            cfg.retry.max_attempts = v;
        }
        if let Some(ms) = parse_var(&lookup, "GHOST_CALL_TIMEOUT_MS")? {
            cfg.retry.call_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var(&lookup, "GHOST_APPROVAL_TTL_SECS")? {
            cfg.approval_ttl = Duration::from_secs(secs);
        }
        if let Some(source) = lookup("GHOST_WALLET_SOURCE") {
            cfg.engine.wallet_source = source;
        }
        if let Some(nodes) = lookup("GHOST_POI_NODES") {
            cfg.engine.poi_node_urls = nodes
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = parse_var(&lookup, "GHOST_ENGINE_DEBUG")? {
            cfg.engine.debug = v;
        }
        if let Some(v) = parse_var(&lookup, "GHOST_SKIP_MERKLETREE_SCANS")? {
            cfg.engine.skip_merkletree_scans = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), WalletError> {
        self.kdf.validate()?;

        let source = &self.engine.wallet_source;
        if source.is_empty() || source.chars().count() > MAX_WALLET_SOURCE_LEN {
            return Err(WalletError::InvalidConfig(format!(
                "wallet_source must be 1 to {MAX_WALLET_SOURCE_LEN} characters"
            )));
        }
        if source.chars().any(|c| c.is_uppercase()) {
            return Err(WalletError::InvalidConfig(
                "wallet_source must be lowercase".into(),
            ));
        }
        if !is_valid_address(&self.network.shield_contract) {
            return Err(WalletError::InvalidConfig(format!(
                "invalid shield contract address {}",
                self.network.shield_contract
            )));
        }
        for token in &self.network.tokens {
            if !is_valid_address(&token.address) {
                return Err(WalletError::InvalidConfig(format!(
                    "invalid address for token {}: {}",
                    token.symbol, token.address
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(WalletError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.call_timeout.is_zero() {
            return Err(WalletError::InvalidConfig(
                "retry.call_timeout must be positive".into(),
            ));
        }
        if self.approval_ttl.is_zero() {
            return Err(WalletError::InvalidConfig(
                "approval_ttl must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Location of the persisted wallet store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("wallet.json")
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, WalletError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| WalletError::InvalidConfig(format!("{key}: {e}")))
        })
        .transpose()
}

/// Parse `SYMBOL:0xaddr:decimals` entries separated by commas.
fn parse_token_list(list: &str) -> Result<Vec<TokenInfo>, WalletError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').collect();
            let [symbol, address, decimals] = parts.as_slice() else {
                return Err(WalletError::InvalidConfig(format!(
                    "GHOST_TOKENS entry {entry:?} is not SYMBOL:ADDRESS:DECIMALS"
                )));
            };
            let decimals = decimals
                .parse()
                .map_err(|e| WalletError::InvalidConfig(format!("GHOST_TOKENS {symbol}: {e}")))?;
            Ok(TokenInfo {
                symbol: (*symbol).to_string(),
                address: (*address).to_string(),
                decimals,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_is_sepolia() {
        let cfg = WalletConfig::default();
        assert_eq!(cfg.network.chain_id, 11_155_111);
        assert_eq!(cfg.network.name, "Ethereum_Sepolia");
        assert_eq!(
            cfg.network.shield_contract,
            "0xeCFCf3b4eC647c4Ca6D49108b311b7a7C9543fea"
        );
        assert_eq!(cfg.network.evm_gas_type, 2);
        assert_eq!(cfg.network.native_symbol, "ETH");
        assert_eq!(cfg.network.native_decimals, 18);
    }

    #[test]
    fn default_validates() {
        assert!(WalletConfig::default().validate().is_ok());
    }

    #[test]
    fn default_data_dir_ends_with_ghost() {
        let cfg = WalletConfig::default();
        assert!(cfg.data_dir.ends_with("ghost"), "{:?}", cfg.data_dir);
        assert!(cfg.store_path().ends_with("ghost/wallet.json"));
    }

    #[test]
    fn empty_lookup_is_default() {
        let cfg = WalletConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg, WalletConfig::default());
    }

    #[test]
    fn lookup_overrides_fields() {
        let cfg = WalletConfig::from_lookup(lookup_from(&[
            ("GHOST_DATA_DIR", "/tmp/ghost-test"),
            ("GHOST_CHAIN_ID", "1"),
            ("GHOST_EVM_GAS_TYPE", "0"),
            ("GHOST_CALL_TIMEOUT_MS", "1500"),
            ("GHOST_APPROVAL_TTL_SECS", "60"),
            ("GHOST_POI_NODES", "https://a.example, https://b.example"),
            ("GHOST_ENGINE_DEBUG", "true"),
        ]))
        .unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/ghost-test"));
        assert_eq!(cfg.engine.db_path, "/tmp/ghost-test/engine.db");
        assert_eq!(cfg.network.chain_id, 1);
        assert_eq!(cfg.network.evm_gas_type, 0);
        assert_eq!(cfg.retry.call_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.approval_ttl, Duration::from_secs(60));
        assert_eq!(
            cfg.engine.poi_node_urls,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(cfg.engine.debug);
    }

    #[test]
    fn token_list_parses() {
        let cfg = WalletConfig::from_lookup(lookup_from(&[(
            "GHOST_TOKENS",
            "USDC:0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed:6, DAI:0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359:18",
        )]))
        .unwrap();
        assert_eq!(cfg.network.tokens.len(), 2);
        assert_eq!(cfg.network.tokens[0].symbol, "USDC");
        assert_eq!(cfg.network.tokens[0].decimals, 6);
        assert!(cfg
            .network
            .token("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed")
            .is_some());
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = WalletConfig::from_lookup(lookup_from(&[("GHOST_CHAIN_ID", "sepolia")]))
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidConfig(ref m) if m.contains("GHOST_CHAIN_ID")));
    }

    #[test]
    fn malformed_token_entry_is_rejected() {
        let err =
            WalletConfig::from_lookup(lookup_from(&[("GHOST_TOKENS", "USDC:0xabc")])).unwrap_err();
        assert!(matches!(err, WalletError::InvalidConfig(_)));
    }

    #[test]
    fn equal_kdf_iterations_are_rejected() {
        let err = WalletConfig::from_lookup(lookup_from(&[
            ("GHOST_KDF_KEY_ITERATIONS", "1000"),
            ("GHOST_KDF_VERIFIER_ITERATIONS", "1000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, WalletError::InvalidConfig(_)));
    }

    #[test]
    fn wallet_source_constraints() {
        let mut cfg = WalletConfig::default();
        cfg.engine.wallet_source = "Ghost".into();
        assert!(cfg.validate().is_err());
        cfg.engine.wallet_source = "a wallet name that is too long".into();
        assert!(cfg.validate().is_err());
        cfg.engine.wallet_source = "ghost".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bad_shield_contract_is_rejected() {
        let err = WalletConfig::from_lookup(lookup_from(&[("GHOST_SHIELD_CONTRACT", "0x1234")]))
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidConfig(_)));
    }

    #[test]
    fn creation_blocks_keyed_by_network_name() {
        let net = NetworkConfig::default();
        let blocks = net.creation_blocks();
        assert_eq!(blocks.get("Ethereum_Sepolia"), Some(&net.creation_block));
    }

    #[test]
    fn config_serializes_to_json() {
        let cfg = WalletConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: WalletConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
