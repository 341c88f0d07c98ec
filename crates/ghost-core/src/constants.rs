//! Wallet constants. Token amounts are integers in the token's base units.

/// Store key holding the privacy engine's wallet handle.
///
/// Its presence is the only signal used to decide between "unlock an
/// existing wallet" and "create a new one".
pub const STORE_KEY_WALLET_ID: &str = "wallet_id";

/// Store key holding the hex-encoded password salt.
pub const STORE_KEY_SALT: &str = "salt";

/// Store key holding the hex-encoded password verifier.
pub const STORE_KEY_PASSWORD_VERIFIER: &str = "password_verifier";

/// Every key this wallet persists. A reset removes all of them at once.
pub const PERSISTED_KEYS: [&str; 3] = [
    STORE_KEY_WALLET_ID,
    STORE_KEY_SALT,
    STORE_KEY_PASSWORD_VERIFIER,
];

/// PBKDF2 rounds for the usable encryption key.
pub const DEFAULT_KEY_ITERATIONS: u32 = 100_000;

/// PBKDF2 rounds for the stored verifier. Kept well above
/// [`DEFAULT_KEY_ITERATIONS`] so brute-forcing the verifier costs more than
/// deriving the key.
pub const DEFAULT_VERIFIER_ITERATIONS: u32 = 1_000_000;

/// Default salt length in bytes.
pub const DEFAULT_SALT_LEN: usize = 16;

/// Smallest salt length accepted by the key derivation module.
pub const MIN_SALT_LEN: usize = 16;

/// Length of the derived symmetric encryption key.
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Entropy used for freshly generated mnemonics (12 words).
pub const MNEMONIC_ENTROPY_LEN: usize = 16;

/// BIP-44 path of the first Ethereum account.
pub const ETH_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// Decimals of the chain's native currency.
pub const NATIVE_DECIMALS: u8 = 18;

/// Symbol of the chain's native currency on the default network.
pub const NATIVE_SYMBOL: &str = "ETH";

/// Ethereum Sepolia chain id.
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Network name of the default preset.
pub const SEPOLIA_NETWORK_NAME: &str = "Ethereum_Sepolia";

/// Shielded-pool contract on Ethereum Sepolia.
pub const SEPOLIA_SHIELD_CONTRACT: &str = "0xeCFCf3b4eC647c4Ca6D49108b311b7a7C9543fea";

/// Block number passed to the engine as the wallet's creation height on
/// Sepolia, so scans start there instead of at genesis.
pub const SEPOLIA_CREATION_BLOCK: u64 = 11_155_111;

/// Maximum length of the wallet source name handed to the engine.
pub const MAX_WALLET_SOURCE_LEN: usize = 16;

/// EVM gas type 0: legacy single gas price.
pub const EVM_GAS_TYPE_LEGACY: u8 = 0;

/// EVM gas type 1: access-list transactions, still priced by a single gas price.
pub const EVM_GAS_TYPE_ACCESS_LIST: u8 = 1;

/// EVM gas type 2: priority-fee (EIP-1559) pricing.
pub const EVM_GAS_TYPE_PRIORITY_FEE: u8 = 2;
