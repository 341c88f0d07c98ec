//! Wallet error types.

use ghost_core::{AdapterError, Amount, AmountError, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Text shown for both "no stored wallet" and "wrong password", so the
/// message does not reveal whether a wallet exists.
const UNLOCK_FAILED_MESSAGE: &str = "unable to unlock wallet";

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The privacy engine has not been started.
    #[error("privacy engine not started")]
    EngineNotStarted,

    /// No wallet handle is persisted; the user has to create a wallet.
    #[error("no stored wallet")]
    NoStoredWallet,

    /// The password does not match the stored verifier.
    #[error("incorrect password")]
    IncorrectPassword,

    /// Salt or verifier is missing from the store.
    #[error("missing stored credentials")]
    MissingCredentials,

    /// Salt or verifier is present but cannot be decoded.
    #[error("corrupted stored credentials: {0}")]
    CorruptedCredentials(String),

    /// A balance refresh failed. The session stays usable.
    #[error("balance refresh failed: {0}")]
    BalanceRefresh(String),

    /// The shielded-pool contract may not spend enough of the token yet.
    #[error("approval required for {token}: allowance {allowance}, need {required}")]
    ApprovalRequired {
        /// Token contract address.
        token: String,
        /// Requested amount in base units.
        required: Amount,
        /// Current on-chain allowance in base units.
        allowance: Amount,
    },

    /// The network reports a fee scheme this wallet cannot price.
    #[error("unsupported gas model: {0}")]
    UnsupportedGasModel(String),

    /// Broadcasting a transaction failed.
    #[error("submission failed: {0}")]
    Submission(String),

    /// Another wallet operation is in flight.
    #[error("wallet busy: {0}")]
    Busy(String),

    /// A wallet is already active; reset first.
    #[error("a wallet is already active")]
    AlreadyActive,

    /// The operation needs an active wallet.
    #[error("no active wallet")]
    NoActiveWallet,

    /// Invalid BIP-39 mnemonic phrase.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Invalid token amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Operation not allowed in the current pipeline or session state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Key derivation failure.
    #[error("key derivation: {0}")]
    KeyDerivation(String),

    /// Privacy engine failure.
    #[error("privacy engine: {0}")]
    Engine(AdapterError),

    /// Chain account failure.
    #[error("chain: {0}")]
    Chain(AdapterError),

    /// Persisted store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An adapter call did not finish in time.
    #[error("timed out: {0}")]
    Timeout(String),
}

/// Coarse classification of a [`WalletError`], recorded in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Precondition,
    Authentication,
    Configuration,
    BalanceRefresh,
    ApprovalRequired,
    UnsupportedGasModel,
    Submission,
    Adapter,
    Input,
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EngineNotStarted
            | Self::NoStoredWallet
            | Self::Busy(_)
            | Self::AlreadyActive
            | Self::NoActiveWallet
            | Self::InvalidState(_) => ErrorKind::Precondition,
            Self::IncorrectPassword => ErrorKind::Authentication,
            Self::MissingCredentials
            | Self::CorruptedCredentials(_)
            | Self::InvalidConfig(_)
            | Self::KeyDerivation(_)
            | Self::Store(_) => ErrorKind::Configuration,
            Self::BalanceRefresh(_) => ErrorKind::BalanceRefresh,
            Self::ApprovalRequired { .. } => ErrorKind::ApprovalRequired,
            Self::UnsupportedGasModel(_) => ErrorKind::UnsupportedGasModel,
            Self::Submission(_) => ErrorKind::Submission,
            Self::Engine(_) | Self::Chain(_) | Self::Timeout(_) => ErrorKind::Adapter,
            Self::InvalidMnemonic(_) | Self::InvalidAmount(_) => ErrorKind::Input,
        }
    }

    /// Message safe to show to the user.
    ///
    /// Unlock failures share one text whether the wallet is missing or the
    /// password is wrong.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoStoredWallet | Self::IncorrectPassword => UNLOCK_FAILED_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Last error recorded in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&WalletError> for ErrorInfo {
    fn from(err: &WalletError) -> Self {
        Self {
            kind: err.kind(),
            message: err.user_message(),
        }
    }
}
