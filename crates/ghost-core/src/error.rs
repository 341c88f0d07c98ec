//! Error types shared by the adapters.
use thiserror::Error;

/// Failure reported by the privacy engine or the chain account adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("transient failure: {0}")] Transient(String),
    #[error("timed out: {0}")] Timeout(String),
    #[error("rejected: {0}")] Rejected(String),
    #[error("not found: {0}")] NotFound(String),
    #[error("engine not started")] NotStarted,
    #[error("internal: {0}")] Internal(String),
}

impl AdapterError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

/// Failure of the persisted key-value store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("I/O error: {0}")] Io(String),
    #[error("corrupted store: {0}")] Corrupted(String),
    #[error("serialization: {0}")] Serialization(String),
}

/// Failure to parse a token amount.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")] Empty,
    #[error("invalid character {0:?} in amount")] InvalidCharacter(char),
    #[error("malformed amount: {0}")] Malformed(String),
    #[error("too many decimal places: at most {max}")] TooManyDecimals { max: u8 },
    #[error("amount must be greater than zero")] Zero,
}
