//! # ghost-wallet
//!
//! Session controller for a wallet that holds two identities derived from
//! one BIP-39 mnemonic: a shielded-pool identity managed by a privacy
//! engine, and a public EVM account.
//!
//! - [`kdf`]: password key derivation and the stored verifier
//! - [`mnemonic`] / [`keys`]: seed phrases and the public account address
//! - [`store`]: persisted key-value stores
//! - [`controller`]: engine startup, create/load/reset, balance refreshes
//! - [`shield`]: the approval-gated shield pipeline

pub mod config;
pub mod controller;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod mnemonic;
pub mod retry;
pub mod session;
pub mod shield;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::{NetworkConfig, WalletConfig};
pub use controller::WalletController;
pub use error::{ErrorInfo, ErrorKind, WalletError};
pub use keys::PublicIdentity;
pub use retry::RetryPolicy;
pub use session::{Session, SessionStatus, WalletIdentity};
pub use shield::{
    ApprovalTicket, ShieldPipeline, ShieldReceipt, ShieldRequest, ShieldStage,
};
pub use store::{FileStore, MemoryStore};
