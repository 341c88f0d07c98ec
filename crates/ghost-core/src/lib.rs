//! # ghost-core
//! Foundation types and adapter traits for the Ghost wallet.

pub mod amount;
pub mod constants;
pub mod error;
#[cfg(feature = "testing")]
pub mod testing;
pub mod traits;
pub mod types;

pub use amount::Amount;
pub use error::{AdapterError, AmountError, StoreError};
