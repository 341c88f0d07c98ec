//! End-to-end scenario tests for the Ghost wallet controller.
//!
//! Every scenario drives a real [`ghost_wallet::WalletController`] against
//! the in-memory engine and chain fakes from `ghost-core`, end to end from
//! engine startup to a submitted shield transaction.

pub mod helpers;
