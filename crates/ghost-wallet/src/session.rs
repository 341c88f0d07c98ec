//! Wallet session state.
//!
//! A [`Session`] is only mutated through [`Session::apply`], so every
//! multi-field transition (status plus identity plus balance maps) happens
//! in one step under the controller's lock.

use ghost_core::types::{BalanceMap, ScanPhase, ScanProgress, SeedPhrase, WalletId};
use serde::Serialize;

use crate::error::{ErrorInfo, WalletError};

/// Lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionStatus {
    Uninitialized,
    EngineStarting,
    Ready,
    Loading,
    Creating,
    Active,
    Error,
}

impl SessionStatus {
    /// A create or load is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Loading | Self::Creating)
    }
}

/// The active wallet: one seed, two addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletIdentity {
    /// Engine handle of the shielded wallet.
    pub private_id: WalletId,
    /// Shielded address.
    pub private_address: String,
    /// EIP-55 public account address.
    pub public_address: String,
    /// Mnemonic backing both identities. Memory only.
    pub seed: SeedPhrase,
}

/// Latest progress of the two engine scans.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanState {
    pub utxo: Option<ScanProgress>,
    pub txid: Option<ScanProgress>,
}

/// A single state transition.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    EngineStarting,
    EngineReady,
    /// A create or load started.
    Begin(SessionStatus),
    /// Return to an earlier status after a recoverable failure.
    Restore(SessionStatus, ErrorInfo),
    /// Unrecoverable failure of the current operation.
    Failed(ErrorInfo),
    /// Identity established. Both balance maps start empty.
    Activated(WalletIdentity),
    PrivateBalances {
        wallet_id: WalletId,
        balances: BalanceMap,
    },
    PublicBalances {
        wallet_id: WalletId,
        balances: BalanceMap,
    },
    Scan {
        phase: ScanPhase,
        progress: ScanProgress,
    },
    /// Note an error without changing status.
    RecordError(ErrorInfo),
    /// Drop identity and balances; bump the epoch.
    Reset,
}

/// Process-wide wallet session.
#[derive(Debug, Clone)]
pub struct Session {
    pub status: SessionStatus,
    pub identity: Option<WalletIdentity>,
    pub private_balances: BalanceMap,
    pub public_balances: BalanceMap,
    pub last_error: Option<ErrorInfo>,
    pub scan: ScanState,
    /// Incremented on every reset.
    pub epoch: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            status: SessionStatus::Uninitialized,
            identity: None,
            private_balances: BalanceMap::new(),
            public_balances: BalanceMap::new(),
            last_error: None,
            scan: ScanState::default(),
            epoch: 0,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the active wallet, if any.
    pub fn active_wallet_id(&self) -> Option<&WalletId> {
        match self.status {
            SessionStatus::Active => self.identity.as_ref().map(|i| &i.private_id),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active_wallet_id().is_some()
    }

    /// The active identity, or `NoActiveWallet`.
    pub fn require_active(&self) -> Result<&WalletIdentity, WalletError> {
        match (self.status, self.identity.as_ref()) {
            (SessionStatus::Active, Some(identity)) => Ok(identity),
            _ => Err(WalletError::NoActiveWallet),
        }
    }

    /// Apply one transition. Returns `false` when the update was discarded
    /// (balances for a wallet that is no longer active).
    pub fn apply(&mut self, update: SessionUpdate) -> bool {
        match update {
            SessionUpdate::EngineStarting => {
                self.status = SessionStatus::EngineStarting;
            }
            SessionUpdate::EngineReady => {
                self.status = SessionStatus::Ready;
                self.last_error = None;
            }
            SessionUpdate::Begin(status) => {
                self.status = status;
                self.last_error = None;
            }
            SessionUpdate::Restore(status, error) => {
                self.status = status;
                self.last_error = Some(error);
            }
            SessionUpdate::Failed(error) => {
                self.status = SessionStatus::Error;
                self.last_error = Some(error);
            }
            SessionUpdate::Activated(identity) => {
                self.status = SessionStatus::Active;
                self.identity = Some(identity);
                self.private_balances = BalanceMap::new();
                self.public_balances = BalanceMap::new();
                self.scan = ScanState::default();
                self.last_error = None;
            }
            SessionUpdate::PrivateBalances {
                wallet_id,
                balances,
            } => {
                if self.active_wallet_id() != Some(&wallet_id) {
                    return false;
                }
                self.private_balances = balances;
            }
            SessionUpdate::PublicBalances {
                wallet_id,
                balances,
            } => {
                if self.active_wallet_id() != Some(&wallet_id) {
                    return false;
                }
                self.public_balances = balances;
            }
            SessionUpdate::Scan { phase, progress } => match phase {
                ScanPhase::Utxo => self.scan.utxo = Some(progress),
                ScanPhase::Txid => self.scan.txid = Some(progress),
            },
            SessionUpdate::RecordError(error) => {
                self.last_error = Some(error);
            }
            SessionUpdate::Reset => {
                self.status = SessionStatus::Uninitialized;
                self.identity = None;
                self.private_balances = BalanceMap::new();
                self.public_balances = BalanceMap::new();
                self.scan = ScanState::default();
                self.last_error = None;
                self.epoch += 1;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ghost_core::Amount;
    use ghost_core::types::{AssetRef, ChainRef, ScanStatus, TokenBalance};

    fn identity(id: &str) -> WalletIdentity {
        WalletIdentity {
            private_id: WalletId::new(id),
            private_address: format!("0zk{id}"),
            public_address: "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".into(),
            seed: SeedPhrase::new("test test test test test test test test test test test junk"),
        }
    }

    fn balances(amount: u64) -> BalanceMap {
        let mut map = BalanceMap::new();
        map.insert(TokenBalance {
            symbol: "WETH".into(),
            asset: AssetRef::Erc20("0xaa".into()),
            decimals: 18,
            amount: Amount::from(amount),
        });
        map
    }

    fn info() -> ErrorInfo {
        ErrorInfo::from(&WalletError::IncorrectPassword)
    }

    #[test]
    fn new_session_is_uninitialized() {
        let s = Session::new();
        assert_eq!(s.status, SessionStatus::Uninitialized);
        assert!(s.identity.is_none());
        assert!(!s.is_active());
        assert_eq!(s.epoch, 0);
    }

    #[test]
    fn activation_clears_balances() {
        let mut s = Session::new();
        s.apply(SessionUpdate::Activated(identity("a")));
        s.apply(SessionUpdate::PublicBalances {
            wallet_id: WalletId::new("a"),
            balances: balances(1),
        });
        assert_eq!(s.public_balances.len(), 1);

        s.apply(SessionUpdate::Activated(identity("b")));
        assert!(s.public_balances.is_empty());
        assert!(s.private_balances.is_empty());
        assert_eq!(s.active_wallet_id(), Some(&WalletId::new("b")));
    }

    #[test]
    fn stale_private_balances_are_discarded() {
        let mut s = Session::new();
        s.apply(SessionUpdate::Activated(identity("current")));
        let applied = s.apply(SessionUpdate::PrivateBalances {
            wallet_id: WalletId::new("old"),
            balances: balances(5),
        });
        assert!(!applied);
        assert!(s.private_balances.is_empty());
    }

    #[test]
    fn balances_without_active_wallet_are_discarded() {
        let mut s = Session::new();
        assert!(!s.apply(SessionUpdate::PublicBalances {
            wallet_id: WalletId::new("a"),
            balances: balances(1),
        }));
    }

    #[test]
    fn reset_bumps_epoch_and_drops_identity() {
        let mut s = Session::new();
        s.apply(SessionUpdate::Activated(identity("a")));
        s.apply(SessionUpdate::PrivateBalances {
            wallet_id: WalletId::new("a"),
            balances: balances(3),
        });
        s.apply(SessionUpdate::Reset);
        assert_eq!(s.status, SessionStatus::Uninitialized);
        assert!(s.identity.is_none());
        assert!(s.private_balances.is_empty());
        assert_eq!(s.epoch, 1);
    }

    #[test]
    fn restore_keeps_previous_status_and_records_error() {
        let mut s = Session::new();
        s.apply(SessionUpdate::EngineReady);
        s.apply(SessionUpdate::Begin(SessionStatus::Loading));
        assert!(s.status.is_busy());
        s.apply(SessionUpdate::Restore(SessionStatus::Ready, info()));
        assert_eq!(s.status, SessionStatus::Ready);
        assert_eq!(s.last_error.as_ref().map(|e| e.kind), Some(ErrorKind::Authentication));
    }

    #[test]
    fn record_error_keeps_status() {
        let mut s = Session::new();
        s.apply(SessionUpdate::Activated(identity("a")));
        s.apply(SessionUpdate::RecordError(ErrorInfo::from(
            &WalletError::BalanceRefresh("rpc down".into()),
        )));
        assert_eq!(s.status, SessionStatus::Active);
        assert!(s.last_error.is_some());
    }

    #[test]
    fn scan_progress_is_tracked_per_phase() {
        let mut s = Session::new();
        let progress = ScanProgress {
            chain: ChainRef {
                name: "Ethereum_Sepolia".into(),
                chain_id: 11_155_111,
            },
            status: ScanStatus::Updated,
            progress: 0.5,
        };
        s.apply(SessionUpdate::Scan {
            phase: ScanPhase::Txid,
            progress: progress.clone(),
        });
        assert!(s.scan.utxo.is_none());
        assert_eq!(s.scan.txid, Some(progress));
    }

    #[test]
    fn require_active_fails_when_not_active() {
        let s = Session::new();
        assert_eq!(s.require_active().unwrap_err(), WalletError::NoActiveWallet);
    }

    #[test]
    fn identity_debug_redacts_seed() {
        let debug = format!("{:?}", identity("a"));
        assert!(!debug.contains("junk"));
    }
}
