//! Wallet session controller.
//!
//! The [`WalletController`] owns the process-wide [`Session`] and drives it
//! through engine startup, wallet creation or unlock, balance refreshes and
//! reset. It talks to the outside world only through the
//! [`PrivacyEngine`], [`ChainAccount`] and [`KeyValueStore`] traits.
//!
//! Engine callbacks never touch the session directly: they forward
//! [`EngineEvent`]s into a channel, and [`WalletController::handle_engine_event`]
//! applies them after checking that the event's wallet is still the active
//! one.

use std::sync::{Arc, Weak};

use ghost_core::constants::{PERSISTED_KEYS, STORE_KEY_WALLET_ID};
use ghost_core::traits::{ChainAccount, KeyValueStore, PrivacyEngine};
use ghost_core::types::{
    AssetRef, BalanceEvent, BalanceMap, ChainRef, EngineEvent, ScanPhase, TokenBalance, WalletId,
};
use ghost_core::{AdapterError, Amount};
use parking_lot::Mutex;
use tokio::sync::{OnceCell, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WalletConfig;
use crate::error::{ErrorInfo, WalletError};
use crate::kdf::{derive_and_verify, derive_new};
use crate::keys::derive_public_identity;
use crate::mnemonic::{generate_mnemonic, parse_mnemonic};
use crate::retry::with_retry;
use crate::session::{Session, SessionStatus, SessionUpdate, WalletIdentity};

/// Decimals assumed for private tokens missing from the configured list.
const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Dual-identity wallet controller.
pub struct WalletController<E, C, S> {
    engine: Arc<E>,
    chain: Arc<C>,
    store: Arc<S>,
    config: WalletConfig,
    session: Mutex<Session>,
    engine_started: OnceCell<()>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<EngineEvent>>>,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl<E, C, S> WalletController<E, C, S>
where
    E: PrivacyEngine + 'static,
    C: ChainAccount + 'static,
    S: KeyValueStore + 'static,
{
    /// Create a controller. Validates `config`; does not start the engine.
    pub fn new(
        engine: Arc<E>,
        chain: Arc<C>,
        store: Arc<S>,
        config: WalletConfig,
    ) -> Result<Self, WalletError> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            engine,
            chain,
            store,
            config,
            session: Mutex::new(Session::new()),
            engine_started: OnceCell::new(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            background: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    pub(crate) fn chain(&self) -> &C {
        &self.chain
    }

    pub(crate) fn chain_ref(&self) -> ChainRef {
        self.config.network.chain_ref()
    }

    /// Copy of the session for display.
    pub fn snapshot(&self) -> Session {
        self.session.lock().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.session.lock().status
    }

    /// Whether a wallet handle is persisted (unlock rather than onboard).
    pub fn has_stored_wallet(&self) -> Result<bool, WalletError> {
        Ok(self.store.contains(STORE_KEY_WALLET_ID)?)
    }

    pub fn engine_running(&self) -> bool {
        self.engine_started.initialized()
    }

    /// The active identity, or `NoActiveWallet`.
    pub(crate) fn active_identity(&self) -> Result<WalletIdentity, WalletError> {
        self.session.lock().require_active().cloned()
    }

    // -----------------------------------------------------------------
    // Engine startup
    // -----------------------------------------------------------------

    /// Start the privacy engine once per process.
    ///
    /// Concurrent callers share the in-flight start. A failed start leaves
    /// the engine unstarted so a later call can retry. The balance and scan
    /// handlers are registered exactly once, on the first success.
    pub async fn start_engine(&self) -> Result<(), WalletError> {
        if self.engine_started.initialized() {
            self.mark_engine_ready();
            return Ok(());
        }

        self.session.lock().apply(SessionUpdate::EngineStarting);
        let result = self
            .engine_started
            .get_or_try_init(|| async {
                self.engine
                    .start(&self.config.engine)
                    .await
                    .map_err(engine_error)?;
                self.register_engine_handlers();
                info!(
                    network = %self.config.network.name,
                    wallet_source = %self.config.engine.wallet_source,
                    "privacy engine started"
                );
                Ok::<(), WalletError>(())
            })
            .await;

        match result {
            Ok(_) => {
                self.mark_engine_ready();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "privacy engine failed to start");
                self.session
                    .lock()
                    .apply(SessionUpdate::Failed(ErrorInfo::from(&e)));
                Err(e)
            }
        }
    }

    fn mark_engine_ready(&self) {
        let mut session = self.session.lock();
        if matches!(
            session.status,
            SessionStatus::Uninitialized | SessionStatus::EngineStarting | SessionStatus::Error
        ) {
            session.apply(SessionUpdate::EngineReady);
        }
    }

    fn register_engine_handlers(&self) {
        let tx = self.events_tx.clone();
        self.engine.on_balance_update(Box::new(move |event| {
            if tx.send(EngineEvent::Balance(event)).is_err() {
                debug!("balance update dropped: controller gone");
            }
        }));
        let tx = self.events_tx.clone();
        self.engine.on_utxo_scan_progress(Box::new(move |progress| {
            if tx
                .send(EngineEvent::Scan {
                    phase: ScanPhase::Utxo,
                    progress,
                })
                .is_err()
            {
                debug!("UTXO scan progress dropped: controller gone");
            }
        }));
        let tx = self.events_tx.clone();
        self.engine.on_txid_scan_progress(Box::new(move |progress| {
            if tx
                .send(EngineEvent::Scan {
                    phase: ScanPhase::Txid,
                    progress,
                })
                .is_err()
            {
                debug!("TXID scan progress dropped: controller gone");
            }
        }));
    }

    fn ensure_engine_started(&self) -> Result<(), WalletError> {
        if self.engine_started.initialized() {
            Ok(())
        } else {
            Err(WalletError::EngineNotStarted)
        }
    }

    /// Move to `next` (Creating or Loading) if no other wallet operation is
    /// running. Returns the status to restore on a recoverable failure.
    fn begin(&self, next: SessionStatus) -> Result<SessionStatus, WalletError> {
        let mut session = self.session.lock();
        let status = session.status;
        match status {
            s if s.is_busy() => Err(WalletError::Busy(format!("{s:?} in progress"))),
            SessionStatus::Active => Err(WalletError::AlreadyActive),
            SessionStatus::EngineStarting => {
                Err(WalletError::Busy("engine is starting".to_string()))
            }
            previous => {
                session.apply(SessionUpdate::Begin(next));
                Ok(previous)
            }
        }
    }

    /// Record the failure of a create or load.
    ///
    /// Authentication and input failures put the session back where it was;
    /// anything else moves it to `Error`.
    fn fail(&self, previous: SessionStatus, err: &WalletError) {
        let info = ErrorInfo::from(err);
        let update = match err {
            WalletError::IncorrectPassword
            | WalletError::NoStoredWallet
            | WalletError::InvalidMnemonic(_) => SessionUpdate::Restore(previous, info),
            _ => SessionUpdate::Failed(info),
        };
        self.session.lock().apply(update);
    }

    // -----------------------------------------------------------------
    // Create / load / reset
    // -----------------------------------------------------------------

    /// Create a new wallet protected by `password`.
    ///
    /// Uses `mnemonic` when given (after validation), otherwise generates a
    /// fresh one. Returns once the identity exists; both balance maps are
    /// then filled by a background refresh, see
    /// [`await_background_refresh`](Self::await_background_refresh).
    pub async fn create_wallet(
        self: &Arc<Self>,
        password: &str,
        mnemonic: Option<&str>,
    ) -> Result<WalletIdentity, WalletError> {
        self.ensure_engine_started()?;
        let previous = self.begin(SessionStatus::Creating)?;

        let identity = match self.establish_new_identity(password, mnemonic).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "wallet creation failed");
                self.fail(previous, &e);
                return Err(e);
            }
        };

        info!(
            wallet_id = %identity.private_id,
            public_address = %identity.public_address,
            "wallet created"
        );
        self.session
            .lock()
            .apply(SessionUpdate::Activated(identity.clone()));
        self.spawn_background_refresh();
        Ok(identity)
    }

    async fn establish_new_identity(
        &self,
        password: &str,
        mnemonic: Option<&str>,
    ) -> Result<WalletIdentity, WalletError> {
        let seed = match mnemonic {
            Some(phrase) => parse_mnemonic(phrase)?,
            None => generate_mnemonic()?,
        };
        let credentials = derive_new(&self.config.kdf, password).await?;
        let private = self
            .engine
            .create_identity(credentials.key(), &seed, &self.config.network.creation_blocks())
            .await
            .map_err(engine_error)?;
        let public = derive_public_identity(&seed)?;
        // Handle, salt and verifier replace any previous wallet together.
        credentials.persist(&*self.store, &[(STORE_KEY_WALLET_ID, private.id.as_str())])?;

        Ok(WalletIdentity {
            private_id: private.id,
            private_address: private.private_address,
            public_address: public.address,
            seed,
        })
    }

    /// Unlock the persisted wallet with `password`.
    ///
    /// On success both balance maps are refreshed before returning. Refresh
    /// failures are recorded in the session and do not fail the unlock.
    pub async fn load_existing_wallet(&self, password: &str) -> Result<WalletIdentity, WalletError> {
        self.ensure_engine_started()?;
        let previous = self.begin(SessionStatus::Loading)?;

        let identity = match self.unlock_stored_identity(password).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "wallet unlock failed");
                self.fail(previous, &e);
                return Err(e);
            }
        };

        info!(wallet_id = %identity.private_id, "wallet loaded");
        self.session
            .lock()
            .apply(SessionUpdate::Activated(identity.clone()));

        if let Err(e) = self.refresh_private_balances().await {
            debug!(error = %e, "private refresh after load failed");
        }
        if let Err(e) = self.refresh_public_balances().await {
            debug!(error = %e, "public refresh after load failed");
        }
        Ok(identity)
    }

    async fn unlock_stored_identity(&self, password: &str) -> Result<WalletIdentity, WalletError> {
        let id = self
            .store
            .get(STORE_KEY_WALLET_ID)?
            .map(WalletId::new)
            .ok_or(WalletError::NoStoredWallet)?;
        let key = derive_and_verify(&*self.store, &self.config.kdf, password).await?;
        let private = self
            .engine
            .load_identity(&key, &id)
            .await
            .map_err(engine_error)?;
        let seed = self
            .engine
            .recover_seed(&key, &id)
            .await
            .map_err(engine_error)?;
        let public = derive_public_identity(&seed)?;

        Ok(WalletIdentity {
            private_id: private.id,
            private_address: private.private_address,
            public_address: public.address,
            seed,
        })
    }

    /// Forget the wallet: remove the persisted handle and credentials, then
    /// clear the session. The engine keeps running.
    pub fn reset_session(&self) -> Result<(), WalletError> {
        let mut session = self.session.lock();
        if session.status.is_busy() {
            return Err(WalletError::Busy(format!(
                "cannot reset while {:?}",
                session.status
            )));
        }
        self.store.remove_many(&PERSISTED_KEYS)?;
        session.apply(SessionUpdate::Reset);
        let epoch = session.epoch;
        drop(session);

        if let Some(handle) = self.background.lock().take() {
            handle.abort();
        }
        info!(epoch, "wallet session reset");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Balances
    // -----------------------------------------------------------------

    fn spawn_background_refresh(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let (private, public) = tokio::join!(
                this.refresh_private_balances(),
                this.refresh_public_balances()
            );
            if private.is_err() || public.is_err() {
                debug!("background balance refresh finished with errors");
            }
        });
        if let Some(previous) = self.background.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Wait for the refresh started by [`create_wallet`](Self::create_wallet).
    pub async fn await_background_refresh(&self) {
        let handle = self.background.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "background refresh task failed");
                }
            }
        }
    }

    /// Ask the engine to rescan private balances of the active wallet.
    ///
    /// The balances themselves arrive later as engine events.
    pub async fn refresh_private_balances(&self) -> Result<(), WalletError> {
        let id = self.active_identity()?.private_id;
        let chain_ref = self.chain_ref();
        let engine: &E = &self.engine;

        let result = with_retry(&self.config.retry, "refresh_private_balances", || {
            engine.refresh_private_balances(&chain_ref, &id)
        })
        .await;

        result.map_err(|e| self.record_refresh_failure("private", &e))
    }

    /// Read public balances of every configured token plus the native asset.
    ///
    /// Either every balance is read and the map replaced, or the previous
    /// map is kept.
    pub async fn refresh_public_balances(&self) -> Result<(), WalletError> {
        let identity = self.active_identity()?;
        let balances = match self.read_public_balances(&identity.public_address).await {
            Ok(balances) => balances,
            Err(e) => return Err(self.record_refresh_failure("public", &e)),
        };

        let applied = self.session.lock().apply(SessionUpdate::PublicBalances {
            wallet_id: identity.private_id.clone(),
            balances,
        });
        if applied {
            debug!(wallet_id = %identity.private_id, "public balances updated");
        } else {
            debug!(wallet_id = %identity.private_id, "discarded public balances of inactive wallet");
        }
        Ok(())
    }

    async fn read_public_balances(&self, owner: &str) -> Result<BalanceMap, WalletError> {
        let chain: &C = &self.chain;
        let retry = &self.config.retry;
        let network = &self.config.network;
        let mut balances = BalanceMap::new();

        for token in &network.tokens {
            let raw = with_retry(retry, "token_balance", || {
                chain.token_balance(&token.address, owner, token.decimals)
            })
            .await
            .map_err(chain_error)?;
            balances.insert(TokenBalance {
                symbol: token.symbol.clone(),
                asset: AssetRef::Erc20(token.address.clone()),
                decimals: token.decimals,
                amount: Amount::parse_units(&raw, token.decimals)?,
            });
        }

        let raw = with_retry(retry, "native_balance", || chain.native_balance(owner))
            .await
            .map_err(chain_error)?;
        balances.insert(TokenBalance {
            symbol: network.native_symbol.clone(),
            asset: AssetRef::Native,
            decimals: network.native_decimals,
            amount: Amount::parse_units(&raw, network.native_decimals)?,
        });
        Ok(balances)
    }

    fn record_refresh_failure(&self, which: &str, err: &dyn std::fmt::Display) -> WalletError {
        let err = WalletError::BalanceRefresh(format!("{which}: {err}"));
        warn!(error = %err, "balance refresh failed");
        self.session
            .lock()
            .apply(SessionUpdate::RecordError(ErrorInfo::from(&err)));
        err
    }

    // -----------------------------------------------------------------
    // Engine events
    // -----------------------------------------------------------------

    /// Apply one engine event. Returns whether the session changed.
    ///
    /// Balance events for a wallet other than the active one (or from
    /// before the last reset) are discarded. Nothing here fails the caller.
    pub async fn handle_engine_event(&self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::Scan { phase, progress } => self
                .session
                .lock()
                .apply(SessionUpdate::Scan { phase, progress }),
            EngineEvent::Balance(event) => self.apply_private_balances(event).await,
        }
    }

    async fn apply_private_balances(&self, event: BalanceEvent) -> bool {
        let (active, epoch) = {
            let session = self.session.lock();
            (session.active_wallet_id().cloned(), session.epoch)
        };
        if active.as_ref() != Some(&event.wallet_id) {
            debug!(wallet_id = %event.wallet_id, "discarded balance update for inactive wallet");
            return false;
        }
        if event.chain.chain_id != self.config.network.chain_id {
            debug!(chain_id = event.chain.chain_id, "discarded balance update for other chain");
            return false;
        }

        let mut balances = BalanceMap::new();
        for erc20 in &event.erc20_amounts {
            let (symbol, decimals) = self.resolve_token(&erc20.token_address).await;
            balances.insert(TokenBalance {
                symbol,
                asset: AssetRef::Erc20(erc20.token_address.clone()),
                decimals,
                amount: erc20.amount.clone(),
            });
        }

        let mut session = self.session.lock();
        if session.epoch != epoch {
            debug!(wallet_id = %event.wallet_id, "discarded balance update from before reset");
            return false;
        }
        let applied = session.apply(SessionUpdate::PrivateBalances {
            wallet_id: event.wallet_id.clone(),
            balances,
        });
        if applied {
            debug!(
                wallet_id = %event.wallet_id,
                tokens = event.erc20_amounts.len(),
                "private balances updated"
            );
        }
        applied
    }

    /// Symbol and decimals of a token: configured list first, then the
    /// chain, then the address itself.
    async fn resolve_token(&self, address: &str) -> (String, u8) {
        if let Some(token) = self.config.network.token(address) {
            return (token.symbol.clone(), token.decimals);
        }
        let chain: &C = &self.chain;
        match with_retry(&self.config.retry, "token_symbol", || chain.token_symbol(address)).await {
            Ok(symbol) => (symbol, DEFAULT_TOKEN_DECIMALS),
            Err(e) => {
                warn!(token = %address, error = %e, "symbol lookup failed, keying by address");
                (address.to_string(), DEFAULT_TOKEN_DECIMALS)
            }
        }
    }

    /// Apply every event queued so far. Returns how many were handled.
    ///
    /// Does nothing once the receiver has moved to a dispatcher task.
    pub async fn drain_engine_events(&self) -> usize {
        let pending: Vec<EngineEvent> = {
            let mut rx = self.events_rx.lock();
            let Some(rx) = rx.as_mut() else {
                return 0;
            };
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };
        let count = pending.len();
        for event in pending {
            self.handle_engine_event(event).await;
        }
        count
    }

    /// Move the event receiver into a task that applies events as they
    /// arrive. Returns `None` if a dispatcher was already spawned.
    pub fn spawn_event_dispatcher(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self.events_rx.lock().take()?;
        let weak: Weak<Self> = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(this) = weak.upgrade() else {
                    break;
                };
                this.handle_engine_event(event).await;
            }
            debug!("engine event dispatcher stopped");
        }))
    }

    /// Base-unit allowance the shield contract may spend from the active
    /// public account.
    pub(crate) async fn read_allowance(
        &self,
        token: &str,
        owner: &str,
    ) -> Result<Amount, WalletError> {
        let chain: &C = &self.chain;
        let spender = self.config.network.shield_contract.as_str();
        with_retry(&self.config.retry, "allowance", || {
            chain.allowance(token, owner, spender)
        })
        .await
        .map_err(chain_error)
    }

    /// Whether shielding `amount` of `asset` needs a token approval first.
    ///
    /// Native assets and zero amounts never do. Otherwise the shield
    /// contract's allowance over the active public account is compared
    /// with the amount.
    pub async fn needs_approval(
        &self,
        asset: &AssetRef,
        amount: &str,
        decimals: u8,
    ) -> Result<bool, WalletError> {
        let AssetRef::Erc20(token) = asset else {
            return Ok(false);
        };
        let required = Amount::parse_units(amount, decimals)?;
        if required.is_zero() {
            return Ok(false);
        }
        let owner = self.active_identity()?.public_address;
        let allowance = self.read_allowance(token, &owner).await?;
        Ok(allowance < required)
    }
}

pub(crate) fn engine_error(e: AdapterError) -> WalletError {
    match e {
        AdapterError::Timeout(msg) => WalletError::Timeout(msg),
        other => WalletError::Engine(other),
    }
}

pub(crate) fn chain_error(e: AdapterError) -> WalletError {
    match e {
        AdapterError::Timeout(msg) => WalletError::Timeout(msg),
        other => WalletError::Chain(other),
    }
}
