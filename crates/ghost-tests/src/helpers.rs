//! Shared helpers for the scenario tests.

use std::sync::{Arc, Once};
use std::time::Duration;

use ghost_core::Amount;
use ghost_core::testing::{FakeChain, FakeEngine};
use ghost_core::traits::KeyValueStore;
use ghost_core::types::FeeData;
use ghost_wallet::kdf::KdfParams;
use ghost_wallet::{MemoryStore, RetryPolicy, WalletConfig, WalletController};

pub const PASSWORD: &str = "correct horse battery";

/// Hardhat's well-known development mnemonic.
pub const DEV_PHRASE: &str = "test test test test test test test test test test test junk";

/// First account of [`DEV_PHRASE`].
pub const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

/// WETH on Ethereum Sepolia, the one token of the default network.
pub const WETH: &str = "0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14";

static LOGGING: Once = Once::new();

/// Install a test subscriber once per binary. `RUST_LOG` overrides the
/// default `warn` level.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Default network with cheap key derivation and fast retries.
pub fn fast_config() -> WalletConfig {
    WalletConfig {
        kdf: KdfParams {
            key_iterations: 10,
            verifier_iterations: 100,
            salt_len: 16,
        },
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            call_timeout: Duration::from_secs(5),
        },
        ..WalletConfig::default()
    }
}

/// Fee market with both pricing schemes filled in.
pub fn sepolia_fees() -> FeeData {
    FeeData {
        gas_price: Some(Amount::from(20_000_000_000u64)),
        max_fee_per_gas: Some(Amount::from(30_000_000_000u64)),
        max_priority_fee_per_gas: Some(Amount::from(1_000_000_000u64)),
    }
}

pub type Controller<S> = WalletController<FakeEngine, FakeChain, S>;

/// A controller wired to fresh fakes.
pub struct Wallet<S> {
    pub engine: Arc<FakeEngine>,
    pub chain: Arc<FakeChain>,
    pub store: Arc<S>,
    pub controller: Arc<Controller<S>>,
}

impl<S: KeyValueStore + 'static> Wallet<S> {
    pub fn with_store(store: Arc<S>, config: WalletConfig) -> Self {
        let engine = Arc::new(FakeEngine::new());
        let chain = Arc::new(FakeChain::new().with_fee_data(sepolia_fees()));
        Self::with_parts(engine, chain, store, config)
    }

    /// Build a controller over existing adapters, as a restarted process
    /// would find them.
    pub fn with_parts(
        engine: Arc<FakeEngine>,
        chain: Arc<FakeChain>,
        store: Arc<S>,
        config: WalletConfig,
    ) -> Self {
        init_logging();
        let controller = Arc::new(
            WalletController::new(engine.clone(), chain.clone(), store.clone(), config)
                .expect("valid test config"),
        );
        Self {
            engine,
            chain,
            store,
            controller,
        }
    }
}

/// In-memory wallet with the fast test config.
pub fn memory_wallet() -> Wallet<MemoryStore> {
    Wallet::with_store(Arc::new(MemoryStore::new()), fast_config())
}
