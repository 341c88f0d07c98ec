//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration;

use ghost_core::testing::{FakeChain, FakeEngine};
use ghost_core::types::{ChainRef, FeeData};
use ghost_core::Amount;

use crate::config::WalletConfig;
use crate::controller::WalletController;
use crate::kdf::KdfParams;
use crate::retry::RetryPolicy;
use crate::store::MemoryStore;

pub(crate) const PASSWORD: &str = "correct horse";
pub(crate) const PHRASE: &str = "test test test test test test test test test test test junk";
pub(crate) const WETH: &str = "0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14";
/// Public address of [`PHRASE`].
pub(crate) const PUBLIC: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

pub(crate) type TestController = WalletController<FakeEngine, FakeChain, MemoryStore>;

pub(crate) struct Harness {
    pub engine: Arc<FakeEngine>,
    pub chain: Arc<FakeChain>,
    pub store: Arc<MemoryStore>,
    pub controller: Arc<TestController>,
}

pub(crate) fn test_config() -> WalletConfig {
    WalletConfig {
        kdf: KdfParams {
            key_iterations: 10,
            verifier_iterations: 100,
            salt_len: 16,
        },
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            call_timeout: Duration::from_secs(5),
        },
        ..WalletConfig::default()
    }
}

pub(crate) fn harness() -> Harness {
    harness_with(test_config())
}

pub(crate) fn harness_with(config: WalletConfig) -> Harness {
    let engine = Arc::new(FakeEngine::new());
    let chain = Arc::new(FakeChain::new().with_fee_data(FeeData {
        gas_price: Some(Amount::from(20_000_000_000u64)),
        max_fee_per_gas: Some(Amount::from(30_000_000_000u64)),
        max_priority_fee_per_gas: Some(Amount::from(1_000_000_000u64)),
    }));
    let store = Arc::new(MemoryStore::new());
    let controller = Arc::new(
        WalletController::new(engine.clone(), chain.clone(), store.clone(), config).unwrap(),
    );
    Harness {
        engine,
        chain,
        store,
        controller,
    }
}

/// Harness with a started engine and an active wallet for [`PHRASE`].
pub(crate) async fn active_harness_with(config: WalletConfig) -> Harness {
    let h = harness_with(config);
    h.controller.start_engine().await.unwrap();
    h.controller
        .create_wallet(PASSWORD, Some(PHRASE))
        .await
        .unwrap();
    h.controller.await_background_refresh().await;
    h
}

pub(crate) async fn active_harness() -> Harness {
    active_harness_with(test_config()).await
}

pub(crate) fn sepolia() -> ChainRef {
    WalletConfig::default().network.chain_ref()
}
