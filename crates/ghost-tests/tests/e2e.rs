//! End-to-end wallet scenarios.
//!
//! Each test boots a controller over the in-memory engine and chain, walks
//! it through engine startup, wallet creation or unlock, balance sync and
//! shielding, and checks session state and persisted keys along the way.

use std::sync::Arc;

use ghost_core::Amount;
use ghost_core::constants::{PERSISTED_KEYS, STORE_KEY_WALLET_ID};
use ghost_core::testing::FakeEngine;
use ghost_core::traits::KeyValueStore;
use ghost_core::types::{
    AssetRef, BalanceEvent, ChainRef, Erc20Amount, SeedPhrase, WalletId,
};
use ghost_tests::helpers::*;
use ghost_wallet::{
    FileStore, SessionStatus, ShieldRequest, ShieldStage, WalletError,
};

fn sepolia() -> ChainRef {
    fast_config().network.chain_ref()
}

#[tokio::test]
async fn concurrent_engine_starts_share_one_boot() {
    let w = memory_wallet();
    let c = &w.controller;
    let (a, b, d) = tokio::join!(c.start_engine(), c.start_engine(), c.start_engine());
    a.unwrap();
    b.unwrap();
    d.unwrap();

    assert_eq!(w.engine.start_calls(), 1);
    assert_eq!(w.engine.handler_registrations(), [1, 1, 1]);
    assert_eq!(c.status(), SessionStatus::Ready);
    assert!(c.engine_running());

    c.start_engine().await.unwrap();
    assert_eq!(w.engine.start_calls(), 1);
}

#[tokio::test]
async fn create_then_reset_clears_everything() {
    let w = memory_wallet();
    let c = &w.controller;
    c.start_engine().await.unwrap();
    assert!(!c.has_stored_wallet().unwrap());

    let identity = c.create_wallet(PASSWORD, None).await.unwrap();
    assert_eq!(identity.seed.word_count(), 12);
    assert!(identity.public_address.starts_with("0x"));
    assert_eq!(c.status(), SessionStatus::Active);
    assert!(c.has_stored_wallet().unwrap());

    c.await_background_refresh().await;
    let session = c.snapshot();
    assert!(session.private_balances.is_empty());
    let mut public: Vec<_> = session.public_balances.keys().cloned().collect();
    public.sort();
    assert_eq!(public, vec!["ETH".to_string(), "WETH".to_string()]);

    c.reset_session().unwrap();
    assert_eq!(c.status(), SessionStatus::Uninitialized);
    for key in PERSISTED_KEYS {
        assert_eq!(w.store.get(key).unwrap(), None, "{key} survived reset");
    }
    let session = c.snapshot();
    assert!(session.identity.is_none());
    assert!(session.public_balances.is_empty());

    // The engine keeps running across a reset.
    c.start_engine().await.unwrap();
    assert_eq!(c.status(), SessionStatus::Ready);
    assert_eq!(w.engine.start_calls(), 1);
}

#[tokio::test]
async fn wrong_password_leaves_wallet_locked() {
    let w = memory_wallet();
    let c = &w.controller;
    c.start_engine().await.unwrap();
    c.create_wallet(PASSWORD, Some(DEV_PHRASE)).await.unwrap();
    c.await_background_refresh().await;

    // Simulate an app restart against the same store and engine.
    let restarted = Wallet::with_parts(
        w.engine.clone(),
        w.chain.clone(),
        w.store.clone(),
        fast_config(),
    );
    let r = &restarted.controller;
    r.start_engine().await.unwrap();

    let err = r.load_existing_wallet("hunter2").await.unwrap_err();
    assert_eq!(err, WalletError::IncorrectPassword);
    assert_ne!(r.status(), SessionStatus::Active);
    assert!(r.snapshot().identity.is_none());

    let identity = r.load_existing_wallet(PASSWORD).await.unwrap();
    assert_eq!(identity.public_address, DEV_ADDRESS);
    assert_eq!(identity.seed, SeedPhrase::new(DEV_PHRASE));
    assert_eq!(r.status(), SessionStatus::Active);
}

#[tokio::test]
async fn unlock_without_stored_wallet() {
    let w = memory_wallet();
    w.controller.start_engine().await.unwrap();
    let err = w.controller.load_existing_wallet(PASSWORD).await.unwrap_err();
    assert_eq!(err, WalletError::NoStoredWallet);
    assert_eq!(
        err.user_message(),
        WalletError::IncorrectPassword.user_message()
    );
    assert_eq!(w.controller.status(), SessionStatus::Ready);
}

#[tokio::test]
async fn file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new());

    let first = Wallet::with_parts(
        engine.clone(),
        Arc::new(ghost_core::testing::FakeChain::new().with_fee_data(sepolia_fees())),
        Arc::new(FileStore::open_in(dir.path()).unwrap()),
        fast_config(),
    );
    first.controller.start_engine().await.unwrap();
    let created = first
        .controller
        .create_wallet(PASSWORD, Some(DEV_PHRASE))
        .await
        .unwrap();
    first.controller.await_background_refresh().await;

    let store = Arc::new(FileStore::open_in(dir.path()).unwrap());
    assert_eq!(
        store.get(STORE_KEY_WALLET_ID).unwrap().as_deref(),
        Some(created.private_id.as_str())
    );
    let second = Wallet::with_parts(engine, first.chain.clone(), store, fast_config());
    second.controller.start_engine().await.unwrap();
    let loaded = second.controller.load_existing_wallet(PASSWORD).await.unwrap();
    assert_eq!(loaded, created);
}

#[tokio::test]
async fn stale_balance_callback_is_ignored() {
    let w = memory_wallet();
    let c = &w.controller;
    c.start_engine().await.unwrap();
    let identity = c.create_wallet(PASSWORD, Some(DEV_PHRASE)).await.unwrap();
    c.await_background_refresh().await;
    c.drain_engine_events().await;

    w.engine.emit_balance(BalanceEvent {
        wallet_id: WalletId::new("some-other-wallet"),
        chain: sepolia(),
        erc20_amounts: vec![Erc20Amount {
            token_address: WETH.to_string(),
            amount: Amount::from(5u64),
        }],
    });
    assert_eq!(c.drain_engine_events().await, 1);
    assert!(c.snapshot().private_balances.is_empty());

    w.engine.emit_balance(BalanceEvent {
        wallet_id: identity.private_id.clone(),
        chain: sepolia(),
        erc20_amounts: vec![Erc20Amount {
            token_address: WETH.to_string(),
            amount: Amount::from(5u64),
        }],
    });
    c.drain_engine_events().await;
    let session = c.snapshot();
    let weth = session.private_balances.get("WETH").unwrap();
    assert_eq!(weth.amount, Amount::from(5u64));
}

#[tokio::test]
async fn callback_after_reset_is_dropped() {
    let w = memory_wallet();
    let c = &w.controller;
    c.start_engine().await.unwrap();
    let identity = c.create_wallet(PASSWORD, Some(DEV_PHRASE)).await.unwrap();
    c.await_background_refresh().await;
    c.reset_session().unwrap();

    w.engine.emit_balance(BalanceEvent {
        wallet_id: identity.private_id,
        chain: sepolia(),
        erc20_amounts: vec![Erc20Amount {
            token_address: WETH.to_string(),
            amount: Amount::from(9u64),
        }],
    });
    c.drain_engine_events().await;
    assert!(c.snapshot().private_balances.is_empty());
}

#[tokio::test]
async fn private_balances_arrive_through_dispatcher() {
    let w = memory_wallet();
    let c = &w.controller;
    c.start_engine().await.unwrap();
    let dispatcher = c.spawn_event_dispatcher().expect("first dispatcher");

    let id = FakeEngine::wallet_id_for(&SeedPhrase::new(DEV_PHRASE));
    w.engine.set_private_balances(
        &id,
        vec![Erc20Amount {
            token_address: WETH.to_string(),
            amount: Amount::parse_units("1.5", 18).unwrap(),
        }],
    );
    c.create_wallet(PASSWORD, Some(DEV_PHRASE)).await.unwrap();
    c.await_background_refresh().await;

    let mut found = None;
    for _ in 0..100 {
        found = c
            .snapshot()
            .private_balances
            .get("WETH")
            .map(|b| b.display_amount());
        if found.is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(found.as_deref(), Some("1.5"));
    dispatcher.abort();
}

#[tokio::test]
async fn native_shield_goes_straight_to_submission() {
    let w = memory_wallet();
    let c = &w.controller;
    c.start_engine().await.unwrap();
    c.create_wallet(PASSWORD, Some(DEV_PHRASE)).await.unwrap();
    c.await_background_refresh().await;

    assert!(!c.needs_approval(&AssetRef::Native, "1", 18).await.unwrap());

    let mut shield = c.draft_shield(ShieldRequest::native("0.1", 18)).unwrap();
    assert_eq!(shield.check_approval().await.unwrap(), ShieldStage::Approved);
    let receipt = shield.confirm().await.unwrap();

    assert_eq!(shield.stage(), ShieldStage::Confirmed);
    assert!(w.chain.approvals().is_empty());
    assert_eq!(w.chain.sent_transactions().len(), 1);
    assert_eq!(receipt.plan.amount, Amount::parse_units("0.1", 18).unwrap());
    assert_eq!(receipt.plan.from_public_address, DEV_ADDRESS);
}

#[tokio::test]
async fn token_shield_is_gated_on_allowance() {
    let w = memory_wallet();
    let c = &w.controller;
    c.start_engine().await.unwrap();
    c.create_wallet(PASSWORD, Some(DEV_PHRASE)).await.unwrap();
    c.await_background_refresh().await;

    let weth = AssetRef::Erc20(WETH.to_string());
    assert!(!c.needs_approval(&weth, "0", 18).await.unwrap());
    assert!(c.needs_approval(&weth, "0.5", 18).await.unwrap());

    let mut shield = c.draft_shield(ShieldRequest::erc20(WETH, "0.5", 18)).unwrap();
    let err = shield.confirm().await.unwrap_err();
    assert!(matches!(err, WalletError::ApprovalRequired { .. }));
    assert_eq!(shield.stage(), ShieldStage::ApprovalRequired);
    assert!(w.chain.sent_transactions().is_empty());

    let ticket = shield.approve().await.unwrap();
    assert_eq!(ticket.amount, Amount::parse_units("0.5", 18).unwrap());
    assert!(!c.needs_approval(&weth, "0.5", 18).await.unwrap());
    assert!(c.needs_approval(&weth, "0.6", 18).await.unwrap());

    shield.confirm().await.unwrap();
    assert_eq!(shield.stage(), ShieldStage::Confirmed);
    assert_eq!(w.chain.sent_transactions().len(), 1);
}

#[tokio::test]
async fn public_refresh_recovers_from_flaky_rpc() {
    let w = memory_wallet();
    let c = &w.controller;
    c.start_engine().await.unwrap();
    let identity = c.create_wallet(PASSWORD, Some(DEV_PHRASE)).await.unwrap();
    c.await_background_refresh().await;

    w.chain
        .set_native_balance(&identity.public_address, Amount::parse_units("2", 18).unwrap());
    w.chain.fail_reads(2);
    c.refresh_public_balances().await.unwrap();

    let session = c.snapshot();
    assert_eq!(session.public_balances.get("ETH").unwrap().display_amount(), "2.0");
}

#[tokio::test]
async fn operations_before_engine_start_are_rejected() {
    let w = memory_wallet();
    let err = w.controller.create_wallet(PASSWORD, None).await.unwrap_err();
    assert_eq!(err, WalletError::EngineNotStarted);
    assert!(!w.controller.has_stored_wallet().unwrap());
}
