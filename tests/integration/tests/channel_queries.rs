//! Integration test: query proxying and link failure behavior.
//!
//! The authoritative side answers balance, limit, and info queries from
//! its books; the client forwards them across the link and negates the
//! signs. An unresponsive peer turns into timeouts, which only the
//! authoritative side absorbs.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;

use trustline_core::{Message, ProtocolError};
use trustline_crypto::Secret;
use trustline_integration_tests::{
    connected_pair, hashlocked, pair_with, preimage, wait_for, ALICE_SEED, BOB_SEED,
};
use trustline_peer::{NoopHooks, Role, Trustline, TrustlineConfig, TrustlineEvent};
use trustline_rpc::duplex;
use trustline_store::MemoryStore;

// =========================================================================
// Proxied queries
// =========================================================================

#[tokio::test]
async fn test_balance_views_are_mirrored() {
    let channel = pair_with(|config| {
        config.min_balance = Some(Decimal::new(-50, 0));
    })
    .await;
    let mut bob_events = channel.bob.event_receiver();

    channel
        .alice
        .send_transfer(hashlocked("pay-1", 25, chrono::Duration::seconds(60)))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;
    channel
        .bob
        .fulfill_condition("pay-1", preimage())
        .await
        .unwrap();

    assert_eq!(
        channel.alice.get_balance().await.unwrap(),
        Decimal::new(-25, 0)
    );
    assert_eq!(
        channel.bob.get_balance().await.unwrap(),
        Decimal::new(25, 0)
    );
}

#[tokio::test]
async fn test_limit_is_negated_for_the_client() {
    let channel = connected_pair().await;
    assert_eq!(
        channel.alice.get_limit().await.unwrap(),
        Decimal::new(100, 0)
    );
    assert_eq!(
        channel.bob.get_limit().await.unwrap(),
        Decimal::new(-100, 0)
    );
}

#[tokio::test]
async fn test_client_serves_info_from_its_connect_snapshot() {
    let channel = connected_pair().await;
    let from_authority = channel.alice.get_info().await.unwrap();
    let from_client = channel.bob.get_info().await.unwrap();

    assert_eq!(from_authority, from_client);
    assert_eq!(from_client.prefix, channel.bob.prefix());
    assert_eq!(from_client.currency_code, "USD");
    assert_eq!(from_client.currency_scale, 2);
    assert_eq!(from_client.max_balance, Some(Decimal::new(100, 0)));
    assert_eq!(from_client.min_balance, Some(Decimal::new(-10, 0)));
    assert_eq!(from_client.connectors, vec![channel.bob.account().to_string()]);
}

#[tokio::test]
async fn test_settle_threshold_fires_once_crossed() {
    let channel = pair_with(|config| {
        config.min_balance = Some(Decimal::new(-50, 0));
        config.settle_threshold = Some(Decimal::new(20, 0));
    })
    .await;
    let mut bob_events = channel.bob.event_receiver();

    channel
        .alice
        .send_transfer(hashlocked("pay-1", 30, chrono::Duration::seconds(60)))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;
    channel
        .bob
        .fulfill_condition("pay-1", preimage())
        .await
        .unwrap();

    let event = wait_for(&mut bob_events, "settle_threshold_reached").await;
    let TrustlineEvent::SettleThresholdReached { balance, threshold } = event else {
        panic!("expected a settle threshold event");
    };
    assert_eq!(balance, Decimal::new(30, 0));
    assert_eq!(threshold, Decimal::new(20, 0));
}

// =========================================================================
// Application chatter
// =========================================================================

#[tokio::test]
async fn test_quote_request_and_response() {
    let channel = connected_pair().await;

    channel
        .bob
        .register_request_handler(|request: Message| async move {
            let amount = request
                .data
                .as_ref()
                .and_then(|data| data.get("amount"))
                .cloned()
                .unwrap_or(json!(null));
            Ok(request.reply_with(json!({ "quoted": amount, "fee": "0.01" })))
        })
        .await
        .unwrap();

    let request = Message {
        ledger: String::new(),
        from: channel.alice.account().to_string(),
        to: channel.alice.peer_account().to_string(),
        data: Some(json!({ "amount": "12.50" })),
    };
    let response = channel.alice.send_request(request).await.unwrap();
    let data = response.data.expect("response should carry data");
    assert_eq!(data["quoted"], "12.50");
    assert_eq!(data["fee"], "0.01");
}

// =========================================================================
// Unresponsive peer
// =========================================================================

fn silent_peer_config(role: Role, timeout: Duration) -> TrustlineConfig {
    let (seed, peer_seed) = match role {
        Role::Authoritative => (ALICE_SEED, BOB_SEED),
        Role::Client => (BOB_SEED, ALICE_SEED),
    };
    let mut config = TrustlineConfig::new(
        Secret::from_seed(seed),
        Secret::from_seed(peer_seed).public_key(),
        "USD",
        2,
        role,
    );
    config.min_balance = Some(Decimal::new(-50, 0));
    config.call_timeout = timeout;
    config
}

#[tokio::test]
async fn test_authoritative_side_tolerates_a_silent_peer() {
    // nobody drains the peer's inbound frames, so every call times out
    let ((transport, _inbound), _peer_end) = duplex();
    let alice = Trustline::new(
        silent_peer_config(Role::Authoritative, Duration::from_millis(50)),
        Arc::new(MemoryStore::new()),
        Arc::new(transport),
        Arc::new(NoopHooks),
    )
    .unwrap();

    alice.connect().await.unwrap();
    let mut events = alice.event_receiver();

    // the relay times out but the local escrow stands
    alice
        .send_transfer(hashlocked("pay-1", 10, chrono::Duration::seconds(60)))
        .await
        .expect("authoritative send should tolerate the silent peer");
    wait_for(&mut events, "outgoing_prepare").await;

    // the escrow really is held: the headroom is gone
    let err = alice
        .send_transfer(hashlocked("pay-2", 41, chrono::Duration::seconds(60)))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::NotAccepted(_)));
}

#[tokio::test]
async fn test_client_cannot_connect_to_a_silent_peer() {
    let ((transport, _inbound), _peer_end) = duplex();
    let bob = Trustline::new(
        silent_peer_config(Role::Client, Duration::from_millis(50)),
        Arc::new(MemoryStore::new()),
        Arc::new(transport),
        Arc::new(NoopHooks),
    )
    .unwrap();

    let err = bob.connect().await.unwrap_err();
    assert!(matches!(err, ProtocolError::Timeout(_)));
    assert!(!bob.is_connected());
}
