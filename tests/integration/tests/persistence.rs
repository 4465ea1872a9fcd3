//! Integration test: durable state across a plugin restart.
//!
//! Plugins rebuilt on the same stores must reconstruct settled balances,
//! terminal transfer records, and the settlement high-water mark. Escrow
//! still in flight is cache-only and does not survive the restart, so an
//! unfinished payment has to be sent again.

use rust_decimal::Decimal;

use trustline_core::ProtocolError;
use trustline_integration_tests::{
    connected_pair, hashlocked, pair_on, preimage, simple_transfer, wait_for,
};
use trustline_ledger::keys;

#[tokio::test]
async fn test_books_survive_a_restart() {
    let first = connected_pair().await;
    let mut bob_events = first.bob.event_receiver();

    // one fulfilled, one left in escrow, one rejected
    first
        .alice
        .send_transfer(hashlocked("done", 4, chrono::Duration::seconds(60)))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;
    first.bob.fulfill_condition("done", preimage()).await.unwrap();

    first
        .alice
        .send_transfer(hashlocked("pending", 5, chrono::Duration::seconds(120)))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;

    first
        .alice
        .send_transfer(simple_transfer("refused", 1))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;
    first
        .bob
        .reject_incoming_transfer("refused", "not wanted")
        .await
        .unwrap();

    // flush both sides and bring the channel back up on the same stores
    first.alice.disconnect().await;
    first.bob.disconnect().await;
    let second = pair_on(first.alice_store, first.bob_store, |_| {}).await;
    let mut bob_events = second.bob.event_receiver();

    assert_eq!(
        second.alice.get_balance().await.unwrap(),
        Decimal::new(-4, 0)
    );
    assert_eq!(second.bob.get_balance().await.unwrap(), Decimal::new(4, 0));

    // escrow still in flight was cache-only; both sides dropped it with
    // the restart, so the payment has to be sent again
    let err = second
        .bob
        .fulfill_condition("pending", preimage())
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::TransferNotFound(_)));
    second
        .alice
        .send_transfer(hashlocked("pending", 5, chrono::Duration::seconds(120)))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;
    second
        .bob
        .fulfill_condition("pending", preimage())
        .await
        .unwrap();
    assert_eq!(
        second.alice.get_balance().await.unwrap(),
        Decimal::new(-9, 0)
    );

    // terminal states survived
    let err = second
        .bob
        .fulfill_condition("refused", preimage())
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::AlreadyRejected(_)));
}

#[tokio::test]
async fn test_refulfilling_after_restart_is_idempotent() {
    let first = connected_pair().await;
    let mut bob_events = first.bob.event_receiver();

    first
        .alice
        .send_transfer(hashlocked("done", 10, chrono::Duration::seconds(60)))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;
    first.bob.fulfill_condition("done", preimage()).await.unwrap();

    first.alice.disconnect().await;
    first.bob.disconnect().await;
    let second = pair_on(first.alice_store, first.bob_store, |_| {}).await;

    // retrying the delivery of an already-fulfilled transfer changes nothing
    second
        .bob
        .fulfill_condition("done", preimage())
        .await
        .unwrap();
    assert_eq!(second.bob.get_balance().await.unwrap(), Decimal::new(10, 0));
}

#[tokio::test]
async fn test_persisted_keys_follow_the_namespace() {
    let channel = connected_pair().await;
    let mut bob_events = channel.bob.event_receiver();

    channel
        .alice
        .send_transfer(hashlocked("pay-1", 10, chrono::Duration::seconds(60)))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;
    channel
        .bob
        .fulfill_condition("pay-1", preimage())
        .await
        .unwrap();

    channel.alice.disconnect().await;
    channel.bob.disconnect().await;

    // both sides derive the same namespace from the shared secret
    let namespace = channel.alice.auth_token().to_string();
    assert_eq!(namespace, channel.bob.auth_token());

    // alice paid: her outgoing-fulfilled counter and high-water mark are up
    assert_eq!(
        channel
            .alice_store
            .get_sync(&keys::balance_outgoing(&namespace)),
        Some("10".to_string())
    );
    let tracker = channel
        .alice_store
        .get_sync(&keys::tracker_maximum(&namespace))
        .expect("high-water mark should be persisted");
    assert!(tracker.contains("\"value\":\"10\""));

    // bob collected: his incoming-fulfilled counter mirrors it
    assert_eq!(
        channel
            .bob_store
            .get_sync(&keys::balance_incoming(&namespace)),
        Some("10".to_string())
    );

    // the transfer record itself is durable on both sides
    let on_alice = channel
        .alice_store
        .get_sync(&keys::transfer(&namespace, "pay-1"))
        .expect("record should be persisted");
    assert!(on_alice.contains("\"state\":\"fulfilled\""));
    assert!(on_alice.contains("\"isIncoming\":false"));
    let on_bob = channel
        .bob_store
        .get_sync(&keys::transfer(&namespace, "pay-1"))
        .expect("record should be persisted");
    assert!(on_bob.contains("\"isIncoming\":true"));
}
