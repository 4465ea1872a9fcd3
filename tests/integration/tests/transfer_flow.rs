//! Integration test: the full transfer lifecycle across both endpoints.
//!
//! Drives the authoritative and client plugins against each other and
//! checks escrow, fulfillment, rejection, and expiry from both
//! perspectives, including the credit limits that bound them.

use rust_decimal::Decimal;

use trustline_core::ProtocolError;
use trustline_crypto::Fulfillment;
use trustline_integration_tests::{
    connected_pair, hashlocked, preimage, simple_transfer, wait_for,
};
use trustline_peer::TrustlineEvent;

// =========================================================================
// Escrow and fulfillment
// =========================================================================

#[tokio::test]
async fn test_hashlocked_payment_end_to_end() {
    let channel = connected_pair().await;
    let mut alice_events = channel.alice.event_receiver();
    let mut bob_events = channel.bob.event_receiver();

    channel
        .alice
        .send_transfer(hashlocked("pay-1", 10, chrono::Duration::seconds(60)))
        .await
        .expect("send should succeed");

    // escrowed on both sides, but nothing has moved yet
    wait_for(&mut alice_events, "outgoing_prepare").await;
    wait_for(&mut bob_events, "incoming_prepare").await;
    assert_eq!(channel.alice.get_balance().await.unwrap(), Decimal::ZERO);

    channel
        .bob
        .fulfill_condition("pay-1", preimage())
        .await
        .expect("fulfill should succeed");

    wait_for(&mut bob_events, "incoming_fulfill").await;
    let event = wait_for(&mut alice_events, "outgoing_fulfill").await;
    let TrustlineEvent::OutgoingFulfill { transfer, .. } = event else {
        panic!("expected an outgoing fulfill");
    };
    assert_eq!(transfer.id, "pay-1");

    assert_eq!(
        channel.alice.get_balance().await.unwrap(),
        Decimal::new(-10, 0)
    );
    assert_eq!(channel.bob.get_balance().await.unwrap(), Decimal::new(10, 0));
}

#[tokio::test]
async fn test_transfers_in_both_directions_net_out() {
    let channel = connected_pair().await;
    let mut alice_events = channel.alice.event_receiver();
    let mut bob_events = channel.bob.event_receiver();

    // alice pays bob 10
    channel
        .alice
        .send_transfer(hashlocked("a-to-b", 10, chrono::Duration::seconds(60)))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;
    channel
        .bob
        .fulfill_condition("a-to-b", preimage())
        .await
        .unwrap();
    wait_for(&mut alice_events, "outgoing_fulfill").await;

    // bob pays alice 20; his headroom is min(-10) plus the 10 he is owed
    let mut reply = hashlocked("b-to-a", 20, chrono::Duration::seconds(60));
    reply.from = "bob".into();
    reply.to = "alice".into();
    channel.bob.send_transfer(reply).await.unwrap();
    wait_for(&mut alice_events, "incoming_prepare").await;
    channel
        .alice
        .fulfill_condition("b-to-a", preimage())
        .await
        .unwrap();
    wait_for(&mut bob_events, "outgoing_fulfill").await;

    assert_eq!(
        channel.alice.get_balance().await.unwrap(),
        Decimal::new(10, 0)
    );
    assert_eq!(
        channel.bob.get_balance().await.unwrap(),
        Decimal::new(-10, 0)
    );

    // bob now owes 10, exactly at his credit edge; one more unit is refused
    let mut over = simple_transfer("b-over", 1);
    over.from = "bob".into();
    over.to = "alice".into();
    let err = channel.bob.send_transfer(over).await.unwrap_err();
    assert!(matches!(err, ProtocolError::NotAccepted(_)));
}

#[tokio::test]
async fn test_wrong_preimage_keeps_the_escrow() {
    let channel = connected_pair().await;
    let mut bob_events = channel.bob.event_receiver();

    channel
        .alice
        .send_transfer(hashlocked("pay-1", 10, chrono::Duration::seconds(60)))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;

    let err = channel
        .bob
        .fulfill_condition("pay-1", Fulfillment::from_bytes(b"wrong preimage".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::NotAccepted(_)));

    // the transfer is still prepared, so the real preimage still collects
    channel
        .bob
        .fulfill_condition("pay-1", preimage())
        .await
        .unwrap();
    assert_eq!(channel.bob.get_balance().await.unwrap(), Decimal::new(10, 0));
}

// =========================================================================
// Rejection and expiry
// =========================================================================

#[tokio::test]
async fn test_rejection_releases_the_escrow() {
    let channel = connected_pair().await;
    let mut alice_events = channel.alice.event_receiver();
    let mut bob_events = channel.bob.event_receiver();

    channel
        .alice
        .send_transfer(hashlocked("pay-1", 10, chrono::Duration::seconds(60)))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;

    channel
        .bob
        .reject_incoming_transfer("pay-1", "out of stock")
        .await
        .unwrap();

    let event = wait_for(&mut alice_events, "outgoing_reject").await;
    let TrustlineEvent::OutgoingReject { reason, .. } = event else {
        panic!("expected an outgoing reject");
    };
    assert_eq!(reason, "out of stock");

    // the escrow is released and the slot cannot be fulfilled any more
    assert_eq!(channel.alice.get_balance().await.unwrap(), Decimal::ZERO);
    let err = channel
        .bob
        .fulfill_condition("pay-1", preimage())
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::AlreadyRejected(_)));

    // the freed headroom is usable again
    channel
        .alice
        .send_transfer(simple_transfer("pay-2", 10))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_expiry_rolls_back_on_both_sides() {
    let channel = connected_pair().await;
    let mut alice_events = channel.alice.event_receiver();
    let mut bob_events = channel.bob.event_receiver();

    channel
        .alice
        .send_transfer(hashlocked("pay-1", 10, chrono::Duration::milliseconds(200)))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;

    let event = wait_for(&mut alice_events, "outgoing_cancel").await;
    let TrustlineEvent::OutgoingCancel { reason, .. } = event else {
        panic!("expected an outgoing cancel");
    };
    assert_eq!(reason, "expired");
    wait_for(&mut bob_events, "incoming_cancel").await;

    assert_eq!(channel.alice.get_balance().await.unwrap(), Decimal::ZERO);
    let err = channel
        .bob
        .fulfill_condition("pay-1", preimage())
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::AlreadyRejected(_)));
}

#[tokio::test]
async fn test_fulfilled_transfer_cannot_be_rejected() {
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

    let err = channel
        .bob
        .reject_incoming_transfer("pay-1", "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::AlreadyFulfilled(_)));
}

// =========================================================================
// Idempotency and limits
// =========================================================================

#[tokio::test]
async fn test_replay_is_idempotent_and_conflict_is_refused() {
    let channel = connected_pair().await;
    let mut bob_events = channel.bob.event_receiver();

    channel
        .alice
        .send_transfer(simple_transfer("pay-1", 5))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;

    // byte-identical replay: re-announced to bob, absorbed on both sides
    channel
        .alice
        .send_transfer(simple_transfer("pay-1", 5))
        .await
        .unwrap();

    // same id, different contents: refused
    let err = channel
        .alice
        .send_transfer(simple_transfer("pay-1", 6))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::DuplicateId(_)));

    // only the original escrow exists, so the rest of the headroom fits
    channel
        .alice
        .send_transfer(simple_transfer("pay-2", 5))
        .await
        .unwrap();
    let err = channel
        .alice
        .send_transfer(simple_transfer("pay-3", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::NotAccepted(_)));
}

#[tokio::test]
async fn test_over_limit_transfer_never_reaches_the_peer() {
    let channel = connected_pair().await;
    let mut bob_events = channel.bob.event_receiver();

    // alice's min balance is -10; an 11-unit transfer breaks it locally
    let err = channel
        .alice
        .send_transfer(simple_transfer("too-big", 11))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::NotAccepted(_)));

    // prove bob never heard of the refused transfer: the next valid one is
    // the first thing he sees
    channel
        .alice
        .send_transfer(simple_transfer("fits", 10))
        .await
        .unwrap();
    let event = wait_for(&mut bob_events, "incoming_prepare").await;
    let TrustlineEvent::IncomingPrepare(seen) = event else {
        panic!("expected an incoming prepare");
    };
    assert_eq!(seen.id, "fits");
}

#[tokio::test]
async fn test_unconditional_transfer_waits_in_escrow() {
    let channel = connected_pair().await;
    let mut bob_events = channel.bob.event_receiver();

    channel
        .alice
        .send_transfer(simple_transfer("open-1", 10))
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_prepare").await;

    // no condition means no fulfillment path; the balance never moves
    let err = channel
        .bob
        .fulfill_condition("open-1", preimage())
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::NotAccepted(_)));
    assert_eq!(channel.alice.get_balance().await.unwrap(), Decimal::ZERO);

    // but the receiver can still hand the escrow back
    channel
        .bob
        .reject_incoming_transfer("open-1", "cash only")
        .await
        .unwrap();
    wait_for(&mut bob_events, "incoming_reject").await;
}
