//! Shared fixtures for the trustline integration tests.
//!
//! Every test drives two real plugins against each other: alice plays the
//! authoritative side, bob the client, wired over in-memory duplex
//! transports with a pump task feeding each side's inbound frames.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc};

use trustline_core::Transfer;
use trustline_crypto::{Fulfillment, Secret};
use trustline_peer::{NoopHooks, Role, Trustline, TrustlineConfig, TrustlineEvent};
use trustline_rpc::duplex;
use trustline_store::MemoryStore;

pub const ALICE_SEED: [u8; 32] = [0xA1; 32];
pub const BOB_SEED: [u8; 32] = [0xB2; 32];

/// Route plugin logs to the captured test output, filtered by `RUST_LOG`.
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The fixture preimage; conditions in these tests are its SHA-256 hash.
pub fn preimage() -> Fulfillment {
    Fulfillment::from_bytes([7u8; 32])
}

/// An unconditional transfer between the fixture identities.
pub fn simple_transfer(id: &str, amount: i64) -> Transfer {
    Transfer::builder()
        .id(id)
        .from("alice")
        .to("bob")
        .amount(Decimal::new(amount, 0))
        .build()
        .expect("failed to build fixture transfer")
}

/// A transfer locked to the fixture preimage's condition.
pub fn hashlocked(id: &str, amount: i64, expires_in: chrono::Duration) -> Transfer {
    Transfer::builder()
        .id(id)
        .from("alice")
        .to("bob")
        .amount(Decimal::new(amount, 0))
        .execution_condition(preimage().condition())
        .expires_at(chrono::Utc::now() + expires_in)
        .build()
        .expect("failed to build fixture transfer")
}

/// A connected authoritative/client pair plus their backing stores.
pub struct Channel {
    pub alice: Trustline,
    pub bob: Trustline,
    pub alice_store: Arc<MemoryStore>,
    pub bob_store: Arc<MemoryStore>,
}

/// alice and bob on fresh stores with the default limits: bob may run up
/// 100, alice may owe at most 10.
pub async fn connected_pair() -> Channel {
    pair_with(|_| {}).await
}

/// Like [`connected_pair`], with config tweaks applied to both sides.
pub async fn pair_with(tune: impl Fn(&mut TrustlineConfig)) -> Channel {
    pair_on(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        tune,
    )
    .await
}

/// Wire a new pair over fresh transports against the given stores.
/// Calling this a second time with the same stores acts as a restart.
pub async fn pair_on(
    alice_store: Arc<MemoryStore>,
    bob_store: Arc<MemoryStore>,
    tune: impl Fn(&mut TrustlineConfig),
) -> Channel {
    init_tracing();
    let ((alice_transport, alice_inbound), (bob_transport, bob_inbound)) = duplex();

    let mut alice_config = TrustlineConfig::new(
        Secret::from_seed(ALICE_SEED),
        Secret::from_seed(BOB_SEED).public_key(),
        "USD",
        2,
        Role::Authoritative,
    );
    default_limits(&mut alice_config);
    tune(&mut alice_config);
    let alice = Trustline::new(
        alice_config,
        Arc::clone(&alice_store) as Arc<dyn trustline_store::Store>,
        Arc::new(alice_transport),
        Arc::new(NoopHooks),
    )
    .expect("failed to build alice");

    let mut bob_config = TrustlineConfig::new(
        Secret::from_seed(BOB_SEED),
        Secret::from_seed(ALICE_SEED).public_key(),
        "USD",
        2,
        Role::Client,
    );
    default_limits(&mut bob_config);
    tune(&mut bob_config);
    let bob = Trustline::new(
        bob_config,
        Arc::clone(&bob_store) as Arc<dyn trustline_store::Store>,
        Arc::new(bob_transport),
        Arc::new(NoopHooks),
    )
    .expect("failed to build bob");

    pump(alice.clone(), alice_inbound);
    pump(bob.clone(), bob_inbound);

    alice.connect().await.expect("alice failed to connect");
    bob.connect().await.expect("bob failed to connect");

    Channel {
        alice,
        bob,
        alice_store,
        bob_store,
    }
}

fn default_limits(config: &mut TrustlineConfig) {
    config.max_balance = Some(Decimal::new(100, 0));
    config.min_balance = Some(Decimal::new(-10, 0));
}

/// Spawn a task feeding the transport's inbound frames into the plugin.
pub fn pump(plugin: Trustline, mut inbound: mpsc::UnboundedReceiver<String>) {
    tokio::spawn(async move {
        while let Some(frame) = inbound.recv().await {
            let _ = plugin.handle_inbound(&frame).await;
        }
    });
}

/// Receive events until one with the given name arrives. Panics after a
/// generous timeout so a missing event fails the test instead of hanging.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<TrustlineEvent>,
    name: &str,
) -> TrustlineEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for a {name} event"))
            .expect("event channel closed");
        if event.name() == name {
            return event;
        }
    }
}
