//! Persisted key layout.
//!
//! Every durable value lives under the ledger namespace so that several
//! trustlines can share one [`trustline_store::Store`] without colliding.

/// Persisted override for the maximum balance bound.
pub fn maximum(namespace: &str) -> String {
    format!("{namespace}:tl:maximum")
}

/// Persisted override for the minimum balance bound.
pub fn minimum(namespace: &str) -> String {
    format!("{namespace}:tl:minimum")
}

/// Cumulative incoming fulfilled counter.
pub fn balance_incoming(namespace: &str) -> String {
    format!("{namespace}:tl:balance:if")
}

/// Cumulative outgoing fulfilled counter.
pub fn balance_outgoing(namespace: &str) -> String {
    format!("{namespace}:tl:balance:of")
}

/// Durable transfer record.
pub fn transfer(namespace: &str, id: &str) -> String {
    format!("{namespace}:tl:transfer:{id}")
}

/// Highest-value entry seen by the [`crate::MaxValueTracker`].
pub fn tracker_maximum(namespace: &str) -> String {
    format!("{namespace}:mvt:maximum")
}
