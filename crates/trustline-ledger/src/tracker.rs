//! Monotonic high-water tracker.
//!
//! Keeps the highest-valued entry ever submitted, with an opaque payload
//! alongside it. Used for settlement claims, where only the claim covering
//! the largest cumulative amount matters and older ones are superseded.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use trustline_core::error::ProtocolError;
use trustline_store::{Store, WriteQueue};

use crate::keys;

/// A candidate value with an opaque payload riding along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerEntry {
    pub value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl TrackerEntry {
    pub fn new(value: Decimal, data: Option<Value>) -> Self {
        Self { value, data }
    }
}

impl Default for TrackerEntry {
    fn default() -> Self {
        Self {
            value: Decimal::ZERO,
            data: None,
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    loaded: bool,
    maximum: TrackerEntry,
}

/// Highest-value-wins register, persisted under the ledger namespace.
///
/// The current maximum is loaded lazily on first use and only replaced by a
/// strictly greater candidate; ties lose.
pub struct MaxValueTracker {
    key: String,
    store: Arc<dyn Store>,
    queue: WriteQueue,
    state: Mutex<TrackerState>,
}

impl MaxValueTracker {
    /// Create a tracker rooted at `namespace`, sharing the ledger's store
    /// and write queue.
    pub fn new(namespace: &str, store: Arc<dyn Store>, queue: WriteQueue) -> Self {
        Self {
            key: keys::tracker_maximum(namespace),
            store,
            queue,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// The highest entry seen so far; a zero entry before any submission.
    pub async fn get_max(&self) -> Result<TrackerEntry, ProtocolError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        Ok(state.maximum.clone())
    }

    /// Submit a candidate.
    ///
    /// When the candidate is strictly greater it becomes the new maximum and
    /// the entry it displaced is returned; otherwise the maximum is kept and
    /// the losing candidate comes back. Callers tell the two apart by
    /// comparing the returned value against what they submitted.
    pub async fn set_if_max(&self, candidate: TrackerEntry) -> Result<TrackerEntry, ProtocolError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;

        if candidate.value > state.maximum.value {
            self.queue
                .put(self.key.clone(), serde_json::to_string(&candidate)?);
            tracing::debug!(
                previous = %state.maximum.value,
                maximum = %candidate.value,
                "tracker maximum raised"
            );
            Ok(std::mem::replace(&mut state.maximum, candidate))
        } else {
            Ok(candidate)
        }
    }

    async fn ensure_loaded(&self, state: &mut TrackerState) -> Result<(), ProtocolError> {
        if state.loaded {
            return Ok(());
        }
        let stored = self
            .store
            .get(&self.key)
            .await
            .map_err(|err| ProtocolError::Store(err.to_string()))?;
        state.maximum = match stored {
            Some(json) => serde_json::from_str(&json)?,
            None => TrackerEntry::default(),
        };
        state.loaded = true;
        Ok(())
    }
}
