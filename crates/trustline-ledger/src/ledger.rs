//! Bilateral escrow ledger.
//!
//! Tracks conditional transfers through the `prepared -> fulfilled | cancelled`
//! lifecycle and maintains four cumulative counters per namespace:
//!
//! - `incoming_fulfilled` / `outgoing_fulfilled`: value actually settled, one
//!   durable key each
//! - `incoming_fulfilled_and_prepared` / `outgoing_fulfilled_and_prepared`:
//!   settled value plus escrow still in flight, memory only
//!
//! Credit admission is checked against the prospective counters, so a channel
//! can never over-commit even while transfers are outstanding. Transfer
//! records become durable at their terminal transition; escrow still in
//! flight lives only in the cache, matching the memory-only prospective
//! counters. Durable writes ride a [`WriteQueue`] and are applied in
//! operation order.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use trustline_core::error::ProtocolError;
use trustline_core::transfer::{Transfer, TransferRecord, TransferState};
use trustline_core::validate;
use trustline_crypto::Fulfillment;
use trustline_store::{Store, WriteQueue};

use crate::keys;

/// Credit bounds applied when admitting new prepares.
///
/// `maximum` caps the balance the peer may owe this side if every incoming
/// prepare settles; `minimum` (usually zero or negative) floors the balance
/// if every outgoing prepare settles. `None` leaves that side unlimited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreditLimits {
    pub maximum: Option<Decimal>,
    pub minimum: Option<Decimal>,
}

#[derive(Debug, Default)]
struct Balances {
    loaded: bool,
    incoming_fulfilled: Decimal,
    incoming_fulfilled_and_prepared: Decimal,
    outgoing_fulfilled: Decimal,
    outgoing_fulfilled_and_prepared: Decimal,
    maximum: Option<Decimal>,
    minimum: Option<Decimal>,
}

enum Admitted {
    New,
    /// The id already exists durably with identical contents.
    Existing,
}

/// A cached slot for one transfer id.
///
/// A claim reserves the id for an in-flight prepare. Until the prepare is
/// admitted the claim is invisible to lookups, so a concurrent fulfill or
/// cancel resolves the id against the store instead of against escrow
/// that is not on the books yet.
enum CacheSlot {
    Claim(TransferRecord),
    Record(TransferRecord),
}

impl CacheSlot {
    fn transfer(&self) -> &Transfer {
        match self {
            CacheSlot::Claim(record) | CacheSlot::Record(record) => &record.transfer,
        }
    }
}

/// One side's view of the escrow ledger for a single trustline.
///
/// The in-memory cache answers duplicate checks synchronously, so a replay
/// of an id is caught before any I/O happens. Admission and state
/// transitions are serialized behind one async mutex which is held across
/// the store reads they depend on; counters are loaded lazily on first use.
pub struct TransferLedger {
    namespace: String,
    store: Arc<dyn Store>,
    queue: WriteQueue,
    cache: Arc<DashMap<String, CacheSlot>>,
    balances: Mutex<Balances>,
}

impl TransferLedger {
    /// Create a ledger rooted at `namespace` in the given store.
    ///
    /// The queue must be backed by the same store; several components may
    /// share it so their writes stay ordered relative to each other.
    pub fn new(
        namespace: impl Into<String>,
        store: Arc<dyn Store>,
        queue: WriteQueue,
        limits: CreditLimits,
    ) -> Result<Self, ProtocolError> {
        let namespace = namespace.into();
        if !validate::is_store_key(&namespace) {
            return Err(ProtocolError::invalid_field(
                "namespace",
                format!("not a valid store key: {:?}", namespace),
            ));
        }
        Ok(Self {
            namespace,
            store,
            queue,
            cache: Arc::new(DashMap::new()),
            balances: Mutex::new(Balances {
                maximum: limits.maximum,
                minimum: limits.minimum,
                ..Balances::default()
            }),
        })
    }

    /// The store namespace this ledger writes under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Admit a transfer into escrow.
    ///
    /// Returns `true` when the transfer was newly admitted and `false` for
    /// an identical replay, which is a no-op. Re-preparing an id with
    /// different contents is a `DuplicateIdError`. A transfer that would
    /// push the prospective balance past a credit bound is refused with
    /// `NotAcceptedError` and leaves no trace. The escrow stays cache-only
    /// until a terminal transition writes the record durably.
    pub async fn prepare(
        &self,
        transfer: Transfer,
        is_incoming: bool,
    ) -> Result<bool, ProtocolError> {
        let record = TransferRecord::new_prepared(transfer, is_incoming);
        let id = record.transfer.id.clone();

        // claim the cache slot before the first await; a concurrent prepare
        // with the same id must see the claim immediately
        match self.cache.entry(id.clone()) {
            Entry::Occupied(existing) => {
                return if *existing.get().transfer() == record.transfer {
                    tracing::debug!(transfer_id = %id, "duplicate prepare ignored");
                    Ok(false)
                } else {
                    Err(ProtocolError::DuplicateId(format!(
                        "transfer {id} already exists with different contents"
                    )))
                };
            }
            Entry::Vacant(slot) => {
                slot.insert(CacheSlot::Claim(record.clone()));
            }
        }

        match self.prepare_claimed(&record).await? {
            Admitted::New => {
                tracing::info!(
                    transfer_id = %id,
                    direction = record.direction(),
                    amount = %record.transfer.amount,
                    "transfer prepared"
                );
                Ok(true)
            }
            Admitted::Existing => Ok(false),
        }
    }

    /// Resolve a freshly claimed slot: admit the transfer or release the
    /// claim. The whole decision runs under the balance lock, so a
    /// concurrent fulfill or cancel never observes a half-admitted prepare.
    async fn prepare_claimed(&self, record: &TransferRecord) -> Result<Admitted, ProtocolError> {
        let mut balances = self.balances.lock().await;
        let admitted = self.admit(record, &mut balances).await;
        if !matches!(admitted, Ok(Admitted::New)) {
            // duplicate or refusal: drop the claim while still holding
            // the lock
            self.cache.remove(&record.transfer.id);
        }
        admitted
    }

    async fn admit(
        &self,
        record: &TransferRecord,
        balances: &mut Balances,
    ) -> Result<Admitted, ProtocolError> {
        let transfer = &record.transfer;

        // ids can outlive the cache: terminal records are evicted once
        // durably written, and earlier runs leave records in the store
        if let Some(stored) = self.load_record(&transfer.id).await? {
            return if stored.transfer == *transfer {
                tracing::debug!(
                    transfer_id = %transfer.id,
                    state = %stored.state,
                    "duplicate prepare of stored transfer ignored"
                );
                Ok(Admitted::Existing)
            } else {
                Err(ProtocolError::DuplicateId(format!(
                    "transfer {} already exists with different contents",
                    transfer.id
                )))
            };
        }

        self.ensure_loaded(balances).await?;

        let amount = transfer.amount;
        if record.is_incoming {
            let prospective = balances
                .incoming_fulfilled_and_prepared
                .checked_add(amount)
                .ok_or_else(|| {
                    ProtocolError::NotAccepted(format!(
                        "transfer {} overflows the incoming balance counter",
                        transfer.id
                    ))
                })?;
            if let Some(maximum) = balances.maximum {
                if prospective - balances.outgoing_fulfilled > maximum {
                    return Err(ProtocolError::NotAccepted(format!(
                        "transfer {} would exceed the maximum balance: {} - {} > {}",
                        transfer.id, prospective, balances.outgoing_fulfilled, maximum
                    )));
                }
            }
            balances.incoming_fulfilled_and_prepared = prospective;
        } else {
            let prospective = balances
                .outgoing_fulfilled_and_prepared
                .checked_add(amount)
                .ok_or_else(|| {
                    ProtocolError::NotAccepted(format!(
                        "transfer {} overflows the outgoing balance counter",
                        transfer.id
                    ))
                })?;
            if let Some(minimum) = balances.minimum {
                if prospective - balances.incoming_fulfilled > -minimum {
                    return Err(ProtocolError::NotAccepted(format!(
                        "transfer {} would exceed the minimum balance: {} - {} > {}",
                        transfer.id,
                        prospective,
                        balances.incoming_fulfilled,
                        -minimum
                    )));
                }
            }
            balances.outgoing_fulfilled_and_prepared = prospective;
        }

        // the claim is now backed by the counters and may serve lookups
        self.cache
            .insert(transfer.id.clone(), CacheSlot::Record(record.clone()));
        Ok(Admitted::New)
    }

    /// Move a prepared transfer to the fulfilled state and credit its amount
    /// to the fulfilled counter for its direction.
    ///
    /// Fulfilling an already-fulfilled transfer returns the existing record
    /// without touching the counters. Fails with `TransferNotFoundError` for
    /// an unknown id and `AlreadyRolledBackError` for a cancelled one.
    pub async fn fulfill(
        &self,
        id: &str,
        fulfillment: Fulfillment,
    ) -> Result<TransferRecord, ProtocolError> {
        let mut balances = self.balances.lock().await;
        let record = self.lookup(id).await?;
        match record.state {
            TransferState::Cancelled => Err(ProtocolError::AlreadyRolledBack(format!(
                "transfer {id} was already rolled back"
            ))),
            TransferState::Fulfilled => Ok(record),
            TransferState::Prepared => {
                self.ensure_loaded(&mut balances).await?;

                let amount = record.transfer.amount;
                let (counter_key, counter_value) = if record.is_incoming {
                    balances.incoming_fulfilled += amount;
                    (
                        keys::balance_incoming(&self.namespace),
                        balances.incoming_fulfilled,
                    )
                } else {
                    balances.outgoing_fulfilled += amount;
                    (
                        keys::balance_outgoing(&self.namespace),
                        balances.outgoing_fulfilled,
                    )
                };

                let mut fulfilled = record;
                fulfilled.state = TransferState::Fulfilled;
                fulfilled.fulfillment = Some(fulfillment);

                self.cache
                    .insert(id.to_string(), CacheSlot::Record(fulfilled.clone()));
                self.queue.put(
                    keys::transfer(&self.namespace, id),
                    serde_json::to_string(&fulfilled)?,
                );
                self.queue.put(counter_key, counter_value.to_string());
                self.evict_after_flush(id);

                tracing::info!(
                    transfer_id = %id,
                    direction = fulfilled.direction(),
                    amount = %amount,
                    "transfer fulfilled"
                );
                Ok(fulfilled)
            }
        }
    }

    /// Roll a prepared transfer back and release its escrow.
    ///
    /// Cancelling an already-cancelled transfer returns the existing record.
    /// Fails with `TransferNotFoundError` for an unknown id and
    /// `AlreadyFulfilledError` for a fulfilled one.
    pub async fn cancel(&self, id: &str, reason: &str) -> Result<TransferRecord, ProtocolError> {
        let mut balances = self.balances.lock().await;
        let record = self.lookup(id).await?;
        match record.state {
            TransferState::Fulfilled => Err(ProtocolError::AlreadyFulfilled(format!(
                "transfer {id} was already fulfilled"
            ))),
            TransferState::Cancelled => Ok(record),
            TransferState::Prepared => {
                self.ensure_loaded(&mut balances).await?;

                let amount = record.transfer.amount;
                if record.is_incoming {
                    balances.incoming_fulfilled_and_prepared -= amount;
                } else {
                    balances.outgoing_fulfilled_and_prepared -= amount;
                }

                let mut cancelled = record;
                cancelled.state = TransferState::Cancelled;

                self.cache
                    .insert(id.to_string(), CacheSlot::Record(cancelled.clone()));
                self.queue.put(
                    keys::transfer(&self.namespace, id),
                    serde_json::to_string(&cancelled)?,
                );
                self.evict_after_flush(id);

                tracing::info!(
                    transfer_id = %id,
                    direction = cancelled.direction(),
                    amount = %amount,
                    reason,
                    "transfer cancelled"
                );
                Ok(cancelled)
            }
        }
    }

    /// Fetch a transfer record by id, from the cache or the store.
    pub async fn get(&self, id: &str) -> Result<TransferRecord, ProtocolError> {
        self.lookup(id).await
    }

    /// Net settled balance from this side's perspective.
    pub async fn get_balance(&self) -> Result<Decimal, ProtocolError> {
        let mut balances = self.balances.lock().await;
        self.ensure_loaded(&mut balances).await?;
        Ok(balances.incoming_fulfilled - balances.outgoing_fulfilled)
    }

    pub async fn get_incoming_fulfilled(&self) -> Result<Decimal, ProtocolError> {
        let mut balances = self.balances.lock().await;
        self.ensure_loaded(&mut balances).await?;
        Ok(balances.incoming_fulfilled)
    }

    pub async fn get_incoming_fulfilled_and_prepared(&self) -> Result<Decimal, ProtocolError> {
        let mut balances = self.balances.lock().await;
        self.ensure_loaded(&mut balances).await?;
        Ok(balances.incoming_fulfilled_and_prepared)
    }

    pub async fn get_outgoing_fulfilled(&self) -> Result<Decimal, ProtocolError> {
        let mut balances = self.balances.lock().await;
        self.ensure_loaded(&mut balances).await?;
        Ok(balances.outgoing_fulfilled)
    }

    pub async fn get_outgoing_fulfilled_and_prepared(&self) -> Result<Decimal, ProtocolError> {
        let mut balances = self.balances.lock().await;
        self.ensure_loaded(&mut balances).await?;
        Ok(balances.outgoing_fulfilled_and_prepared)
    }

    /// Current maximum balance bound, `None` when unlimited.
    pub async fn get_maximum(&self) -> Result<Option<Decimal>, ProtocolError> {
        let mut balances = self.balances.lock().await;
        self.ensure_loaded(&mut balances).await?;
        Ok(balances.maximum)
    }

    /// Override the maximum balance bound and persist the override.
    pub async fn set_maximum(&self, value: Decimal) -> Result<(), ProtocolError> {
        let mut balances = self.balances.lock().await;
        self.ensure_loaded(&mut balances).await?;
        balances.maximum = Some(value);
        self.queue
            .put(keys::maximum(&self.namespace), value.to_string());
        Ok(())
    }

    /// Current minimum balance bound, `None` when unlimited.
    pub async fn get_minimum(&self) -> Result<Option<Decimal>, ProtocolError> {
        let mut balances = self.balances.lock().await;
        self.ensure_loaded(&mut balances).await?;
        Ok(balances.minimum)
    }

    /// Override the minimum balance bound and persist the override.
    pub async fn set_minimum(&self, value: Decimal) -> Result<(), ProtocolError> {
        let mut balances = self.balances.lock().await;
        self.ensure_loaded(&mut balances).await?;
        balances.minimum = Some(value);
        self.queue
            .put(keys::minimum(&self.namespace), value.to_string());
        Ok(())
    }

    /// Wait until every write enqueued so far reached the store.
    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    async fn lookup(&self, id: &str) -> Result<TransferRecord, ProtocolError> {
        let cached = self.cache.get(id).and_then(|slot| match slot.value() {
            // a claim is not on the books yet; the store stays authoritative
            CacheSlot::Claim(_) => None,
            CacheSlot::Record(record) => Some(record.clone()),
        });
        if let Some(record) = cached {
            return Ok(record);
        }
        self.load_record(id)
            .await?
            .ok_or_else(|| ProtocolError::TransferNotFound(format!("no transfer with id {id}")))
    }

    async fn load_record(&self, id: &str) -> Result<Option<TransferRecord>, ProtocolError> {
        let key = keys::transfer(&self.namespace, id);
        let raw = self
            .store
            .get(&key)
            .await
            .map_err(|err| ProtocolError::Store(err.to_string()))?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn ensure_loaded(&self, balances: &mut Balances) -> Result<(), ProtocolError> {
        if balances.loaded {
            return Ok(());
        }
        let incoming = self
            .read_decimal(&keys::balance_incoming(&self.namespace))
            .await?
            .unwrap_or(Decimal::ZERO);
        let outgoing = self
            .read_decimal(&keys::balance_outgoing(&self.namespace))
            .await?
            .unwrap_or(Decimal::ZERO);
        balances.incoming_fulfilled = incoming;
        balances.outgoing_fulfilled = outgoing;
        // escrow in flight is not persisted; the prospective counters start
        // level with the fulfilled ones
        balances.incoming_fulfilled_and_prepared = incoming;
        balances.outgoing_fulfilled_and_prepared = outgoing;
        if let Some(maximum) = self.read_decimal(&keys::maximum(&self.namespace)).await? {
            balances.maximum = Some(maximum);
        }
        if let Some(minimum) = self.read_decimal(&keys::minimum(&self.namespace)).await? {
            balances.minimum = Some(minimum);
        }
        balances.loaded = true;
        tracing::debug!(
            namespace = %self.namespace,
            incoming_fulfilled = %incoming,
            outgoing_fulfilled = %outgoing,
            "balances loaded"
        );
        Ok(())
    }

    async fn read_decimal(&self, key: &str) -> Result<Option<Decimal>, ProtocolError> {
        let raw = self
            .store
            .get(key)
            .await
            .map_err(|err| ProtocolError::Store(err.to_string()))?;
        match raw {
            Some(raw) => {
                let value = Decimal::from_str(&raw).map_err(|err| {
                    ProtocolError::Serialization(format!("corrupt decimal at {key}: {err}"))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Drop a terminal record from the cache once its durable write landed.
    /// Until then the cached copy keeps duplicate checks exact.
    fn evict_after_flush(&self, id: &str) {
        let queue = self.queue.clone();
        let cache = Arc::clone(&self.cache);
        let id = id.to_string();
        tokio::spawn(async move {
            queue.flush().await;
            cache.remove(&id);
        });
    }
}
