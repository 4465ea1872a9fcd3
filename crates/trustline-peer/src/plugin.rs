//! The trustline plugin: one side of a bilateral payment channel.
//!
//! [`Trustline`] ties the transfer ledger, the RPC link, and the event
//! stream together. Both endpoints run the same type; the configured
//! [`Role`](crate::config::Role) decides which side keeps the books and
//! serves queries, and which side mirrors them.
//!
//! Inbound frames are not read from the transport here. The application
//! owns the receiving half of its transport and feeds each raw frame into
//! [`Trustline::handle_inbound`].

use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};

use trustline_core::error::ProtocolError;
use trustline_core::message::{LedgerInfo, Message};
use trustline_core::transfer::{Transfer, TransferRecord, TransferState};
use trustline_core::validate::{is_prefix, validate_message, validate_transfer};
use trustline_crypto::{auth_token, prefix, Fulfillment};
use trustline_ledger::{CreditLimits, MaxValueTracker, TrackerEntry, TransferLedger};
use trustline_rpc::{Method, RpcLink, Transport};
use trustline_store::{Store, WriteQueue};

use crate::config::TrustlineConfig;
use crate::events::TrustlineEvent;
use crate::hooks::SettlementHooks;

/// Timers further out than this are never armed; the expiry still holds,
/// it is just checked lazily at fulfillment time instead.
const MAX_EXPIRY_DELAY: Duration = Duration::from_secs(2 * 365 * 24 * 60 * 60);

type RequestHandler =
    Arc<dyn Fn(Message) -> BoxFuture<'static, Result<Message, ProtocolError>> + Send + Sync>;

struct Inner {
    config: TrustlineConfig,
    account: String,
    peer_account: String,
    prefix: String,
    auth_token: String,
    ledger: TransferLedger,
    tracker: MaxValueTracker,
    rpc: Arc<RpcLink>,
    hooks: Arc<dyn SettlementHooks>,
    event_tx: broadcast::Sender<TrustlineEvent>,
    connected: AtomicBool,
    peer_info: RwLock<Option<LedgerInfo>>,
    request_handler: RwLock<Option<RequestHandler>>,
}

/// One endpoint of a trustline. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Trustline {
    inner: Arc<Inner>,
}

impl Trustline {
    /// Build a plugin from its config, backing store, and outbound
    /// transport. RPC handlers are registered immediately; nothing flows
    /// until the application pumps inbound frames and calls
    /// [`connect`](Self::connect).
    pub fn new(
        config: TrustlineConfig,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        hooks: Arc<dyn SettlementHooks>,
    ) -> Result<Self, ProtocolError> {
        let shared = config.secret.shared_secret(&config.peer_public_key);
        let token = auth_token(&shared);
        let ledger_prefix = prefix(&token, &config.currency_code, config.currency_scale);
        if !is_prefix(&ledger_prefix) {
            return Err(ProtocolError::invalid_field(
                "currencyCode",
                format!("derives an unusable ledger prefix: {:?}", ledger_prefix),
            ));
        }
        let account = format!("{}{}", ledger_prefix, config.secret.public_key().to_base64url());
        let peer_account = format!("{}{}", ledger_prefix, config.peer_public_key.to_base64url());

        let queue = WriteQueue::new(Arc::clone(&store));
        let ledger = TransferLedger::new(
            token.clone(),
            Arc::clone(&store),
            queue.clone(),
            CreditLimits {
                maximum: config.max_balance,
                minimum: config.min_balance,
            },
        )?;
        let tracker = MaxValueTracker::new(&token, store, queue);
        let rpc = Arc::new(RpcLink::with_timeout(transport, config.call_timeout));
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);

        tracing::info!(
            role = ?config.role,
            %account,
            ledger_prefix = %ledger_prefix,
            "creating trustline plugin"
        );

        let inner = Arc::new(Inner {
            config,
            account,
            peer_account,
            prefix: ledger_prefix,
            auth_token: token,
            ledger,
            tracker,
            rpc,
            hooks,
            event_tx,
            connected: AtomicBool::new(false),
            peer_info: RwLock::new(None),
            request_handler: RwLock::new(None),
        });
        register_rpc_handlers(&inner)?;
        Ok(Self { inner })
    }

    /// Subscribe to the plugin's event stream. Each receiver sees every
    /// event from the moment it subscribes; a lagging receiver drops the
    /// oldest events but never blocks the plugin.
    pub fn event_receiver(&self) -> broadcast::Receiver<TrustlineEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Feed one raw inbound frame from the transport into the plugin.
    pub async fn handle_inbound(&self, frame: &str) -> Result<(), ProtocolError> {
        self.inner.rpc.receive(frame).await
    }

    /// This side's account: `<prefix><own public key>`.
    pub fn account(&self) -> &str {
        &self.inner.account
    }

    /// The peer's account: `<prefix><peer public key>`.
    pub fn peer_account(&self) -> &str {
        &self.inner.peer_account
    }

    /// The shared ledger prefix both sides derive from the channel secret.
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// The shared bearer token; both sides derive the same value.
    pub fn auth_token(&self) -> &str {
        &self.inner.auth_token
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Bring the channel up. The client side fetches and verifies the
    /// peer's ledger info first; the authoritative side has nothing to ask.
    /// Connecting twice, or concurrently, emits a single connect event.
    pub async fn connect(&self) -> Result<(), ProtocolError> {
        // claim the flag first so overlapping connects collapse into one
        if self
            .inner
            .connected
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        if !self.inner.config.role.is_authoritative() {
            match self.fetch_peer_info().await {
                Ok(info) => *self.inner.peer_info.write().await = Some(info),
                Err(err) => {
                    // release the claim so a later connect can try again
                    self.inner.connected.store(false, Ordering::SeqCst);
                    return Err(err);
                }
            }
        }
        tracing::info!(account = %self.inner.account, "trustline connected");
        emit(&self.inner, TrustlineEvent::Connect);
        Ok(())
    }

    async fn fetch_peer_info(&self) -> Result<LedgerInfo, ProtocolError> {
        let raw = self.inner.rpc.call(Method::GetInfo, json!([])).await?;
        let info: LedgerInfo = serde_json::from_value(raw)
            .map_err(|err| ProtocolError::Serialization(format!("bad get_info response: {err}")))?;
        if info.prefix != self.inner.prefix {
            return Err(ProtocolError::InvalidFields(format!(
                "peer reports prefix {:?}, expected {:?}",
                info.prefix, self.inner.prefix
            )));
        }
        Ok(info)
    }

    /// Take the channel down and flush pending writes. Disconnecting twice
    /// is a no-op.
    pub async fn disconnect(&self) {
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.ledger.flush().await;
        tracing::info!(account = %self.inner.account, "trustline disconnected");
        emit(&self.inner, TrustlineEvent::Disconnect);
    }

    /// Escrow an outgoing transfer locally, then relay it to the peer.
    ///
    /// The local prepare happens first, so the credit check runs against
    /// our own books before anything crosses the wire. Replaying a transfer
    /// the ledger already holds skips the escrow but still announces it,
    /// which lets a sender whose relay failed retry the delivery; the
    /// peer's prepare is idempotent. When the peer does not acknowledge
    /// the relay, the authoritative side keeps the escrow and lets the
    /// expiry timer reconcile; the client side reports the error.
    pub async fn send_transfer(&self, mut transfer: Transfer) -> Result<(), ProtocolError> {
        self.ensure_connected()?;
        transfer.ledger = self.inner.prefix.clone();
        validate_transfer(&transfer, &self.inner.prefix)?;

        let newly_prepared = self.inner.ledger.prepare(transfer.clone(), false).await?;
        if newly_prepared {
            emit(&self.inner, TrustlineEvent::OutgoingPrepare(transfer.clone()));
        } else {
            tracing::debug!(transfer_id = %transfer.id, "transfer already prepared, re-announcing");
        }

        let relay = self
            .inner
            .rpc
            .call(Method::SendTransfer, json!([transfer.for_peer()]))
            .await;
        if let Err(err) = relay {
            if self.inner.config.role.is_authoritative() {
                tracing::warn!(
                    transfer_id = %transfer.id,
                    error = %err,
                    "peer did not acknowledge transfer"
                );
            } else {
                return Err(err);
            }
        }
        if newly_prepared && self.inner.config.role.is_authoritative() {
            schedule_expiry(&self.inner, &transfer);
        }
        Ok(())
    }

    /// Present the preimage for an incoming transfer and collect it.
    ///
    /// Only the receiver may fulfill. A wrong preimage is refused and the
    /// transfer stays prepared; an expired one is rolled back on the spot.
    /// The peer is told afterwards so it releases its escrow; local
    /// fulfillment is idempotent, which makes that call safe to retry.
    pub async fn fulfill_condition(
        &self,
        transfer_id: &str,
        fulfillment: Fulfillment,
    ) -> Result<(), ProtocolError> {
        self.ensure_connected()?;
        let record = self.inner.ledger.get(transfer_id).await?;
        if !record.is_incoming {
            return Err(ProtocolError::NotAccepted(format!(
                "transfer {transfer_id} is outgoing; only its receiver may fulfill it"
            )));
        }
        ensure_fulfillable(&self.inner, &record, &fulfillment).await?;

        let was_prepared = record.state == TransferState::Prepared;
        let fulfilled = self
            .inner
            .ledger
            .fulfill(transfer_id, fulfillment.clone())
            .await?;
        if was_prepared {
            emit(
                &self.inner,
                TrustlineEvent::IncomingFulfill {
                    transfer: fulfilled.transfer.clone(),
                    fulfillment: fulfillment.clone(),
                },
            );
            check_settle_threshold(&self.inner).await;
        }
        self.inner
            .rpc
            .call(Method::FulfillCondition, json!([transfer_id, fulfillment]))
            .await?;
        Ok(())
    }

    /// Refuse an incoming prepared transfer and hand the escrow back.
    pub async fn reject_incoming_transfer(
        &self,
        transfer_id: &str,
        reason: &str,
    ) -> Result<(), ProtocolError> {
        self.ensure_connected()?;
        let record = self.inner.ledger.get(transfer_id).await?;
        if !record.is_incoming {
            return Err(ProtocolError::NotAccepted(format!(
                "transfer {transfer_id} is outgoing; only its receiver may reject it"
            )));
        }
        let was_prepared = record.state == TransferState::Prepared;
        let cancelled = self.inner.ledger.cancel(transfer_id, reason).await?;
        if was_prepared {
            emit(
                &self.inner,
                TrustlineEvent::IncomingReject {
                    transfer: cancelled.transfer.clone(),
                    reason: reason.to_string(),
                },
            );
        }
        self.inner
            .rpc
            .call(Method::RejectIncomingTransfer, json!([transfer_id, reason]))
            .await?;
        Ok(())
    }

    /// Deliver a one-way message to the peer. The outgoing event fires only
    /// after the peer acknowledged delivery.
    pub async fn send_message(&self, mut message: Message) -> Result<(), ProtocolError> {
        self.ensure_connected()?;
        message.ledger = self.inner.prefix.clone();
        validate_message(&message, &self.inner.prefix)?;
        self.inner
            .rpc
            .call(Method::SendMessage, json!([message]))
            .await?;
        emit(&self.inner, TrustlineEvent::OutgoingMessage(message));
        Ok(())
    }

    /// Ask the peer a question and wait for its request handler's answer.
    pub async fn send_request(&self, mut message: Message) -> Result<Message, ProtocolError> {
        self.ensure_connected()?;
        message.ledger = self.inner.prefix.clone();
        validate_message(&message, &self.inner.prefix)?;
        emit(&self.inner, TrustlineEvent::OutgoingRequest(message.clone()));

        let raw = self
            .inner
            .rpc
            .call(Method::SendRequest, json!([message]))
            .await?;
        let response: Message = serde_json::from_value(raw).map_err(|err| {
            ProtocolError::Serialization(format!("bad send_request response: {err}"))
        })?;
        emit(&self.inner, TrustlineEvent::IncomingResponse(response.clone()));
        Ok(response)
    }

    /// Install the handler that answers the peer's `send_request` calls.
    /// At most one handler exists at a time.
    pub async fn register_request_handler<F, Fut>(&self, handler: F) -> Result<(), ProtocolError>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Message, ProtocolError>> + Send + 'static,
    {
        let mut slot = self.inner.request_handler.write().await;
        if slot.is_some() {
            return Err(ProtocolError::RequestHandlerAlreadyRegistered);
        }
        *slot = Some(Arc::new(move |message| Box::pin(handler(message))));
        Ok(())
    }

    /// Remove the request handler, if any.
    pub async fn deregister_request_handler(&self) {
        self.inner.request_handler.write().await.take();
    }

    /// Net balance from this side's perspective. The authoritative side
    /// answers from its books; the client asks the peer and flips the sign.
    pub async fn get_balance(&self) -> Result<Decimal, ProtocolError> {
        self.ensure_connected()?;
        if self.inner.config.role.is_authoritative() {
            return self.inner.ledger.get_balance().await;
        }
        let raw = self.inner.rpc.call(Method::GetBalance, json!([])).await?;
        Ok(-parse_decimal(&raw, "balance")?)
    }

    /// The maximum balance the books allow, `0` when unset. The client
    /// proxies the peer's answer with the sign flipped.
    pub async fn get_limit(&self) -> Result<Decimal, ProtocolError> {
        self.ensure_connected()?;
        if self.inner.config.role.is_authoritative() {
            let maximum = self.inner.ledger.get_maximum().await?;
            return Ok(maximum.unwrap_or(Decimal::ZERO));
        }
        let raw = self.inner.rpc.call(Method::GetLimit, json!([])).await?;
        Ok(-parse_decimal(&raw, "limit")?)
    }

    /// Static channel metadata. The client serves the copy it fetched
    /// during [`connect`](Self::connect).
    pub async fn get_info(&self) -> Result<LedgerInfo, ProtocolError> {
        if self.inner.config.role.is_authoritative() {
            return local_info(&self.inner).await;
        }
        self.inner.peer_info.read().await.clone().ok_or_else(|| {
            ProtocolError::NotAccepted("ledger info is not available before connect".into())
        })
    }

    fn ensure_connected(&self) -> Result<(), ProtocolError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ProtocolError::NotAccepted("trustline is not connected".into()))
        }
    }
}

fn register_rpc_handlers(inner: &Arc<Inner>) -> Result<(), ProtocolError> {
    let rpc = Arc::clone(&inner.rpc);

    let ctx = Arc::clone(inner);
    rpc.add_method(Method::SendTransfer, move |params| {
        rpc_send_transfer(Arc::clone(&ctx), params)
    })?;
    let ctx = Arc::clone(inner);
    rpc.add_method(Method::SendMessage, move |params| {
        rpc_send_message(Arc::clone(&ctx), params)
    })?;
    let ctx = Arc::clone(inner);
    rpc.add_method(Method::SendRequest, move |params| {
        rpc_send_request(Arc::clone(&ctx), params)
    })?;
    let ctx = Arc::clone(inner);
    rpc.add_method(Method::FulfillCondition, move |params| {
        rpc_fulfill_condition(Arc::clone(&ctx), params)
    })?;
    let ctx = Arc::clone(inner);
    rpc.add_method(Method::RejectIncomingTransfer, move |params| {
        rpc_reject_incoming_transfer(Arc::clone(&ctx), params)
    })?;
    let ctx = Arc::clone(inner);
    rpc.add_method(Method::ExpireTransfer, move |params| {
        rpc_expire_transfer(Arc::clone(&ctx), params)
    })?;

    // queries are answered by the bookkeeping side only
    if inner.config.role.is_authoritative() {
        let ctx = Arc::clone(inner);
        rpc.add_method(Method::GetLimit, move |_params| rpc_get_limit(Arc::clone(&ctx)))?;
        let ctx = Arc::clone(inner);
        rpc.add_method(Method::GetBalance, move |_params| {
            rpc_get_balance(Arc::clone(&ctx))
        })?;
        let ctx = Arc::clone(inner);
        rpc.add_method(Method::GetInfo, move |_params| rpc_get_info(Arc::clone(&ctx)))?;
    }
    Ok(())
}

/// The peer escrowed a transfer to us.
async fn rpc_send_transfer(inner: Arc<Inner>, params: Value) -> Result<Value, ProtocolError> {
    let (transfer,): (Transfer,) = parse_params(params)?;
    validate_transfer(&transfer, &inner.prefix)?;

    let newly_prepared = inner.ledger.prepare(transfer.clone(), true).await?;
    if !newly_prepared {
        return Ok(Value::Bool(true));
    }
    if let Err(err) = inner.hooks.handle_incoming_prepare(&transfer).await {
        tracing::warn!(
            transfer_id = %transfer.id,
            error = %err,
            "incoming transfer refused, rolling back"
        );
        if let Err(cancel_err) = inner.ledger.cancel(&transfer.id, "refused").await {
            tracing::warn!(
                transfer_id = %transfer.id,
                error = %cancel_err,
                "rollback of refused transfer failed"
            );
        }
        return Err(err);
    }
    emit(&inner, TrustlineEvent::IncomingPrepare(transfer.clone()));
    schedule_expiry(&inner, &transfer);
    Ok(Value::Bool(true))
}

/// The peer fulfilled one of our outgoing transfers.
async fn rpc_fulfill_condition(inner: Arc<Inner>, params: Value) -> Result<Value, ProtocolError> {
    let (id, fulfillment): (String, Fulfillment) = parse_params(params)?;
    let record = inner.ledger.get(&id).await?;
    if record.is_incoming {
        return Err(ProtocolError::NotAccepted(format!(
            "transfer {id} is incoming; its sender cannot fulfill it"
        )));
    }
    ensure_fulfillable(&inner, &record, &fulfillment).await?;

    let was_prepared = record.state == TransferState::Prepared;
    let fulfilled = inner.ledger.fulfill(&id, fulfillment.clone()).await?;
    if was_prepared {
        emit(
            &inner,
            TrustlineEvent::OutgoingFulfill {
                transfer: fulfilled.transfer.clone(),
                fulfillment,
            },
        );
        record_outgoing_claim(&inner).await;
    }
    Ok(Value::Bool(true))
}

/// The peer refused one of our outgoing transfers.
async fn rpc_reject_incoming_transfer(
    inner: Arc<Inner>,
    params: Value,
) -> Result<Value, ProtocolError> {
    let (id, reason): (String, String) = parse_params(params)?;
    let record = inner.ledger.get(&id).await?;
    if record.is_incoming {
        return Err(ProtocolError::NotAccepted(format!(
            "transfer {id} is incoming; its sender cannot reject it"
        )));
    }
    let was_prepared = record.state == TransferState::Prepared;
    let cancelled = inner.ledger.cancel(&id, &reason).await?;
    if was_prepared {
        emit(
            &inner,
            TrustlineEvent::OutgoingReject {
                transfer: cancelled.transfer.clone(),
                reason,
            },
        );
    }
    Ok(Value::Bool(true))
}

/// The peer's timer fired; it claims the transfer has expired.
async fn rpc_expire_transfer(inner: Arc<Inner>, params: Value) -> Result<Value, ProtocolError> {
    let (id,): (String,) = parse_params(params)?;
    let record = inner.ledger.get(&id).await?;
    let Some(expires_at) = record.transfer.expires_at else {
        return Err(ProtocolError::NotAccepted(format!(
            "transfer {id} has no expiry"
        )));
    };
    if !record.transfer.is_expired_at(Utc::now()) {
        return Err(ProtocolError::NotAccepted(format!(
            "transfer {id} does not expire until {expires_at}"
        )));
    }
    let was_prepared = record.state == TransferState::Prepared;
    let cancelled = inner.ledger.cancel(&id, "expired").await?;
    if was_prepared {
        emit(&inner, cancel_event(&cancelled, "expired"));
    }
    Ok(Value::Bool(true))
}

/// The peer sent a one-way message.
async fn rpc_send_message(inner: Arc<Inner>, params: Value) -> Result<Value, ProtocolError> {
    let (message,): (Message,) = parse_params(params)?;
    validate_message(&message, &inner.prefix)?;
    emit(&inner, TrustlineEvent::IncomingMessage(message));
    Ok(Value::Bool(true))
}

/// The peer asked a question; route it through the request handler.
async fn rpc_send_request(inner: Arc<Inner>, params: Value) -> Result<Value, ProtocolError> {
    let (message,): (Message,) = parse_params(params)?;
    validate_message(&message, &inner.prefix)?;
    emit(&inner, TrustlineEvent::IncomingRequest(message.clone()));

    let handler = {
        let slot = inner.request_handler.read().await;
        slot.as_ref().map(Arc::clone)
    };
    let Some(handler) = handler else {
        return Err(ProtocolError::NotAccepted(
            "no request handler registered".into(),
        ));
    };
    let mut response = match handler(message.clone()).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "request handler failed, relaying the error");
            message.reply_with(json!({
                "error": { "type": err.kind(), "message": err.to_string() }
            }))
        }
    };
    response.ledger = inner.prefix.clone();
    validate_message(&response, &inner.prefix)?;
    emit(&inner, TrustlineEvent::OutgoingResponse(response.clone()));
    Ok(serde_json::to_value(response)?)
}

async fn rpc_get_limit(inner: Arc<Inner>) -> Result<Value, ProtocolError> {
    let maximum = inner.ledger.get_maximum().await?.unwrap_or(Decimal::ZERO);
    Ok(Value::String(maximum.to_string()))
}

async fn rpc_get_balance(inner: Arc<Inner>) -> Result<Value, ProtocolError> {
    let balance = inner.ledger.get_balance().await?;
    Ok(Value::String(balance.to_string()))
}

async fn rpc_get_info(inner: Arc<Inner>) -> Result<Value, ProtocolError> {
    Ok(serde_json::to_value(local_info(&inner).await?)?)
}

/// The channel metadata this side advertises. Limits are read from the
/// ledger so persisted overrides win over the construction-time config.
async fn local_info(inner: &Inner) -> Result<LedgerInfo, ProtocolError> {
    Ok(LedgerInfo {
        prefix: inner.prefix.clone(),
        currency_code: inner.config.currency_code.clone(),
        currency_scale: inner.config.currency_scale,
        connectors: vec![inner.peer_account.clone()],
        min_balance: inner.ledger.get_minimum().await?,
        max_balance: inner.ledger.get_maximum().await?,
    })
}

/// A transfer can be fulfilled only while prepared, unexpired, and with a
/// preimage that hashes to its condition. A transfer found expired here is
/// rolled back on the spot.
async fn ensure_fulfillable(
    inner: &Inner,
    record: &TransferRecord,
    fulfillment: &Fulfillment,
) -> Result<(), ProtocolError> {
    let id = &record.transfer.id;
    if record.state == TransferState::Cancelled {
        return Err(ProtocolError::AlreadyRejected(format!(
            "transfer {id} was already rejected or has expired"
        )));
    }
    if record.state == TransferState::Prepared && record.transfer.is_expired_at(Utc::now()) {
        let cancelled = inner.ledger.cancel(id, "expired").await?;
        emit(inner, cancel_event(&cancelled, "expired"));
        return Err(ProtocolError::AlreadyRejected(format!(
            "transfer {id} has expired"
        )));
    }
    let Some(condition) = &record.transfer.execution_condition else {
        return Err(ProtocolError::NotAccepted(format!(
            "transfer {id} has no execution condition"
        )));
    };
    if !fulfillment.validate(condition) {
        return Err(ProtocolError::NotAccepted(format!(
            "fulfillment does not hash to the condition of transfer {id}"
        )));
    }
    Ok(())
}

/// Arm a timer that rolls the transfer back once its expiry passes.
/// The state is re-checked when the timer fires, never at schedule time.
fn schedule_expiry(inner: &Arc<Inner>, transfer: &Transfer) {
    let Some(expires_at) = transfer.expires_at else {
        return;
    };
    let delay = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    if delay > MAX_EXPIRY_DELAY {
        tracing::warn!(
            transfer_id = %transfer.id,
            %expires_at,
            "expiry too far out, not arming a timer"
        );
        return;
    }
    let inner = Arc::clone(inner);
    let id = transfer.id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        expire_if_still_prepared(inner, id).await;
    });
}

async fn expire_if_still_prepared(inner: Arc<Inner>, id: String) {
    let record = match inner.ledger.get(&id).await {
        Ok(record) => record,
        Err(err) => {
            tracing::debug!(transfer_id = %id, error = %err, "expiry timer found no transfer");
            return;
        }
    };
    if record.state != TransferState::Prepared || !record.transfer.is_expired_at(Utc::now()) {
        return;
    }
    let cancelled = match inner.ledger.cancel(&id, "expired").await {
        Ok(cancelled) => cancelled,
        Err(err) => {
            // lost the race against a concurrent fulfillment
            tracing::debug!(transfer_id = %id, error = %err, "expiry timer stood down");
            return;
        }
    };
    tracing::info!(
        transfer_id = %id,
        direction = cancelled.direction(),
        "transfer expired"
    );
    emit(&inner, cancel_event(&cancelled, "expired"));
    if let Err(err) = inner.rpc.call(Method::ExpireTransfer, json!([id])).await {
        tracing::warn!(transfer_id = %id, error = %err, "peer did not acknowledge the expiry");
    }
}

/// Update the settlement high-water mark after one of our transfers was
/// fulfilled. Runs after the fulfillment is committed; nothing here can
/// undo it, so every failure is logged and swallowed.
async fn record_outgoing_claim(inner: &Inner) {
    let cumulative = match inner.ledger.get_outgoing_fulfilled().await {
        Ok(total) => total,
        Err(err) => {
            tracing::warn!(error = %err, "skipping settlement claim, could not read outgoing total");
            return;
        }
    };
    let data = match inner.hooks.create_outgoing_claim(cumulative).await {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!(error = %err, "settlement claim hook failed");
            None
        }
    };
    if let Err(err) = inner.tracker.set_if_max(TrackerEntry::new(cumulative, data)).await {
        tracing::warn!(error = %err, "settlement high-water update failed");
    }
}

async fn check_settle_threshold(inner: &Inner) {
    let Some(threshold) = inner.config.settle_threshold else {
        return;
    };
    match inner.ledger.get_balance().await {
        Ok(balance) if balance >= threshold => {
            tracing::info!(%balance, %threshold, "net balance crossed the settlement threshold");
            emit(inner, TrustlineEvent::SettleThresholdReached { balance, threshold });
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(error = %err, "could not read balance for the settlement check");
        }
    }
}

fn cancel_event(record: &TransferRecord, reason: &str) -> TrustlineEvent {
    if record.is_incoming {
        TrustlineEvent::IncomingCancel {
            transfer: record.transfer.clone(),
            reason: reason.to_string(),
        }
    } else {
        TrustlineEvent::OutgoingCancel {
            transfer: record.transfer.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Broadcast an event. Nobody listening is fine; a send only fails when
/// there are no receivers.
fn emit(inner: &Inner, event: TrustlineEvent) {
    tracing::debug!(event = event.name(), "emitting event");
    let _ = inner.event_tx.send(event);
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(params)
        .map_err(|err| ProtocolError::InvalidFields(format!("bad rpc params: {err}")))
}

fn parse_decimal(raw: &Value, what: &str) -> Result<Decimal, ProtocolError> {
    let Value::String(text) = raw else {
        return Err(ProtocolError::Serialization(format!(
            "peer returned a non-string {what}: {raw}"
        )));
    };
    Decimal::from_str(text).map_err(|err| {
        ProtocolError::Serialization(format!("peer returned an unparseable {what} {text:?}: {err}"))
    })
}
