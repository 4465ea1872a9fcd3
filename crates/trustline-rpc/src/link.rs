//! Correlated RPC over a frame transport.
//!
//! [`RpcLink`] owns both directions: outgoing calls get a fresh UUIDv7
//! correlation id and a oneshot waiter, incoming frames are classified and
//! either dispatched to a registered method handler or matched against a
//! waiter. The caller feeds raw inbound frames into [`RpcLink::receive`];
//! the link never reads from the transport itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tokio::time::timeout;
use uuid::Uuid;

use trustline_core::error::ProtocolError;

use crate::method::Method;
use crate::transport::Transport;
use crate::wire::{RpcErrorBody, RpcMessage, RpcRequest, RpcResponse};

/// How long a call waits for its response before giving up.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

type MethodHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ProtocolError>> + Send + Sync>;

type Waiter = oneshot::Sender<Result<Value, ProtocolError>>;

/// One end of a bilateral RPC link.
pub struct RpcLink {
    transport: Arc<dyn Transport>,
    call_timeout: Duration,
    pending: DashMap<Uuid, Waiter>,
    handlers: DashMap<Method, MethodHandler>,
    notifications: broadcast::Sender<RpcResponse>,
}

impl RpcLink {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_timeout(transport, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(transport: Arc<dyn Transport>, call_timeout: Duration) -> Self {
        let (notifications, _) = broadcast::channel(64);
        Self {
            transport,
            call_timeout,
            pending: DashMap::new(),
            handlers: DashMap::new(),
            notifications,
        }
    }

    /// Response frames that carry `id: null` correlate with nothing; they
    /// are surfaced here instead of resolving a call.
    pub fn notification_receiver(&self) -> broadcast::Receiver<RpcResponse> {
        self.notifications.subscribe()
    }

    /// Register the handler invoked when the peer calls `method`.
    ///
    /// Each method takes exactly one handler; registering twice is refused.
    pub fn add_method<F, Fut>(&self, method: Method, handler: F) -> Result<(), ProtocolError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ProtocolError>> + Send + 'static,
    {
        match self.handlers.entry(method) {
            Entry::Occupied(_) => Err(ProtocolError::NotAccepted(format!(
                "method {method} already has a handler"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(move |params| Box::pin(handler(params))));
                Ok(())
            }
        }
    }

    /// Invoke `method` on the peer and wait for the correlated response.
    ///
    /// Gives up with a `TimeoutError` after the configured window; a
    /// response arriving later is discarded.
    pub async fn call(&self, method: Method, params: Value) -> Result<Value, ProtocolError> {
        let id = Uuid::now_v7();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let request = RpcRequest {
            method,
            params,
            id: Some(id),
        };
        if let Err(err) = self.send_frame(&RpcMessage::Request(request)).await {
            self.pending.remove(&id);
            return Err(err);
        }

        match timeout(self.call_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                self.pending.remove(&id);
                Err(ProtocolError::Transport(format!(
                    "link closed while waiting for {method} response"
                )))
            }
            Err(_) => {
                self.pending.remove(&id);
                tracing::warn!(method = %method, request_id = %id, "rpc call timed out");
                Err(ProtocolError::Timeout(format!(
                    "no response to {} within {}ms",
                    method,
                    self.call_timeout.as_millis()
                )))
            }
        }
    }

    /// Fire-and-forget invocation: the frame carries no id and the peer
    /// sends no reply.
    pub async fn notify(&self, method: Method, params: Value) -> Result<(), ProtocolError> {
        let request = RpcRequest {
            method,
            params,
            id: None,
        };
        self.send_frame(&RpcMessage::Request(request)).await
    }

    /// Feed one raw inbound frame into the link.
    ///
    /// Requests are dispatched to their handler and answered; responses
    /// resolve the matching waiter. A frame that is not valid JSON is an
    /// error; a malformed request still gets an error reply when its
    /// correlation id is salvageable.
    pub async fn receive(&self, raw: &str) -> Result<(), ProtocolError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| ProtocolError::Serialization(format!("unparseable frame: {err}")))?;

        if value.get("method").is_some() {
            // pull the id out first so a strict parse failure can still be
            // answered
            let id = value
                .get("id")
                .and_then(|raw_id| serde_json::from_value::<Option<Uuid>>(raw_id.clone()).ok())
                .flatten();
            match serde_json::from_value::<RpcRequest>(value) {
                Ok(request) => self.handle_request(request).await,
                Err(err) => {
                    tracing::warn!(error = %err, "rejecting malformed request frame");
                    match id {
                        Some(id) => {
                            let refusal = ProtocolError::InvalidFields(format!(
                                "unparseable request: {err}"
                            ));
                            self.respond(id, Err(refusal)).await
                        }
                        None => Ok(()),
                    }
                }
            }
        } else {
            let response: RpcResponse = serde_json::from_value(value)?;
            self.handle_response(response);
            Ok(())
        }
    }

    async fn handle_request(&self, request: RpcRequest) -> Result<(), ProtocolError> {
        let handler = self
            .handlers
            .get(&request.method)
            .map(|entry| Arc::clone(entry.value()));

        let outcome = match handler {
            Some(handler) => handler(request.params).await,
            None => Err(ProtocolError::NotAccepted(format!(
                "no handler registered for method {}",
                request.method
            ))),
        };

        match request.id {
            Some(id) => self.respond(id, outcome).await,
            None => {
                if let Err(err) = outcome {
                    tracing::warn!(
                        method = %request.method,
                        error = %err,
                        "notification handler failed"
                    );
                }
                Ok(())
            }
        }
    }

    fn handle_response(&self, response: RpcResponse) {
        let Some(id) = response.id else {
            tracing::debug!("response frame without id, surfacing as a notification");
            let _ = self.notifications.send(response);
            return;
        };
        let Some((_, waiter)) = self.pending.remove(&id) else {
            tracing::debug!(request_id = %id, "discarding response for unknown or timed out request");
            return;
        };
        let outcome = match response.error {
            Some(body) => Err(body.into_error()),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };
        if waiter.send(outcome).is_err() {
            tracing::debug!(request_id = %id, "caller went away before the response arrived");
        }
    }

    async fn respond(
        &self,
        id: Uuid,
        outcome: Result<Value, ProtocolError>,
    ) -> Result<(), ProtocolError> {
        let response = match outcome {
            Ok(result) => RpcResponse {
                result: Some(result),
                error: None,
                id: Some(id),
            },
            Err(err) => RpcResponse {
                result: None,
                error: Some(RpcErrorBody::from_error(&err)),
                id: Some(id),
            },
        };
        self.send_frame(&RpcMessage::Response(response)).await
    }

    async fn send_frame(&self, message: &RpcMessage) -> Result<(), ProtocolError> {
        let payload = serde_json::to_string(message)?;
        self.transport
            .send(payload)
            .await
            .map_err(|err| ProtocolError::Transport(err.to_string()))
    }
}
