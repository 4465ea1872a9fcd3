use async_trait::async_trait;
use tokio::sync::mpsc;

/// Transport failures, reported by implementations of [`Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The other end is gone and no further frames can be delivered.
    #[error("transport closed")]
    Closed,

    /// The payload could not be delivered.
    #[error("send failed: {0}")]
    Send(String),
}

/// Carries serialized RPC frames to the peer.
///
/// Implementations must deliver frames in the order they were sent; the
/// ledger relies on prepares arriving before their fulfillments.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: String) -> Result<(), TransportError>;
}

/// In-memory transport: frames sent here pop out of the paired receiver.
pub struct DuplexTransport {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for DuplexTransport {
    async fn send(&self, payload: String) -> Result<(), TransportError> {
        self.tx.send(payload).map_err(|_| TransportError::Closed)
    }
}

/// Cross-wired transport pair for exercising two link endpoints in one
/// process. Each side gets a transport to send with and the stream of
/// frames the other side sent.
pub fn duplex() -> (
    (DuplexTransport, mpsc::UnboundedReceiver<String>),
    (DuplexTransport, mpsc::UnboundedReceiver<String>),
) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        (DuplexTransport { tx: a_tx }, b_rx),
        (DuplexTransport { tx: b_tx }, a_rx),
    )
}
