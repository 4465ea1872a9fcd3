//! Plugin events.
//!
//! Every observable state change on the trustline is broadcast as one of
//! these. Subscribers receive them over a `tokio::sync::broadcast` channel;
//! a slow subscriber lags and drops events but can never block or fail the
//! plugin.

use rust_decimal::Decimal;

use trustline_core::message::Message;
use trustline_core::transfer::Transfer;
use trustline_crypto::Fulfillment;

/// Everything the plugin tells the application about.
///
/// `Incoming`/`Outgoing` is from this side's perspective: an incoming
/// prepare is money offered to us, an outgoing fulfill is our own transfer
/// completing.
#[derive(Debug, Clone)]
pub enum TrustlineEvent {
    /// The link is up and the channel is usable.
    Connect,

    /// The channel was shut down locally.
    Disconnect,

    /// The peer escrowed a transfer to us.
    IncomingPrepare(Transfer),

    /// A transfer we sent was escrowed locally.
    OutgoingPrepare(Transfer),

    /// We fulfilled a transfer the peer sent.
    IncomingFulfill {
        transfer: Transfer,
        fulfillment: Fulfillment,
    },

    /// The peer fulfilled a transfer we sent.
    OutgoingFulfill {
        transfer: Transfer,
        fulfillment: Fulfillment,
    },

    /// An incoming transfer was rolled back by expiry.
    IncomingCancel { transfer: Transfer, reason: String },

    /// An outgoing transfer was rolled back by expiry.
    OutgoingCancel { transfer: Transfer, reason: String },

    /// We explicitly refused an incoming transfer.
    IncomingReject { transfer: Transfer, reason: String },

    /// The peer explicitly refused a transfer we sent.
    OutgoingReject { transfer: Transfer, reason: String },

    /// The peer sent a one-way message.
    IncomingMessage(Message),

    /// We sent a one-way message and the peer acknowledged it.
    OutgoingMessage(Message),

    /// The peer asked a question that our request handler answers.
    IncomingRequest(Message),

    /// We asked the peer a question.
    OutgoingRequest(Message),

    /// The peer answered a question we asked.
    IncomingResponse(Message),

    /// Our request handler answered a question from the peer.
    OutgoingResponse(Message),

    /// The net balance crossed the configured settlement threshold.
    SettleThresholdReached { balance: Decimal, threshold: Decimal },
}

impl TrustlineEvent {
    /// Stable name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::IncomingPrepare(_) => "incoming_prepare",
            Self::OutgoingPrepare(_) => "outgoing_prepare",
            Self::IncomingFulfill { .. } => "incoming_fulfill",
            Self::OutgoingFulfill { .. } => "outgoing_fulfill",
            Self::IncomingCancel { .. } => "incoming_cancel",
            Self::OutgoingCancel { .. } => "outgoing_cancel",
            Self::IncomingReject { .. } => "incoming_reject",
            Self::OutgoingReject { .. } => "outgoing_reject",
            Self::IncomingMessage(_) => "incoming_message",
            Self::OutgoingMessage(_) => "outgoing_message",
            Self::IncomingRequest(_) => "incoming_request",
            Self::OutgoingRequest(_) => "outgoing_request",
            Self::IncomingResponse(_) => "incoming_response",
            Self::OutgoingResponse(_) => "outgoing_response",
            Self::SettleThresholdReached { .. } => "settle_threshold_reached",
        }
    }
}
