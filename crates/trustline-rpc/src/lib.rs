//! Peer RPC for trustlines.
//!
//! Frames are JSON objects flowing over a [`Transport`] in both directions.
//! [`RpcLink`] correlates calls with responses, dispatches inbound requests
//! to registered handlers, and flattens errors into their wire form.

pub mod link;
pub mod method;
pub mod transport;
pub mod wire;

pub use link::{RpcLink, DEFAULT_CALL_TIMEOUT};
pub use method::Method;
pub use transport::{duplex, DuplexTransport, Transport, TransportError};
pub use wire::{RpcErrorBody, RpcMessage, RpcRequest, RpcResponse};
