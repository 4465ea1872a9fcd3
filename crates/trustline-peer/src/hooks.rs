use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use trustline_core::error::ProtocolError;
use trustline_core::transfer::Transfer;

/// Application hooks into the transfer lifecycle.
///
/// The plugin calls these at fixed points and never holds ledger locks
/// while doing so.
#[async_trait]
pub trait SettlementHooks: Send + Sync {
    /// Runs after an incoming transfer is escrowed but before the peer
    /// hears a success. An error rolls the transfer back and travels to
    /// the peer as the refusal.
    async fn handle_incoming_prepare(&self, transfer: &Transfer) -> Result<(), ProtocolError>;

    /// Produce the claim payload attached to the settlement high-water
    /// entry after one of our transfers is fulfilled. `cumulative` is the
    /// total outgoing value settled so far.
    async fn create_outgoing_claim(
        &self,
        cumulative: Decimal,
    ) -> Result<Option<Value>, ProtocolError>;
}

/// Hooks that accept every transfer and claim nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

#[async_trait]
impl SettlementHooks for NoopHooks {
    async fn handle_incoming_prepare(&self, _transfer: &Transfer) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn create_outgoing_claim(
        &self,
        _cumulative: Decimal,
    ) -> Result<Option<Value>, ProtocolError> {
        Ok(None)
    }
}
