use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use trustline_crypto::{PublicKey, Secret};
use trustline_rpc::DEFAULT_CALL_TIMEOUT;

/// Which side of the trustline this endpoint plays.
///
/// Exactly one side keeps the books; the other mirrors them and proxies
/// its queries across the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Admits transfers against the credit limits and serves balance,
    /// limit, and info queries.
    Authoritative,
    /// Trusts the authoritative side's answers; reports balances from the
    /// peer's perspective, negated.
    Client,
}

impl Role {
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Authoritative)
    }
}

/// Configuration for one side of a trustline.
#[derive(Debug, Clone)]
pub struct TrustlineConfig {
    /// This side's long-lived peering secret.
    pub secret: Secret,
    /// The peer's public key, exchanged out of band.
    pub peer_public_key: PublicKey,
    /// Currency code, e.g. "USD"; lowercased into the ledger prefix.
    pub currency_code: String,
    /// Decimal scale of the currency.
    pub currency_scale: u32,
    /// Which side of the line this endpoint plays.
    pub role: Role,
    /// Highest net balance the peer may run up; `None` is unlimited.
    pub max_balance: Option<Decimal>,
    /// Lowest net balance this side may run down to, usually negative;
    /// `None` is unlimited.
    pub min_balance: Option<Decimal>,
    /// Balance at which a settlement event fires; `None` disables it.
    pub settle_threshold: Option<Decimal>,
    /// How long an RPC call waits before timing out.
    pub call_timeout: Duration,
    /// Broadcast capacity for plugin events.
    pub event_channel_capacity: usize,
}

impl TrustlineConfig {
    /// Build a config with the required identity fields; limits default to
    /// unlimited and the call timeout to [`DEFAULT_CALL_TIMEOUT`].
    pub fn new(
        secret: Secret,
        peer_public_key: PublicKey,
        currency_code: impl Into<String>,
        currency_scale: u32,
        role: Role,
    ) -> Self {
        Self {
            secret,
            peer_public_key,
            currency_code: currency_code.into(),
            currency_scale,
            role,
            max_balance: None,
            min_balance: None,
            settle_threshold: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            event_channel_capacity: 256,
        }
    }
}
