use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A non-value message between the two endpoints: quotes, routing chatter,
/// or one half of a request/response exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Ledger prefix of the channel.
    #[serde(default)]
    pub ledger: String,
    /// Sender account.
    pub from: String,
    /// Receiver account.
    pub to: String,
    /// Structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Message {
    /// Swap `from`/`to`, the shape of a reply.
    pub fn reply_with(&self, data: Value) -> Message {
        Message {
            ledger: self.ledger.clone(),
            from: self.to.clone(),
            to: self.from.clone(),
            data: Some(data),
        }
    }
}

/// Static channel metadata served by `get_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerInfo {
    /// The channel's ledger prefix.
    pub prefix: String,
    /// Currency code, e.g. "USD".
    pub currency_code: String,
    /// Decimal scale of the currency.
    pub currency_scale: u32,
    /// Accounts that forward onwards from this channel.
    #[serde(default)]
    pub connectors: Vec<String>,
    /// Lowest net balance the authoritative side will allow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_balance: Option<Decimal>,
    /// Highest net balance the authoritative side will allow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_balance: Option<Decimal>,
}
