use serde::{Deserialize, Serialize};

/// The closed set of RPC methods a peer may invoke.
///
/// Frames carrying anything else fail to parse and are answered with an
/// `InvalidFieldsError` instead of reaching dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    SendTransfer,
    SendMessage,
    SendRequest,
    FulfillCondition,
    RejectIncomingTransfer,
    ExpireTransfer,
    GetLimit,
    GetBalance,
    GetInfo,
}

impl Method {
    /// The wire name of this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendTransfer => "send_transfer",
            Self::SendMessage => "send_message",
            Self::SendRequest => "send_request",
            Self::FulfillCondition => "fulfill_condition",
            Self::RejectIncomingTransfer => "reject_incoming_transfer",
            Self::ExpireTransfer => "expire_transfer",
            Self::GetLimit => "get_limit",
            Self::GetBalance => "get_balance",
            Self::GetInfo => "get_info",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
