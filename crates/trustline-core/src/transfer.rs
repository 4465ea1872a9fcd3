use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use trustline_crypto::{Condition, Fulfillment};

use crate::error::ProtocolError;
use crate::validate;

/// A conditional transfer between the two endpoints of a channel.
///
/// The same object exists on both sides: outgoing for the sender, incoming
/// for the receiver. `id` is the caller-supplied idempotency key; replaying
/// a transfer with the same id and identical contents is a no-op, replaying
/// with different contents is a `DuplicateIdError`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    /// Idempotency key for this transfer.
    pub id: String,
    /// Sender account (`<prefix><sender public key>`).
    pub from: String,
    /// Receiver account.
    pub to: String,
    /// Ledger prefix of the channel this transfer belongs to.
    #[serde(default)]
    pub ledger: String,
    /// Positive decimal amount, serialized as a string on the wire.
    pub amount: Decimal,
    /// SHA-256 hashlock; when present the transfer is held in escrow until
    /// fulfilled or expired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_condition: Option<Condition>,
    /// Absolute expiry; required whenever a condition is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// End-to-end payload, visible to the peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Local-only annotation, stripped before the transfer goes on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_to_self: Option<Value>,
    /// Free-form extension fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

impl Transfer {
    /// Create a new TransferBuilder.
    pub fn builder() -> TransferBuilder {
        TransferBuilder::default()
    }

    /// Whether this transfer carries an execution condition.
    pub fn is_conditional(&self) -> bool {
        self.execution_condition.is_some()
    }

    /// Whether the transfer has expired relative to the given instant.
    /// A transfer without `expires_at` never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => now > expiry,
            None => false,
        }
    }

    /// Copy of this transfer with `note_to_self` removed, the form that is
    /// relayed to the peer.
    pub fn for_peer(&self) -> Transfer {
        Transfer {
            note_to_self: None,
            ..self.clone()
        }
    }
}

/// Lifecycle state of a transfer.
///
/// `Prepared` is the only non-terminal state; a prepared transfer moves to
/// exactly one of the terminal states and never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    /// Held in escrow, counted in the `*_and_prepared` balances.
    Prepared,
    /// Completed with a valid preimage; counted in the fulfilled balances.
    Fulfilled,
    /// Rolled back by rejection, expiry, or failure.
    Cancelled,
}

impl TransferState {
    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Prepared)
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prepared => write!(f, "prepared"),
            Self::Fulfilled => write!(f, "fulfilled"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A transfer together with its local bookkeeping: direction, state, and
/// the fulfillment once one was presented. This is the unit the ledger
/// caches and persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub transfer: Transfer,
    pub is_incoming: bool,
    pub state: TransferState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<Fulfillment>,
}

impl TransferRecord {
    /// Create a freshly prepared record.
    pub fn new_prepared(transfer: Transfer, is_incoming: bool) -> Self {
        Self {
            transfer,
            is_incoming,
            state: TransferState::Prepared,
            fulfillment: None,
        }
    }

    /// Human-readable direction label, used in logs and error messages.
    pub fn direction(&self) -> &'static str {
        if self.is_incoming {
            "incoming"
        } else {
            "outgoing"
        }
    }
}

/// Builder for constructing Transfer instances.
#[derive(Default)]
pub struct TransferBuilder {
    id: Option<String>,
    from: Option<String>,
    to: Option<String>,
    ledger: Option<String>,
    amount: Option<Decimal>,
    execution_condition: Option<Condition>,
    expires_at: Option<DateTime<Utc>>,
    data: Option<Value>,
    note_to_self: Option<Value>,
    custom: Option<Value>,
}

impl TransferBuilder {
    /// Set the transfer id. A UUIDv7 is generated when omitted.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the sender account.
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Set the receiver account.
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Set the ledger prefix. Usually left empty; the plugin attaches its
    /// own prefix when sending.
    pub fn ledger(mut self, ledger: impl Into<String>) -> Self {
        self.ledger = Some(ledger.into());
        self
    }

    /// Set the amount.
    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Attach an execution condition.
    pub fn execution_condition(mut self, condition: Condition) -> Self {
        self.execution_condition = Some(condition);
        self
    }

    /// Set the absolute expiry.
    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Attach an end-to-end data object.
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a local-only note.
    pub fn note_to_self(mut self, note: Value) -> Self {
        self.note_to_self = Some(note);
        self
    }

    /// Attach protocol extension fields.
    pub fn custom(mut self, custom: Value) -> Self {
        self.custom = Some(custom);
        self
    }

    /// Build the Transfer.
    pub fn build(self) -> Result<Transfer, ProtocolError> {
        let from = self
            .from
            .ok_or_else(|| ProtocolError::invalid_field("from", "missing"))?;
        let to = self
            .to
            .ok_or_else(|| ProtocolError::invalid_field("to", "missing"))?;
        let amount = self
            .amount
            .ok_or_else(|| ProtocolError::invalid_field("amount", "missing"))?;

        let transfer = Transfer {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::now_v7().to_string()),
            from,
            to,
            ledger: self.ledger.unwrap_or_default(),
            amount,
            execution_condition: self.execution_condition,
            expires_at: self.expires_at,
            data: self.data,
            note_to_self: self.note_to_self,
            custom: self.custom,
        };

        validate::check_transfer_shape(&transfer)?;
        Ok(transfer)
    }
}
