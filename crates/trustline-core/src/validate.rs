//! Field validation for transfers and messages.
//!
//! Identifiers, accounts, and prefixes share one restricted charset
//! (letters, digits, `.`, `_`, `~`, `-`); a prefix additionally ends with a
//! dot. Checks are plain character predicates, and every rejection names
//! the offending field and value.

use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::ProtocolError;
use crate::message::Message;
use crate::transfer::Transfer;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '~' | '-')
}

/// Whether `s` is a valid account identifier or transfer id.
pub fn is_account(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_name_char)
}

/// Whether `s` is a valid ledger prefix: account charset ending in `.`.
pub fn is_prefix(s: &str) -> bool {
    is_account(s) && s.ends_with('.')
}

/// Whether `s` is usable as a store namespace key. Same charset as accounts.
pub fn is_store_key(s: &str) -> bool {
    is_account(s)
}

fn check_account(field: &str, value: &str) -> Result<(), ProtocolError> {
    if !is_account(value) {
        return Err(ProtocolError::invalid_field(
            field,
            format!("not a valid identifier: {:?}", value),
        ));
    }
    Ok(())
}

fn check_object(field: &str, value: &Option<Value>) -> Result<(), ProtocolError> {
    match value {
        Some(Value::Object(_)) | None => Ok(()),
        Some(other) => Err(ProtocolError::invalid_field(
            field,
            format!("must be an object, got {}", other),
        )),
    }
}

/// Field-level checks that do not depend on the channel: identifiers,
/// positive amount, object-typed payloads, condition/expiry pairing.
/// The ledger prefix is only checked syntactically when present, since
/// outgoing transfers have it attached later by the plugin.
pub fn check_transfer_shape(transfer: &Transfer) -> Result<(), ProtocolError> {
    check_account("id", &transfer.id)?;
    check_account("from", &transfer.from)?;
    check_account("to", &transfer.to)?;

    if !transfer.ledger.is_empty() && !is_prefix(&transfer.ledger) {
        return Err(ProtocolError::invalid_field(
            "ledger",
            format!("not a valid prefix: {:?}", transfer.ledger),
        ));
    }

    if transfer.amount <= Decimal::ZERO {
        return Err(ProtocolError::invalid_field(
            "amount",
            format!("must be a positive decimal, got {:?}", transfer.amount.to_string()),
        ));
    }

    check_object("data", &transfer.data)?;
    check_object("noteToSelf", &transfer.note_to_self)?;
    check_object("custom", &transfer.custom)?;

    if transfer.execution_condition.is_some() && transfer.expires_at.is_none() {
        return Err(ProtocolError::invalid_field(
            "expiresAt",
            "required when an executionCondition is present",
        ));
    }

    Ok(())
}

/// Full transfer validation against the channel's prefix.
pub fn validate_transfer(transfer: &Transfer, prefix: &str) -> Result<(), ProtocolError> {
    check_transfer_shape(transfer)?;
    if transfer.ledger != prefix {
        return Err(ProtocolError::invalid_field(
            "ledger",
            format!("expected {:?}, got {:?}", prefix, transfer.ledger),
        ));
    }
    Ok(())
}

/// Validate a message against the channel's prefix.
pub fn validate_message(message: &Message, prefix: &str) -> Result<(), ProtocolError> {
    check_account("from", &message.from)?;
    check_account("to", &message.to)?;
    check_object("data", &message.data)?;
    if message.ledger != prefix {
        return Err(ProtocolError::invalid_field(
            "ledger",
            format!("expected {:?}, got {:?}", prefix, message.ledger),
        ));
    }
    Ok(())
}
