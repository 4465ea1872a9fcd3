pub mod error;
pub mod message;
pub mod transfer;
pub mod validate;

pub use error::ProtocolError;
pub use message::{LedgerInfo, Message};
pub use transfer::{Transfer, TransferBuilder, TransferRecord, TransferState};
