//! Transfer ledger for one side of a trustline.
//!
//! [`TransferLedger`] is the escrow state machine and balance accountant;
//! [`MaxValueTracker`] keeps the highest settlement claim. Both persist
//! under a shared namespace through one ordered write queue.

pub mod keys;
pub mod ledger;
pub mod tracker;

pub use ledger::{CreditLimits, TransferLedger};
pub use tracker::{MaxValueTracker, TrackerEntry};
