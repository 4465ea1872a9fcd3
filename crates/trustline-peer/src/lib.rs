//! Bilateral trustline plugin.
//!
//! A trustline is a payment channel between exactly two peers who extend
//! each other credit. Each side runs a [`Trustline`]; transfers are
//! escrowed on both sets of books, fulfilled with a SHA-256 preimage, and
//! every state change is broadcast as a [`TrustlineEvent`].

pub mod config;
pub mod events;
pub mod hooks;
pub mod plugin;

pub use config::{Role, TrustlineConfig};
pub use events::TrustlineEvent;
pub use hooks::{NoopHooks, SettlementHooks};
pub use plugin::Trustline;
