pub mod condition;
pub mod error;
pub mod keys;
pub mod token;

pub use condition::{Condition, Fulfillment};
pub use error::CryptoError;
pub use keys::{PublicKey, Secret, SharedSecret};
pub use token::{auth_token, prefix};
