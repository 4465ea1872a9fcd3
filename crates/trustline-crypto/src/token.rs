//! Peering token and ledger prefix derivation.
//!
//! Both endpoints derive the same token from the X25519 shared secret, so
//! the token doubles as a bearer credential for the transport layer and as
//! the store namespace. The ledger prefix embeds the leading token
//! characters, which makes two channels in different currencies between the
//! same pair of peers addressably distinct.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::keys::SharedSecret;

type HmacSha256 = Hmac<Sha256>;

/// Fixed HMAC input for token derivation.
const TOKEN_CONTEXT: &[u8] = b"token";

/// Number of leading token characters embedded in the ledger prefix.
const PREFIX_TOKEN_CHARS: usize = 5;

/// Derive the shared auth token: base64url(HMAC-SHA256(shared_secret, "token")).
pub fn auth_token(shared: &SharedSecret) -> String {
    let mut mac = HmacSha256::new_from_slice(shared.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(TOKEN_CONTEXT);
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

/// Build the ledger prefix for a channel:
/// `peer.<token[0..5]>.<lowercase currency code>.<scale>.`
pub fn prefix(token: &str, currency_code: &str, currency_scale: u32) -> String {
    let short = &token[..PREFIX_TOKEN_CHARS.min(token.len())];
    format!(
        "peer.{}.{}.{}.",
        short,
        currency_code.to_lowercase(),
        currency_scale
    )
}
