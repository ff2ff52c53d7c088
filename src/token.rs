use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Derives order access tokens as `hex(HMAC-SHA256(secret, order_id))`.
///
/// Tokens are deterministic so that redirect links can be rebuilt without
/// server-side session state. They never expire.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
}

impl TokenIssuer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, order_id: &str) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(order_id.as_bytes());
        mac
    }

    /// Issues the access token for an order.
    pub fn issue(&self, order_id: &str) -> String {
        hex::encode(self.mac(order_id).finalize().into_bytes())
    }

    /// Checks a presented token. Only the exact issued form (lowercase hex,
    /// no padding) verifies; anything else simply fails.
    pub fn verify(&self, order_id: &str, token: &str) -> bool {
        if !token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return false;
        }
        let Ok(presented) = hex::decode(token) else {
            return false;
        };
        self.mac(order_id).verify_slice(&presented).is_ok()
    }

    /// `verify` for an optional query/body value.
    pub fn verify_opt(&self, order_id: &str, token: Option<&str>) -> bool {
        token.is_some_and(|t| self.verify(order_id, t))
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer").finish_non_exhaustive()
    }
}
