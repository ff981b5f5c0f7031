use hmac::{Hmac, Mac};
use sha2::Sha256;

pub(crate) type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("link expired")]
    Expired,

    #[error("invalid signature")]
    Invalid,
}

pub(crate) fn keyed(secret: &[u8]) -> anyhow::Result<HmacSha256> {
    HmacSha256::new_from_slice(secret).map_err(|e| anyhow::anyhow!("bad signing key: {e}"))
}

fn mac(base: &HmacSha256, key: &str, expires: u64) -> HmacSha256 {
    let mut mac = base.clone();
    mac.update(key.as_bytes());
    mac.update(b"\n");
    mac.update(expires.to_string().as_bytes());
    mac
}

/// Hex HMAC-SHA256 over `key` and the expiry timestamp.
pub(crate) fn sign(secret: &HmacSha256, key: &str, expires: u64) -> String {
    hex::encode(mac(secret, key, expires).finalize().into_bytes())
}

pub(crate) fn verify(secret: &HmacSha256, key: &str, expires: u64, signature: &str, now: u64) -> Result<(), SignatureError> {
    let provided = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
    mac(secret, key, expires)
        .verify_slice(&provided)
        .map_err(|_| SignatureError::Invalid)?;
    if now > expires {
        return Err(SignatureError::Expired);
    }
    Ok(())
}
