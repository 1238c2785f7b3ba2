use super::{MIN_HASH_KEY_LEN, TAG_LEN};
use anyhow::{Result, anyhow, bail};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn keyed(key: &[u8]) -> Result<HmacSha256> {
    if key.len() < MIN_HASH_KEY_LEN {
        bail!("hash key must be at least {MIN_HASH_KEY_LEN} bytes");
    }
    HmacSha256::new_from_slice(key).map_err(|_| anyhow!("invalid hash key"))
}

/// Compute HMAC-SHA256 over the concatenation of `parts`
pub fn sign(key: &[u8], parts: &[&[u8]]) -> Result<[u8; TAG_LEN]> {
    let mut mac = keyed(key)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Verify a tag in constant time
pub fn verify(key: &[u8], parts: &[&[u8]], tag: &[u8]) -> bool {
    let Ok(mut mac) = keyed(key) else {
        return false;
    };
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(tag).is_ok()
}
