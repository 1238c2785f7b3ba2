use super::{BLOCK_KEY_LEN, NONCE_LEN};
use anyhow::{Result, anyhow, bail};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use getrandom::fill;
use zeroize::Zeroizing;

/// Fill buffer with cryptographically secure random bytes
pub fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| anyhow!("OS random generator unavailable"))
}

/// Allocate `len` random bytes
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    secure_random(&mut buf)?;
    Ok(buf)
}

/// Encrypt plaintext, binding `aad` to the ciphertext
pub fn encrypt(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN])> {
    if key.len() != BLOCK_KEY_LEN {
        bail!("block key must be {BLOCK_KEY_LEN} bytes");
    }
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce = [0u8; NONCE_LEN];
    secure_random(&mut nonce)?;

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| anyhow!("encryption failed"))?;

    Ok((ciphertext, nonce))
}

/// Decrypt ciphertext produced by [`encrypt`] with the same `aad`
pub fn decrypt(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if key.len() != BLOCK_KEY_LEN || nonce.len() != NONCE_LEN {
        bail!("invalid key or nonce length");
    }
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| anyhow!("invalid key or corrupted data"))?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [9u8; BLOCK_KEY_LEN];
        let (ciphertext, nonce) = encrypt(&key, b"session", b"auth").unwrap();

        let plaintext = decrypt(&key, &nonce, &ciphertext, b"auth").unwrap();
        assert_eq!(plaintext.as_slice(), b"session");
    }

    #[test]
    fn decrypt_with_other_aad_fails() {
        let key = [9u8; BLOCK_KEY_LEN];
        let (ciphertext, nonce) = encrypt(&key, b"session", b"auth").unwrap();

        assert!(decrypt(&key, &nonce, &ciphertext, b"reset").is_err());
    }

    #[test]
    fn decrypt_with_other_key_fails() {
        let (ciphertext, nonce) = encrypt(&[1u8; BLOCK_KEY_LEN], b"session", b"").unwrap();
        assert!(decrypt(&[2u8; BLOCK_KEY_LEN], &nonce, &ciphertext, b"").is_err());
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(encrypt(&[1u8; 16], b"session", b"").is_err());
    }

    #[test]
    fn nonces_are_fresh() {
        let key = [3u8; BLOCK_KEY_LEN];
        let (_, n1) = encrypt(&key, b"x", b"").unwrap();
        let (_, n2) = encrypt(&key, b"x", b"").unwrap();
        assert_ne!(n1, n2);
    }
}
