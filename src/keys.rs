//! Cookie key material.
//!
//! A [`KeySet`] pairs the HMAC (hash) key with the encryption (block) key.
//! Its textual form is `base64(hash key)$base64(block key)` using unpadded
//! standard base64.

use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::crypto::{self, BLOCK_KEY_LEN, HASH_KEY_LEN, MIN_HASH_KEY_LEN};
use crate::error::KeyError;

const SEPARATOR: char = '$';

#[derive(Clone)]
pub struct KeySet {
    hash_key: Zeroizing<Vec<u8>>,
    block_key: Zeroizing<[u8; BLOCK_KEY_LEN]>,
}

impl KeySet {
    pub fn new(hash_key: &[u8], block_key: &[u8]) -> Result<Self, KeyError> {
        if hash_key.len() < MIN_HASH_KEY_LEN {
            return Err(KeyError::HashKeyTooShort {
                actual: hash_key.len(),
                minimum: MIN_HASH_KEY_LEN,
            });
        }
        let block_key: [u8; BLOCK_KEY_LEN] =
            block_key.try_into().map_err(|_| KeyError::BlockKeyLength {
                actual: block_key.len(),
                expected: BLOCK_KEY_LEN,
            })?;

        Ok(Self {
            hash_key: Zeroizing::new(hash_key.to_vec()),
            block_key: Zeroizing::new(block_key),
        })
    }

    /// Generates a key set with a 64 byte hash key and a 32 byte block key.
    pub fn generate() -> Result<Self, KeyError> {
        let hash_key = Zeroizing::new(
            crypto::random_bytes(HASH_KEY_LEN).map_err(|e| KeyError::Generate("hash", e))?,
        );
        let mut block_key = Zeroizing::new([0u8; BLOCK_KEY_LEN]);
        crypto::secure_random(block_key.as_mut_slice())
            .map_err(|e| KeyError::Generate("block", e))?;

        Self::new(&hash_key, block_key.as_slice())
    }

    /// Parses the textual `hash$block` form.
    pub fn parse(encoded: &str) -> Result<Self, KeyError> {
        let (hash, block) = encoded
            .trim()
            .split_once(SEPARATOR)
            .ok_or(KeyError::MissingSeparator)?;

        let hash_key = Zeroizing::new(
            STANDARD_NO_PAD
                .decode(hash)
                .map_err(|_| KeyError::Encoding("hash"))?,
        );
        let block_key = Zeroizing::new(
            STANDARD_NO_PAD
                .decode(block)
                .map_err(|_| KeyError::Encoding("block"))?,
        );

        Self::new(&hash_key, &block_key)
    }

    /// Returns the textual `hash$block` form.
    pub fn encode(&self) -> Zeroizing<String> {
        Zeroizing::new(format!(
            "{}{SEPARATOR}{}",
            STANDARD_NO_PAD.encode(self.hash_key.as_slice()),
            STANDARD_NO_PAD.encode(self.block_key.as_slice())
        ))
    }

    /// Short identifier safe to print in logs and operator output.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.hash_key.as_slice());
        hasher.update(self.block_key.as_slice());
        hasher.finalize()[..8]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    pub(crate) fn hash_key(&self) -> &[u8] {
        &self.hash_key
    }

    pub(crate) fn block_key(&self) -> &[u8] {
        self.block_key.as_slice()
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

impl PartialEq for KeySet {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        bool::from(
            self.hash_key.as_slice().ct_eq(other.hash_key.as_slice())
                & self.block_key.as_slice().ct_eq(other.block_key.as_slice()),
        )
    }
}

impl Eq for KeySet {}

/// Key sets accepted for decoding, newest first.
///
/// The first generation encodes every new value. Later generations are only
/// tried when decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRing {
    generations: Vec<KeySet>,
}

impl KeyRing {
    pub fn new(current: KeySet, previous: Option<KeySet>) -> Self {
        let mut generations = vec![current];
        generations.extend(previous);
        Self { generations }
    }

    pub fn from_generations(generations: Vec<KeySet>) -> Result<Self, KeyError> {
        if generations.is_empty() {
            return Err(KeyError::EmptyRing);
        }
        Ok(Self { generations })
    }

    pub fn current(&self) -> &KeySet {
        &self.generations[0]
    }

    pub fn previous(&self) -> Option<&KeySet> {
        self.generations.get(1)
    }

    pub fn generations(&self) -> &[KeySet] {
        &self.generations
    }

    /// Installs `next` as current and keeps the old current as previous.
    /// Anything older is evicted.
    pub fn rotate(&self, next: KeySet) -> Self {
        Self::new(next, Some(self.current().clone()))
    }
}
