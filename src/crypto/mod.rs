//! Cryptographic primitives used by the gatekeeper.
//!
//! Provides randomness, password key derivation, authenticated encryption
//! and message authentication. Higher level modules never touch the
//! underlying crates directly.

pub mod aead;
pub mod kdf;
pub mod mac;

pub use aead::{decrypt, encrypt, random_bytes, secure_random};
pub use kdf::{HashParams, derive_key};
pub use mac::{sign, verify};

/// Length of the nonce (24 bytes for XChaCha20-Poly1305).
pub const NONCE_LEN: usize = 24;
/// Length of the encryption (block) key (32 bytes / 256 bits).
pub const BLOCK_KEY_LEN: usize = 32;
/// Length of an HMAC-SHA256 tag.
pub const TAG_LEN: usize = 32;
/// Minimum length of the authentication (hash) key.
pub const MIN_HASH_KEY_LEN: usize = 32;
/// Recommended length of the authentication (hash) key.
pub const HASH_KEY_LEN: usize = 64;
