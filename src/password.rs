//! Password hashing and verification.

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::{self, HashParams, kdf::ARGON2_VERSION};
use crate::error::PasswordError;
use crate::format::PasswordRecord;

/// Hash `password` with a fresh salt and return the encoded record.
pub fn hash_password(password: &str, params: HashParams) -> Result<String, PasswordError> {
    let salt = crypto::random_bytes(usize::from(params.salt_len())).map_err(PasswordError::Entropy)?;
    let key = crypto::derive_key(password, &salt, params).map_err(PasswordError::Hashing)?;

    let record = PasswordRecord::new(ARGON2_VERSION as u32, params, salt, key.to_vec())
        .map_err(PasswordError::Hashing)?;

    record.encode().map_err(PasswordError::Hashing)
}

/// Check `password` against an encoded record.
///
/// The key is re-derived with the parameters stored in the record, never the
/// current defaults, and compared in constant time.
pub fn verify_password(password: &str, encoded: &str) -> Result<bool, PasswordError> {
    let record = PasswordRecord::decode(encoded).map_err(PasswordError::Malformed)?;

    let expected = ARGON2_VERSION as u32;
    if record.algorithm_version() != expected {
        return Err(PasswordError::UnsupportedAlgorithm {
            found: record.algorithm_version(),
            expected,
        });
    }

    let derived: Zeroizing<Vec<u8>> = crypto::derive_key(password, record.salt(), record.params())
        .map_err(PasswordError::Hashing)?;

    Ok(bool::from(derived.as_slice().ct_eq(record.hash())))
}
