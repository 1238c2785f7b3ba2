//! Storable encoding of hashed passwords.
//!
//! Provides version-aware parsing and serialization of password records. A
//! record carries everything needed to verify a password later: the Argon2
//! version, the cost parameters, the salt and the derived key.

use anyhow::{Context, Result, bail};
use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};

use crate::crypto::HashParams;

pub mod v1;

/// Magic bytes identifying a gatekeeper password record ("GKPW").
pub const MAGIC: &[u8; 4] = b"GKPW";
/// Length of magic bytes.
pub const MAGIC_LEN: usize = 4;
/// Length of version field.
pub const VER_LEN: usize = 1;
/// Latest format version
pub const CURRENT_VERSION: u8 = v1::VERSION_V1;

/// A hashed password together with the parameters it was hashed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRecord {
    version: u8,
    algorithm_version: u32,
    params: HashParams,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl PasswordRecord {
    /// Creates a record in the current format.
    ///
    /// # Errors
    ///
    /// Returns an error if the salt or key lengths do not fit the format or
    /// disagree with `params`.
    pub fn new(
        algorithm_version: u32,
        params: HashParams,
        salt: Vec<u8>,
        hash: Vec<u8>,
    ) -> Result<Self> {
        if salt.len() != usize::from(params.salt_len()) {
            bail!("salt length does not match parameters");
        }
        if hash.len() != usize::from(params.output_len()) {
            bail!("key length does not match parameters");
        }

        Ok(Self {
            version: CURRENT_VERSION,
            algorithm_version,
            params,
            salt,
            hash,
        })
    }

    /// Returns the record format version.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the Argon2 version the key was derived with.
    pub fn algorithm_version(&self) -> u32 {
        self.algorithm_version
    }

    /// Returns the cost parameters embedded in the record.
    pub fn params(&self) -> HashParams {
        self.params
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Returns the derived key.
    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    /// Encodes the record into a printable string for storage.
    pub fn encode(&self) -> Result<String> {
        Ok(STANDARD_NO_PAD.encode(serialize(self)?))
    }

    /// Decodes a string produced by [`PasswordRecord::encode`].
    pub fn decode(encoded: &str) -> Result<Self> {
        let data = STANDARD_NO_PAD
            .decode(encoded.trim())
            .context("password record is not valid base64")?;
        parse(&data)
    }
}

/// Parses a serialized record.
///
/// Automatically dispatches to the appropriate version parser.
///
/// # Errors
///
/// Returns an error if:
/// - The data is too short
/// - The magic bytes are invalid
/// - The version is unsupported
pub fn parse(data: &[u8]) -> Result<PasswordRecord> {
    if data.len() < MAGIC_LEN + VER_LEN {
        bail!("password record too short");
    }

    if &data[..MAGIC_LEN] != MAGIC {
        bail!("invalid magic");
    }

    let version = data[MAGIC_LEN];

    match version {
        1 => v1::parse(data),
        _ => bail!("unsupported password record version {version}"),
    }
}

/// Serializes a record to bytes.
///
/// # Errors
///
/// Returns an error if the version is unsupported.
pub fn serialize(record: &PasswordRecord) -> Result<Vec<u8>> {
    match record.version() {
        1 => v1::serialize(record),
        v => bail!("unsupported password record version {v}"),
    }
}
