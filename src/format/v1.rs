//! Password record format v1.
//!
//! V1 Format:
//! ```text
//! MAGIC (4) | VERSION (1) | ARGON2_VERSION (4) | MEM_COST (4) | TIME_COST (4) | PARALLELISM (4) | SALT_LEN (1) | KEY_LEN (1) | SALT | KEY
//! ```

use super::{MAGIC, PasswordRecord};
use crate::{
    crypto::HashParams,
    format::{MAGIC_LEN, VER_LEN},
};
use anyhow::{Result, bail};

/// Current record format version.
pub const VERSION_V1: u8 = 1;

const ALG_LEN: usize = 4;
const MEM_LEN: usize = 4;
const TIME_LEN: usize = 4;
const PAR_LEN: usize = 4;
const SALT_LEN_LEN: usize = 1;
const KEY_LEN_LEN: usize = 1;

const HEADER_LEN: usize =
    MAGIC_LEN + VER_LEN + ALG_LEN + MEM_LEN + TIME_LEN + PAR_LEN + SALT_LEN_LEN + KEY_LEN_LEN;

fn read_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    let value = u32::from_le_bytes(data[*offset..*offset + 4].try_into()?);
    *offset += 4;
    Ok(value)
}

/// Parses a v1 password record.
///
/// # Errors
///
/// Returns an error if the record is truncated, carries trailing bytes or
/// has invalid parameters.
pub fn parse(data: &[u8]) -> Result<PasswordRecord> {
    if data.len() < HEADER_LEN {
        bail!("password record too short for v1");
    }

    let mut offset = MAGIC_LEN + VER_LEN;

    let algorithm_version = read_u32(data, &mut offset)?;
    let mem_cost = read_u32(data, &mut offset)?;
    let time_cost = read_u32(data, &mut offset)?;
    let parallelism = read_u32(data, &mut offset)?;

    let salt_len = data[offset];
    offset += SALT_LEN_LEN;
    let key_len = data[offset];
    offset += KEY_LEN_LEN;

    if data.len() != HEADER_LEN + usize::from(salt_len) + usize::from(key_len) {
        bail!("password record length does not match its header");
    }

    let salt = data[offset..offset + usize::from(salt_len)].to_vec();
    offset += usize::from(salt_len);

    let hash = data[offset..].to_vec();

    let params = HashParams::new(salt_len, time_cost, mem_cost, parallelism, key_len)?;

    PasswordRecord::new(algorithm_version, params, salt, hash)
}

/// Serializes a record to v1 bytes.
///
/// # Errors
///
/// Returns an error if the record is not v1.
pub fn serialize(record: &PasswordRecord) -> Result<Vec<u8>> {
    if record.version() != VERSION_V1 {
        bail!("wrong version for v1 serializer");
    }

    let params = record.params();
    let mut buf = Vec::with_capacity(HEADER_LEN + record.salt().len() + record.hash().len());

    buf.extend_from_slice(MAGIC);
    buf.push(VERSION_V1);

    buf.extend_from_slice(&record.algorithm_version().to_le_bytes());
    buf.extend_from_slice(&params.mem_cost_kib().to_le_bytes());
    buf.extend_from_slice(&params.time_cost().to_le_bytes());
    buf.extend_from_slice(&params.parallelism().to_le_bytes());
    buf.push(params.salt_len());
    buf.push(params.output_len());

    buf.extend_from_slice(record.salt());
    buf.extend_from_slice(record.hash());

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PasswordRecord {
        PasswordRecord::new(
            0x13,
            HashParams::new(16, 3, 65536, 2, 32).unwrap(),
            vec![1u8; 16],
            vec![2u8; 32],
        )
        .unwrap()
    }

    #[test]
    fn header_fields_survive_serialization() {
        let bytes = serialize(&record()).unwrap();
        let parsed = parse(&bytes).unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + 16 + 32);
        assert_eq!(parsed.version(), VERSION_V1);
        assert_eq!(parsed.algorithm_version(), 0x13);
        assert_eq!(parsed.params().mem_cost_kib(), 65536);
        assert_eq!(parsed.params().time_cost(), 3);
        assert_eq!(parsed.params().parallelism(), 2);
        assert_eq!(parsed.salt(), &[1u8; 16]);
        assert_eq!(parsed.hash(), &[2u8; 32]);
    }

    #[test]
    fn invalid_magic_fails() {
        let mut data = serialize(&record()).unwrap();
        data[..4].copy_from_slice(b"FAIL");

        assert!(super::super::parse(&data).is_err());
    }

    #[test]
    fn truncated_record_fails() {
        let data = serialize(&record()).unwrap();
        assert!(parse(&data[..data.len() - 1]).is_err());
        assert!(parse(&data[..10]).is_err());
    }

    #[test]
    fn trailing_bytes_fail() {
        let mut data = serialize(&record()).unwrap();
        data.push(0);
        assert!(parse(&data).is_err());
    }

    #[test]
    fn zero_time_cost_fails() {
        let mut data = serialize(&record()).unwrap();
        let offset = MAGIC_LEN + VER_LEN + ALG_LEN + MEM_LEN;
        data[offset..offset + TIME_LEN].copy_from_slice(&0u32.to_le_bytes());
        assert!(parse(&data).is_err());
    }
}
