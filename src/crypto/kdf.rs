use anyhow::{Context, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

/// Argon2 version every new record is derived with.
pub const ARGON2_VERSION: Version = Version::V0x13;

const MIN_SALT_LEN: u8 = 8;
const MIN_OUTPUT_LEN: u8 = 4;
const MAX_PARALLELISM: u32 = 0x00ff_ffff;
// upper bounds keep a decoded record from demanding absurd work
const MAX_TIME_COST: u32 = 1 << 16;
const MAX_MEM_COST_KIB: u32 = 4 * 1024 * 1024; // 4 GiB
// iterations follow the CPU count but stop growing here
const MAX_DEFAULT_TIME_COST: u32 = 8;

/// Cost parameters for Argon2id password hashing.
///
/// Chosen once at startup. Every encoded record embeds the values it was
/// produced with, so changing them never invalidates existing hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    salt_len: u8,
    time_cost: u32,
    mem_cost_kib: u32,
    parallelism: u32,
    output_len: u8,
}

impl Default for HashParams {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);

        Self {
            salt_len: 32,
            // default number of iterations
            time_cost: cpus.clamp(1, MAX_DEFAULT_TIME_COST),
            // default memory cost
            mem_cost_kib: 64 * 1024, // 64 MiB
            // default number of threads
            parallelism: cpus,
            output_len: 32,
        }
    }
}

impl HashParams {
    pub fn new(
        salt_len: u8,
        time_cost: u32,
        mem_cost_kib: u32,
        parallelism: u32,
        output_len: u8,
    ) -> Result<Self> {
        let params = Self {
            salt_len,
            time_cost,
            mem_cost_kib,
            parallelism,
            output_len,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn salt_len(&self) -> u8 {
        self.salt_len
    }

    pub fn time_cost(&self) -> u32 {
        self.time_cost
    }

    pub fn mem_cost_kib(&self) -> u32 {
        self.mem_cost_kib
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn output_len(&self) -> u8 {
        self.output_len
    }

    pub fn validate(&self) -> Result<()> {
        if self.salt_len < MIN_SALT_LEN {
            anyhow::bail!("argon2 salt must be at least {MIN_SALT_LEN} bytes");
        }
        if self.time_cost < 1 || self.time_cost > MAX_TIME_COST {
            anyhow::bail!("argon2 time cost must be between 1 and {MAX_TIME_COST}");
        }
        if self.parallelism < 1 || self.parallelism > MAX_PARALLELISM {
            anyhow::bail!("argon2 parallelism must be between 1 and {MAX_PARALLELISM}");
        }
        if self.mem_cost_kib < 8 * self.parallelism {
            anyhow::bail!("argon2 memory cost must be at least 8 * parallelism");
        }
        if self.mem_cost_kib > MAX_MEM_COST_KIB {
            anyhow::bail!("argon2 memory cost must be at most {MAX_MEM_COST_KIB} KiB");
        }
        if self.output_len < MIN_OUTPUT_LEN {
            anyhow::bail!("argon2 output must be at least {MIN_OUTPUT_LEN} bytes");
        }
        Ok(())
    }
}

/// Derive `params.output_len()` bytes from `password` with Argon2id.
///
/// The salt is taken as given; its length is not required to match
/// `params.salt_len()` so that records hashed under older settings verify.
pub fn derive_key(password: &str, salt: &[u8], params: HashParams) -> Result<Zeroizing<Vec<u8>>> {
    params.validate().context("invalid Argon2 parameters")?;

    let argon_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(usize::from(params.output_len)),
    )
    .map_err(|e| anyhow::anyhow!("failed to construct Argon2 params: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, ARGON2_VERSION, argon_params);

    let mut key = Zeroizing::new(vec![0u8; usize::from(params.output_len)]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| anyhow::anyhow!("argon2 key derivation failed {e}"))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> HashParams {
        HashParams::new(16, 1, 64, 1, 32).unwrap()
    }

    #[test]
    fn kdf_is_deterministic() {
        let salt = [42u8; 16];

        let k1 = derive_key("password", &salt, cheap()).unwrap();
        let k2 = derive_key("password", &salt, cheap()).unwrap();

        assert_eq!(k1, k2);
    }

    #[test]
    fn kdf_params_affect_output() {
        let salt = [7u8; 16];

        let p1 = HashParams::new(16, 1, 64, 1, 32).unwrap();
        let p2 = HashParams::new(16, 2, 64, 1, 32).unwrap();

        let k1 = derive_key("pw", &salt, p1).unwrap();
        let k2 = derive_key("pw", &salt, p2).unwrap();

        assert_ne!(k1, k2);
    }

    #[test]
    fn output_len_is_honoured() {
        let params = HashParams::new(16, 1, 64, 1, 48).unwrap();
        let key = derive_key("pw", &[1u8; 16], params).unwrap();
        assert_eq!(key.len(), 48);
    }

    #[test]
    fn invalid_params_fail_gracefully() {
        assert!(HashParams::new(0, 0, 0, 0, 0).is_err());
        assert!(HashParams::new(16, 0, 64, 1, 32).is_err());
        assert!(HashParams::new(16, 1, 8, 2, 32).is_err());
        assert!(HashParams::new(4, 1, 64, 1, 32).is_err());
    }

    #[test]
    fn oversized_params_are_rejected() {
        assert!(HashParams::new(16, MAX_TIME_COST + 1, 64, 1, 32).is_err());
        assert!(HashParams::new(16, 1, MAX_MEM_COST_KIB + 1, 1, 32).is_err());
        assert!(HashParams::new(16, 1, u32::MAX, 1, 32).is_err());
        assert!(HashParams::new(16, MAX_TIME_COST, MAX_MEM_COST_KIB, 1, 32).is_ok());
    }

    #[test]
    fn default_params_are_valid() {
        let params = HashParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.mem_cost_kib(), 64 * 1024);
        assert_eq!(params.output_len(), 32);
    }
}
