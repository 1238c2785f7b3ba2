//! On-disk key file used by the operator CLI.
//!
//! The file is a small JSON document holding the current and previous key
//! sets in their textual form plus the time of the last rotation.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto;
use crate::keys::{KeyRing, KeySet};

#[derive(Serialize, Deserialize)]
struct StoredKeys {
    current: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    previous: Option<String>,
    rotated_at: DateTime<Utc>,
}

impl Drop for StoredKeys {
    fn drop(&mut self) {
        self.current.zeroize();
        if let Some(previous) = self.previous.as_mut() {
            previous.zeroize();
        }
    }
}

/// Keys read back from a key file.
#[derive(Debug, Clone)]
pub struct KeyFileContents {
    pub keys: KeyRing,
    pub rotated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct KeyFile {
    path: PathBuf,
}

impl KeyFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<KeyFileContents> {
        let data = Zeroizing::new(
            fs::read(&self.path)
                .with_context(|| format!("failed to read key file {}", self.path.display()))?,
        );
        let stored: StoredKeys =
            serde_json::from_slice(&data).context("key file is not valid JSON")?;

        let current = KeySet::parse(&stored.current).context("invalid current key")?;
        let previous = match stored.previous.as_deref() {
            Some(key) => Some(KeySet::parse(key).context("invalid previous key")?),
            None => None,
        };

        Ok(KeyFileContents {
            keys: KeyRing::new(current, previous),
            rotated_at: stored.rotated_at,
        })
    }

    /// Writes the current and previous generations of `keys`. Older
    /// generations are not persisted.
    pub fn save(&self, keys: &KeyRing, rotated_at: DateTime<Utc>) -> Result<()> {
        let stored = StoredKeys {
            current: keys.current().encode().to_string(),
            previous: keys.previous().map(|k| k.encode().to_string()),
            rotated_at,
        };
        let data = Zeroizing::new(serde_json::to_vec_pretty(&stored)?);

        self.write_atomic(&data)
    }

    /// Crash-safe write: temp file in the same directory, fsync, atomic
    /// rename, fsync of the directory. A crash leaves either the old or the
    /// new file, never a partial one.
    fn write_atomic(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut tmp_file = options
            .open(&tmp_path)
            .context("failed to create temporary file")?;

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Some(parent) = self.path.parent() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }

        Ok(())
    }

    /// `filename.tmp.<randomhex>` next to the target.
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8];
        crypto::secure_random(&mut buf)?;

        let suffix = buf.iter().map(|b| format!("{:02x}", b)).collect::<String>();
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| anyhow!("key file path has no file name"))?
            .to_string_lossy();

        Ok(self.path.with_file_name(format!("{file_name}.tmp.{suffix}")))
    }

    /// Uses `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH`.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            fs::rename(tmp_path, &self.path)?;
            return Ok(());
        }

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY: both buffers are NUL-terminated UTF-16 and outlive the call.
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context("atomic replace failed");
        }

        Ok(())
    }

    /// `rename()` is atomic on the same filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}
