use crate::error::{PadError, Result};
use std::fs::{File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive claim on a MIDI port, shared across processes through an
/// advisory lock on `<dir>/<port>-<hash>.lock`. Released on drop.
#[derive(Debug)]
pub struct DeviceLock {
    file: File,
    path: PathBuf,
}

impl DeviceLock {
    /// # Errors
    /// Returns `PadError::DeviceBusy` if another process holds the lock,
    /// `PadError::Io` if the lock file cannot be created.
    pub fn acquire(dir: &Path, port: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.lock", file_stem(port)));
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(PadError::DeviceBusy(format!(
                    "'{port}' is in use by another instance ({})",
                    path.display()
                )));
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!("locked {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("failed to unlock {}: {e}", self.path.display());
        }
    }
}

/// Readable, filesystem-safe name for `port`. The suffix hashes the exact
/// name, so ports that sanitize alike still get their own file.
fn file_stem(port: &str) -> String {
    let mut stem: String = port
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if stem.is_empty() {
        stem.push_str("port");
    }
    format!("{stem}-{:08x}", name_hash(port))
}

/// 32-bit FNV-1a. Stable across processes and builds, unlike `std`'s hasher.
fn name_hash(name: &str) -> u32 {
    name.bytes().fold(0x811c_9dc5, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    })
}
