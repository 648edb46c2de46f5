//! Platform abstraction layer: the OS collaborators the engine consumes.
//!
//! The engine decides *what* to delete and *in what order*. Listing profile
//! records, deleting them, reading free space and telling time all sit behind
//! the traits in this module.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Months, Utc};

use crate::core::errors::{ReclaimError, Result};
use crate::core::profile::ProfileRecord;

/// Point-in-time capacity reading for one volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// OS-level profile records: enumeration and the official deletion request.
pub trait ProfileDirectory {
    /// Every profile record the OS knows about. Failure here is fatal.
    fn list_profiles(&self) -> Result<Vec<ProfileRecord>>;

    /// Delete one record and its data through the OS mechanism.
    ///
    /// Returns [`ReclaimError::ProfileVanished`] when the record no longer
    /// exists; any other error is a failed deletion.
    fn delete_profile(&self, profile: &ProfileRecord) -> Result<()>;
}

/// Fresh free-space readings. Implementations must not cache.
pub trait FreeSpaceReader {
    fn fs_stats(&self, volume: &Path) -> Result<FsStats>;

    fn free_bytes(&self, volume: &Path) -> Result<u64> {
        self.fs_stats(volume).map(|stats| stats.free_bytes)
    }
}

/// Wall clock.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// `now()` minus `months` calendar months.
    fn months_ago(&self, months: u32) -> Result<DateTime<Utc>> {
        self.now()
            .checked_sub_months(Months::new(months))
            .ok_or_else(|| {
                ReclaimError::invalid_config(format!("month cutoff {months} is out of range"))
            })
    }
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Default locations for the current platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformPaths {
    pub config_file: PathBuf,
    pub log_dir: PathBuf,
    pub volume: PathBuf,
}

impl Default for PlatformPaths {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("/etc/profile-reclaimer/config.toml"),
            log_dir: PathBuf::from("/var/log/profile-reclaimer"),
            volume: PathBuf::from("/home"),
        }
    }
}

/// Bundle of collaborators for one operating system.
pub trait Platform {
    fn profiles(&self) -> &dyn ProfileDirectory;
    fn space(&self) -> &dyn FreeSpaceReader;
    fn default_paths(&self) -> PlatformPaths;
}

/// Select the platform implementation for the running OS.
///
/// `profiles_root` only applies where profiles are plain directories (Linux).
pub fn detect_platform(profiles_root: Option<&Path>) -> Result<Box<dyn Platform>> {
    #[cfg(windows)]
    {
        let _ = profiles_root;
        Ok(Box::new(crate::platform::windows::WindowsPlatform::new()))
    }
    #[cfg(target_os = "linux")]
    {
        let root = profiles_root.map_or_else(|| PathBuf::from("/home"), Path::to_path_buf);
        Ok(Box::new(crate::platform::linux::LinuxPlatform::new(root)))
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    {
        let _ = profiles_root;
        Err(ReclaimError::UnsupportedPlatform {
            details: std::env::consts::OS.to_string(),
        })
    }
}
