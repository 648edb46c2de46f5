//! Linux collaborators: home directories as profiles, `userdel` as the
//! official deletion mechanism, `statvfs` for free space.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use nix::sys::statvfs::statvfs;
use nix::unistd::User;

use crate::core::errors::{ReclaimError, Result};
use crate::core::profile::{ProfileHandle, ProfileRecord};
use crate::platform::pal::{FreeSpaceReader, FsStats, Platform, PlatformPaths, ProfileDirectory};

/// Lowest uid treated as a regular interactive account.
pub const MIN_REGULAR_UID: u32 = 1000;

/// `userdel` exit status for "can't update password file", which is what an
/// unprivileged caller gets.
const USERDEL_CANT_UPDATE_PASSWD: i32 = 1;
/// `userdel` exit status for "specified user doesn't exist".
const USERDEL_NO_SUCH_USER: i32 = 6;

/// Account resolved for a profile directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub uid: u32,
    pub home: PathBuf,
}

/// Home-directory backed profile directory.
#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    profiles_root: PathBuf,
    proc_root: PathBuf,
}

impl LinuxPlatform {
    #[must_use]
    pub fn new(profiles_root: PathBuf) -> Self {
        Self {
            profiles_root,
            proc_root: PathBuf::from("/proc"),
        }
    }

    fn lookup_account(name: &str) -> Option<AccountInfo> {
        match User::from_name(name) {
            Ok(Some(user)) => Some(AccountInfo {
                uid: user.uid.as_raw(),
                home: user.dir,
            }),
            _ => None,
        }
    }
}

impl ProfileDirectory for LinuxPlatform {
    fn list_profiles(&self) -> Result<Vec<ProfileRecord>> {
        let active = active_uids(&self.proc_root);
        scan_profiles_root(&self.profiles_root, &active, Self::lookup_account)
    }

    fn delete_profile(&self, profile: &ProfileRecord) -> Result<()> {
        if !profile.path.exists() {
            return Err(ReclaimError::ProfileVanished {
                path: profile.path.clone(),
            });
        }
        let output = Command::new("userdel")
            .arg("--remove")
            .arg(profile.handle.as_str())
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => ReclaimError::PermissionDenied {
                    path: PathBuf::from("userdel"),
                },
                _ => ReclaimError::Command {
                    command: "userdel".to_string(),
                    details: e.to_string(),
                },
            })?;
        userdel_outcome(
            profile,
            output.status.code(),
            &String::from_utf8_lossy(&output.stderr),
        )
    }
}

/// Map a `userdel` exit status onto the deletion contract.
fn userdel_outcome(profile: &ProfileRecord, code: Option<i32>, stderr: &str) -> Result<()> {
    match code {
        Some(0) => Ok(()),
        Some(USERDEL_NO_SUCH_USER) => Err(ReclaimError::ProfileVanished {
            path: profile.path.clone(),
        }),
        Some(USERDEL_CANT_UPDATE_PASSWD) => Err(ReclaimError::PermissionDenied {
            path: profile.path.clone(),
        }),
        _ => Err(ReclaimError::Deletion {
            username: profile.username.clone(),
            reason: stderr.trim().to_string(),
        }),
    }
}

impl FreeSpaceReader for LinuxPlatform {
    fn fs_stats(&self, volume: &Path) -> Result<FsStats> {
        let stat = statvfs(volume).map_err(|e| ReclaimError::FsStats {
            path: volume.to_path_buf(),
            details: e.to_string(),
        })?;
        let fragment = u64::from(stat.fragment_size());
        Ok(FsStats {
            total_bytes: u64::from(stat.blocks()).saturating_mul(fragment),
            free_bytes: u64::from(stat.blocks_available()).saturating_mul(fragment),
        })
    }
}

impl Platform for LinuxPlatform {
    fn profiles(&self) -> &dyn ProfileDirectory {
        self
    }

    fn space(&self) -> &dyn FreeSpaceReader {
        self
    }

    fn default_paths(&self) -> PlatformPaths {
        PlatformPaths {
            volume: self.profiles_root.clone(),
            ..PlatformPaths::default()
        }
    }
}

/// Turn each directory under `root` into a profile record.
///
/// A directory is a regular profile only when an account of the same name
/// exists, has it as its home and has a uid of at least [`MIN_REGULAR_UID`].
/// Everything else (service homes, orphaned directories) is special, since
/// there is no account through which it could be removed.
pub fn scan_profiles_root<F>(
    root: &Path,
    active_uids: &HashSet<u32>,
    lookup: F,
) -> Result<Vec<ProfileRecord>>
where
    F: Fn(&str) -> Option<AccountInfo>,
{
    let entries = fs::read_dir(root).map_err(|e| ReclaimError::Enumeration {
        details: format!("cannot read {}: {e}", root.display()),
    })?;

    let mut records = Vec::new();
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let account = lookup(&name);
        let (is_special, is_loaded) = match &account {
            Some(info) => (
                info.uid < MIN_REGULAR_UID || info.home != path,
                active_uids.contains(&info.uid),
            ),
            None => (true, false),
        };
        records.push(ProfileRecord::new(
            path,
            is_special,
            is_loaded,
            ProfileHandle::new(name),
        ));
    }
    records.sort_by(|left, right| left.path.cmp(&right.path));
    Ok(records)
}

/// Real uids owning at least one process under `proc_root`.
pub fn active_uids(proc_root: &Path) -> HashSet<u32> {
    let Ok(entries) = fs::read_dir(proc_root) else {
        return HashSet::new();
    };
    entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.bytes().all(|b| b.is_ascii_digit()))
        })
        .filter_map(|entry| fs::read_to_string(entry.path().join("status")).ok())
        .filter_map(|status| parse_status_uid(&status))
        .collect()
}

fn parse_status_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}
