//! Windows collaborators backed by CIM through `powershell.exe`.
//!
//! `Win32_UserProfile` is the record the OS itself keeps for each profile;
//! removing the CIM instance deletes the profile directory *and* the registry
//! `ProfileList` entry, which is what keeps future logons from failing.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::core::errors::{ReclaimError, Result};
use crate::core::profile::{ProfileHandle, ProfileRecord};
use crate::platform::pal::{FreeSpaceReader, FsStats, Platform, PlatformPaths, ProfileDirectory};

/// Exit code the delete script uses when no instance matches the SID.
const EXIT_NOT_FOUND: i32 = 3;

static SID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^S-1(-[0-9]+)+$").expect("static SID regex"));

static DRIVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)([a-z]):").expect("static drive regex"));

const LIST_PROFILES_SCRIPT: &str = "Get-CimInstance -ClassName Win32_UserProfile | \
     Select-Object SID,LocalPath,Special,Loaded | ConvertTo-Json -Compress";

/// CIM-backed profile directory and free-space reader.
#[derive(Debug, Clone)]
pub struct WindowsPlatform {
    shell: PathBuf,
}

impl WindowsPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("powershell.exe"),
        }
    }

    fn run_script(&self, script: &str) -> Result<std::process::Output> {
        Command::new(&self.shell)
            .args(["-NoProfile", "-NonInteractive", "-Command", script])
            .output()
            .map_err(|e| ReclaimError::Command {
                command: self.shell.display().to_string(),
                details: e.to_string(),
            })
    }

    fn run_json(&self, script: &str) -> Result<String> {
        let output = self.run_script(script)?;
        if !output.status.success() {
            return Err(ReclaimError::Command {
                command: script.to_string(),
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for WindowsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileDirectory for WindowsPlatform {
    fn list_profiles(&self) -> Result<Vec<ProfileRecord>> {
        let raw = self
            .run_json(LIST_PROFILES_SCRIPT)
            .map_err(|e| ReclaimError::Enumeration {
                details: e.to_string(),
            })?;
        parse_profile_list(&raw)
    }

    fn delete_profile(&self, profile: &ProfileRecord) -> Result<()> {
        let script = delete_script(profile.handle.as_str())?;
        let output = self.run_script(&script)?;
        match output.status.code() {
            Some(0) => Ok(()),
            Some(EXIT_NOT_FOUND) => Err(ReclaimError::ProfileVanished {
                path: profile.path.clone(),
            }),
            _ => Err(ReclaimError::Deletion {
                username: profile.username.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

impl FreeSpaceReader for WindowsPlatform {
    fn fs_stats(&self, volume: &Path) -> Result<FsStats> {
        let drive = drive_id(volume)?;
        let script = format!(
            "Get-CimInstance -ClassName Win32_LogicalDisk -Filter \"DeviceID='{drive}'\" | \
             Select-Object Size,FreeSpace | ConvertTo-Json -Compress"
        );
        let raw = self.run_json(&script).map_err(|e| ReclaimError::FsStats {
            path: volume.to_path_buf(),
            details: e.to_string(),
        })?;
        parse_logical_disk(volume, &raw)
    }
}

impl Platform for WindowsPlatform {
    fn profiles(&self) -> &dyn ProfileDirectory {
        self
    }

    fn space(&self) -> &dyn FreeSpaceReader {
        self
    }

    fn default_paths(&self) -> PlatformPaths {
        let program_data =
            std::env::var("ProgramData").unwrap_or_else(|_| "C:\\ProgramData".to_string());
        let system_drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
        let base = PathBuf::from(program_data).join("ProfileReclaimer");
        PlatformPaths {
            config_file: base.join("config.toml"),
            log_dir: base.join("logs"),
            volume: PathBuf::from(system_drive),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CimUserProfile {
    #[serde(rename = "SID")]
    sid: String,
    #[serde(rename = "LocalPath")]
    local_path: Option<String>,
    #[serde(rename = "Special", default)]
    special: bool,
    #[serde(rename = "Loaded", default)]
    loaded: bool,
}

/// Parse `ConvertTo-Json` output: an array, a lone object, or nothing.
pub fn parse_profile_list(raw: &str) -> Result<Vec<ProfileRecord>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(trimmed).map_err(|e| ReclaimError::Enumeration {
        details: format!("unreadable Win32_UserProfile output: {e}"),
    })?;
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    };

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let cim: CimUserProfile =
            serde_json::from_value(item).map_err(|e| ReclaimError::Enumeration {
                details: format!("unexpected Win32_UserProfile shape: {e}"),
            })?;
        // Profiles without a local path have nothing on disk to reclaim.
        let Some(local_path) = cim.local_path.filter(|path| !path.trim().is_empty()) else {
            continue;
        };
        records.push(ProfileRecord::new(
            local_path,
            cim.special,
            cim.loaded,
            ProfileHandle::new(cim.sid),
        ));
    }
    Ok(records)
}

/// Build the delete script for one SID. Rejects anything that is not a SID.
pub fn delete_script(sid: &str) -> Result<String> {
    if !SID_PATTERN.is_match(sid) {
        return Err(ReclaimError::Deletion {
            username: sid.to_string(),
            reason: "handle is not a well-formed SID".to_string(),
        });
    }
    Ok(format!(
        "$p = Get-CimInstance -ClassName Win32_UserProfile -Filter \"SID='{sid}'\"; \
         if ($null -eq $p) {{ exit {EXIT_NOT_FOUND} }}; \
         Remove-CimInstance -InputObject $p -ErrorAction Stop"
    ))
}

fn drive_id(volume: &Path) -> Result<String> {
    let text = volume.to_string_lossy();
    DRIVE_PATTERN
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|letter| format!("{}:", letter.as_str().to_ascii_uppercase()))
        .ok_or_else(|| ReclaimError::FsStats {
            path: volume.to_path_buf(),
            details: "volume must start with a drive letter".to_string(),
        })
}

#[derive(Debug, Deserialize)]
struct CimLogicalDisk {
    #[serde(rename = "Size")]
    size: Option<u64>,
    #[serde(rename = "FreeSpace")]
    free_space: Option<u64>,
}

fn parse_logical_disk(volume: &Path, raw: &str) -> Result<FsStats> {
    let stats_error = |details: String| ReclaimError::FsStats {
        path: volume.to_path_buf(),
        details,
    };
    let disk: CimLogicalDisk = serde_json::from_str(raw.trim())
        .map_err(|e| stats_error(format!("unreadable Win32_LogicalDisk output: {e}")))?;
    let free_bytes = disk
        .free_space
        .ok_or_else(|| stats_error("volume reports no free space figure".to_string()))?;
    Ok(FsStats {
        total_bytes: disk.size.unwrap_or(free_bytes),
        free_bytes,
    })
}
