//! Decision events: one variant per thing the audit trail must show.

#![allow(missing_docs)]

use std::path::PathBuf;

use serde::Serialize;

use crate::scanner::size::format_gib;

/// Severity used by live renderers for coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Notice,
    Warning,
    Error,
}

/// One entry of the decision log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DecisionEvent {
    RunStarted {
        mode: String,
        dry_run: bool,
        month_cutoff: u32,
        space_limit_bytes: u64,
        profile_limit: usize,
        whitelist: Vec<String>,
    },
    StateChanged {
        from: String,
        to: String,
    },
    ProfilesListed {
        total: usize,
    },
    Excluded {
        username: String,
        reason: String,
    },
    CutoffComputed {
        cutoff: String,
    },
    Keep {
        username: String,
        evidence: Option<PathBuf>,
    },
    Queued {
        username: String,
        size_bytes: Option<u64>,
    },
    Sized {
        username: String,
        size_bytes: u64,
    },
    FreeSpace {
        volume: PathBuf,
        free_bytes: u64,
        context: String,
    },
    NoPressure {
        free_bytes: u64,
        limit_bytes: u64,
    },
    DeleteIntent {
        username: String,
        path: PathBuf,
        size_bytes: Option<u64>,
        dry_run: bool,
    },
    Deleted {
        username: String,
    },
    DeleteSkipped {
        username: String,
    },
    Vanished {
        username: String,
    },
    DeleteFailed {
        username: String,
        code: String,
        reason: String,
    },
    ProbeFailure {
        path: PathBuf,
        details: String,
    },
    PersistFailure {
        sink: String,
        details: String,
    },
    ThresholdMet {
        free_bytes: u64,
        limit_bytes: u64,
    },
    LimitReached {
        limit: usize,
    },
    ThresholdNotReached {
        free_bytes: Option<u64>,
        limit_bytes: u64,
    },
    Interrupted,
    RunFinished {
        outcome: String,
        deleted: usize,
        failed: usize,
    },
    RunFailed {
        code: String,
        details: String,
    },
}

impl DecisionEvent {
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::DeleteIntent { .. }
            | Self::Deleted { .. }
            | Self::ThresholdMet { .. }
            | Self::NoPressure { .. }
            | Self::RunFinished { .. } => Severity::Notice,
            Self::ProbeFailure { .. }
            | Self::PersistFailure { .. }
            | Self::Vanished { .. }
            | Self::ThresholdNotReached { .. }
            | Self::LimitReached { .. }
            | Self::Interrupted => Severity::Warning,
            Self::DeleteFailed { .. } | Self::RunFailed { .. } => Severity::Error,
            _ => Severity::Info,
        }
    }

    /// Human-readable line, identical on the console and in the audit file.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::RunStarted {
                mode,
                dry_run,
                month_cutoff,
                space_limit_bytes,
                profile_limit,
                whitelist,
            } => format!(
                "Run started: mode={mode}, months={month_cutoff}, space limit={}, profile limit={}, dry run={dry_run}, whitelist=[{}]",
                optional_gib(*space_limit_bytes),
                if *profile_limit == 0 {
                    "unlimited".to_string()
                } else {
                    profile_limit.to_string()
                },
                whitelist.join(", ")
            ),
            Self::StateChanged { from, to } => format!("State: {from} -> {to}"),
            Self::ProfilesListed { total } => format!("Found {total} profile record(s)"),
            Self::Excluded { username, reason } => format!("Skipping {username}: {reason}"),
            Self::CutoffComputed { cutoff } => {
                format!("Activity cutoff: files modified after {cutoff} count as recent")
            }
            Self::Keep { username, evidence } => match evidence {
                Some(path) => format!("Keeping {username}: recent activity in {}", path.display()),
                None => format!("Keeping {username}"),
            },
            Self::Queued {
                username,
                size_bytes,
            } => match size_bytes {
                Some(bytes) => format!("Queued {username} ({})", format_gib(*bytes)),
                None => format!("Queued {username}: no activity since cutoff"),
            },
            Self::Sized {
                username,
                size_bytes,
            } => format!("Measured {username}: {}", format_gib(*size_bytes)),
            Self::FreeSpace {
                volume,
                free_bytes,
                context,
            } => format!(
                "Free space on {} ({context}): {}",
                volume.display(),
                format_gib(*free_bytes)
            ),
            Self::NoPressure {
                free_bytes,
                limit_bytes,
            } => format!(
                "Nothing to do: {} free already meets the {} limit",
                format_gib(*free_bytes),
                format_gib(*limit_bytes)
            ),
            Self::DeleteIntent {
                username,
                path,
                size_bytes,
                dry_run,
            } => {
                let verb = if *dry_run { "Would delete" } else { "Deleting" };
                match size_bytes {
                    Some(bytes) => format!(
                        "{verb} {username} ({}) at {}",
                        format_gib(*bytes),
                        path.display()
                    ),
                    None => format!("{verb} {username} at {}", path.display()),
                }
            }
            Self::Deleted { username } => format!("Deleted {username}"),
            Self::DeleteSkipped { username } => {
                format!("Dry run: deletion of {username} not issued")
            }
            Self::Vanished { username } => {
                format!("Profile {username} disappeared before deletion; skipped")
            }
            Self::DeleteFailed {
                username,
                code,
                reason,
            } => format!("Failed to delete {username} [{code}]: {reason}"),
            Self::ProbeFailure { path, details } => {
                format!("Could not read {}: {details}", path.display())
            }
            Self::PersistFailure { sink, details } => {
                format!("Failed to persist log line to {sink}: {details}")
            }
            Self::ThresholdMet {
                free_bytes,
                limit_bytes,
            } => format!(
                "Space limit reached: {} free >= {}",
                format_gib(*free_bytes),
                format_gib(*limit_bytes)
            ),
            Self::LimitReached { limit } => format!("Profile limit of {limit} reached"),
            Self::ThresholdNotReached {
                free_bytes,
                limit_bytes,
            } => format!(
                "Threshold not reached: {} free, {} required",
                free_bytes.map_or_else(|| "unknown".to_string(), format_gib),
                format_gib(*limit_bytes)
            ),
            Self::Interrupted => "Interrupted; stopping before the next profile".to_string(),
            Self::RunFinished {
                outcome,
                deleted,
                failed,
            } => format!("Run finished ({outcome}): {deleted} deleted, {failed} failed"),
            Self::RunFailed { code, details } => format!("Run failed [{code}]: {details}"),
        }
    }
}

fn optional_gib(bytes: u64) -> String {
    if bytes == 0 {
        "off".to_string()
    } else {
        format_gib(bytes)
    }
}
