//! Activity prober: does a profile show genuine use after a cutoff?
//!
//! Only files count. The per-user registry hives (`NTUSER.*`, `UsrClass.*`)
//! are rewritten by the OS at every logon and housekeeping pass, so their
//! timestamps say nothing about the user; they are ignored along with
//! system-flagged files and reparse points.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::scanner::walker::{FileWalker, WalkIssue, WalkOptions};

static REGISTRY_HIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(ntuser|usrclass)(\.|$)").expect("static hive regex")
});

/// Whether `path` names a per-user registry hive or one of its logs.
#[must_use]
pub fn is_registry_hive(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| REGISTRY_HIVE.is_match(name))
}

/// Result of one activity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityVerdict {
    /// At least one qualifying file was modified strictly after the cutoff.
    pub recent: bool,
    /// The file that proved activity, when `recent`.
    pub evidence: Option<PathBuf>,
    /// Files examined before the verdict was reached.
    pub files_examined: u64,
    /// Nodes that could not be read. They count as "no evidence".
    pub issues: Vec<WalkIssue>,
}

/// Seam for the age policy.
pub trait ActivityProbe {
    fn probe(&self, root: &Path, cutoff: DateTime<Utc>) -> ActivityVerdict;
}

/// Filesystem-backed activity prober.
#[derive(Debug, Clone, Copy)]
pub struct ActivityProber {
    options: WalkOptions,
}

impl ActivityProber {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            options: WalkOptions {
                skip_reparse_points: true,
                skip_system_files: true,
            },
        }
    }

    /// Stops at the first qualifying file.
    #[must_use]
    pub fn has_recent_activity(&self, root: &Path, cutoff: DateTime<Utc>) -> ActivityVerdict {
        let mut walker = FileWalker::new(root, self.options);
        let mut files_examined = 0u64;
        let mut evidence = None;

        for entry in walker.by_ref() {
            if is_registry_hive(&entry.path) {
                continue;
            }
            files_examined += 1;
            if DateTime::<Utc>::from(entry.last_write) > cutoff {
                evidence = Some(entry.path);
                break;
            }
        }

        ActivityVerdict {
            recent: evidence.is_some(),
            evidence,
            files_examined,
            issues: walker.into_issues(),
        }
    }
}

impl Default for ActivityProber {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityProbe for ActivityProber {
    fn probe(&self, root: &Path, cutoff: DateTime<Utc>) -> ActivityVerdict {
        self.has_recent_activity(root, cutoff)
    }
}
