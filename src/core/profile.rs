//! Profile records as reported by the OS profile directory.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Opaque identity the OS profile directory uses to delete a profile.
///
/// On Windows this is the account SID, on Linux the account name. The engine
/// never inspects or mutates it; it only hands it back to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProfileHandle(String);

impl ProfileHandle {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One OS-level user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileRecord {
    /// Absolute filesystem root of the profile. Unique per record.
    pub path: PathBuf,
    /// Final segment of `path`, assumed to equal the account name.
    pub username: String,
    /// OS or service profile; never eligible.
    pub is_special: bool,
    /// Currently signed in; never eligible.
    pub is_loaded: bool,
    /// Handle used to issue the deletion request.
    pub handle: ProfileHandle,
}

impl ProfileRecord {
    /// Build a record, deriving `username` from the last segment of `path`.
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        is_special: bool,
        is_loaded: bool,
        handle: ProfileHandle,
    ) -> Self {
        let path = path.into();
        let username = username_from_path(&path);
        Self {
            path,
            username,
            is_special,
            is_loaded,
            handle,
        }
    }
}

/// Last non-empty path segment, splitting on both `/` and `\`.
///
/// Profile paths reported by Windows arrive as `C:\Users\name` strings, which
/// `Path::file_name` would not split on other hosts.
#[must_use]
pub fn username_from_path(path: &Path) -> String {
    path.to_string_lossy()
        .split(|c: char| c == '/' || c == '\\')
        .rfind(|segment| !segment.is_empty())
        .unwrap_or_default()
        .to_string()
}
