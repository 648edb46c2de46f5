//! Case-insensitive set of protected usernames.

use std::collections::BTreeSet;

/// Account names that are never eligible regardless of configuration.
pub const BUILTIN_PROTECTED: &[&str] = &[
    "Administrator",
    "All Users",
    "Default",
    "Default User",
    "Public",
    "root",
];

/// Usernames excluded from deletion. Built once at startup, then read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistSet {
    names: BTreeSet<String>,
}

impl WhitelistSet {
    /// The built-in protected names only.
    #[must_use]
    pub fn builtin() -> Self {
        Self::with_names(std::iter::empty::<&str>())
    }

    /// Built-in protected names plus `extra`. Blank entries are ignored.
    #[must_use]
    pub fn with_names<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = BUILTIN_PROTECTED
            .iter()
            .copied()
            .map(str::to_string)
            .chain(extra.into_iter().map(|name| name.as_ref().to_string()))
            .filter_map(|name| normalize(&name))
            .collect();
        Self { names }
    }

    /// Config entries are trimmed when the set is built; profile usernames
    /// are matched as-is apart from case.
    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.names.contains(&username.to_lowercase())
    }

    /// Normalized names in sorted order, for display.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Default for WhitelistSet {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}
