//! Candidate filter: which profiles may be considered for deletion at all.

use serde::Serialize;

use crate::core::profile::ProfileRecord;
use crate::core::whitelist::WhitelistSet;

/// Why a profile was excluded. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    Special,
    Loaded,
    Whitelisted,
}

impl Exclusion {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Special => "special profile",
            Self::Loaded => "profile is loaded",
            Self::Whitelisted => "whitelisted",
        }
    }
}

/// First reason `profile` is ineligible, if any.
#[must_use]
pub fn exclusion_reason(profile: &ProfileRecord, whitelist: &WhitelistSet) -> Option<Exclusion> {
    if profile.is_special {
        Some(Exclusion::Special)
    } else if profile.is_loaded {
        Some(Exclusion::Loaded)
    } else if whitelist.contains(&profile.username) {
        Some(Exclusion::Whitelisted)
    } else {
        None
    }
}

/// Eligible profiles, in input order.
#[must_use]
pub fn eligible<'a>(all: &'a [ProfileRecord], whitelist: &WhitelistSet) -> Vec<&'a ProfileRecord> {
    all.iter()
        .filter(|profile| exclusion_reason(profile, whitelist).is_none())
        .collect()
}

/// Eligible and excluded profiles, both in input order.
#[derive(Debug, Default)]
pub struct FilterOutcome<'a> {
    pub eligible: Vec<&'a ProfileRecord>,
    pub excluded: Vec<(&'a ProfileRecord, Exclusion)>,
}

#[must_use]
pub fn partition<'a>(all: &'a [ProfileRecord], whitelist: &WhitelistSet) -> FilterOutcome<'a> {
    let mut outcome = FilterOutcome::default();
    for profile in all {
        match exclusion_reason(profile, whitelist) {
            Some(reason) => outcome.excluded.push((profile, reason)),
            None => outcome.eligible.push(profile),
        }
    }
    outcome
}
