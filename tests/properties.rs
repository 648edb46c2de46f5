//! Property tests for eligibility, ordering and the profile cap.

#![allow(missing_docs)]

use std::path::Path;

use parking_lot::Mutex;
use proptest::prelude::*;

use profile_reclaimer::core::errors::Result;
use profile_reclaimer::core::profile::{ProfileHandle, ProfileRecord};
use profile_reclaimer::core::whitelist::WhitelistSet;
use profile_reclaimer::logger::dual::DecisionLog;
use profile_reclaimer::platform::pal::{FreeSpaceReader, FsStats, ProfileDirectory};
use profile_reclaimer::scanner::deletion::{DeletionConfig, DeletionExecutor};
use profile_reclaimer::scanner::filter::eligible;
use profile_reclaimer::scanner::policy::{Candidate, Metric, SelectionPolicy, SpacePolicy};
use profile_reclaimer::scanner::size::{SizeMeasurement, SizeProbe};

fn record(name: &str, is_special: bool, is_loaded: bool) -> ProfileRecord {
    ProfileRecord::new(
        format!("C:\\Users\\{name}"),
        is_special,
        is_loaded,
        ProfileHandle::new(format!("S-1-5-21-{}", name.len())),
    )
}

fn profile_set() -> impl Strategy<Value = Vec<(String, bool, bool)>> {
    prop::collection::vec(("[a-zA-Z]{1,6}", any::<bool>(), any::<bool>()), 0..24)
}

/// Position encoded in `u{index}_{size}` names.
fn index_of(profile: &ProfileRecord) -> usize {
    profile.username[1..]
        .split('_')
        .next()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(usize::MAX)
}

/// Size taken from the numeric suffix of the profile directory name.
struct SuffixSize;

impl SizeProbe for SuffixSize {
    fn measure(&self, root: &Path) -> SizeMeasurement {
        let name = root.to_string_lossy();
        let bytes = name
            .rsplit('_')
            .next()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        SizeMeasurement {
            bytes,
            issues: Vec::new(),
        }
    }
}

struct CountingDirectory {
    requests: Mutex<usize>,
}

impl ProfileDirectory for CountingDirectory {
    fn list_profiles(&self) -> Result<Vec<ProfileRecord>> {
        Ok(Vec::new())
    }

    fn delete_profile(&self, _profile: &ProfileRecord) -> Result<()> {
        *self.requests.lock() += 1;
        Ok(())
    }
}

struct NoSpace;

impl FreeSpaceReader for NoSpace {
    fn fs_stats(&self, _volume: &Path) -> Result<FsStats> {
        Ok(FsStats {
            total_bytes: 100,
            free_bytes: 0,
        })
    }
}

proptest! {
    #[test]
    fn eligible_excludes_exactly_the_protected(
        set in profile_set(),
        extra in prop::collection::vec("[a-zA-Z]{1,6}", 0..4),
    ) {
        let whitelist = WhitelistSet::with_names(&extra);
        let records: Vec<ProfileRecord> = set
            .iter()
            .map(|(name, special, loaded)| record(name, *special, *loaded))
            .collect();
        let kept = eligible(&records, &whitelist);

        for profile in &records {
            let listed = extra.iter().any(|w| w.eq_ignore_ascii_case(&profile.username))
                || ["administrator", "all users", "default", "default user", "public", "root"]
                    .contains(&profile.username.to_lowercase().as_str());
            let expected = !profile.is_special && !profile.is_loaded && !listed;
            let present = kept.iter().any(|p| std::ptr::eq(*p, profile));
            prop_assert_eq!(expected, present, "profile {:?}", profile);
        }
        // Filter order is preserved.
        let positions: Vec<usize> = kept
            .iter()
            .map(|p| records.iter().position(|r| std::ptr::eq(r, *p)).unwrap())
            .collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn space_policy_orders_by_descending_size(sizes in prop::collection::vec(0u64..1_000, 0..20)) {
        let records: Vec<ProfileRecord> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| record(&format!("u{i}_{size}"), false, false))
            .collect();
        let queue = SpacePolicy::new(&SuffixSize, 0)
            .select(records.iter().collect(), &mut DecisionLog::silent());

        prop_assert_eq!(queue.len(), records.len());
        for pair in queue.windows(2) {
            prop_assert!(pair[0].size_bytes() >= pair[1].size_bytes());
            if pair[0].size_bytes() == pair[1].size_bytes() {
                // Ties keep filter order.
                prop_assert!(index_of(pair[0].profile) < index_of(pair[1].profile));
            }
        }
    }

    #[test]
    fn profile_limit_caps_delete_requests(count in 0usize..15, limit in 0usize..20) {
        let records: Vec<ProfileRecord> = (0..count)
            .map(|i| record(&format!("user{i}"), false, false))
            .collect();
        let queue: Vec<Candidate<'_>> = records
            .iter()
            .map(|profile| Candidate { profile, metric: Metric::RecentActivity(false) })
            .collect();
        let directory = CountingDirectory { requests: Mutex::new(0) };
        let config = DeletionConfig {
            space_limit_bytes: 0,
            profile_limit: limit,
            dry_run: false,
            volume: "C:".into(),
        };
        let report = DeletionExecutor::new(config, &directory, &NoSpace)
            .execute(&queue, &mut DecisionLog::silent());

        let expected = if limit == 0 { count } else { count.min(limit) };
        prop_assert_eq!(*directory.requests.lock(), expected);
        prop_assert_eq!(report.items.len(), expected);
    }
}
