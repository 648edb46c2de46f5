//! End-to-end runs against an in-memory machine.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, TimeZone, Utc};
use filetime::{FileTime, set_file_mtime};
use parking_lot::Mutex;

use profile_reclaimer::core::config::{GIB, RunConfig};
use profile_reclaimer::core::errors::{ReclaimError, Result};
use profile_reclaimer::core::profile::{ProfileHandle, ProfileRecord};
use profile_reclaimer::core::whitelist::WhitelistSet;
use profile_reclaimer::logger::dual::{DecisionLog, MemorySink};
use profile_reclaimer::logger::events::DecisionEvent;
use profile_reclaimer::platform::pal::{FixedClock, FreeSpaceReader, FsStats, ProfileDirectory};
use profile_reclaimer::reclaim::run::{Collaborators, ReclaimRun, RunSummary};
use profile_reclaimer::scanner::activity::{ActivityProbe, ActivityProber, ActivityVerdict};
use profile_reclaimer::scanner::deletion::LoopOutcome;
use profile_reclaimer::scanner::size::{SizeMeasurement, SizeProbe, SizeProber};

/// Profiles plus a disk whose free space grows by each deleted profile's size.
struct FakeMachine {
    profiles: Vec<ProfileRecord>,
    sizes: HashMap<PathBuf, u64>,
    free: Mutex<u64>,
    delete_requests: Mutex<Vec<String>>,
}

impl FakeMachine {
    fn new(profiles: Vec<ProfileRecord>, free: u64) -> Self {
        Self {
            profiles,
            sizes: HashMap::new(),
            free: Mutex::new(free),
            delete_requests: Mutex::new(Vec::new()),
        }
    }

    fn with_sizes(mut self, sizes: &[(&str, u64)]) -> Self {
        for (name, bytes) in sizes {
            let path = self
                .profiles
                .iter()
                .find(|p| p.username == *name)
                .map(|p| p.path.clone())
                .unwrap();
            self.sizes.insert(path, *bytes);
        }
        self
    }

    fn deleted(&self) -> Vec<String> {
        self.delete_requests.lock().clone()
    }
}

impl ProfileDirectory for FakeMachine {
    fn list_profiles(&self) -> Result<Vec<ProfileRecord>> {
        Ok(self.profiles.clone())
    }

    fn delete_profile(&self, profile: &ProfileRecord) -> Result<()> {
        if !self.profiles.iter().any(|p| p.path == profile.path) {
            return Err(ReclaimError::ProfileVanished {
                path: profile.path.clone(),
            });
        }
        self.delete_requests.lock().push(profile.username.clone());
        *self.free.lock() += self.sizes.get(&profile.path).copied().unwrap_or(0);
        Ok(())
    }
}

impl FreeSpaceReader for FakeMachine {
    fn fs_stats(&self, _volume: &Path) -> Result<FsStats> {
        let free = *self.free.lock();
        Ok(FsStats {
            total_bytes: 1_000 * GIB,
            free_bytes: free,
        })
    }
}

impl SizeProbe for FakeMachine {
    fn measure(&self, root: &Path) -> SizeMeasurement {
        SizeMeasurement {
            bytes: self.sizes.get(root).copied().unwrap_or(0),
            issues: Vec::new(),
        }
    }
}

struct Dormant;

impl ActivityProbe for Dormant {
    fn probe(&self, _root: &Path, _cutoff: DateTime<Utc>) -> ActivityVerdict {
        ActivityVerdict {
            recent: false,
            evidence: None,
            files_examined: 0,
            issues: Vec::new(),
        }
    }
}

fn regular(root: &Path, name: &str) -> ProfileRecord {
    ProfileRecord::new(root.join(name), false, false, ProfileHandle::new(name))
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
}

fn run(
    machine: &FakeMachine,
    activity: &dyn ActivityProbe,
    config: RunConfig,
) -> (RunSummary, Vec<DecisionEvent>) {
    let clock = FixedClock(now());
    let with = Collaborators {
        directory: machine,
        space: machine,
        clock: &clock,
        activity,
        sizes: machine,
    };
    let sink = MemorySink::new();
    let mut log = DecisionLog::new(Box::new(sink.clone()));
    let summary = ReclaimRun::new(config, "/", with)
        .execute(&mut log)
        .unwrap();
    (summary, sink.events())
}

fn touch(path: &Path, modified: SystemTime) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"data").unwrap();
    set_file_mtime(path, FileTime::from_system_time(modified)).unwrap();
}

#[test]
fn age_policy_deletes_only_dormant_profiles_in_filter_order() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let now_system = SystemTime::from(now());
    let recent = now_system - Duration::from_secs(7 * 86_400);
    let stale = now_system - Duration::from_secs(400 * 86_400);

    let names = ["amy", "ben", "cal", "dee", "eve"];
    for name in names {
        touch(&root.join(name).join("Documents/old.docx"), stale);
    }
    touch(&root.join("ben/Desktop/notes.txt"), recent);
    touch(&root.join("dee/AppData/cache.bin"), recent);
    touch(&root.join("eve/Downloads/setup.exe"), recent);
    // A fresh registry hive alone is not activity.
    touch(&root.join("cal/NTUSER.DAT"), recent);

    let machine = FakeMachine::new(names.iter().map(|n| regular(root, n)).collect(), 0);
    let config = RunConfig::new(6, 0, 0, false, WhitelistSet::builtin()).unwrap();
    let (summary, events) = run(&machine, &ActivityProber::new(), config);

    assert_eq!(machine.deleted(), vec!["amy", "cal"]);
    assert_eq!(summary.queued, vec!["amy", "cal"]);
    assert_eq!(summary.outcome(), LoopOutcome::Exhausted);
    let kept: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            DecisionEvent::Keep { username, .. } => Some(username.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(kept, vec!["ben", "dee", "eve"]);
    let deleted = events
        .iter()
        .filter(|e| matches!(e, DecisionEvent::Deleted { .. }))
        .count();
    assert_eq!(deleted, 2);
}

#[test]
fn space_policy_is_a_no_op_when_free_space_suffices() {
    let root = Path::new("/profiles");
    let machine = FakeMachine::new(vec![regular(root, "a"), regular(root, "b")], 150 * GIB)
        .with_sizes(&[("a", 10 * GIB), ("b", 20 * GIB)]);
    let config = RunConfig::new(0, 100 * GIB, 0, false, WhitelistSet::builtin()).unwrap();
    let (summary, events) = run(&machine, &Dormant, config);

    assert!(summary.no_op);
    assert!(machine.deleted().is_empty());
    assert!(events.iter().any(|e| matches!(e, DecisionEvent::NoPressure { .. })));
    assert!(!events.iter().any(|e| matches!(e, DecisionEvent::Sized { .. })));
}

#[test]
fn space_policy_deletes_largest_first_and_stops_at_threshold() {
    let root = Path::new("/profiles");
    let machine = FakeMachine::new(
        vec![regular(root, "mid"), regular(root, "small"), regular(root, "large")],
        50 * GIB,
    )
    .with_sizes(&[("mid", 30 * GIB), ("small", 10 * GIB), ("large", 80 * GIB)]);
    let config = RunConfig::new(0, 100 * GIB, 0, false, WhitelistSet::builtin()).unwrap();
    let (summary, events) = run(&machine, &Dormant, config);

    assert_eq!(summary.queued, vec!["large", "mid", "small"]);
    assert_eq!(machine.deleted(), vec!["large"]);
    assert_eq!(summary.outcome(), LoopOutcome::ThresholdMet);
    assert_eq!(summary.report.final_free, Some(130 * GIB));
    assert!(events.iter().any(|e| matches!(
        e,
        DecisionEvent::ThresholdMet { free_bytes, .. } if *free_bytes == 130 * GIB
    )));
}

#[test]
fn profile_limit_stops_early_and_reports_unmet_threshold() {
    let root = Path::new("/profiles");
    let machine = FakeMachine::new(vec![regular(root, "a"), regular(root, "b")], 10 * GIB)
        .with_sizes(&[("a", 5 * GIB), ("b", 40 * GIB)]);
    let config = RunConfig::new(0, 100 * GIB, 1, false, WhitelistSet::builtin()).unwrap();
    let (summary, events) = run(&machine, &Dormant, config);

    assert_eq!(machine.deleted(), vec!["a"]);
    assert_eq!(summary.outcome(), LoopOutcome::LimitReached);
    assert_eq!(summary.report.threshold_met, Some(false));
    let last_events: Vec<&DecisionEvent> = events.iter().rev().take(4).collect();
    assert!(last_events.iter().any(|e| matches!(
        e,
        DecisionEvent::ThresholdNotReached { free_bytes: Some(free), .. } if *free == 15 * GIB
    )));
}

#[test]
fn threshold_stop_deletes_no_more_than_necessary() {
    let root = Path::new("/profiles");
    let names = ["p1", "p2", "p3", "p4", "p5", "p6"];
    let sizes: Vec<(&str, u64)> = names.iter().map(|n| (*n, 10 * GIB)).collect();
    let machine = FakeMachine::new(names.iter().map(|n| regular(root, n)).collect(), 5 * GIB)
        .with_sizes(&sizes);
    let config = RunConfig::new(0, 32 * GIB, 0, false, WhitelistSet::builtin()).unwrap();
    let (summary, _) = run(&machine, &Dormant, config);

    // 5 -> 15 -> 25 -> 35: the third deletion is the first to satisfy 32.
    assert_eq!(machine.deleted().len(), 3);
    assert_eq!(summary.outcome(), LoopOutcome::ThresholdMet);
}

#[test]
fn age_policy_with_space_limit_exits_early() {
    let root = Path::new("/profiles");
    let machine = FakeMachine::new(
        vec![regular(root, "a"), regular(root, "b"), regular(root, "c")],
        90 * GIB,
    )
    .with_sizes(&[("a", 5 * GIB), ("b", 6 * GIB), ("c", 7 * GIB)]);
    let config = RunConfig::new(6, 100 * GIB, 0, false, WhitelistSet::builtin()).unwrap();
    let (summary, _) = run(&machine, &Dormant, config);

    assert_eq!(summary.queued, vec!["a", "b", "c"]);
    assert_eq!(machine.deleted(), vec!["a", "b"]);
    assert_eq!(summary.outcome(), LoopOutcome::ThresholdMet);
}

#[test]
fn dry_run_selects_identically_but_deletes_nothing() {
    let root = Path::new("/profiles");
    let build = || {
        FakeMachine::new(
            vec![
                regular(root, "a"),
                regular(root, "b"),
                regular(root, "Public"),
                regular(root, "c"),
            ],
            0,
        )
        .with_sizes(&[("a", 3 * GIB), ("b", 9 * GIB), ("c", 6 * GIB)])
    };

    let real_machine = build();
    let real_config = RunConfig::new(0, 500 * GIB, 0, false, WhitelistSet::builtin()).unwrap();
    let (real, _) = run(&real_machine, &Dormant, real_config);

    let dry_machine = build();
    let dry_config = RunConfig::new(0, 500 * GIB, 0, true, WhitelistSet::builtin()).unwrap();
    let (dry, dry_events) = run(&dry_machine, &Dormant, dry_config);

    assert_eq!(real.queued, dry.queued);
    assert_eq!(dry.queued, vec!["b", "c", "a"]);
    assert_eq!(real_machine.deleted().len(), 3);
    assert!(dry_machine.deleted().is_empty());
    assert_eq!(dry.report.deleted(), 3);
    assert_eq!(
        dry_events
            .iter()
            .filter(|e| matches!(e, DecisionEvent::DeleteSkipped { .. }))
            .count(),
        3
    );
}

#[test]
fn whitelisted_and_loaded_profiles_are_never_touched() {
    let root = Path::new("/profiles");
    let mut loaded = regular(root, "busy");
    loaded.is_loaded = true;
    let mut special = regular(root, "systemprofile");
    special.is_special = true;
    let machine = FakeMachine::new(
        vec![
            regular(root, "KIOSK"),
            loaded,
            special,
            regular(root, "Administrator"),
            regular(root, "old"),
        ],
        0,
    );
    let config = RunConfig::new(1, 0, 0, false, WhitelistSet::with_names(["kiosk"])).unwrap();
    let (summary, _) = run(&machine, &Dormant, config);

    assert_eq!(machine.deleted(), vec!["old"]);
    assert_eq!(summary.excluded.len(), 4);
}

#[test]
fn real_size_prober_feeds_space_policy() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("big/Videos")).unwrap();
    fs::write(root.join("big/Videos/clip.mp4"), vec![0u8; 4096]).unwrap();
    fs::create_dir_all(root.join("tiny")).unwrap();
    fs::write(root.join("tiny/a.txt"), vec![0u8; 16]).unwrap();

    let machine = FakeMachine::new(vec![regular(root, "tiny"), regular(root, "big")], 0);
    let prober = SizeProber::new(2);
    let clock = FixedClock(now());
    let with = Collaborators {
        directory: &machine,
        space: &machine,
        clock: &clock,
        activity: &Dormant,
        sizes: &prober,
    };
    let config = RunConfig::new(0, GIB, 0, true, WhitelistSet::builtin()).unwrap();
    let summary = ReclaimRun::new(config, "/", with)
        .execute(&mut DecisionLog::silent())
        .unwrap();

    assert_eq!(summary.queued, vec!["big", "tiny"]);
    assert_eq!(summary.report.items[0].size_bytes, Some(4096));
    assert_eq!(summary.outcome(), LoopOutcome::ThresholdNotReached);
}
