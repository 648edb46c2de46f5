//! Deletion loop: walk the ordered queue, delete through the OS, stop as soon
//! as the free-space target or the profile cap is reached.
//!
//! Deletions are strictly sequential. Free space is shared external state
//! that every deletion changes, so it is re-read before and after each one
//! and never carried across a deletion.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::core::errors::ReclaimError;
use crate::logger::dual::DecisionLog;
use crate::logger::events::DecisionEvent;
use crate::platform::pal::{FreeSpaceReader, ProfileDirectory};
use crate::scanner::policy::Candidate;

/// Loop controls derived from the run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionConfig {
    /// Stop once this many bytes are free. 0 disables.
    pub space_limit_bytes: u64,
    /// Process at most this many candidates. 0 means unlimited.
    pub profile_limit: usize,
    /// Skip the delete request itself; everything else runs.
    pub dry_run: bool,
    /// Volume whose free space is measured.
    pub volume: PathBuf,
}

/// Why the loop stopped. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    /// Free space reached the configured limit.
    ThresholdMet,
    /// `profile_limit` candidates were processed.
    LimitReached,
    /// Queue exhausted with no space limit configured.
    Exhausted,
    /// Queue exhausted and the space limit is still unmet.
    ThresholdNotReached,
    /// External interruption between candidates.
    Interrupted,
}

impl LoopOutcome {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ThresholdMet => "threshold met",
            Self::LimitReached => "limit reached",
            Self::Exhausted => "exhausted",
            Self::ThresholdNotReached => "threshold not reached",
            Self::Interrupted => "interrupted",
        }
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ItemStatus {
    Deleted,
    /// Dry run: the request was not issued.
    Simulated,
    /// The profile disappeared between listing and deletion.
    Vanished,
    Failed { code: String, reason: String },
}

/// Per-candidate record in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionItem {
    pub username: String,
    pub path: PathBuf,
    pub size_bytes: Option<u64>,
    #[serde(flatten)]
    pub status: ItemStatus,
    /// Free space measured right after this candidate.
    pub free_after: Option<u64>,
}

/// Structured result of one loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub items: Vec<DeletionItem>,
    pub outcome: LoopOutcome,
    pub dry_run: bool,
    pub initial_free: Option<u64>,
    pub final_free: Option<u64>,
    /// `Some(met)` when a space limit was configured.
    pub threshold_met: Option<bool>,
}

impl DeletionReport {
    /// Profiles actually removed (or that would be, in a dry run).
    #[must_use]
    pub fn deleted(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.status, ItemStatus::Deleted | ItemStatus::Simulated))
            .count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.status, ItemStatus::Failed { .. }))
            .count()
    }

    /// Measured free-space gain over the loop.
    #[must_use]
    pub fn bytes_freed(&self) -> u64 {
        match (self.initial_free, self.final_free) {
            (Some(before), Some(after)) => after.saturating_sub(before),
            _ => 0,
        }
    }
}

/// Issues deletions for an ordered candidate queue.
pub struct DeletionExecutor<'a> {
    config: DeletionConfig,
    directory: &'a dyn ProfileDirectory,
    space: &'a dyn FreeSpaceReader,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<'a> DeletionExecutor<'a> {
    #[must_use]
    pub fn new(
        config: DeletionConfig,
        directory: &'a dyn ProfileDirectory,
        space: &'a dyn FreeSpaceReader,
    ) -> Self {
        Self {
            config,
            directory,
            space,
            interrupt: None,
        }
    }

    /// Stop between candidates once `flag` is set.
    #[must_use]
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn read_free(&self, context: &str, log: &mut DecisionLog) -> Option<u64> {
        read_free_space(self.space, &self.config.volume, context, log)
    }

    /// Run the loop. Never fails: per-candidate errors land in the report.
    pub fn execute(&self, queue: &[Candidate<'_>], log: &mut DecisionLog) -> DeletionReport {
        let limit = self.config.space_limit_bytes;
        let limit_active = limit > 0;
        // Dry runs project the effect of simulated deletions onto the
        // measured free space so they stop where a real run would.
        let mut projected_gain = 0u64;
        let effective = |free: Option<u64>, gain: u64| free.map(|bytes| bytes.saturating_add(gain));
        let satisfied =
            |free: Option<u64>, gain: u64| limit_active && effective(free, gain).is_some_and(|bytes| bytes >= limit);

        let initial_free = self.read_free("before deletions", log);
        let mut last_free = initial_free;
        let mut items = Vec::with_capacity(queue.len());
        let mut outcome = None;

        for candidate in queue {
            if self.interrupted() {
                log.record(DecisionEvent::Interrupted);
                outcome = Some(LoopOutcome::Interrupted);
                break;
            }
            if !items.is_empty() {
                last_free = self.read_free("before deletion", log);
            }
            if satisfied(last_free, projected_gain) {
                outcome = Some(LoopOutcome::ThresholdMet);
                break;
            }

            let profile = candidate.profile;
            let size_bytes = candidate.size_bytes();
            log.record(DecisionEvent::DeleteIntent {
                username: profile.username.clone(),
                path: profile.path.clone(),
                size_bytes,
                dry_run: self.config.dry_run,
            });

            let status = if self.config.dry_run {
                log.record(DecisionEvent::DeleteSkipped {
                    username: profile.username.clone(),
                });
                projected_gain = projected_gain.saturating_add(size_bytes.unwrap_or(0));
                ItemStatus::Simulated
            } else {
                match self.directory.delete_profile(profile) {
                    Ok(()) => {
                        log.record(DecisionEvent::Deleted {
                            username: profile.username.clone(),
                        });
                        ItemStatus::Deleted
                    }
                    Err(ReclaimError::ProfileVanished { .. }) => {
                        log.record(DecisionEvent::Vanished {
                            username: profile.username.clone(),
                        });
                        ItemStatus::Vanished
                    }
                    Err(err) => {
                        log.record(DecisionEvent::DeleteFailed {
                            username: profile.username.clone(),
                            code: err.code().to_string(),
                            reason: err.to_string(),
                        });
                        ItemStatus::Failed {
                            code: err.code().to_string(),
                            reason: err.to_string(),
                        }
                    }
                }
            };

            last_free = self.read_free("after deletion", log);
            items.push(DeletionItem {
                username: profile.username.clone(),
                path: profile.path.clone(),
                size_bytes,
                status,
                free_after: last_free,
            });

            if satisfied(last_free, projected_gain) {
                outcome = Some(LoopOutcome::ThresholdMet);
                break;
            }
            if self.config.profile_limit > 0 && items.len() >= self.config.profile_limit {
                log.record(DecisionEvent::LimitReached {
                    limit: self.config.profile_limit,
                });
                outcome = Some(LoopOutcome::LimitReached);
                break;
            }
        }

        let met = satisfied(last_free, projected_gain);
        let outcome = outcome.unwrap_or(if limit_active && !met {
            LoopOutcome::ThresholdNotReached
        } else if limit_active {
            LoopOutcome::ThresholdMet
        } else {
            LoopOutcome::Exhausted
        });

        if limit_active {
            let free_bytes = effective(last_free, projected_gain);
            if met {
                log.record(DecisionEvent::ThresholdMet {
                    free_bytes: free_bytes.unwrap_or_default(),
                    limit_bytes: limit,
                });
            } else {
                log.record(DecisionEvent::ThresholdNotReached {
                    free_bytes,
                    limit_bytes: limit,
                });
            }
        }

        DeletionReport {
            items,
            outcome,
            dry_run: self.config.dry_run,
            initial_free,
            final_free: last_free,
            threshold_met: limit_active.then_some(met),
        }
    }
}

/// Read free space once, logging the reading or the failure.
pub fn read_free_space(
    space: &dyn FreeSpaceReader,
    volume: &Path,
    context: &str,
    log: &mut DecisionLog,
) -> Option<u64> {
    match space.free_bytes(volume) {
        Ok(free_bytes) => {
            log.record(DecisionEvent::FreeSpace {
                volume: volume.to_path_buf(),
                free_bytes,
                context: context.to_string(),
            });
            Some(free_bytes)
        }
        Err(err) => {
            log.record(DecisionEvent::ProbeFailure {
                path: volume.to_path_buf(),
                details: err.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::Result;
    use crate::core::profile::{ProfileHandle, ProfileRecord};
    use crate::logger::dual::MemorySink;
    use crate::platform::pal::FsStats;
    use crate::scanner::policy::Metric;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Machine whose free space grows by each deleted profile's size.
    struct FakeMachine {
        free: Mutex<u64>,
        sizes: HashMap<String, u64>,
        failing: Vec<String>,
        vanished: Vec<String>,
        deleted: Mutex<Vec<String>>,
    }

    impl FakeMachine {
        fn new(free: u64, sizes: &[(&str, u64)]) -> Self {
            Self {
                free: Mutex::new(free),
                sizes: sizes.iter().map(|(n, s)| ((*n).to_string(), *s)).collect(),
                failing: Vec::new(),
                vanished: Vec::new(),
                deleted: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProfileDirectory for FakeMachine {
        fn list_profiles(&self) -> Result<Vec<ProfileRecord>> {
            Ok(Vec::new())
        }

        fn delete_profile(&self, profile: &ProfileRecord) -> Result<()> {
            if self.failing.contains(&profile.username) {
                return Err(ReclaimError::Deletion {
                    username: profile.username.clone(),
                    reason: "profile in use".to_string(),
                });
            }
            if self.vanished.contains(&profile.username) {
                return Err(ReclaimError::ProfileVanished {
                    path: profile.path.clone(),
                });
            }
            self.deleted.lock().push(profile.username.clone());
            *self.free.lock() += self.sizes.get(&profile.username).copied().unwrap_or(0);
            Ok(())
        }
    }

    impl FreeSpaceReader for FakeMachine {
        fn fs_stats(&self, _volume: &Path) -> Result<FsStats> {
            let free = *self.free.lock();
            Ok(FsStats {
                total_bytes: free * 10,
                free_bytes: free,
            })
        }
    }

    fn records(names: &[&str]) -> Vec<ProfileRecord> {
        names
            .iter()
            .map(|n| ProfileRecord::new(format!("/home/{n}"), false, false, ProfileHandle::new(*n)))
            .collect()
    }

    fn sized<'a>(profiles: &'a [ProfileRecord], machine: &FakeMachine) -> Vec<Candidate<'a>> {
        profiles
            .iter()
            .map(|profile| Candidate {
                profile,
                metric: Metric::SizeBytes(machine.sizes[&profile.username]),
            })
            .collect()
    }

    fn config(limit: u64, profile_limit: usize, dry_run: bool) -> DeletionConfig {
        DeletionConfig {
            space_limit_bytes: limit,
            profile_limit,
            dry_run,
            volume: PathBuf::from("/"),
        }
    }

    #[test]
    fn stops_at_first_point_threshold_is_met() {
        let machine = FakeMachine::new(50, &[("a", 20), ("b", 20), ("c", 20), ("d", 20)]);
        let profiles = records(&["a", "b", "c", "d"]);
        let queue = sized(&profiles, &machine);
        let report = DeletionExecutor::new(config(85, 0, false), &machine, &machine)
            .execute(&queue, &mut DecisionLog::silent());
        assert_eq!(report.outcome, LoopOutcome::ThresholdMet);
        assert_eq!(*machine.deleted.lock(), vec!["a", "b"]);
        assert_eq!(report.final_free, Some(90));
        assert_eq!(report.bytes_freed(), 40);
        assert_eq!(report.threshold_met, Some(true));
    }

    #[test]
    fn failures_are_recorded_and_loop_continues() {
        let mut machine = FakeMachine::new(0, &[("a", 5), ("b", 5), ("c", 5)]);
        machine.failing.push("a".to_string());
        machine.vanished.push("b".to_string());
        let profiles = records(&["a", "b", "c"]);
        let queue = sized(&profiles, &machine);
        let sink = MemorySink::new();
        let mut log = DecisionLog::new(Box::new(sink.clone()));
        let report = DeletionExecutor::new(config(0, 0, false), &machine, &machine)
            .execute(&queue, &mut log);

        assert_eq!(report.outcome, LoopOutcome::Exhausted);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.deleted(), 1);
        assert_eq!(report.items[1].status, ItemStatus::Vanished);
        assert!(sink.events().iter().any(|e| matches!(
            e,
            DecisionEvent::DeleteFailed { username, code, .. } if username == "a" && code == "PRC-2003"
        )));
        assert_eq!(report.threshold_met, None);
    }

    #[test]
    fn profile_limit_caps_processed_candidates() {
        let machine = FakeMachine::new(0, &[("a", 1), ("b", 1), ("c", 1)]);
        let profiles = records(&["a", "b", "c"]);
        let queue = sized(&profiles, &machine);
        let report = DeletionExecutor::new(config(0, 2, false), &machine, &machine)
            .execute(&queue, &mut DecisionLog::silent());
        assert_eq!(report.outcome, LoopOutcome::LimitReached);
        assert_eq!(report.items.len(), 2);
    }

    #[test]
    fn dry_run_issues_nothing_but_projects_the_stop() {
        let machine = FakeMachine::new(50, &[("a", 80), ("b", 30), ("c", 10)]);
        let profiles = records(&["a", "b", "c"]);
        let queue = sized(&profiles, &machine);
        let report = DeletionExecutor::new(config(100, 0, true), &machine, &machine)
            .execute(&queue, &mut DecisionLog::silent());
        assert!(machine.deleted.lock().is_empty());
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].status, ItemStatus::Simulated);
        assert_eq!(report.outcome, LoopOutcome::ThresholdMet);
        assert_eq!(report.bytes_freed(), 0);
    }

    #[test]
    fn interrupt_flag_stops_before_next_candidate() {
        let machine = FakeMachine::new(0, &[("a", 1), ("b", 1)]);
        let profiles = records(&["a", "b"]);
        let queue = sized(&profiles, &machine);
        let flag = Arc::new(AtomicBool::new(true));
        let report = DeletionExecutor::new(config(0, 0, false), &machine, &machine)
            .with_interrupt(Arc::clone(&flag))
            .execute(&queue, &mut DecisionLog::silent());
        assert_eq!(report.outcome, LoopOutcome::Interrupted);
        assert!(report.items.is_empty());
    }

    #[test]
    fn already_satisfied_limit_deletes_nothing() {
        let machine = FakeMachine::new(500, &[("a", 1)]);
        let profiles = records(&["a"]);
        let queue = sized(&profiles, &machine);
        let report = DeletionExecutor::new(config(100, 0, false), &machine, &machine)
            .execute(&queue, &mut DecisionLog::silent());
        assert_eq!(report.outcome, LoopOutcome::ThresholdMet);
        assert!(report.items.is_empty());
    }
}
