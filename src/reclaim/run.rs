//! One reclamation run: enumerate, filter, select, delete, report.
//!
//! ```text
//! Idle -> Enumerating -> Filtering -> Scoring -> Deleting -> Finished
//!              |                          |
//!              +--------> Failed <--------+
//! ```
//!
//! Only enumeration and cutoff computation can fail a run. Everything past
//! that point degrades into logged events and per-candidate results.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::Local;
use serde::Serialize;

use crate::core::config::{RunConfig, SelectionMode};
use crate::core::errors::{ReclaimError, Result};
use crate::logger::dual::DecisionLog;
use crate::logger::events::DecisionEvent;
use crate::platform::pal::{Clock, FreeSpaceReader, ProfileDirectory};
use crate::scanner::activity::ActivityProbe;
use crate::scanner::deletion::{
    DeletionConfig, DeletionExecutor, DeletionReport, LoopOutcome, read_free_space,
};
use crate::scanner::filter::{Exclusion, partition};
use crate::scanner::policy::{AgePolicy, SelectionPolicy, SpacePolicy};
use crate::scanner::size::SizeProbe;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Enumerating,
    Filtering,
    Scoring,
    Deleting,
    Finished,
    Failed,
}

impl RunState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Enumerating => "enumerating",
            Self::Filtering => "filtering",
            Self::Scoring => "scoring",
            Self::Deleting => "deleting",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }

    const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// External collaborators a run drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub directory: &'a dyn ProfileDirectory,
    pub space: &'a dyn FreeSpaceReader,
    pub clock: &'a dyn Clock,
    pub activity: &'a dyn ActivityProbe,
    pub sizes: &'a dyn SizeProbe,
}

/// A profile the filter removed from consideration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedProfile {
    pub username: String,
    pub reason: Exclusion,
}

/// Everything a finished run reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub mode: SelectionMode,
    pub dry_run: bool,
    pub started_at: String,
    pub profiles_found: usize,
    pub excluded: Vec<ExcludedProfile>,
    /// Deletion queue in policy order.
    pub queued: Vec<String>,
    /// Space mode found enough free space and never built a queue.
    pub no_op: bool,
    pub report: DeletionReport,
}

impl RunSummary {
    #[must_use]
    pub const fn outcome(&self) -> LoopOutcome {
        self.report.outcome
    }
}

/// Orchestrates a single run against one set of collaborators.
pub struct ReclaimRun<'a> {
    config: RunConfig,
    volume: PathBuf,
    with: Collaborators<'a>,
    interrupt: Option<Arc<AtomicBool>>,
    state: RunState,
}

impl<'a> ReclaimRun<'a> {
    #[must_use]
    pub fn new(config: RunConfig, volume: impl Into<PathBuf>, with: Collaborators<'a>) -> Self {
        Self {
            config,
            volume: volume.into(),
            with,
            interrupt: None,
            state: RunState::Idle,
        }
    }

    /// Checked by the deletion loop between candidates.
    #[must_use]
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, to: RunState, log: &mut DecisionLog) {
        if self.state == to {
            return;
        }
        log.record(DecisionEvent::StateChanged {
            from: self.state.label().to_string(),
            to: to.label().to_string(),
        });
        self.state = to;
    }

    fn fail(&mut self, err: ReclaimError, log: &mut DecisionLog) -> ReclaimError {
        log.record(DecisionEvent::RunFailed {
            code: err.code().to_string(),
            details: err.to_string(),
        });
        self.transition(RunState::Failed, log);
        err
    }

    /// Run to completion. A run object is single-use.
    pub fn execute(&mut self, log: &mut DecisionLog) -> Result<RunSummary> {
        if self.state != RunState::Idle {
            return Err(ReclaimError::Runtime {
                details: format!("run already {}", self.state.label()),
            });
        }
        let started_at = Local::now().to_rfc3339();
        let mode = self.config.mode();
        log.record(DecisionEvent::RunStarted {
            mode: match mode {
                SelectionMode::Age => "age".to_string(),
                SelectionMode::Space => "space".to_string(),
            },
            dry_run: self.config.dry_run,
            month_cutoff: self.config.month_cutoff,
            space_limit_bytes: self.config.space_limit_bytes,
            profile_limit: self.config.profile_limit,
            whitelist: self.config.whitelist.names().map(str::to_string).collect(),
        });

        self.transition(RunState::Enumerating, log);
        let profiles = match self.with.directory.list_profiles() {
            Ok(profiles) => profiles,
            Err(err) => {
                let err = match err {
                    ReclaimError::Enumeration { .. } => err,
                    other => ReclaimError::Enumeration {
                        details: other.to_string(),
                    },
                };
                return Err(self.fail(err, log));
            }
        };
        log.record(DecisionEvent::ProfilesListed {
            total: profiles.len(),
        });

        self.transition(RunState::Filtering, log);
        let filtered = partition(&profiles, &self.config.whitelist);
        let excluded: Vec<ExcludedProfile> = filtered
            .excluded
            .iter()
            .map(|(profile, reason)| {
                log.record(DecisionEvent::Excluded {
                    username: profile.username.clone(),
                    reason: reason.label().to_string(),
                });
                ExcludedProfile {
                    username: profile.username.clone(),
                    reason: *reason,
                }
            })
            .collect();

        self.transition(RunState::Scoring, log);
        let queue = match mode {
            SelectionMode::Age => {
                let cutoff = match self.with.clock.months_ago(self.config.month_cutoff) {
                    Ok(cutoff) => cutoff,
                    Err(err) => return Err(self.fail(err, log)),
                };
                log.record(DecisionEvent::CutoffComputed {
                    cutoff: cutoff
                        .with_timezone(&Local)
                        .format("%m/%d/%Y %H:%M:%S")
                        .to_string(),
                });
                AgePolicy::new(self.with.activity, cutoff).select(filtered.eligible, log)
            }
            SelectionMode::Space => {
                let limit = self.config.space_limit_bytes;
                let free = read_free_space(self.with.space, &self.volume, "before selection", log);
                if let Some(free_bytes) = free.filter(|free| *free >= limit) {
                    log.record(DecisionEvent::NoPressure {
                        free_bytes,
                        limit_bytes: limit,
                    });
                    return Ok(self.finish(
                        log,
                        RunSummary {
                            mode,
                            dry_run: self.config.dry_run,
                            started_at,
                            profiles_found: profiles.len(),
                            excluded,
                            queued: Vec::new(),
                            no_op: true,
                            report: DeletionReport {
                                items: Vec::new(),
                                outcome: LoopOutcome::ThresholdMet,
                                dry_run: self.config.dry_run,
                                initial_free: Some(free_bytes),
                                final_free: Some(free_bytes),
                                threshold_met: Some(true),
                            },
                        },
                    ));
                }
                SpacePolicy::new(self.with.sizes, self.config.profile_limit)
                    .select(filtered.eligible, log)
            }
        };
        let queued = queue
            .iter()
            .map(|candidate| candidate.profile.username.clone())
            .collect();

        self.transition(RunState::Deleting, log);
        let mut executor = DeletionExecutor::new(
            DeletionConfig {
                space_limit_bytes: self.config.space_limit_bytes,
                profile_limit: self.config.profile_limit,
                dry_run: self.config.dry_run,
                volume: self.volume.clone(),
            },
            self.with.directory,
            self.with.space,
        );
        if let Some(flag) = &self.interrupt {
            executor = executor.with_interrupt(Arc::clone(flag));
        }
        let report = executor.execute(&queue, log);

        Ok(self.finish(
            log,
            RunSummary {
                mode,
                dry_run: self.config.dry_run,
                started_at,
                profiles_found: profiles.len(),
                excluded,
                queued,
                no_op: false,
                report,
            },
        ))
    }

    fn finish(&mut self, log: &mut DecisionLog, summary: RunSummary) -> RunSummary {
        log.record(DecisionEvent::RunFinished {
            outcome: summary.outcome().label().to_string(),
            deleted: summary.report.deleted(),
            failed: summary.report.failed(),
        });
        self.transition(RunState::Finished, log);
        debug_assert!(self.state.is_terminal());
        summary
    }
}
