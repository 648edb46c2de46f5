//! Selection policies: turn eligible profiles into an ordered deletion queue.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::profile::ProfileRecord;
use crate::logger::dual::DecisionLog;
use crate::logger::events::DecisionEvent;
use crate::scanner::activity::ActivityProbe;
use crate::scanner::size::SizeProbe;
use crate::scanner::walker::WalkIssue;

/// What the active policy measured for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Metric {
    /// Age policy: whether post-cutoff activity was found.
    RecentActivity(bool),
    /// Space policy: total bytes on disk.
    SizeBytes(u64),
}

/// An eligible profile annotated by a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub profile: &'a ProfileRecord,
    pub metric: Metric,
}

impl Candidate<'_> {
    #[must_use]
    pub const fn size_bytes(&self) -> Option<u64> {
        match self.metric {
            Metric::SizeBytes(bytes) => Some(bytes),
            Metric::RecentActivity(_) => None,
        }
    }
}

/// Orders eligible profiles for deletion.
pub trait SelectionPolicy {
    /// Deletion queue, first entry deleted first.
    fn select<'a>(
        &self,
        eligible: Vec<&'a ProfileRecord>,
        log: &mut DecisionLog,
    ) -> Vec<Candidate<'a>>;
}

/// Queue every profile with no file modified after `cutoff`, in filter order.
pub struct AgePolicy<'p> {
    probe: &'p dyn ActivityProbe,
    cutoff: DateTime<Utc>,
}

impl<'p> AgePolicy<'p> {
    #[must_use]
    pub fn new(probe: &'p dyn ActivityProbe, cutoff: DateTime<Utc>) -> Self {
        Self { probe, cutoff }
    }
}

impl SelectionPolicy for AgePolicy<'_> {
    fn select<'a>(
        &self,
        eligible: Vec<&'a ProfileRecord>,
        log: &mut DecisionLog,
    ) -> Vec<Candidate<'a>> {
        let mut queue = Vec::new();
        for profile in eligible {
            let verdict = self.probe.probe(&profile.path, self.cutoff);
            log_issues(log, &verdict.issues);
            if verdict.recent {
                log.record(DecisionEvent::Keep {
                    username: profile.username.clone(),
                    evidence: verdict.evidence,
                });
                continue;
            }
            log.record(DecisionEvent::Queued {
                username: profile.username.clone(),
                size_bytes: None,
            });
            queue.push(Candidate {
                profile,
                metric: Metric::RecentActivity(false),
            });
        }
        queue
    }
}

/// Size every eligible profile and queue them largest first.
pub struct SpacePolicy<'p> {
    probe: &'p dyn SizeProbe,
    profile_limit: usize,
}

impl<'p> SpacePolicy<'p> {
    /// `profile_limit` caps how many profiles get sized (0 = all); sizing is
    /// the expensive step, so the cap applies before it.
    #[must_use]
    pub fn new(probe: &'p dyn SizeProbe, profile_limit: usize) -> Self {
        Self {
            probe,
            profile_limit,
        }
    }
}

impl SelectionPolicy for SpacePolicy<'_> {
    fn select<'a>(
        &self,
        mut eligible: Vec<&'a ProfileRecord>,
        log: &mut DecisionLog,
    ) -> Vec<Candidate<'a>> {
        if self.profile_limit > 0 {
            eligible.truncate(self.profile_limit);
        }

        let mut queue: Vec<Candidate<'a>> = eligible
            .into_iter()
            .map(|profile| {
                let measured = self.probe.measure(&profile.path);
                log_issues(log, &measured.issues);
                log.record(DecisionEvent::Sized {
                    username: profile.username.clone(),
                    size_bytes: measured.bytes,
                });
                Candidate {
                    profile,
                    metric: Metric::SizeBytes(measured.bytes),
                }
            })
            .collect();

        // Stable: equal sizes keep filter order.
        queue.sort_by(|left, right| right.size_bytes().cmp(&left.size_bytes()));

        for candidate in &queue {
            log.record(DecisionEvent::Queued {
                username: candidate.profile.username.clone(),
                size_bytes: candidate.size_bytes(),
            });
        }
        queue
    }
}

fn log_issues(log: &mut DecisionLog, issues: &[WalkIssue]) {
    for issue in issues {
        log.record(DecisionEvent::ProbeFailure {
            path: issue.path.clone(),
            details: issue.details.clone(),
        });
    }
}

/// Usernames of a queue, in order. Handy for reports and assertions.
#[must_use]
pub fn queue_order<'a>(queue: &'a [Candidate<'_>]) -> Vec<&'a str> {
    queue.iter().map(|c| c.profile.username.as_str()).collect()
}
