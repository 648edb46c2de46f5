//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use profile_reclaimer::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, RunConfig, SelectionMode};
pub use crate::core::errors::{ReclaimError, Result};
pub use crate::core::profile::{ProfileHandle, ProfileRecord};
pub use crate::core::whitelist::WhitelistSet;

// Platform
pub use crate::platform::pal::{
    Clock, FreeSpaceReader, FsStats, Platform, ProfileDirectory, SystemClock, detect_platform,
};

// Scanner
pub use crate::scanner::activity::{ActivityProbe, ActivityProber};
pub use crate::scanner::deletion::{DeletionConfig, DeletionExecutor, DeletionReport, LoopOutcome};
pub use crate::scanner::filter::eligible;
pub use crate::scanner::policy::{AgePolicy, Candidate, Metric, SelectionPolicy, SpacePolicy};
pub use crate::scanner::size::{SizeProbe, SizeProber};

// Logging
pub use crate::logger::dual::{DecisionLog, LogSink};
pub use crate::logger::events::DecisionEvent;

// Run
pub use crate::reclaim::run::{Collaborators, ReclaimRun, RunSummary};
