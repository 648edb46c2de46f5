//! Run orchestration and process-level interrupt handling.

pub mod run;
#[cfg(feature = "signals")]
pub mod signals;
