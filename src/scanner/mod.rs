//! Profile scanner: probes, eligibility filter, selection policies and the
//! deletion loop.

pub mod activity;
pub mod deletion;
pub mod filter;
pub mod policy;
pub mod size;
pub mod walker;
