#![forbid(unsafe_code)]

//! Profile Reclaimer: policy-driven removal of stale or oversized local user
//! profiles on shared machines.
//!
//! A run has three stages:
//! 1. **Filter**: drop special, loaded and whitelisted profiles
//! 2. **Select**: queue by inactivity cutoff, or largest-first under a
//!    free-space target
//! 3. **Delete**: remove through the OS profile mechanism, re-checking free
//!    space and the profile cap after every deletion
//!
//! Every decision lands in an append-only audit trail.

pub mod core;
pub mod logger;
pub mod platform;
pub mod prelude;
pub mod reclaim;
pub mod scanner;
