//! Decision log: live stream plus append-only text and JSONL audit files.

pub mod audit;
pub mod dual;
pub mod events;
pub mod jsonl;
