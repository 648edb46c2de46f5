//! Core types: configuration, error taxonomy, profile records, whitelist.

pub mod config;
pub mod errors;
pub mod profile;
pub mod whitelist;
