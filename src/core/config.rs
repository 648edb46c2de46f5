//! Layered configuration: defaults, TOML file, `RECLAIM_*` environment, CLI.
//!
//! [`Config`] is the loose, serializable document; [`RunConfig`] is the
//! validated snapshot a single run consumes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{ReclaimError, Result};
use crate::core::whitelist::WhitelistSet;

/// One binary gigabyte, the unit `space_limit_gb` is expressed in.
pub const GIB: u64 = 1_073_741_824;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "RECLAIM_";

/// Full configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub policy: PolicyConfig,
    pub paths: PathsConfig,
    pub probe: ProbeConfig,
    /// Extra usernames to protect, on top of the built-in set.
    pub whitelist: Vec<String>,
}

/// Selection and loop controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PolicyConfig {
    /// Delete profiles with no activity in this many months. 0 disables.
    pub month_cutoff: u32,
    /// Reclaim until this many GiB are free. 0 disables.
    pub space_limit_gb: f64,
    /// Process at most this many profiles. 0 means unlimited.
    pub profile_limit: usize,
    /// Log every decision but never issue a deletion.
    pub dry_run: bool,
}

/// Filesystem locations. Unset entries fall back to platform defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory receiving the per-run audit log.
    pub log_dir: Option<PathBuf>,
    /// Volume whose free space drives the space policy.
    pub volume: Option<PathBuf>,
    /// Root holding profile directories (Linux only).
    pub profiles_root: Option<PathBuf>,
}

/// Prober tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Worker threads used when sizing a profile tree.
    pub parallelism: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { parallelism: 4 }
    }
}

impl Config {
    /// Load from `path` (required to exist) or from `default_path` (optional),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>, default_path: &Path) -> Result<Self> {
        let mut config = match path {
            Some(explicit) => {
                if !explicit.is_file() {
                    return Err(ReclaimError::MissingConfig {
                        path: explicit.to_path_buf(),
                    });
                }
                Self::from_file(explicit)?
            }
            None if default_path.is_file() => Self::from_file(default_path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ReclaimError::io(path, e))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `RECLAIM_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(raw) = var("MONTHS") {
            self.policy.month_cutoff = parse_env("RECLAIM_MONTHS", &raw)?;
        }
        if let Some(raw) = var("SPACE_LIMIT_GB") {
            self.policy.space_limit_gb = parse_env("RECLAIM_SPACE_LIMIT_GB", &raw)?;
        }
        if let Some(raw) = var("PROFILE_LIMIT") {
            self.policy.profile_limit = parse_env("RECLAIM_PROFILE_LIMIT", &raw)?;
        }
        if let Some(raw) = var("DRY_RUN") {
            self.policy.dry_run = parse_bool("RECLAIM_DRY_RUN", &raw)?;
        }
        if let Some(raw) = var("WHITELIST") {
            self.whitelist.extend(split_list(&raw));
        }
        if let Some(raw) = var("LOG_DIR") {
            self.paths.log_dir = Some(PathBuf::from(raw));
        }
        if let Some(raw) = var("VOLUME") {
            self.paths.volume = Some(PathBuf::from(raw));
        }
        Ok(())
    }

    /// Space limit in bytes, rejecting negative or non-finite values.
    pub fn space_limit_bytes(&self) -> Result<u64> {
        gib_to_bytes(self.policy.space_limit_gb)
    }
}

/// Validated configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub month_cutoff: u32,
    pub space_limit_bytes: u64,
    pub profile_limit: usize,
    pub dry_run: bool,
    pub whitelist: WhitelistSet,
}

/// Which selection policy builds the deletion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Inactivity cutoff; a space limit, if set, is only an early exit.
    Age,
    /// Largest profiles first until the space limit is met.
    Space,
}

impl RunConfig {
    /// Fails fast when neither a month cutoff nor a space limit is set.
    pub fn new(
        month_cutoff: u32,
        space_limit_bytes: u64,
        profile_limit: usize,
        dry_run: bool,
        whitelist: WhitelistSet,
    ) -> Result<Self> {
        if month_cutoff == 0 && space_limit_bytes == 0 {
            return Err(ReclaimError::invalid_config(
                "either a month cutoff or a space limit must be set",
            ));
        }
        Ok(Self {
            month_cutoff,
            space_limit_bytes,
            profile_limit,
            dry_run,
            whitelist,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.policy.month_cutoff,
            config.space_limit_bytes()?,
            config.policy.profile_limit,
            config.policy.dry_run,
            WhitelistSet::with_names(&config.whitelist),
        )
    }

    #[must_use]
    pub const fn mode(&self) -> SelectionMode {
        if self.month_cutoff > 0 {
            SelectionMode::Age
        } else {
            SelectionMode::Space
        }
    }
}

/// Convert GiB to bytes, rounding to the nearest byte.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn gib_to_bytes(gib: f64) -> Result<u64> {
    if !gib.is_finite() || gib < 0.0 {
        return Err(ReclaimError::invalid_config(format!(
            "space limit must be a non-negative number of GB, got {gib}"
        )));
    }
    let bytes = (gib * GIB as f64).round();
    if bytes >= u64::MAX as f64 {
        return Err(ReclaimError::invalid_config(format!(
            "space limit {gib} GB is out of range"
        )));
    }
    Ok(bytes as u64)
}

/// Split a comma-separated list, trimming and dropping blank entries.
pub fn split_list(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
}

fn parse_env<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ReclaimError::ConfigParse {
        context: key,
        details: format!("{raw:?}: {e}"),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ReclaimError::ConfigParse {
            context: key,
            details: format!("expected a boolean, got {other:?}"),
        }),
    }
}
