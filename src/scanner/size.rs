//! Size prober: total on-disk bytes of a profile tree.

use std::path::Path;

use crate::core::config::GIB;
use crate::scanner::walker::{WalkIssue, WalkOptions, parallel_total_size};

/// Result of one size probe. `bytes` is a partial sum when `issues` is
/// non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeMeasurement {
    pub bytes: u64,
    pub issues: Vec<WalkIssue>,
}

impl SizeMeasurement {
    /// Size in GiB rounded to two decimals. Display only.
    #[must_use]
    pub fn gib(&self) -> f64 {
        bytes_to_gib(self.bytes)
    }
}

/// Seam for the space policy.
pub trait SizeProbe {
    fn measure(&self, root: &Path) -> SizeMeasurement;
}

/// Filesystem-backed size prober.
#[derive(Debug, Clone, Copy)]
pub struct SizeProber {
    options: WalkOptions,
    parallelism: usize,
}

impl SizeProber {
    #[must_use]
    pub fn new(parallelism: usize) -> Self {
        Self {
            options: WalkOptions {
                skip_reparse_points: true,
                skip_system_files: false,
            },
            parallelism: parallelism.max(1),
        }
    }

    #[must_use]
    pub fn total_size(&self, root: &Path) -> SizeMeasurement {
        let (bytes, issues) = parallel_total_size(root, self.options, self.parallelism);
        SizeMeasurement { bytes, issues }
    }
}

impl SizeProbe for SizeProber {
    fn measure(&self, root: &Path) -> SizeMeasurement {
        self.total_size(root)
    }
}

/// Bytes to GiB, rounded to two decimals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bytes_to_gib(bytes: u64) -> f64 {
    (bytes as f64 / GIB as f64 * 100.0).round() / 100.0
}

/// `12.34 GB`-style label.
#[must_use]
pub fn format_gib(bytes: u64) -> String {
    format!("{:.2} GB", bytes_to_gib(bytes))
}
