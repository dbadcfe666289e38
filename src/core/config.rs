//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use serde::{Deserialize, Serialize};

use crate::core::errors::{CharterError, Result};

/// Full disk_charter configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub scan: ScanOptions,
}

/// Per-scan options bundle consumed by [`crate::scanner::parallel::ParallelScanner`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanOptions {
    /// Materialize file-level nodes in the tree. When false, files only
    /// contribute bytes to their directory's total.
    pub include_file_nodes: bool,
    /// Maximum descent depth; directories at the bound are finalized
    /// without enumerating their contents. `None` means unbounded.
    pub max_depth: Option<usize>,
    /// Worker thread count; 0 derives a count from hardware parallelism.
    pub worker_count: usize,
    /// Which per-file byte metric totals are built from.
    pub size_accounting: SizeAccounting,
    /// How opaque bundle directories (`.app` and friends) are handled.
    pub bundle_policy: BundlePolicy,
    /// Exclude children that live on a different device than the scan root.
    pub stay_on_device: bool,
    /// Path prefixes never descended into (virtual, ephemeral, or
    /// access-restricted OS locations). The scan root itself is exempt.
    pub pruned_paths: Vec<PathBuf>,
    /// Extension suffixes identifying opaque bundle directories.
    pub bundle_suffixes: Vec<String>,
}

/// Per-file size metric selected once for the whole scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SizeAccounting {
    /// Apparent size as reported by the directory entry.
    Logical,
    /// Blocks actually consumed on disk (POSIX 512-byte block units).
    #[default]
    Allocated,
}

/// Policy for directories conventionally treated as single opaque units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BundlePolicy {
    /// Exclude the bundle from totals; a zero-size placeholder node marks
    /// its existence.
    Skip,
    /// Fold the bundle's full recursive byte total into its parent as one
    /// childless node, computed off the shared queue.
    #[default]
    Aggregate,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_file_nodes: false,
            max_depth: None,
            worker_count: 0,
            size_accounting: SizeAccounting::default(),
            bundle_policy: BundlePolicy::default(),
            stay_on_device: true,
            pruned_paths: default_pruned_paths(),
            bundle_suffixes: default_bundle_suffixes(),
        }
    }
}

impl ScanOptions {
    /// Resolve the worker count, deriving from hardware parallelism when
    /// unset. The workload is I/O-bound, so the pool oversubscribes the
    /// core count to hide blocking directory-read latency.
    #[must_use]
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count;
        }
        let cores = thread::available_parallelism().map_or(1, std::num::NonZero::get);
        (cores * 8).min(cores + 24).max(1)
    }

    /// Validate option values, normalizing bundle suffixes to lowercase.
    pub fn validate(&mut self) -> Result<()> {
        if self.worker_count > MAX_WORKER_COUNT {
            return Err(CharterError::InvalidConfig {
                details: format!(
                    "worker_count {} exceeds maximum {MAX_WORKER_COUNT}",
                    self.worker_count
                ),
            });
        }
        for suffix in &mut self.bundle_suffixes {
            if suffix.is_empty() || suffix.contains('.') || suffix.contains('/') {
                return Err(CharterError::InvalidConfig {
                    details: format!("bundle suffix {suffix:?} must be a bare extension"),
                });
            }
            suffix.make_ascii_lowercase();
        }
        for path in &self.pruned_paths {
            if !path.is_absolute() {
                return Err(CharterError::InvalidConfig {
                    details: format!("pruned path {} must be absolute", path.display()),
                });
            }
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration: TOML file (if present) layered with `DCH_*`
    /// environment overrides, then validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = fs::read_to_string(p).map_err(|_| CharterError::MissingConfig {
                    path: p.to_path_buf(),
                })?;
                toml::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.scan.validate()?;
        Ok(config)
    }

    /// Apply `DCH_*` environment variable overrides on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_var("DCH_INCLUDE_FILE_NODES") {
            self.scan.include_file_nodes = parse_bool("DCH_INCLUDE_FILE_NODES", &v)?;
        }
        if let Some(v) = env_var("DCH_MAX_DEPTH") {
            self.scan.max_depth =
                Some(v.parse().map_err(|_| invalid_env("DCH_MAX_DEPTH", &v))?);
        }
        if let Some(v) = env_var("DCH_WORKER_COUNT") {
            self.scan.worker_count = v
                .parse()
                .map_err(|_| invalid_env("DCH_WORKER_COUNT", &v))?;
        }
        if let Some(v) = env_var("DCH_SIZE_ACCOUNTING") {
            self.scan.size_accounting = match v.to_ascii_lowercase().as_str() {
                "logical" => SizeAccounting::Logical,
                "allocated" => SizeAccounting::Allocated,
                _ => return Err(invalid_env("DCH_SIZE_ACCOUNTING", &v)),
            };
        }
        if let Some(v) = env_var("DCH_BUNDLE_POLICY") {
            self.scan.bundle_policy = match v.to_ascii_lowercase().as_str() {
                "skip" => BundlePolicy::Skip,
                "aggregate" => BundlePolicy::Aggregate,
                _ => return Err(invalid_env("DCH_BUNDLE_POLICY", &v)),
            };
        }
        if let Some(v) = env_var("DCH_STAY_ON_DEVICE") {
            self.scan.stay_on_device = parse_bool("DCH_STAY_ON_DEVICE", &v)?;
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid_env(name, value)),
    }
}

fn invalid_env(name: &str, value: &str) -> CharterError {
    CharterError::InvalidConfig {
        details: format!("env override {name}={value:?} is not a valid value"),
    }
}

/// Virtual, ephemeral, or access-restricted locations skipped by default.
#[must_use]
pub fn default_pruned_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    let prefixes: &[&str] = &[
        "/System/Volumes",
        "/private/var/vm",
        "/dev",
        "/Volumes",
        "/Library/Developer/CoreSimulator",
    ];
    #[cfg(all(unix, not(target_os = "macos")))]
    let prefixes: &[&str] = &["/proc", "/sys", "/dev", "/run", "/snap"];
    #[cfg(not(unix))]
    let prefixes: &[&str] = &[];

    prefixes.iter().map(PathBuf::from).collect()
}

/// Extension suffixes conventionally denoting structured-but-atomic
/// directory bundles.
#[must_use]
pub fn default_bundle_suffixes() -> Vec<String> {
    [
        "app",
        "framework",
        "bundle",
        "appex",
        "kext",
        "xpc",
        "photoslibrary",
        "musiclibrary",
        "tvlibrary",
        "docset",
        "xcarchive",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Hard cap on configured worker counts; beyond this thread-spawn overhead
/// dwarfs any I/O overlap benefit.
const MAX_WORKER_COUNT: usize = 1024;
