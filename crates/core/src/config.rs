//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into core services, so nothing
//! reads process-wide environment variables while handling a request or a scan.

use crate::constants::{CAPACITY_WARNING_RATIO, DEFAULT_BOX_CAPACITY, PROJECTS_DIR_NAME};
use crate::scan::ScanPolicy;
use crate::{SampleError, SampleResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    default_box_capacity: u32,
    allow_switch_from_empty_box: bool,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidCapacity`] if `default_box_capacity` is zero.
    pub fn new(data_dir: PathBuf, default_box_capacity: u32) -> SampleResult<Self> {
        if default_box_capacity == 0 {
            return Err(SampleError::InvalidCapacity);
        }

        Ok(Self {
            data_dir,
            default_box_capacity,
            allow_switch_from_empty_box: false,
        })
    }

    /// Permit switching away from a box that has no members yet.
    pub fn with_switch_from_empty_box(mut self, allow: bool) -> Self {
        self.allow_switch_from_empty_box = allow;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir.join(PROJECTS_DIR_NAME)
    }

    pub fn default_box_capacity(&self) -> u32 {
        self.default_box_capacity
    }

    /// Scan policy derived from this configuration.
    pub fn scan_policy(&self) -> ScanPolicy {
        ScanPolicy {
            default_box_capacity: self.default_box_capacity,
            warn_ratio: CAPACITY_WARNING_RATIO,
            allow_switch_from_empty_box: self.allow_switch_from_empty_box,
        }
    }
}

/// Parse the default box capacity from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_BOX_CAPACITY`].
///
/// # Errors
///
/// Returns [`SampleError::InvalidInput`] for non-numeric values and
/// [`SampleError::InvalidCapacity`] for zero.
pub fn box_capacity_from_env_value(value: Option<String>) -> SampleResult<u32> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let parsed = value
        .map(|v| {
            v.parse::<u32>()
                .map_err(|_| SampleError::InvalidInput(format!("invalid box capacity: '{v}'")))
        })
        .transpose()?;

    match parsed {
        Some(0) => Err(SampleError::InvalidCapacity),
        Some(capacity) => Ok(capacity),
        None => Ok(DEFAULT_BOX_CAPACITY),
    }
}

/// Parse a boolean flag such as `BIOBANK_ALLOW_EMPTY_BOX_SWITCH`.
///
/// Accepts `1/0`, `true/false`, `yes/no` (case-insensitive); missing or empty means `false`.
pub fn flag_from_env_value(value: Option<String>) -> SampleResult<bool> {
    let Some(raw) = value.map(|v| v.trim().to_ascii_lowercase()) else {
        return Ok(false);
    };
    match raw.as_str() {
        "" | "0" | "false" | "no" => Ok(false),
        "1" | "true" | "yes" => Ok(true),
        other => Err(SampleError::InvalidInput(format!("invalid boolean flag: '{other}'"))),
    }
}
