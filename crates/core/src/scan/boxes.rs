use crate::constants::{CAPACITY_WARNING_RATIO, DEFAULT_BOX_CAPACITY};
use serde::{Deserialize, Serialize};

/// Box selection and capacity policy for a scan session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanPolicy {
    /// Capacity used when the box metadata does not declare one.
    pub default_box_capacity: u32,
    /// Fill ratio at which a non-blocking warning is raised.
    pub warn_ratio: f64,
    /// Permit switching away from a box with no members.
    pub allow_switch_from_empty_box: bool,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            default_box_capacity: DEFAULT_BOX_CAPACITY,
            warn_ratio: CAPACITY_WARNING_RATIO,
            allow_switch_from_empty_box: false,
        }
    }
}

/// Fill level of a box after a scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxFill {
    Normal,
    NearFull,
    Full,
}

/// A physical container receiving scanned samples.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleBox {
    pub code: String,
    pub capacity: u32,
    pub members: Vec<String>,
}

impl SampleBox {
    pub(crate) fn new(code: String, capacity: u32) -> Self {
        Self {
            code,
            capacity,
            members: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity as usize
    }

    pub fn remaining(&self) -> usize {
        (self.capacity as usize).saturating_sub(self.members.len())
    }

    pub fn fill(&self, warn_ratio: f64) -> BoxFill {
        if self.is_full() {
            BoxFill::Full
        } else if self.members.len() as f64 >= f64::from(self.capacity) * warn_ratio {
            BoxFill::NearFull
        } else {
            BoxFill::Normal
        }
    }
}
