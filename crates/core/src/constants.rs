//! Constants used throughout the biobank core crate.

use std::time::Duration;

/// Separator placed between slot values of a generated code.
pub const CODE_SEPARATOR: &str = "-";

/// Number of slot positions in a sample code rule (one per element kind).
pub const SLOT_COUNT: usize = 9;

/// Upper bound on the number of codes a single generation request may produce.
pub const MAX_GENERATED_CODES: usize = 100_000;

/// Upper bound on the quantity of a stability/QC request.
pub const MAX_STABILITY_QC_QUANTITY: u32 = 10_000;

/// Zero-padded width of stability/QC sequence numbers.
pub const STABILITY_QC_NUMBER_WIDTH: usize = 3;

/// Zero-padded width of subject numbers when a range does not say otherwise.
pub const DEFAULT_SUBJECT_WIDTH: usize = 3;

/// Upper bound on the subject ids all ranges of a rule may produce together.
pub const MAX_SUBJECT_RANGE_COUNT: u64 = 100_000;

/// Widest zero padding a subject range may ask for.
pub const MAX_SUBJECT_WIDTH: usize = 16;

/// Capacity used for boxes whose metadata carries none.
pub const DEFAULT_BOX_CAPACITY: u32 = 100;

/// Fill ratio at which the operator is warned that the active box is nearly full.
pub const CAPACITY_WARNING_RATIO: f64 = 0.9;

/// Longest gap between two keystrokes that still counts as one scanner burst.
pub const SCAN_KEY_GAP: Duration = Duration::from_millis(100);

/// Default directory for project data when none is configured.
pub const DEFAULT_DATA_DIR: &str = "biobank_data";

/// Directory name for project records.
pub const PROJECTS_DIR_NAME: &str = "projects";

/// Filename of the project descriptor.
pub const PROJECT_FILENAME: &str = "project.yaml";

/// Filename of the stored sample code rule.
pub const RULE_FILENAME: &str = "sample_code_rule.yaml";

/// Filename of the append-only rule audit log.
pub const AUDIT_LOG_FILENAME: &str = "audit.log";
