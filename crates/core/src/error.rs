use crate::rule::ElementKind;
use biobank_ids::{CodeId, IdError};
use biobank_types::TextError;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid text: {0}")]
    Text(#[from] TextError),
    #[error("invalid identifier: {0}")]
    Id(#[from] IdError),

    // Rule definition and generation.
    #[error("sample code rule not configured: no slot is assigned")]
    RuleNotConfigured,
    #[error("slot {slot} is out of range (rule has {max} slots)")]
    SlotOutOfRange { slot: usize, max: usize },
    #[error("slot {slot} is already assigned to {kind}")]
    SlotOccupied { slot: usize, kind: ElementKind },
    #[error("element {0} is assigned to more than one slot")]
    DuplicateElement(ElementKind),
    #[error("no generation criteria selected")]
    NoGenerationCriteria,
    #[error("value '{value}' is not in the {axis} dictionary")]
    ValueNotInDictionary { axis: &'static str, value: String },
    #[error("value '{value}' is selected more than once for {axis}")]
    DuplicateSelection { axis: &'static str, value: String },
    #[error("{0} values were selected but no slot of the rule uses them")]
    AxisNotInRule(&'static str),
    #[error("project has no value for {0}, which the rule places in a slot")]
    MissingProjectCode(ElementKind),
    #[error("generation would produce {count} codes (maximum {max})")]
    TooManyCodes { count: usize, max: usize },

    // Code edit and signature gate.
    #[error("proposed code is identical to the current code")]
    UnchangedCode,
    #[error("code was changed elsewhere (expected '{expected}', found '{found}')")]
    StaleEdit { expected: String, found: String },
    #[error("an audit reason is required")]
    MissingAuditReason,
    #[error("signature rejected: {0}")]
    SignatureRejected(String),
    #[error("signature verification failed: {0}")]
    SignatureFailed(String),
    #[error("generated code {0} not found")]
    CodeNotFound(CodeId),

    // Scan reconciliation.
    #[error("no active box: scan or select a box first")]
    NoActiveBox,
    #[error("sample {0} has already been scanned")]
    AlreadyScanned(String),
    #[error("sample {0} is marked as error")]
    CodeInErrorState(String),
    #[error("sample {0} is not in the expected list")]
    UnexpectedCode(String),
    #[error("box {0} has already been used in this session")]
    BoxAlreadyUsed(String),
    #[error("box {0} is empty; scan at least one sample before switching boxes")]
    BoxSwitchFromEmpty(String),
    #[error("box {box_code} is full ({capacity} samples)")]
    BoxFull { box_code: String, capacity: u32 },
    #[error("box capacity must be greater than zero")]
    InvalidCapacity,
    #[error("an error reason is required")]
    MissingErrorReason,
    #[error("no samples have been scanned")]
    NothingScanned,
    #[error("{0} expected samples are still pending")]
    PendingSamples(usize),

    // Storage assignment.
    #[error("location for box {box_code} is incomplete (missing: {})", .missing.join(", "))]
    IncompleteLocation {
        box_code: String,
        missing: Vec<&'static str>,
    },
    #[error("location {location} is already assigned to box {box_code}")]
    LocationOccupied { location: String, box_code: String },
    #[error("{0} boxes have no storage location yet")]
    UnassignedBoxes(usize),
    #[error("there are no boxes to assign")]
    NoBoxes,

    // Collaborators.
    #[error("backend error: {0}")]
    Backend(String),
    #[error("operation cancelled")]
    Cancelled,

    // Project repository.
    #[error("project {0} not found")]
    ProjectNotFound(String),
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize JSON: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(String),
}

/// Broad classes of failure, used by callers to choose how to surface an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input; retrying without changing it will fail again.
    Validation,
    /// Wrong password; the staged operation is kept for a retry.
    Signature,
    /// The operation clashes with the current session state and was refused.
    Conflict,
    /// Backend or network failure; the user may re-invoke the operation.
    Backend,
    /// The requested record does not exist.
    NotFound,
    /// Local I/O or serialization failure.
    Internal,
}

impl SampleError {
    pub fn class(&self) -> ErrorClass {
        use SampleError::*;
        match self {
            InvalidInput(_)
            | Text(_)
            | Id(_)
            | RuleNotConfigured
            | SlotOutOfRange { .. }
            | SlotOccupied { .. }
            | DuplicateElement(_)
            | NoGenerationCriteria
            | ValueNotInDictionary { .. }
            | DuplicateSelection { .. }
            | AxisNotInRule(_)
            | MissingProjectCode(_)
            | TooManyCodes { .. }
            | UnchangedCode
            | MissingAuditReason
            | InvalidCapacity
            | MissingErrorReason
            | IncompleteLocation { .. }
            | YamlDeserialization(_) => ErrorClass::Validation,
            SignatureRejected(_) => ErrorClass::Signature,
            StaleEdit { .. }
            | NoActiveBox
            | AlreadyScanned(_)
            | CodeInErrorState(_)
            | UnexpectedCode(_)
            | BoxAlreadyUsed(_)
            | BoxSwitchFromEmpty(_)
            | BoxFull { .. }
            | NothingScanned
            | PendingSamples(_)
            | LocationOccupied { .. }
            | UnassignedBoxes(_)
            | NoBoxes
            | Cancelled => ErrorClass::Conflict,
            SignatureFailed(_) | Backend(_) => ErrorClass::Backend,
            CodeNotFound(_) | ProjectNotFound(_) => ErrorClass::NotFound,
            StorageDirCreation(_)
            | FileWrite(_)
            | FileRead(_)
            | Serialization(_)
            | YamlSerialization(_) => ErrorClass::Internal,
        }
    }
}

pub type SampleResult<T> = std::result::Result<T, SampleError>;
