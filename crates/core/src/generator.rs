//! Combination generator.
//!
//! Turns a [`GenerationRequest`] into one [`GeneratedCode`] per point of the Cartesian product of
//! every non-empty axis. Clinic/subject and sequence/time are supplied as pairs and each pair
//! list forms a single axis, so a subject is never combined with another clinic's subjects.
//!
//! Axes with an empty selection are absent from the product. Axes are ordered by the first slot
//! their element kinds occupy in the rule, and the last axis varies fastest, so the same rule and
//! request always yield the same codes in the same order.

use crate::constants::{CODE_SEPARATOR, MAX_GENERATED_CODES};
use crate::error::{SampleError, SampleResult};
use crate::rule::{CodeRule, ElementKind, ProjectCodes};
use biobank_ids::{CodeId, CodeIdGenerator};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================================================
// REQUEST AND RESULT TYPES
// ============================================================================

/// A clinic code paired with one of its subjects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClinicSubjectPair {
    pub clinic: String,
    pub subject: String,
}

impl ClinicSubjectPair {
    pub fn new(clinic: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            clinic: clinic.into(),
            subject: subject.into(),
        }
    }
}

/// A collection sequence number paired with its collection time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeqTimePair {
    pub seq: String,
    pub time: String,
}

impl SeqTimePair {
    pub fn new(seq: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            seq: seq.into(),
            time: time.into(),
        }
    }
}

/// Selected values per axis. An empty list means the axis is not used.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub cycles: Vec<String>,
    pub test_types: Vec<String>,
    pub primary: Vec<String>,
    pub backup: Vec<String>,
    pub clinic_subject_pairs: Vec<ClinicSubjectPair>,
    pub seq_time_pairs: Vec<SeqTimePair>,
}

/// Whether a fraction code came from the primary or the backup dictionary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fraction {
    Primary,
    Backup,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FractionValue {
    pub fraction: Fraction,
    pub code: String,
}

/// The selected values that produced one code.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeProvenance {
    pub cycle: Option<String>,
    pub test_type: Option<String>,
    pub fraction: Option<FractionValue>,
    pub clinic_subject: Option<ClinicSubjectPair>,
    pub seq_time: Option<SeqTimePair>,
}

impl CodeProvenance {
    fn value_for(&self, kind: ElementKind) -> Option<&str> {
        match kind {
            ElementKind::ClinicCode => self.clinic_subject.as_ref().map(|p| p.clinic.as_str()),
            ElementKind::SubjectId => self.clinic_subject.as_ref().map(|p| p.subject.as_str()),
            ElementKind::TestType => self.test_type.as_deref(),
            ElementKind::CollectionSeq => self.seq_time.as_ref().map(|p| p.seq.as_str()),
            ElementKind::CollectionTime => self.seq_time.as_ref().map(|p| p.time.as_str()),
            ElementKind::CycleGroup => self.cycle.as_deref(),
            ElementKind::SampleFraction => self.fraction.as_ref().map(|f| f.code.as_str()),
            ElementKind::SponsorCode | ElementKind::LabCode => None,
        }
    }

    fn apply(&mut self, value: &AxisValue) {
        match value {
            AxisValue::Cycle(v) => self.cycle = Some(v.clone()),
            AxisValue::TestType(v) => self.test_type = Some(v.clone()),
            AxisValue::Fraction(v) => self.fraction = Some(v.clone()),
            AxisValue::ClinicSubject(v) => self.clinic_subject = Some(v.clone()),
            AxisValue::SeqTime(v) => self.seq_time = Some(v.clone()),
        }
    }
}

/// One generated code row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    id: CodeId,
    code: String,
    edited_code: Option<String>,
    provenance: CodeProvenance,
}

impl GeneratedCode {
    pub fn id(&self) -> CodeId {
        self.id
    }

    /// The code as originally rendered from the rule.
    pub fn original_code(&self) -> &str {
        &self.code
    }

    /// The edited code if one was committed, otherwise the original.
    pub fn current_code(&self) -> &str {
        self.edited_code.as_deref().unwrap_or(&self.code)
    }

    pub fn is_edited(&self) -> bool {
        self.edited_code.is_some()
    }

    pub fn provenance(&self) -> &CodeProvenance {
        &self.provenance
    }

    pub(crate) fn apply_edit(&mut self, code: String) {
        self.edited_code = Some(code);
    }
}

/// Finds a row by id in a preview list.
pub fn find_code_mut(codes: &mut [GeneratedCode], id: CodeId) -> SampleResult<&mut GeneratedCode> {
    codes
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or(SampleError::CodeNotFound(id))
}

// ============================================================================
// AXES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AxisKind {
    Cycle,
    TestType,
    Fraction,
    ClinicSubject,
    SeqTime,
}

impl AxisKind {
    fn name(&self) -> &'static str {
        match self {
            AxisKind::Cycle => "cycles",
            AxisKind::TestType => "test_types",
            AxisKind::Fraction => "sample_fraction",
            AxisKind::ClinicSubject => "clinic_subject_pairs",
            AxisKind::SeqTime => "seq_time_pairs",
        }
    }

    fn element_kinds(&self) -> &'static [ElementKind] {
        match self {
            AxisKind::Cycle => &[ElementKind::CycleGroup],
            AxisKind::TestType => &[ElementKind::TestType],
            AxisKind::Fraction => &[ElementKind::SampleFraction],
            AxisKind::ClinicSubject => &[ElementKind::ClinicCode, ElementKind::SubjectId],
            AxisKind::SeqTime => &[ElementKind::CollectionSeq, ElementKind::CollectionTime],
        }
    }
}

#[derive(Clone, Debug)]
enum AxisValue {
    Cycle(String),
    TestType(String),
    Fraction(FractionValue),
    ClinicSubject(ClinicSubjectPair),
    SeqTime(SeqTimePair),
}

#[derive(Debug)]
struct Axis {
    kind: AxisKind,
    position: usize,
    values: Vec<AxisValue>,
}

/// Validated, ordered axes ready for the product.
#[derive(Debug)]
pub struct GenerationPlan {
    axes: Vec<Axis>,
    total: usize,
}

impl GenerationPlan {
    /// Number of codes the plan will produce.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Axis names in product order.
    pub fn axis_names(&self) -> Vec<&'static str> {
        self.axes.iter().map(|a| a.kind.name()).collect()
    }
}

// ============================================================================
// GENERATOR
// ============================================================================

/// Renders codes for one project's rule.
#[derive(Clone, Copy, Debug)]
pub struct CodeGenerator<'a> {
    rule: &'a CodeRule,
    project: &'a ProjectCodes,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(rule: &'a CodeRule, project: &'a ProjectCodes) -> Self {
        Self { rule, project }
    }

    /// Validates `request` against the rule and its dictionaries and orders the axes.
    ///
    /// # Errors
    ///
    /// Returns, in order of checking:
    /// - [`SampleError::RuleNotConfigured`] if no slot is assigned,
    /// - [`SampleError::NoGenerationCriteria`] if every axis is empty,
    /// - [`SampleError::ValueNotInDictionary`] / [`SampleError::InvalidInput`] for selections
    ///   outside their dictionary,
    /// - [`SampleError::DuplicateSelection`] for repeated values within an axis,
    /// - [`SampleError::AxisNotInRule`] for a non-empty axis no slot uses,
    /// - [`SampleError::MissingProjectCode`] for an assigned constant slot without a value,
    /// - [`SampleError::TooManyCodes`] above [`MAX_GENERATED_CODES`].
    pub fn plan(&self, request: &GenerationRequest) -> SampleResult<GenerationPlan> {
        if !self.rule.is_configured() {
            return Err(SampleError::RuleNotConfigured);
        }

        let candidates = [
            (AxisKind::Cycle, self.cycle_values(request)),
            (AxisKind::TestType, self.test_type_values(request)),
            (AxisKind::Fraction, self.fraction_values(request)),
            (AxisKind::ClinicSubject, self.clinic_subject_values(request)),
            (AxisKind::SeqTime, self.seq_time_values(request)),
        ];

        if candidates.iter().all(|(_, values)| values.is_empty()) {
            return Err(SampleError::NoGenerationCriteria);
        }

        self.check_dictionaries(request)?;
        check_duplicates(request)?;

        let mut axes = Vec::new();
        for (kind, values) in candidates {
            if values.is_empty() {
                continue;
            }
            let position = kind
                .element_kinds()
                .iter()
                .filter_map(|element| self.rule.slot_of(*element))
                .min()
                .ok_or(SampleError::AxisNotInRule(kind.name()))?;
            axes.push(Axis {
                kind,
                position,
                values,
            });
        }
        axes.sort_by_key(|axis| axis.position);

        for kind in self.rule.ordered_slots() {
            if kind.is_project_constant() && self.project.value_for(kind).is_none() {
                return Err(SampleError::MissingProjectCode(kind));
            }
        }

        let total = axes
            .iter()
            .try_fold(1usize, |acc, axis| acc.checked_mul(axis.values.len()))
            .unwrap_or(usize::MAX);
        if total > MAX_GENERATED_CODES {
            return Err(SampleError::TooManyCodes {
                count: total,
                max: MAX_GENERATED_CODES,
            });
        }

        Ok(GenerationPlan { axes, total })
    }

    /// Generates every code of the request, tagging each with a fresh id from `ids`.
    ///
    /// # Errors
    ///
    /// See [`CodeGenerator::plan`]; also fails if `ids` is exhausted.
    pub fn generate(
        &self,
        request: &GenerationRequest,
        ids: &mut CodeIdGenerator,
    ) -> SampleResult<Vec<GeneratedCode>> {
        let plan = self.plan(request)?;
        let mut codes = Vec::with_capacity(plan.total);
        let mut indices = vec![0usize; plan.axes.len()];

        for _ in 0..plan.total {
            let mut provenance = CodeProvenance::default();
            for (axis, &index) in plan.axes.iter().zip(&indices) {
                provenance.apply(&axis.values[index]);
            }

            let code = self.render(&provenance)?;
            codes.push(GeneratedCode {
                id: ids.next_id()?,
                code,
                edited_code: None,
                provenance,
            });

            // Odometer step: the last axis varies fastest.
            for pos in (0..plan.axes.len()).rev() {
                indices[pos] += 1;
                if indices[pos] < plan.axes[pos].values.len() {
                    break;
                }
                indices[pos] = 0;
            }
        }

        tracing::info!(
            count = codes.len(),
            axes = ?plan.axis_names(),
            "generated sample codes"
        );
        Ok(codes)
    }

    /// Joins the value of every assigned slot in slot order, skipping slots with no value.
    ///
    /// # Errors
    ///
    /// - [`SampleError::RuleNotConfigured`] if no slot is assigned,
    /// - [`SampleError::MissingProjectCode`] if a constant slot has no project value.
    pub fn render(&self, provenance: &CodeProvenance) -> SampleResult<String> {
        let slots = self.rule.ordered_slots();
        if slots.is_empty() {
            return Err(SampleError::RuleNotConfigured);
        }

        let mut parts = Vec::with_capacity(slots.len());
        for kind in slots {
            let value = if kind.is_project_constant() {
                Some(
                    self.project
                        .value_for(kind)
                        .ok_or(SampleError::MissingProjectCode(kind))?,
                )
            } else {
                provenance.value_for(kind)
            };
            if let Some(value) = value {
                parts.push(value);
            }
        }

        if parts.is_empty() {
            return Err(SampleError::RuleNotConfigured);
        }
        Ok(parts.join(CODE_SEPARATOR))
    }

    fn cycle_values(&self, request: &GenerationRequest) -> Vec<AxisValue> {
        request.cycles.iter().cloned().map(AxisValue::Cycle).collect()
    }

    fn test_type_values(&self, request: &GenerationRequest) -> Vec<AxisValue> {
        request
            .test_types
            .iter()
            .cloned()
            .map(AxisValue::TestType)
            .collect()
    }

    fn fraction_values(&self, request: &GenerationRequest) -> Vec<AxisValue> {
        let primary = request.primary.iter().map(|code| FractionValue {
            fraction: Fraction::Primary,
            code: code.clone(),
        });
        let backup = request.backup.iter().map(|code| FractionValue {
            fraction: Fraction::Backup,
            code: code.clone(),
        });
        primary.chain(backup).map(AxisValue::Fraction).collect()
    }

    fn clinic_subject_values(&self, request: &GenerationRequest) -> Vec<AxisValue> {
        request
            .clinic_subject_pairs
            .iter()
            .cloned()
            .map(AxisValue::ClinicSubject)
            .collect()
    }

    fn seq_time_values(&self, request: &GenerationRequest) -> Vec<AxisValue> {
        request
            .seq_time_pairs
            .iter()
            .cloned()
            .map(AxisValue::SeqTime)
            .collect()
    }

    fn check_dictionaries(&self, request: &GenerationRequest) -> SampleResult<()> {
        let dictionaries = self.rule.dictionaries();

        check_subset("cycles", &request.cycles, &dictionaries.cycles)?;
        check_subset("test_types", &request.test_types, &dictionaries.test_types)?;
        check_subset("primary", &request.primary, &dictionaries.primary)?;
        check_subset("backup", &request.backup, &dictionaries.backup)?;

        for pair in &request.clinic_subject_pairs {
            if pair.clinic.trim().is_empty() || pair.subject.trim().is_empty() {
                return Err(SampleError::InvalidInput(
                    "clinic/subject pair has an empty component".into(),
                ));
            }
            if !dictionaries.clinic_codes.contains(&pair.clinic) {
                return Err(SampleError::ValueNotInDictionary {
                    axis: "clinic_codes",
                    value: pair.clinic.clone(),
                });
            }
            if !dictionaries.subject_ranges.is_empty()
                && !dictionaries.contains_subject(&pair.subject)
            {
                return Err(SampleError::ValueNotInDictionary {
                    axis: "subject_ranges",
                    value: pair.subject.clone(),
                });
            }
        }

        for pair in &request.seq_time_pairs {
            if pair.seq.trim().is_empty() || pair.time.trim().is_empty() {
                return Err(SampleError::InvalidInput(
                    "sequence/time pair has an empty component".into(),
                ));
            }
            if !dictionaries.collection_points.is_empty()
                && !dictionaries
                    .collection_points
                    .iter()
                    .any(|point| point.code == pair.seq && point.name == pair.time)
            {
                return Err(SampleError::ValueNotInDictionary {
                    axis: "collection_points",
                    value: format!("{}/{}", pair.seq, pair.time),
                });
            }
        }

        Ok(())
    }
}

fn check_subset(axis: &'static str, selected: &[String], dictionary: &[String]) -> SampleResult<()> {
    match selected.iter().find(|value| !dictionary.contains(value)) {
        Some(value) => Err(SampleError::ValueNotInDictionary {
            axis,
            value: value.clone(),
        }),
        None => Ok(()),
    }
}

fn check_duplicates(request: &GenerationRequest) -> SampleResult<()> {
    fn unique<'v>(
        axis: &'static str,
        values: impl IntoIterator<Item = &'v String>,
    ) -> SampleResult<()> {
        let mut seen = HashSet::new();
        for value in values {
            if !seen.insert(value) {
                return Err(SampleError::DuplicateSelection {
                    axis,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    unique("cycles", &request.cycles)?;
    unique("test_types", &request.test_types)?;
    // A code picked as both primary and backup would render identical codes.
    unique("sample_fraction", request.primary.iter().chain(&request.backup))?;

    // Each subject belongs to exactly one clinic; each sequence to exactly one time.
    let mut clinic_of: HashMap<&str, &str> = HashMap::new();
    for pair in &request.clinic_subject_pairs {
        if clinic_of.insert(&pair.subject, &pair.clinic).is_some() {
            return Err(SampleError::DuplicateSelection {
                axis: "subject_id",
                value: pair.subject.clone(),
            });
        }
    }
    let mut time_of: HashMap<&str, &str> = HashMap::new();
    for pair in &request.seq_time_pairs {
        if time_of.insert(&pair.seq, &pair.time).is_some() {
            return Err(SampleError::DuplicateSelection {
                axis: "collection_seq",
                value: pair.seq.clone(),
            });
        }
    }

    Ok(())
}
