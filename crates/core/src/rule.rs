//! Sample code rule definition.
//!
//! A rule places element kinds (sponsor code, clinic code, subject id, ...) into ordered slots
//! and owns the dictionaries of candidate values an operator picks from when generating codes.
//!
//! The slot assignment is stored as a single map from [`ElementKind`] to slot index, so one kind
//! can never occupy two slots. The frontend exchanges rules as an ordered slot list; that form is
//! validated on the way in (see [`CodeRule::from_slots`]).

use crate::constants::{
    DEFAULT_SUBJECT_WIDTH, MAX_SUBJECT_RANGE_COUNT, MAX_SUBJECT_WIDTH, SLOT_COUNT,
};
use crate::error::{SampleError, SampleResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ELEMENT KINDS
// ============================================================================

/// Semantic element a slot can be bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    SponsorCode,
    LabCode,
    ClinicCode,
    SubjectId,
    TestType,
    CollectionSeq,
    CollectionTime,
    CycleGroup,
    SampleFraction,
}

impl ElementKind {
    pub const ALL: [ElementKind; SLOT_COUNT] = [
        ElementKind::SponsorCode,
        ElementKind::LabCode,
        ElementKind::ClinicCode,
        ElementKind::SubjectId,
        ElementKind::TestType,
        ElementKind::CollectionSeq,
        ElementKind::CollectionTime,
        ElementKind::CycleGroup,
        ElementKind::SampleFraction,
    ];

    /// Wire name (snake_case).
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::SponsorCode => "sponsor_code",
            ElementKind::LabCode => "lab_code",
            ElementKind::ClinicCode => "clinic_code",
            ElementKind::SubjectId => "subject_id",
            ElementKind::TestType => "test_type",
            ElementKind::CollectionSeq => "collection_seq",
            ElementKind::CollectionTime => "collection_time",
            ElementKind::CycleGroup => "cycle_group",
            ElementKind::SampleFraction => "sample_fraction",
        }
    }

    /// True for kinds whose value is a project constant rather than a generation axis.
    pub fn is_project_constant(&self) -> bool {
        matches!(self, ElementKind::SponsorCode | ElementKind::LabCode)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementKind {
    type Err = SampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| SampleError::InvalidInput(format!("unknown element kind: '{s}'")))
    }
}

// ============================================================================
// DICTIONARIES
// ============================================================================

/// A collection point: a sequence number (`code`) bound to exactly one collection time (`name`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionPoint {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

fn default_subject_width() -> usize {
    DEFAULT_SUBJECT_WIDTH
}

/// A block of subject numbers, e.g. prefix `""`, start 1, count 20 -> `001`..`020`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubjectRange {
    #[serde(default)]
    pub prefix: String,
    pub start: u32,
    pub count: u32,
    #[serde(default = "default_subject_width")]
    pub width: usize,
}

impl SubjectRange {
    pub fn new(prefix: impl Into<String>, start: u32, count: u32) -> Self {
        Self {
            prefix: prefix.into(),
            start,
            count,
            width: DEFAULT_SUBJECT_WIDTH,
        }
    }

    /// Expands the range into zero-padded subject ids.
    pub fn subjects(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.count).map(move |offset| {
            let number = u64::from(self.start) + u64::from(offset);
            format!("{}{:0width$}", self.prefix, number, width = self.width)
        })
    }

    /// Whether `subject` is one of the ids this range expands to, without expanding it.
    pub fn contains(&self, subject: &str) -> bool {
        let Some(digits) = subject.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        // Padding is exact: "01" is not in a width-3 range.
        if digits.len() < self.width || (digits.len() > self.width.max(1) && digits.starts_with('0')) {
            return false;
        }
        let Ok(number) = digits.parse::<u64>() else {
            return false;
        };
        let start = u64::from(self.start);
        number >= start && number < start + u64::from(self.count)
    }

    fn validate(&self) -> SampleResult<()> {
        if self.width > MAX_SUBJECT_WIDTH {
            return Err(SampleError::InvalidInput(format!(
                "subject range '{}' has width {} (maximum {})",
                self.prefix, self.width, MAX_SUBJECT_WIDTH
            )));
        }
        if u64::from(self.count) > MAX_SUBJECT_RANGE_COUNT {
            return Err(SampleError::InvalidInput(format!(
                "subject range '{}' has {} subjects (maximum {})",
                self.prefix, self.count, MAX_SUBJECT_RANGE_COUNT
            )));
        }
        if self.count == 0 {
            return Err(SampleError::InvalidInput(format!(
                "subject range '{}' starting at {} has a count of zero",
                self.prefix, self.start
            )));
        }
        if self.start.checked_add(self.count - 1).is_none() {
            return Err(SampleError::InvalidInput(format!(
                "subject range '{}' overflows",
                self.prefix
            )));
        }
        Ok(())
    }
}

/// Named dictionaries of candidate values owned by a rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Dictionaries {
    pub cycles: Vec<String>,
    pub test_types: Vec<String>,
    pub primary: Vec<String>,
    pub backup: Vec<String>,
    pub clinic_codes: Vec<String>,
    pub collection_points: Vec<CollectionPoint>,
    pub subject_ranges: Vec<SubjectRange>,
}

impl Dictionaries {
    /// All subject ids produced by the configured ranges, in range order.
    pub fn subject_ids(&self) -> Vec<String> {
        self.subject_ranges
            .iter()
            .flat_map(|range| range.subjects())
            .collect()
    }

    /// Whether `subject` belongs to any configured range.
    pub fn contains_subject(&self, subject: &str) -> bool {
        self.subject_ranges.iter().any(|range| range.contains(subject))
    }

    /// Rejects empty entries and duplicates within each dictionary.
    pub fn validate(&self) -> SampleResult<()> {
        check_list("cycles", &self.cycles)?;
        check_list("test_types", &self.test_types)?;
        check_list("primary", &self.primary)?;
        check_list("backup", &self.backup)?;
        check_list("clinic_codes", &self.clinic_codes)?;

        let codes: Vec<String> = self
            .collection_points
            .iter()
            .map(|point| point.code.clone())
            .collect();
        check_list("collection_points", &codes)?;
        for point in &self.collection_points {
            if point.name.trim().is_empty() {
                return Err(SampleError::InvalidInput(format!(
                    "collection point '{}' has no collection time",
                    point.code
                )));
            }
        }

        for range in &self.subject_ranges {
            range.validate()?;
        }
        let total: u64 = self.subject_ranges.iter().map(|r| u64::from(r.count)).sum();
        if total > MAX_SUBJECT_RANGE_COUNT {
            return Err(SampleError::InvalidInput(format!(
                "subject ranges produce {total} subjects (maximum {MAX_SUBJECT_RANGE_COUNT})"
            )));
        }
        check_list("subject_ranges", &self.subject_ids())?;

        Ok(())
    }
}

fn check_list(name: &'static str, values: &[String]) -> SampleResult<()> {
    let mut seen = HashSet::new();
    for value in values {
        if value.trim().is_empty() {
            return Err(SampleError::InvalidInput(format!(
                "{name} dictionary contains an empty value"
            )));
        }
        if !seen.insert(value.as_str()) {
            return Err(SampleError::InvalidInput(format!(
                "{name} dictionary contains '{value}' more than once"
            )));
        }
    }
    Ok(())
}

// ============================================================================
// PROJECT CONSTANTS
// ============================================================================

/// Project-level constants placed into the sponsor and lab slots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectCodes {
    pub sponsor_project_code: Option<String>,
    pub lab_project_code: Option<String>,
}

impl ProjectCodes {
    pub fn new(sponsor: impl Into<String>, lab: Option<String>) -> Self {
        Self {
            sponsor_project_code: Some(sponsor.into()),
            lab_project_code: lab,
        }
    }

    /// The constant for `kind`, ignoring blank values.
    pub fn value_for(&self, kind: ElementKind) -> Option<&str> {
        let raw = match kind {
            ElementKind::SponsorCode => self.sponsor_project_code.as_deref(),
            ElementKind::LabCode => self.lab_project_code.as_deref(),
            _ => None,
        };
        raw.map(str::trim).filter(|v| !v.is_empty())
    }
}

// ============================================================================
// CODE RULE
// ============================================================================

/// Ordered slot assignment plus dictionaries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CodeRuleWire", into = "CodeRuleWire")]
pub struct CodeRule {
    assignments: BTreeMap<ElementKind, usize>,
    dictionaries: Dictionaries,
}

impl CodeRule {
    /// An empty rule with no slot assigned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a rule from the frontend's ordered slot list.
    ///
    /// # Errors
    ///
    /// - [`SampleError::SlotOutOfRange`] if more than [`SLOT_COUNT`] slots are supplied,
    /// - [`SampleError::DuplicateElement`] if a kind appears in two slots.
    pub fn from_slots(slots: &[Option<ElementKind>]) -> SampleResult<Self> {
        if slots.len() > SLOT_COUNT {
            return Err(SampleError::SlotOutOfRange {
                slot: slots.len() - 1,
                max: SLOT_COUNT,
            });
        }

        let mut assignments = BTreeMap::new();
        for (slot, kind) in slots.iter().enumerate() {
            if let Some(kind) = kind {
                if assignments.insert(*kind, slot).is_some() {
                    return Err(SampleError::DuplicateElement(*kind));
                }
            }
        }

        Ok(Self {
            assignments,
            dictionaries: Dictionaries::default(),
        })
    }

    pub fn with_dictionaries(mut self, dictionaries: Dictionaries) -> Self {
        self.dictionaries = dictionaries;
        self
    }

    pub fn dictionaries(&self) -> &Dictionaries {
        &self.dictionaries
    }

    pub fn dictionaries_mut(&mut self) -> &mut Dictionaries {
        &mut self.dictionaries
    }

    /// Binds `kind` to `slot`, moving it if it was bound elsewhere.
    ///
    /// # Errors
    ///
    /// - [`SampleError::SlotOutOfRange`] if `slot >= SLOT_COUNT`,
    /// - [`SampleError::SlotOccupied`] if another kind holds `slot`.
    pub fn assign(&mut self, kind: ElementKind, slot: usize) -> SampleResult<()> {
        if slot >= SLOT_COUNT {
            return Err(SampleError::SlotOutOfRange {
                slot,
                max: SLOT_COUNT,
            });
        }
        if let Some(holder) = self.kind_at(slot) {
            if holder != kind {
                return Err(SampleError::SlotOccupied { slot, kind: holder });
            }
        }
        self.assignments.insert(kind, slot);
        Ok(())
    }

    /// Clears the slot held by `kind`, returning its former index.
    pub fn unassign(&mut self, kind: ElementKind) -> Option<usize> {
        self.assignments.remove(&kind)
    }

    pub fn slot_of(&self, kind: ElementKind) -> Option<usize> {
        self.assignments.get(&kind).copied()
    }

    pub fn kind_at(&self, slot: usize) -> Option<ElementKind> {
        self.assignments
            .iter()
            .find(|(_, s)| **s == slot)
            .map(|(kind, _)| *kind)
    }

    pub fn is_configured(&self) -> bool {
        !self.assignments.is_empty()
    }

    /// Assigned kinds in slot order.
    pub fn ordered_slots(&self) -> Vec<ElementKind> {
        let mut slots: Vec<(usize, ElementKind)> = self
            .assignments
            .iter()
            .map(|(kind, slot)| (*slot, *kind))
            .collect();
        slots.sort_unstable();
        slots.into_iter().map(|(_, kind)| kind).collect()
    }

    /// Frontend form: one entry per slot position, `None` where unassigned.
    pub fn to_slots(&self) -> Vec<Option<ElementKind>> {
        (0..SLOT_COUNT).map(|slot| self.kind_at(slot)).collect()
    }

    /// Validates the dictionaries; the slot map is valid by construction.
    pub fn validate(&self) -> SampleResult<()> {
        self.dictionaries.validate()
    }
}

/// Serialised form of a rule, as exchanged with the frontend and stored on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CodeRuleWire {
    slots: Vec<Option<ElementKind>>,
    #[serde(default)]
    dictionaries: Dictionaries,
}

impl TryFrom<CodeRuleWire> for CodeRule {
    type Error = SampleError;

    fn try_from(wire: CodeRuleWire) -> Result<Self, Self::Error> {
        let rule = CodeRule::from_slots(&wire.slots)?.with_dictionaries(wire.dictionaries);
        rule.validate()?;
        Ok(rule)
    }
}

impl From<CodeRule> for CodeRuleWire {
    fn from(rule: CodeRule) -> Self {
        CodeRuleWire {
            slots: rule.to_slots(),
            dictionaries: rule.dictionaries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slots_rejects_duplicate_kind() {
        let err = CodeRule::from_slots(&[
            Some(ElementKind::SponsorCode),
            Some(ElementKind::ClinicCode),
            Some(ElementKind::SponsorCode),
        ])
        .unwrap_err();

        assert!(matches!(err, SampleError::DuplicateElement(ElementKind::SponsorCode)));
    }

    #[test]
    fn from_slots_rejects_too_many_slots() {
        let slots = vec![None; SLOT_COUNT + 1];
        assert!(matches!(
            CodeRule::from_slots(&slots),
            Err(SampleError::SlotOutOfRange { .. })
        ));
    }

    #[test]
    fn ordered_slots_skip_gaps() {
        let rule = CodeRule::from_slots(&[
            None,
            Some(ElementKind::SubjectId),
            None,
            Some(ElementKind::SponsorCode),
        ])
        .unwrap();

        assert_eq!(
            rule.ordered_slots(),
            vec![ElementKind::SubjectId, ElementKind::SponsorCode]
        );
        assert_eq!(rule.slot_of(ElementKind::SponsorCode), Some(3));
    }

    #[test]
    fn assign_moves_kind_and_refuses_occupied_slot() {
        let mut rule = CodeRule::new();
        rule.assign(ElementKind::SponsorCode, 0).unwrap();
        rule.assign(ElementKind::ClinicCode, 1).unwrap();

        let err = rule.assign(ElementKind::SubjectId, 1).unwrap_err();
        assert!(matches!(
            err,
            SampleError::SlotOccupied {
                slot: 1,
                kind: ElementKind::ClinicCode
            }
        ));

        rule.assign(ElementKind::SponsorCode, 4).unwrap();
        assert_eq!(rule.slot_of(ElementKind::SponsorCode), Some(4));
        assert_eq!(rule.kind_at(0), None);
    }

    #[test]
    fn assign_rejects_out_of_range_slot() {
        let mut rule = CodeRule::new();
        assert!(matches!(
            rule.assign(ElementKind::LabCode, SLOT_COUNT),
            Err(SampleError::SlotOutOfRange { .. })
        ));
    }

    #[test]
    fn subject_range_expands_with_padding() {
        let range = SubjectRange::new("S", 8, 3);
        let subjects: Vec<String> = range.subjects().collect();
        assert_eq!(subjects, vec!["S008", "S009", "S010"]);
    }

    #[test]
    fn subject_range_contains_matches_expansion() {
        let range = SubjectRange::new("S", 8, 3);
        for subject in range.subjects() {
            assert!(range.contains(&subject), "{subject}");
        }
        assert!(!range.contains("S007"));
        assert!(!range.contains("S011"));
        assert!(!range.contains("S08"));
        assert!(!range.contains("S0008"));
        assert!(!range.contains("X008"));
        assert!(!range.contains("S00a"));

        let wide = SubjectRange::new("", 998, 5);
        assert!(wide.contains("1002"));
        assert!(!wide.contains("01002"));
    }

    #[test]
    fn rule_with_oversized_subject_width_is_rejected_without_panicking() {
        let json = r#"{"slots":["subject_id"],"dictionaries":{"subject_ranges":[{"start":1,"count":1,"width":100000}]}}"#;
        let err = serde_json::from_str::<CodeRule>(json).unwrap_err();
        assert!(err.to_string().contains("width"), "{err}");
    }

    #[test]
    fn rule_with_oversized_subject_count_is_rejected_before_expansion() {
        let json = r#"{"slots":["subject_id"],"dictionaries":{"subject_ranges":[{"start":1,"count":4000000000}]}}"#;
        let err = serde_json::from_str::<CodeRule>(json).unwrap_err();
        assert!(err.to_string().contains("maximum"), "{err}");

        let dictionaries = Dictionaries {
            subject_ranges: vec![
                SubjectRange::new("A", 1, 60_000),
                SubjectRange::new("B", 1, 60_000),
            ],
            ..Default::default()
        };
        assert!(matches!(
            dictionaries.validate(),
            Err(SampleError::InvalidInput(ref m)) if m.contains("maximum")
        ));
    }

    #[test]
    fn dictionaries_reject_duplicates() {
        let dictionaries = Dictionaries {
            cycles: vec!["C1".into(), "C1".into()],
            ..Default::default()
        };
        assert!(matches!(
            dictionaries.validate(),
            Err(SampleError::InvalidInput(msg)) if msg.contains("cycles")
        ));
    }

    #[test]
    fn dictionaries_reject_overlapping_subject_ranges() {
        let dictionaries = Dictionaries {
            subject_ranges: vec![SubjectRange::new("", 1, 5), SubjectRange::new("", 5, 5)],
            ..Default::default()
        };
        assert!(dictionaries.validate().is_err());
    }

    #[test]
    fn rule_yaml_uses_slot_list() {
        let rule = CodeRule::from_slots(&[
            Some(ElementKind::SponsorCode),
            Some(ElementKind::ClinicCode),
            Some(ElementKind::SubjectId),
        ])
        .unwrap();

        let yaml = serde_yaml::to_string(&rule).unwrap();
        assert!(yaml.contains("sponsor_code"));

        let parsed: CodeRule = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, rule);
    }

    #[test]
    fn rule_json_with_duplicate_slot_is_rejected() {
        let json = r#"{"slots": ["clinic_code", "clinic_code"]}"#;
        let err = serde_json::from_str::<CodeRule>(json).unwrap_err();
        assert!(err.to_string().contains("more than one slot"));
    }

    #[test]
    fn project_codes_ignore_blank_values() {
        let codes = ProjectCodes {
            sponsor_project_code: Some("  ".into()),
            lab_project_code: Some("LAB7".into()),
        };
        assert_eq!(codes.value_for(ElementKind::SponsorCode), None);
        assert_eq!(codes.value_for(ElementKind::LabCode), Some("LAB7"));
        assert_eq!(codes.value_for(ElementKind::ClinicCode), None);
    }
}
