//! Scan reconciliation.
//!
//! Matches physically scanned barcodes against the expected codes of one receive record and
//! groups them into capacity-bounded boxes.
//!
//! - [`ExpectedSample`]: one expected code as returned by the backend (legacy or current shape).
//! - [`ScanRecord`]: per-code status (`pending`, `scanned`, `error`).
//! - [`SampleBox`] and [`ScanPolicy`]: box capacity and switching policy.
//! - [`ScanSession`]: the single-writer state machine processing scans in receipt order.

mod boxes;
mod session;

pub use boxes::{BoxFill, SampleBox, ScanPolicy};
pub use session::{Completion, InventoryReport, ScanOutcome, ScanSession, ScanSummary};

use serde::{Deserialize, Serialize};

/// Status of one scan record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    #[default]
    Pending,
    Scanned,
    Error,
}

/// One expected sample for a receive record.
///
/// Deserialises from either a bare code string or an object
/// `{ code, status, boxCode, specialNotes }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ExpectedSampleWire")]
pub struct ExpectedSample {
    pub code: String,
    pub status: ScanStatus,
    pub box_code: Option<String>,
    pub special_notes: Option<String>,
}

impl ExpectedSample {
    /// A pending sample with no box.
    pub fn pending(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            status: ScanStatus::Pending,
            box_code: None,
            special_notes: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpectedSampleWire {
    Legacy(String),
    Current {
        code: String,
        #[serde(default)]
        status: Option<ScanStatus>,
        #[serde(default, rename = "boxCode", alias = "box_code")]
        box_code: Option<String>,
        #[serde(default, rename = "specialNotes", alias = "special_notes")]
        special_notes: Option<String>,
    },
}

impl From<ExpectedSampleWire> for ExpectedSample {
    fn from(wire: ExpectedSampleWire) -> Self {
        match wire {
            ExpectedSampleWire::Legacy(code) => ExpectedSample::pending(code.trim()),
            ExpectedSampleWire::Current {
                code,
                status,
                box_code,
                special_notes,
            } => ExpectedSample {
                code: code.trim().to_string(),
                status: status.unwrap_or_default(),
                box_code: box_code.filter(|b| !b.trim().is_empty()),
                special_notes: special_notes.filter(|n| !n.trim().is_empty()),
            },
        }
    }
}

/// Reconciliation state of one code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub code: String,
    pub status: ScanStatus,
    pub box_code: Option<String>,
    pub special_notes: Option<String>,
    pub error_reason: Option<String>,
    /// `false` for codes scanned that were never part of the expected set.
    pub expected: bool,
}

impl ScanRecord {
    fn from_expected(sample: ExpectedSample) -> Self {
        Self {
            code: sample.code,
            status: sample.status,
            box_code: sample.box_code,
            special_notes: sample.special_notes,
            error_reason: None,
            expected: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_string_array() {
        let samples: Vec<ExpectedSample> =
            serde_json::from_str(r#"["SP-01-001", " SP-01-002 "]"#).unwrap();
        assert_eq!(
            samples,
            vec![
                ExpectedSample::pending("SP-01-001"),
                ExpectedSample::pending("SP-01-002")
            ]
        );
    }

    #[test]
    fn parses_current_object_array() {
        let json = r#"[
            {"code": "SP-01-001", "status": "scanned", "boxCode": "BOX-1", "specialNotes": "haemolysed"},
            {"code": "SP-01-002", "status": "pending", "boxCode": null, "specialNotes": ""},
            {"code": "SP-01-003"}
        ]"#;
        let samples: Vec<ExpectedSample> = serde_json::from_str(json).unwrap();

        assert_eq!(samples[0].status, ScanStatus::Scanned);
        assert_eq!(samples[0].box_code.as_deref(), Some("BOX-1"));
        assert_eq!(samples[0].special_notes.as_deref(), Some("haemolysed"));
        assert_eq!(samples[1].special_notes, None);
        assert_eq!(samples[2], ExpectedSample::pending("SP-01-003"));
    }

    #[test]
    fn serialises_in_current_shape() {
        let json = serde_json::to_value(ExpectedSample::pending("A")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"code": "A", "status": "pending", "boxCode": null, "specialNotes": null})
        );
    }
}
