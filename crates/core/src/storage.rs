//! Storage assignment.
//!
//! After reconciliation each box gets a physical location. Boxes are walked one at a time and
//! the plan is only sent to the backend once every box has a complete location.

use crate::cancel::CancellationToken;
use crate::collaborators::StorageCommitter;
use crate::error::{SampleError, SampleResult};
use crate::scan::InventoryReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A complete physical location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub freezer_id: String,
    pub shelf_level: String,
    pub rack_position: String,
    pub box_position: String,
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.freezer_id, self.shelf_level, self.rack_position, self.box_position
        )
    }
}

/// A location being filled in. Blank parts count as missing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocationDraft {
    pub freezer_id: Option<String>,
    pub shelf_level: Option<String>,
    pub rack_position: Option<String>,
    pub box_position: Option<String>,
}

impl LocationDraft {
    pub fn new(
        freezer_id: impl Into<String>,
        shelf_level: impl Into<String>,
        rack_position: impl Into<String>,
        box_position: impl Into<String>,
    ) -> Self {
        Self {
            freezer_id: Some(freezer_id.into()),
            shelf_level: Some(shelf_level.into()),
            rack_position: Some(rack_position.into()),
            box_position: Some(box_position.into()),
        }
    }

    /// Names of the parts still missing.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("freezer_id", &self.freezer_id),
            ("shelf_level", &self.shelf_level),
            ("rack_position", &self.rack_position),
            ("box_position", &self.box_position),
        ]
        .into_iter()
        .filter(|(_, part)| part.as_deref().map_or(true, |p| p.trim().is_empty()))
        .map(|(name, _)| name)
        .collect()
    }

    /// Build the location for `box_code`.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::IncompleteLocation`] listing every missing part.
    pub fn complete(&self, box_code: &str) -> SampleResult<StorageLocation> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(SampleError::IncompleteLocation {
                box_code: box_code.to_string(),
                missing,
            });
        }

        let part = |p: &Option<String>| p.as_deref().unwrap_or_default().trim().to_string();
        Ok(StorageLocation {
            freezer_id: part(&self.freezer_id),
            shelf_level: part(&self.shelf_level),
            rack_position: part(&self.rack_position),
            box_position: part(&self.box_position),
        })
    }
}

/// One element of `POST /samples/storage/assign`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxAssignment {
    pub box_code: String,
    #[serde(flatten)]
    pub location: StorageLocation,
}

/// Sequential location assignment for the boxes of one receive record.
#[derive(Clone, Debug)]
pub struct StoragePlan {
    receive_record_id: String,
    boxes: Vec<String>,
    locations: Vec<Option<StorageLocation>>,
    cursor: usize,
}

impl StoragePlan {
    /// # Errors
    ///
    /// Returns [`SampleError::NoBoxes`] when `box_codes` is empty.
    pub fn new(receive_record_id: impl Into<String>, box_codes: Vec<String>) -> SampleResult<Self> {
        let mut boxes: Vec<String> = Vec::with_capacity(box_codes.len());
        for code in box_codes {
            if !boxes.contains(&code) {
                boxes.push(code);
            }
        }
        if boxes.is_empty() {
            return Err(SampleError::NoBoxes);
        }

        Ok(Self {
            receive_record_id: receive_record_id.into(),
            locations: vec![None; boxes.len()],
            boxes,
            cursor: 0,
        })
    }

    /// Plan for the non-empty boxes of an inventory report.
    pub fn from_report(
        receive_record_id: impl Into<String>,
        report: &InventoryReport,
    ) -> SampleResult<Self> {
        let codes = report
            .boxes
            .iter()
            .filter(|b| !b.is_empty())
            .map(|b| b.code.clone())
            .collect();
        Self::new(receive_record_id, codes)
    }

    /// Box awaiting a location, or `None` once the walk reached the end.
    pub fn current_box(&self) -> Option<&str> {
        self.boxes.get(self.cursor).map(String::as_str)
    }

    /// `(index of the current box, number of boxes)`.
    pub fn progress(&self) -> (usize, usize) {
        (self.cursor, self.boxes.len())
    }

    pub fn location_of(&self, box_code: &str) -> Option<&StorageLocation> {
        let index = self.boxes.iter().position(|b| b == box_code)?;
        self.locations[index].as_ref()
    }

    /// Assign `draft` to the current box and advance.
    ///
    /// Returns the next box to assign, if any.
    ///
    /// # Errors
    ///
    /// - [`SampleError::UnassignedBoxes`] if every box was already walked,
    /// - [`SampleError::IncompleteLocation`] if a part is missing,
    /// - [`SampleError::LocationOccupied`] if another box in the plan holds the location.
    pub fn assign_current(&mut self, draft: &LocationDraft) -> SampleResult<Option<&str>> {
        let Some(box_code) = self.boxes.get(self.cursor) else {
            return Err(SampleError::UnassignedBoxes(0));
        };
        let location = draft.complete(box_code)?;

        let taken = self
            .locations
            .iter()
            .enumerate()
            .find(|(i, l)| *i != self.cursor && l.as_ref() == Some(&location));
        if let Some((other, _)) = taken {
            return Err(SampleError::LocationOccupied {
                location: location.to_string(),
                box_code: self.boxes[other].clone(),
            });
        }

        tracing::debug!(box_code = %box_code, location = %location, "storage location assigned");
        self.locations[self.cursor] = Some(location);
        self.cursor += 1;
        Ok(self.current_box())
    }

    /// Step back to the previous box. Its location is kept until reassigned.
    pub fn back(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.locations.iter().all(Option::is_some)
    }

    /// All assignments, in box order.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::UnassignedBoxes`] while any box lacks a location.
    pub fn assignments(&self) -> SampleResult<Vec<BoxAssignment>> {
        let unassigned = self.locations.iter().filter(|l| l.is_none()).count();
        if unassigned > 0 {
            return Err(SampleError::UnassignedBoxes(unassigned));
        }

        Ok(self
            .boxes
            .iter()
            .zip(self.locations.iter().flatten())
            .map(|(box_code, location)| BoxAssignment {
                box_code: box_code.clone(),
                location: location.clone(),
            })
            .collect())
    }

    /// Send every assignment in one backend call.
    ///
    /// Nothing is considered committed unless the call succeeds; the plan stays intact either
    /// way.
    pub async fn commit<C: StorageCommitter>(
        &self,
        committer: &C,
        cancel: &CancellationToken,
    ) -> SampleResult<Vec<BoxAssignment>> {
        let assignments = self.assignments()?;
        cancel.check()?;

        if let Err(err) = committer
            .assign_storage(&self.receive_record_id, &assignments)
            .await
        {
            tracing::error!(receive_record_id = %self.receive_record_id, error = %err, "storage assignment failed");
            return Err(err);
        }
        cancel.check()?;

        tracing::info!(
            receive_record_id = %self.receive_record_id,
            boxes = assignments.len(),
            "storage assigned"
        );
        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn plan() -> StoragePlan {
        StoragePlan::new("rr-1", vec!["BOX-1".into(), "BOX-2".into()]).unwrap()
    }

    #[test]
    fn draft_reports_every_missing_part() {
        let draft = LocationDraft {
            freezer_id: Some("F1".into()),
            shelf_level: Some("  ".into()),
            ..Default::default()
        };
        let err = draft.complete("BOX-1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "location for box BOX-1 is incomplete (missing: shelf_level, rack_position, box_position)"
        );
    }

    #[test]
    fn boxes_are_walked_one_at_a_time() {
        let mut plan = plan();
        assert_eq!(plan.current_box(), Some("BOX-1"));

        let next = plan
            .assign_current(&LocationDraft::new("F1", "2", "R3", "4"))
            .unwrap();
        assert_eq!(next, Some("BOX-2"));
        assert!(!plan.is_complete());
        assert!(matches!(plan.assignments(), Err(SampleError::UnassignedBoxes(1))));

        assert!(plan.back());
        assert_eq!(plan.current_box(), Some("BOX-1"));
        assert_eq!(plan.location_of("BOX-1").unwrap().freezer_id, "F1");
    }

    #[test]
    fn incomplete_location_does_not_advance() {
        let mut plan = plan();
        let draft = LocationDraft {
            freezer_id: Some("F1".into()),
            ..Default::default()
        };
        assert!(plan.assign_current(&draft).is_err());
        assert_eq!(plan.current_box(), Some("BOX-1"));
    }

    #[test]
    fn duplicate_location_is_rejected() {
        let mut plan = plan();
        plan.assign_current(&LocationDraft::new("F1", "2", "R3", "4"))
            .unwrap();
        let err = plan
            .assign_current(&LocationDraft::new("F1", "2", "R3", "4"))
            .unwrap_err();
        assert!(matches!(err, SampleError::LocationOccupied { box_code, .. } if box_code == "BOX-1"));
    }

    #[test]
    fn empty_plan_is_rejected() {
        assert!(matches!(StoragePlan::new("rr-1", vec![]), Err(SampleError::NoBoxes)));
    }

    #[test]
    fn assignment_serialises_flat() {
        let assignment = BoxAssignment {
            box_code: "BOX-1".into(),
            location: LocationDraft::new("F1", "2", "R3", "4").complete("BOX-1").unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&assignment).unwrap(),
            serde_json::json!({
                "box_code": "BOX-1",
                "freezer_id": "F1",
                "shelf_level": "2",
                "rack_position": "R3",
                "box_position": "4"
            })
        );
    }

    #[derive(Default)]
    struct FakeCommitter {
        fail: bool,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl StorageCommitter for FakeCommitter {
        async fn assign_storage(
            &self,
            receive_record_id: &str,
            assignments: &[BoxAssignment],
        ) -> SampleResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push((receive_record_id.to_string(), assignments.len()));
            if self.fail {
                Err(SampleError::Backend("freezer service down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn commit_requires_every_box() {
        let mut plan = plan();
        plan.assign_current(&LocationDraft::new("F1", "1", "R1", "1"))
            .unwrap();
        let committer = FakeCommitter::default();

        let err = plan
            .commit(&committer, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SampleError::UnassignedBoxes(1)));
        assert!(committer.calls.lock().unwrap().is_empty());

        plan.assign_current(&LocationDraft::new("F1", "1", "R1", "2"))
            .unwrap();
        let assignments = plan
            .commit(&committer, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(assignments.len(), 2);
        assert_eq!(
            committer.calls.lock().unwrap().as_slice(),
            &[("rr-1".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn failed_commit_keeps_plan() {
        let mut plan = plan();
        plan.assign_current(&LocationDraft::new("F1", "1", "R1", "1"))
            .unwrap();
        plan.assign_current(&LocationDraft::new("F1", "1", "R1", "2"))
            .unwrap();
        let committer = FakeCommitter {
            fail: true,
            ..Default::default()
        };

        assert!(plan.commit(&committer, &CancellationToken::new()).await.is_err());
        assert!(plan.is_complete());
        assert_eq!(plan.assignments().unwrap().len(), 2);
    }
}
