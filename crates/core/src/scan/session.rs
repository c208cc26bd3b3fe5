use super::boxes::{BoxFill, SampleBox, ScanPolicy};
use super::{ExpectedSample, ScanRecord, ScanStatus};
use crate::cancel::CancellationToken;
use crate::collaborators::InventoryCompleter;
use crate::error::{SampleError, SampleResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of a successful sample scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanOutcome {
    pub code: String,
    pub box_code: String,
    pub members: usize,
    pub capacity: u32,
    /// `Full` means the box was released and a new one must be selected.
    pub fill: BoxFill,
}

/// Counts for display.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub expected: usize,
    pub scanned: usize,
    pub pending: usize,
    pub errors: usize,
    pub unexpected: usize,
    pub boxes: usize,
    pub active_box: Option<String>,
}

/// Whether the session may be finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// Nothing scanned yet; finishing is refused even when forced.
    NothingScanned,
    /// Some expected samples are still pending; finishing needs `force`.
    Partial { pending: usize },
    /// Every non-error expected sample is scanned.
    Complete,
}

/// Payload of `POST /samples/receive-records/{id}/complete-inventory`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReport {
    pub samples: Vec<ScanRecord>,
    pub boxes: Vec<SampleBox>,
}

/// Reconciliation session for one receive record.
///
/// Events are applied strictly in call order and every rejected event leaves the session
/// untouched.
#[derive(Clone, Debug)]
pub struct ScanSession {
    receive_record_id: String,
    policy: ScanPolicy,
    records: Vec<ScanRecord>,
    index: HashMap<String, usize>,
    unexpected: Vec<ScanRecord>,
    boxes: Vec<SampleBox>,
    active: Option<usize>,
    released_full: Option<usize>,
}

impl ScanSession {
    /// Start a session from the expected samples of a receive record.
    ///
    /// Samples already `scanned` are placed back into their boxes so a session can be resumed.
    /// Duplicate expected codes keep their first occurrence.
    pub fn new(
        receive_record_id: impl Into<String>,
        expected: Vec<ExpectedSample>,
        policy: ScanPolicy,
    ) -> Self {
        let mut session = Self {
            receive_record_id: receive_record_id.into(),
            policy,
            records: Vec::with_capacity(expected.len()),
            index: HashMap::with_capacity(expected.len()),
            unexpected: Vec::new(),
            boxes: Vec::new(),
            active: None,
            released_full: None,
        };

        for sample in expected {
            if sample.code.is_empty() || session.index.contains_key(&sample.code) {
                tracing::warn!(code = %sample.code, "skipping empty or duplicate expected sample");
                continue;
            }
            let mut record = ScanRecord::from_expected(sample);
            if record.status == ScanStatus::Scanned {
                match record.box_code.clone() {
                    Some(box_code) => session.restore_member(box_code, &record.code),
                    None => record.status = ScanStatus::Pending,
                }
            }
            session.index.insert(record.code.clone(), session.records.len());
            session.records.push(record);
        }

        session
    }

    fn restore_member(&mut self, box_code: String, code: &str) {
        let position = match self.boxes.iter().position(|b| b.code == box_code) {
            Some(position) => position,
            None => {
                self.boxes
                    .push(SampleBox::new(box_code, self.policy.default_box_capacity));
                self.boxes.len() - 1
            }
        };
        let sample_box = &mut self.boxes[position];
        sample_box.members.push(code.to_string());
        if sample_box.members.len() > sample_box.capacity as usize {
            sample_box.capacity = sample_box.members.len() as u32;
        }
    }

    pub fn receive_record_id(&self) -> &str {
        &self.receive_record_id
    }

    pub fn policy(&self) -> &ScanPolicy {
        &self.policy
    }

    pub fn records(&self) -> &[ScanRecord] {
        &self.records
    }

    pub fn record(&self, code: &str) -> Option<&ScanRecord> {
        self.index.get(code.trim()).map(|&i| &self.records[i])
    }

    pub fn unexpected(&self) -> &[ScanRecord] {
        &self.unexpected
    }

    pub fn boxes(&self) -> &[SampleBox] {
        &self.boxes
    }

    pub fn active_box(&self) -> Option<&SampleBox> {
        self.active.map(|i| &self.boxes[i])
    }

    // ============================================================================
    // BOXES
    // ============================================================================

    /// Make `code` the active box.
    ///
    /// `capacity` comes from the box metadata when known; otherwise the policy default applies.
    /// Re-selecting the active box is a no-op.
    ///
    /// # Errors
    ///
    /// - [`SampleError::InvalidInput`] for a blank code,
    /// - [`SampleError::InvalidCapacity`] for a zero capacity,
    /// - [`SampleError::BoxSwitchFromEmpty`] when leaving an empty box is not allowed,
    /// - [`SampleError::BoxAlreadyUsed`] for a box used earlier in this session.
    pub fn select_box(&mut self, code: &str, capacity: Option<u32>) -> SampleResult<&SampleBox> {
        let code = code.trim();
        if code.is_empty() {
            return Err(SampleError::InvalidInput("box code is empty".into()));
        }
        let capacity = capacity.unwrap_or(self.policy.default_box_capacity);
        if capacity == 0 {
            return Err(SampleError::InvalidCapacity);
        }

        if let Some(active) = self.active {
            if self.boxes[active].code == code {
                return Ok(&self.boxes[active]);
            }
            if self.boxes[active].is_empty() && !self.policy.allow_switch_from_empty_box {
                return Err(SampleError::BoxSwitchFromEmpty(
                    self.boxes[active].code.clone(),
                ));
            }
        }
        if self.boxes.iter().any(|b| b.code == code) {
            return Err(SampleError::BoxAlreadyUsed(code.to_string()));
        }

        if let Some(active) = self.active.take() {
            if self.boxes[active].is_empty() {
                let dropped = self.boxes.remove(active);
                tracing::debug!(box_code = %dropped.code, "discarded empty box");
            }
        }

        self.boxes.push(SampleBox::new(code.to_string(), capacity));
        self.active = Some(self.boxes.len() - 1);
        self.released_full = None;
        tracing::info!(box_code = code, capacity, "box selected");
        Ok(&self.boxes[self.boxes.len() - 1])
    }

    // ============================================================================
    // SCANS
    // ============================================================================

    /// Scan one expected sample into the active box.
    ///
    /// Every rejection leaves the session untouched. In particular a scan with no active box
    /// returns [`SampleError::NoActiveBox`] and the sample stays `pending`; it is not moved to
    /// `error`, so the operator can select a box and scan it again.
    ///
    /// # Errors
    ///
    /// - [`SampleError::BoxFull`] if the previous box filled up and no new box was selected,
    /// - [`SampleError::NoActiveBox`] if no box is selected,
    /// - [`SampleError::UnexpectedCode`] if `code` is not expected (record it with
    ///   [`ScanSession::record_unexpected`]),
    /// - [`SampleError::AlreadyScanned`] / [`SampleError::CodeInErrorState`] for non-pending codes.
    pub fn scan(&mut self, code: &str) -> SampleResult<ScanOutcome> {
        let code = code.trim();
        if code.is_empty() {
            return Err(SampleError::InvalidInput("scanned code is empty".into()));
        }

        let Some(active) = self.active else {
            if let Some(full) = self.released_full {
                let sample_box = &self.boxes[full];
                return Err(SampleError::BoxFull {
                    box_code: sample_box.code.clone(),
                    capacity: sample_box.capacity,
                });
            }
            return Err(SampleError::NoActiveBox);
        };

        let Some(&position) = self.index.get(code) else {
            tracing::warn!(code, "scanned code is not expected");
            return Err(SampleError::UnexpectedCode(code.to_string()));
        };
        match self.records[position].status {
            ScanStatus::Pending => {}
            ScanStatus::Scanned => return Err(SampleError::AlreadyScanned(code.to_string())),
            ScanStatus::Error => return Err(SampleError::CodeInErrorState(code.to_string())),
        }
        if self.boxes[active].is_full() {
            return Err(SampleError::BoxFull {
                box_code: self.boxes[active].code.clone(),
                capacity: self.boxes[active].capacity,
            });
        }

        let sample_box = &mut self.boxes[active];
        sample_box.members.push(code.to_string());
        let record = &mut self.records[position];
        record.status = ScanStatus::Scanned;
        record.box_code = Some(sample_box.code.clone());

        let fill = sample_box.fill(self.policy.warn_ratio);
        let outcome = ScanOutcome {
            code: code.to_string(),
            box_code: sample_box.code.clone(),
            members: sample_box.len(),
            capacity: sample_box.capacity,
            fill,
        };

        match fill {
            BoxFill::Full => {
                tracing::info!(box_code = %outcome.box_code, "box full, released");
                self.active = None;
                self.released_full = Some(active);
            }
            BoxFill::NearFull => {
                tracing::warn!(box_code = %outcome.box_code, members = outcome.members, "box nearly full")
            }
            BoxFill::Normal => {}
        }

        Ok(outcome)
    }

    /// Record a scanned code that is not in the expected list.
    ///
    /// # Errors
    ///
    /// - [`SampleError::MissingErrorReason`] for a blank reason,
    /// - [`SampleError::InvalidInput`] if the code is expected (use [`ScanSession::mark_error`]),
    /// - [`SampleError::AlreadyScanned`] if it was already recorded.
    pub fn record_unexpected(&mut self, code: &str, reason: &str) -> SampleResult<()> {
        let code = code.trim();
        let reason = reason.trim();
        if code.is_empty() {
            return Err(SampleError::InvalidInput("scanned code is empty".into()));
        }
        if reason.is_empty() {
            return Err(SampleError::MissingErrorReason);
        }
        if self.index.contains_key(code) {
            return Err(SampleError::InvalidInput(format!(
                "sample {code} is expected; mark it as error instead"
            )));
        }
        if self.unexpected.iter().any(|r| r.code == code) {
            return Err(SampleError::AlreadyScanned(code.to_string()));
        }

        self.unexpected.push(ScanRecord {
            code: code.to_string(),
            status: ScanStatus::Error,
            box_code: None,
            special_notes: None,
            error_reason: Some(reason.to_string()),
            expected: false,
        });
        tracing::info!(code, reason, "unexpected sample recorded");
        Ok(())
    }

    /// Move a pending expected sample to `error`.
    pub fn mark_error(&mut self, code: &str, reason: &str) -> SampleResult<()> {
        let code = code.trim();
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SampleError::MissingErrorReason);
        }
        let position = *self
            .index
            .get(code)
            .ok_or_else(|| SampleError::UnexpectedCode(code.to_string()))?;
        let record = &mut self.records[position];
        match record.status {
            ScanStatus::Pending => {}
            ScanStatus::Scanned => return Err(SampleError::AlreadyScanned(code.to_string())),
            ScanStatus::Error => return Err(SampleError::CodeInErrorState(code.to_string())),
        }

        record.status = ScanStatus::Error;
        record.error_reason = Some(reason.to_string());
        tracing::info!(code, reason, "expected sample marked as error");
        Ok(())
    }

    /// Set or clear (blank `notes`) the special notes of an expected sample.
    pub fn annotate(&mut self, code: &str, notes: &str) -> SampleResult<()> {
        let code = code.trim();
        let position = *self
            .index
            .get(code)
            .ok_or_else(|| SampleError::UnexpectedCode(code.to_string()))?;
        let notes = notes.trim();
        self.records[position].special_notes = (!notes.is_empty()).then(|| notes.to_string());
        Ok(())
    }

    // ============================================================================
    // COMPLETION
    // ============================================================================

    pub fn summary(&self) -> ScanSummary {
        let count = |status: ScanStatus| self.records.iter().filter(|r| r.status == status).count();
        ScanSummary {
            expected: self.records.len(),
            scanned: count(ScanStatus::Scanned),
            pending: count(ScanStatus::Pending),
            errors: count(ScanStatus::Error),
            unexpected: self.unexpected.len(),
            boxes: self.boxes.iter().filter(|b| !b.is_empty()).count(),
            active_box: self.active_box().map(|b| b.code.clone()),
        }
    }

    pub fn completion(&self) -> Completion {
        let summary = self.summary();
        if summary.scanned == 0 {
            Completion::NothingScanned
        } else if summary.pending > 0 {
            Completion::Partial {
                pending: summary.pending,
            }
        } else {
            Completion::Complete
        }
    }

    /// Build the inventory report.
    ///
    /// # Errors
    ///
    /// - [`SampleError::NothingScanned`] if nothing was scanned, even with `force`,
    /// - [`SampleError::PendingSamples`] if samples are pending and `force` is false.
    pub fn finish(&self, force: bool) -> SampleResult<InventoryReport> {
        match self.completion() {
            Completion::NothingScanned => return Err(SampleError::NothingScanned),
            Completion::Partial { pending } if !force => {
                return Err(SampleError::PendingSamples(pending))
            }
            _ => {}
        }

        Ok(InventoryReport {
            samples: self
                .records
                .iter()
                .chain(self.unexpected.iter())
                .cloned()
                .collect(),
            boxes: self.boxes.iter().filter(|b| !b.is_empty()).cloned().collect(),
        })
    }

    /// Send the inventory report to the backend.
    ///
    /// The session is left unchanged whatever the outcome, so a failed call can be retried
    /// without losing scanning progress.
    pub async fn complete<C: InventoryCompleter>(
        &self,
        completer: &C,
        force: bool,
        cancel: &CancellationToken,
    ) -> SampleResult<InventoryReport> {
        let report = self.finish(force)?;
        cancel.check()?;

        if let Err(err) = completer
            .complete_inventory(&self.receive_record_id, &report)
            .await
        {
            tracing::error!(receive_record_id = %self.receive_record_id, error = %err, "complete inventory failed");
            return Err(err);
        }
        cancel.check()?;

        tracing::info!(
            receive_record_id = %self.receive_record_id,
            samples = report.samples.len(),
            boxes = report.boxes.len(),
            "inventory completed"
        );
        Ok(report)
    }
}
