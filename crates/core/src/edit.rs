//! Code edit and signature gate.
//!
//! Changing a sample code needs the operator to re-enter their password. The edit is staged
//! first, the signature is verified by the backend, and only then is the change applied.
//!
//! ## Architecture
//!
//! - **Type-state pattern** (`Viewing` / `PendingSignature`) so a commit can only be attempted on
//!   a staged edit.
//! - **Two commit paths**: a code that only exists in a generation preview is replaced in memory;
//!   a code already persisted as a sample goes through the backend update with an audit reason
//!   and is reflected locally only after the backend accepts it.
//! - **No optimistic commit**: every failure leaves the previous code observable.

use crate::cancel::CancellationToken;
use crate::collaborators::{Credentials, SampleCodeUpdater, SignatureVerifier, VerifyError};
use crate::error::{SampleError, SampleResult};
use crate::generator::{find_code_mut, GeneratedCode};
use biobank_ids::CodeId;
use biobank_types::{NonEmptyText, SampleCode};

// ============================================================================
// SIGNATURE GATE
// ============================================================================

/// Verifies an operator signature before a dependent state transition.
pub struct SignatureGate;

impl SignatureGate {
    /// Asks `verifier` to check `credentials`.
    ///
    /// # Errors
    ///
    /// - [`SampleError::SignatureRejected`] for bad credentials,
    /// - [`SampleError::SignatureFailed`] for any other verifier failure,
    /// - [`SampleError::Cancelled`] if `cancel` fires before or during the call.
    pub async fn authorise<V: SignatureVerifier>(
        verifier: &V,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> SampleResult<()> {
        cancel.check()?;
        let result = verifier.verify(credentials).await;
        cancel.check()?;

        match result {
            Ok(()) => Ok(()),
            Err(VerifyError::Rejected(reason)) => {
                tracing::warn!(purpose = credentials.purpose().as_str(), "signature rejected");
                Err(SampleError::SignatureRejected(reason))
            }
            Err(VerifyError::Failed(reason)) => {
                tracing::error!(purpose = credentials.purpose().as_str(), %reason, "signature verification failed");
                Err(SampleError::SignatureFailed(reason))
            }
        }
    }
}

// ============================================================================
// TYPE-STATE MARKERS
// ============================================================================

/// Marker: the code is displayed, no edit staged.
#[derive(Clone, Copy, Debug)]
pub struct Viewing;

/// Marker: an edit is staged and waits for a signature.
#[derive(Clone, Debug)]
pub struct PendingSignature {
    proposed: SampleCode,
}

// ============================================================================
// EDIT SESSION
// ============================================================================

/// Edit workflow for one code.
#[derive(Clone, Debug)]
pub struct CodeEditSession<S> {
    original: String,
    state: S,
}

/// Result of a successful commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommittedEdit {
    pub previous: String,
    pub code: SampleCode,
    pub audit_reason: Option<NonEmptyText>,
}

/// Where the session ended up after a failed commit.
#[derive(Debug)]
pub enum EditState {
    Viewing(CodeEditSession<Viewing>),
    PendingSignature(CodeEditSession<PendingSignature>),
}

/// A failed commit: the error plus the session to continue with.
#[derive(Debug)]
pub struct EditFailure {
    pub session: EditState,
    pub error: SampleError,
}

impl CodeEditSession<Viewing> {
    pub fn new(current_code: impl Into<String>) -> Self {
        Self {
            original: current_code.into(),
            state: Viewing,
        }
    }

    /// Opens an edit on a preview row.
    pub fn for_generated(code: &GeneratedCode) -> Self {
        Self::new(code.current_code())
    }

    pub fn current_code(&self) -> &str {
        &self.original
    }

    /// Stages `proposed` as the new code.
    ///
    /// # Errors
    ///
    /// - [`SampleError::Text`] if `proposed` is not a valid sample code,
    /// - [`SampleError::UnchangedCode`] if it equals the current code.
    pub fn stage(&self, proposed: &str) -> SampleResult<CodeEditSession<PendingSignature>> {
        let proposed = SampleCode::parse(proposed)?;
        if proposed.as_str() == self.original {
            return Err(SampleError::UnchangedCode);
        }

        Ok(CodeEditSession {
            original: self.original.clone(),
            state: PendingSignature { proposed },
        })
    }
}

impl CodeEditSession<PendingSignature> {
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn proposed(&self) -> &SampleCode {
        &self.state.proposed
    }

    /// Discards the staged edit.
    pub fn cancel(self) -> CodeEditSession<Viewing> {
        CodeEditSession::new(self.original)
    }

    /// Commits the staged edit to a code that only exists in a preview list.
    ///
    /// The row addressed by `id` must still show the code this edit was staged against.
    ///
    /// # Errors
    ///
    /// On failure the returned [`EditFailure`] carries:
    /// - `PendingSignature` for a rejected password, so the operator can retry,
    /// - `Viewing` for verifier failures, cancellation, stale rows or unknown ids.
    pub async fn commit_preview<V: SignatureVerifier>(
        self,
        verifier: &V,
        credentials: &Credentials,
        codes: &mut [GeneratedCode],
        id: CodeId,
        cancel: &CancellationToken,
    ) -> Result<CommittedEdit, EditFailure> {
        if let Err(error) = self.check_preview_row(codes, id) {
            let current = find_code_mut(codes, id)
                .map(|row| row.current_code().to_string())
                .unwrap_or_else(|_| self.original.clone());
            return Err(EditFailure {
                session: EditState::Viewing(CodeEditSession::new(current)),
                error,
            });
        }

        if let Err(error) = SignatureGate::authorise(verifier, credentials, cancel).await {
            return Err(self.signature_failure(error));
        }

        let row = match find_code_mut(codes, id) {
            Ok(row) => row,
            Err(error) => return Err(self.discard(error)),
        };
        row.apply_edit(self.state.proposed.as_str().to_string());

        tracing::info!(code_id = %id, from = %self.original, to = %self.state.proposed, "preview code edited");
        Ok(CommittedEdit {
            previous: self.original,
            code: self.state.proposed,
            audit_reason: None,
        })
    }

    /// Commits the staged edit to a persisted sample through the backend.
    ///
    /// # Errors
    ///
    /// On failure the returned [`EditFailure`] carries:
    /// - `PendingSignature` for a missing audit reason or a rejected password,
    /// - `Viewing` (still showing the original code) for verifier or backend failures and
    ///   cancellation before the update is sent.
    ///
    /// Once the backend has accepted the update the edit is reported as committed even if
    /// `cancel` fired meanwhile, so the caller never shows a code the backend no longer holds.
    pub async fn commit_persisted<V, U>(
        self,
        verifier: &V,
        updater: &U,
        credentials: &Credentials,
        sample_id: &str,
        audit_reason: &str,
        cancel: &CancellationToken,
    ) -> Result<CommittedEdit, EditFailure>
    where
        V: SignatureVerifier,
        U: SampleCodeUpdater,
    {
        let audit_reason = match NonEmptyText::new(audit_reason) {
            Ok(reason) => reason,
            Err(_) => {
                return Err(EditFailure {
                    session: EditState::PendingSignature(self),
                    error: SampleError::MissingAuditReason,
                })
            }
        };

        if let Err(error) = SignatureGate::authorise(verifier, credentials, cancel).await {
            return Err(self.signature_failure(error));
        }

        let result = updater
            .update_sample_code(sample_id, &self.state.proposed, &audit_reason)
            .await;
        if let Err(error) = result {
            tracing::error!(sample_id, error = %error, "sample code update failed");
            return Err(self.discard(error));
        }
        if cancel.is_cancelled() {
            tracing::warn!(sample_id, "cancelled after the backend applied the update; reporting the commit");
        }

        tracing::info!(sample_id, from = %self.original, to = %self.state.proposed, "persisted code edited");
        Ok(CommittedEdit {
            previous: self.original,
            code: self.state.proposed,
            audit_reason: Some(audit_reason),
        })
    }

    fn check_preview_row(&self, codes: &mut [GeneratedCode], id: CodeId) -> SampleResult<()> {
        let row = find_code_mut(codes, id)?;
        if row.current_code() != self.original {
            return Err(SampleError::StaleEdit {
                expected: self.original.clone(),
                found: row.current_code().to_string(),
            });
        }
        Ok(())
    }

    fn signature_failure(self, error: SampleError) -> EditFailure {
        match error {
            SampleError::SignatureRejected(_) => EditFailure {
                session: EditState::PendingSignature(self),
                error,
            },
            other => self.discard(other),
        }
    }

    fn discard(self, error: SampleError) -> EditFailure {
        EditFailure {
            session: EditState::Viewing(self.cancel()),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SignaturePurpose;
    use crate::generator::{ClinicSubjectPair, CodeGenerator, GenerationRequest};
    use crate::rule::{CodeRule, Dictionaries, ElementKind, ProjectCodes};
    use biobank_ids::CodeIdGenerator;
    use std::sync::Mutex;

    struct FakeVerifier {
        outcome: Result<(), VerifyError>,
    }

    impl SignatureVerifier for FakeVerifier {
        async fn verify(&self, _credentials: &Credentials) -> Result<(), VerifyError> {
            self.outcome.clone()
        }
    }

    #[derive(Default)]
    struct FakeUpdater {
        fail_with: Option<String>,
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl SampleCodeUpdater for FakeUpdater {
        async fn update_sample_code(
            &self,
            sample_id: &str,
            code: &SampleCode,
            audit_reason: &NonEmptyText,
        ) -> SampleResult<()> {
            self.calls.lock().unwrap().push((
                sample_id.to_string(),
                code.to_string(),
                audit_reason.to_string(),
            ));
            match &self.fail_with {
                Some(message) => Err(SampleError::Backend(message.clone())),
                None => Ok(()),
            }
        }
    }

    fn accepting() -> FakeVerifier {
        FakeVerifier { outcome: Ok(()) }
    }

    fn credentials() -> Credentials {
        Credentials::new("secret", SignaturePurpose::EditSampleCode)
    }

    fn preview() -> Vec<GeneratedCode> {
        let rule = CodeRule::from_slots(&[
            Some(ElementKind::SponsorCode),
            Some(ElementKind::ClinicCode),
            Some(ElementKind::SubjectId),
        ])
        .unwrap()
        .with_dictionaries(Dictionaries {
            clinic_codes: vec!["01".into()],
            ..Default::default()
        });
        let project = ProjectCodes::new("SP2024", None);
        let request = GenerationRequest {
            clinic_subject_pairs: vec![ClinicSubjectPair::new("01", "001")],
            ..Default::default()
        };
        CodeGenerator::new(&rule, &project)
            .generate(&request, &mut CodeIdGenerator::new())
            .unwrap()
    }

    #[test]
    fn stage_rejects_unchanged_and_invalid_codes() {
        let session = CodeEditSession::new("SP2024-01-001");
        assert!(matches!(
            session.stage("SP2024-01-001"),
            Err(SampleError::UnchangedCode)
        ));
        assert!(matches!(session.stage("  "), Err(SampleError::Text(_))));
        assert_eq!(
            session.stage("SP2024-01-009").unwrap().proposed().as_str(),
            "SP2024-01-009"
        );
    }

    #[test]
    fn cancel_returns_to_viewing_original() {
        let pending = CodeEditSession::new("A-1").stage("A-2").unwrap();
        let viewing = pending.cancel();
        assert_eq!(viewing.current_code(), "A-1");
    }

    #[tokio::test]
    async fn preview_commit_replaces_in_memory_code() {
        let mut codes = preview();
        let id = codes[0].id();
        let pending = CodeEditSession::for_generated(&codes[0])
            .stage("SP2024-01-101")
            .unwrap();

        let committed = pending
            .commit_preview(&accepting(), &credentials(), &mut codes, id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(committed.previous, "SP2024-01-001");
        assert_eq!(codes[0].current_code(), "SP2024-01-101");
        assert_eq!(codes[0].original_code(), "SP2024-01-001");
        assert!(codes[0].is_edited());
    }

    #[tokio::test]
    async fn rejected_signature_keeps_staged_edit_and_code() {
        let mut codes = preview();
        let id = codes[0].id();
        let pending = CodeEditSession::for_generated(&codes[0])
            .stage("SP2024-01-101")
            .unwrap();
        let verifier = FakeVerifier {
            outcome: Err(VerifyError::Rejected("wrong password".into())),
        };

        let failure = pending
            .commit_preview(&verifier, &credentials(), &mut codes, id, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, SampleError::SignatureRejected(ref r) if r == "wrong password"));
        match failure.session {
            EditState::PendingSignature(session) => {
                assert_eq!(session.proposed().as_str(), "SP2024-01-101")
            }
            other => panic!("expected staged edit to survive, got {other:?}"),
        }
        assert_eq!(codes[0].current_code(), "SP2024-01-001");
    }

    #[tokio::test]
    async fn verifier_failure_discards_staged_edit_with_verbatim_reason() {
        let mut codes = preview();
        let id = codes[0].id();
        let pending = CodeEditSession::for_generated(&codes[0]).stage("X-1").unwrap();
        let verifier = FakeVerifier {
            outcome: Err(VerifyError::Failed("account locked".into())),
        };

        let failure = pending
            .commit_preview(&verifier, &credentials(), &mut codes, id, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.error.to_string(), "signature verification failed: account locked");
        assert!(matches!(failure.session, EditState::Viewing(_)));
        assert!(!codes[0].is_edited());
    }

    #[tokio::test]
    async fn stale_preview_edit_is_rejected() {
        let mut codes = preview();
        let id = codes[0].id();
        let pending = CodeEditSession::new("SOMETHING-ELSE").stage("X-1").unwrap();

        let failure = pending
            .commit_preview(&accepting(), &credentials(), &mut codes, id, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, SampleError::StaleEdit { .. }));
        match failure.session {
            EditState::Viewing(session) => assert_eq!(session.current_code(), "SP2024-01-001"),
            other => panic!("unexpected session state {other:?}"),
        }
    }

    #[tokio::test]
    async fn persisted_commit_calls_backend_with_audit_reason() {
        let updater = FakeUpdater::default();
        let pending = CodeEditSession::new("SP2024-01-001")
            .stage("SP2024-01-002")
            .unwrap();

        let committed = pending
            .commit_persisted(
                &accepting(),
                &updater,
                &credentials(),
                "sample-17",
                "label misprint",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(committed.code.as_str(), "SP2024-01-002");
        assert_eq!(
            updater.calls.lock().unwrap().as_slice(),
            &[(
                "sample-17".to_string(),
                "SP2024-01-002".to_string(),
                "label misprint".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn persisted_commit_with_bad_signature_never_reaches_backend() {
        let updater = FakeUpdater::default();
        let verifier = FakeVerifier {
            outcome: Err(VerifyError::Rejected("wrong password".into())),
        };
        let pending = CodeEditSession::new("SP2024-01-001")
            .stage("SP2024-01-002")
            .unwrap();

        let failure = pending
            .commit_persisted(
                &verifier,
                &updater,
                &credentials(),
                "sample-17",
                "label misprint",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(updater.calls.lock().unwrap().is_empty());
        match failure.session {
            EditState::PendingSignature(session) => {
                assert_eq!(session.original(), "SP2024-01-001")
            }
            other => panic!("unexpected session state {other:?}"),
        }
    }

    #[tokio::test]
    async fn persisted_commit_backend_failure_keeps_original() {
        let updater = FakeUpdater {
            fail_with: Some("duplicate sample code".into()),
            ..Default::default()
        };
        let pending = CodeEditSession::new("SP2024-01-001")
            .stage("SP2024-01-002")
            .unwrap();

        let failure = pending
            .commit_persisted(
                &accepting(),
                &updater,
                &credentials(),
                "sample-17",
                "label misprint",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(failure.error, SampleError::Backend(_)));
        match failure.session {
            EditState::Viewing(session) => assert_eq!(session.current_code(), "SP2024-01-001"),
            other => panic!("unexpected session state {other:?}"),
        }
    }

    #[tokio::test]
    async fn persisted_commit_requires_audit_reason() {
        let updater = FakeUpdater::default();
        let pending = CodeEditSession::new("A-1").stage("A-2").unwrap();

        let failure = pending
            .commit_persisted(
                &accepting(),
                &updater,
                &credentials(),
                "sample-1",
                "   ",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(failure.error, SampleError::MissingAuditReason));
        assert!(matches!(failure.session, EditState::PendingSignature(_)));
    }

    struct CancellingUpdater {
        cancel: CancellationToken,
    }

    impl SampleCodeUpdater for CancellingUpdater {
        async fn update_sample_code(
            &self,
            _sample_id: &str,
            _code: &SampleCode,
            _audit_reason: &NonEmptyText,
        ) -> SampleResult<()> {
            self.cancel.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn cancellation_after_applied_update_still_reports_commit() {
        let cancel = CancellationToken::new();
        let updater = CancellingUpdater {
            cancel: cancel.clone(),
        };
        let pending = CodeEditSession::new("SP2024-01-001")
            .stage("SP2024-01-002")
            .unwrap();

        let committed = pending
            .commit_persisted(
                &accepting(),
                &updater,
                &credentials(),
                "sample-17",
                "label misprint",
                &cancel,
            )
            .await
            .unwrap();

        assert!(cancel.is_cancelled());
        assert_eq!(committed.previous, "SP2024-01-001");
        assert_eq!(committed.code.as_str(), "SP2024-01-002");
    }

    #[tokio::test]
    async fn cancelled_persisted_commit_never_reaches_backend() {
        let updater = FakeUpdater::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pending = CodeEditSession::new("A-1").stage("A-2").unwrap();

        let failure = pending
            .commit_persisted(&accepting(), &updater, &credentials(), "sample-1", "typo", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, SampleError::Cancelled));
        assert!(updater.calls.lock().unwrap().is_empty());
        match failure.session {
            EditState::Viewing(session) => assert_eq!(session.current_code(), "A-1"),
            other => panic!("unexpected session state {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_commit_is_not_applied() {
        let mut codes = preview();
        let id = codes[0].id();
        let pending = CodeEditSession::for_generated(&codes[0]).stage("X-1").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = pending
            .commit_preview(&accepting(), &credentials(), &mut codes, id, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, SampleError::Cancelled));
        assert!(!codes[0].is_edited());
    }
}
