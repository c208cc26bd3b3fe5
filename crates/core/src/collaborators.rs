//! Backend collaborators consumed by the core.
//!
//! The core never talks HTTP itself. Each backend contract it depends on is a trait here;
//! `biobank-client` implements them over HTTP and tests use in-memory fakes.

use crate::error::SampleResult;
use crate::scan::{ExpectedSample, InventoryReport};
use crate::storage::BoxAssignment;
use biobank_types::{NonEmptyText, SampleCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// What a signature is being given for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignaturePurpose {
    EditSampleCode,
    SaveCodeRule,
    DeleteSamples,
}

impl SignaturePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignaturePurpose::EditSampleCode => "edit_sample_code",
            SignaturePurpose::SaveCodeRule => "save_code_rule",
            SignaturePurpose::DeleteSamples => "delete_samples",
        }
    }
}

/// Password re-entered by the operator, tagged with its purpose.
#[derive(Clone)]
pub struct Credentials {
    password: String,
    purpose: SignaturePurpose,
}

impl Credentials {
    pub fn new(password: impl Into<String>, purpose: SignaturePurpose) -> Self {
        Self {
            password: password.into(),
            purpose,
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn purpose(&self) -> SignaturePurpose {
        self.purpose
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &"<redacted>")
            .field("purpose", &self.purpose)
            .finish()
    }
}

/// Failure reported by a signature verifier. The message is shown to the operator verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Bad credentials (HTTP 401).
    #[error("{0}")]
    Rejected(String),
    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

/// `POST /auth/verify-signature`.
pub trait SignatureVerifier {
    fn verify(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<(), VerifyError>> + Send;
}

/// `PATCH /samples/{id}`.
pub trait SampleCodeUpdater {
    fn update_sample_code(
        &self,
        sample_id: &str,
        code: &SampleCode,
        audit_reason: &NonEmptyText,
    ) -> impl Future<Output = SampleResult<()>> + Send;
}

/// `GET /samples/receive-records/{id}/expected-samples`.
pub trait ExpectedSampleSource {
    fn expected_samples(
        &self,
        receive_record_id: &str,
    ) -> impl Future<Output = SampleResult<Vec<ExpectedSample>>> + Send;
}

/// `POST /samples/receive-records/{id}/complete-inventory`.
pub trait InventoryCompleter {
    fn complete_inventory(
        &self,
        receive_record_id: &str,
        report: &InventoryReport,
    ) -> impl Future<Output = SampleResult<()>> + Send;
}

/// `POST /samples/storage/assign`.
pub trait StorageCommitter {
    fn assign_storage(
        &self,
        receive_record_id: &str,
        assignments: &[BoxAssignment],
    ) -> impl Future<Output = SampleResult<()>> + Send;
}
