//! Request and response bodies of the biobank HTTP contracts.
//!
//! Types served by `api-rest` derive `ToSchema` for the OpenAPI document. Bodies that only the
//! client sends to the external backend are plain serde types.

use biobank_core::generator::{ClinicSubjectPair, GenerationRequest, SeqTimePair};
use biobank_core::repositories::projects::Project;
use biobank_core::collaborators::SignaturePurpose;
use biobank_core::stability::StabilityQcRequest;
use biobank_core::storage::BoxAssignment;
use biobank_core::{CodeRule, ProjectCodes, SampleResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================================
// SERVED BY api-rest
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Error body returned with 4xx/5xx responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreateProjectReq {
    pub name: String,
    #[serde(default)]
    pub sponsor_project_code: Option<String>,
    #[serde(default)]
    pub lab_project_code: Option<String>,
}

impl CreateProjectReq {
    pub fn codes(&self) -> ProjectCodes {
        ProjectCodes {
            sponsor_project_code: self.sponsor_project_code.clone(),
            lab_project_code: self.lab_project_code.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProjectRes {
    pub id: String,
    pub name: String,
    pub sponsor_project_code: Option<String>,
    pub lab_project_code: Option<String>,
    pub created_at: String,
}

impl From<&Project> for ProjectRes {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.to_string(),
            name: project.name.clone(),
            sponsor_project_code: project.codes.sponsor_project_code.clone(),
            lab_project_code: project.codes.lab_project_code.clone(),
            created_at: project.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ListProjectsRes {
    pub projects: Vec<ProjectRes>,
}

/// `GET /projects/{id}/sample-code-rule`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CodeRuleRes {
    /// `{ slots: [kind | null], dictionaries: {...} }`
    #[schema(value_type = Object)]
    pub sample_code_rule: CodeRule,
}

/// `PUT /projects/{id}/sample-code-rule`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SaveCodeRuleReq {
    #[schema(value_type = Object)]
    pub sample_code_rule: CodeRule,
    pub audit_reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClinicSubjectPairDto {
    pub clinic: String,
    pub subject: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SeqTimePairDto {
    pub seq: String,
    pub time: String,
}

/// `POST /projects/{id}/generate-sample-codes`. Omitted lists mean the axis is not used.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GenerateSampleCodesReq {
    pub cycles: Vec<String>,
    pub test_types: Vec<String>,
    pub primary: Vec<String>,
    pub backup: Vec<String>,
    pub clinic_subject_pairs: Vec<ClinicSubjectPairDto>,
    pub seq_time_pairs: Vec<SeqTimePairDto>,
}

impl From<GenerateSampleCodesReq> for GenerationRequest {
    fn from(req: GenerateSampleCodesReq) -> Self {
        GenerationRequest {
            cycles: req.cycles,
            test_types: req.test_types,
            primary: req.primary,
            backup: req.backup,
            clinic_subject_pairs: req
                .clinic_subject_pairs
                .into_iter()
                .map(|p| ClinicSubjectPair::new(p.clinic, p.subject))
                .collect(),
            seq_time_pairs: req
                .seq_time_pairs
                .into_iter()
                .map(|p| SeqTimePair::new(p.seq, p.time))
                .collect(),
        }
    }
}

impl From<&GenerationRequest> for GenerateSampleCodesReq {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            cycles: request.cycles.clone(),
            test_types: request.test_types.clone(),
            primary: request.primary.clone(),
            backup: request.backup.clone(),
            clinic_subject_pairs: request
                .clinic_subject_pairs
                .iter()
                .map(|p| ClinicSubjectPairDto {
                    clinic: p.clinic.clone(),
                    subject: p.subject.clone(),
                })
                .collect(),
            seq_time_pairs: request
                .seq_time_pairs
                .iter()
                .map(|p| SeqTimePairDto {
                    seq: p.seq.clone(),
                    time: p.time.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GenerateSampleCodesRes {
    pub sample_codes: Vec<String>,
}

/// `POST /projects/{id}/generate-stability-qc-codes`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StabilityQcReq {
    /// `STB`, `QC` or `VAL`.
    pub sample_category: String,
    pub code: String,
    pub quantity: u32,
    #[serde(default = "default_start_number")]
    pub start_number: u32,
}

fn default_start_number() -> u32 {
    1
}

impl StabilityQcReq {
    /// # Errors
    ///
    /// Returns `SampleError::InvalidInput` for an unknown category.
    pub fn to_request(&self) -> SampleResult<StabilityQcRequest> {
        Ok(StabilityQcRequest {
            sample_category: self.sample_category.parse()?,
            code: self.code.clone(),
            quantity: self.quantity,
            start_number: self.start_number,
        })
    }
}

impl From<&StabilityQcRequest> for StabilityQcReq {
    fn from(request: &StabilityQcRequest) -> Self {
        Self {
            sample_category: request.sample_category.as_str().to_string(),
            code: request.code.clone(),
            quantity: request.quantity,
            start_number: request.start_number,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StabilityQcRes {
    pub count: usize,
    pub sample_codes: Vec<String>,
}

// ============================================================================
// SENT TO THE EXTERNAL BACKEND
// ============================================================================

/// `POST /auth/verify-signature`.
#[derive(Serialize)]
pub struct VerifySignatureReq<'a> {
    pub password: &'a str,
    pub purpose: SignaturePurpose,
}

/// `PATCH /samples/{id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSampleCodeReq {
    pub sample_code: String,
    pub audit_reason: String,
}

/// `POST /samples/storage/assign`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignStorageReq {
    pub receive_record_id: String,
    pub assignments: Vec<BoxAssignment>,
}

/// Error body of the external backend. Either field may carry the message.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BackendErrorRes {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BackendErrorRes {
    pub fn into_message(self) -> Option<String> {
        self.message.or(self.error).filter(|m| !m.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_request_accepts_partial_body() {
        let req: GenerateSampleCodesReq = serde_json::from_str(
            r#"{"clinic_subject_pairs": [{"clinic": "01", "subject": "001"}]}"#,
        )
        .unwrap();
        let request = GenerationRequest::from(req);

        assert!(request.cycles.is_empty());
        assert_eq!(
            request.clinic_subject_pairs,
            vec![ClinicSubjectPair::new("01", "001")]
        );
    }

    #[test]
    fn stability_request_defaults_start_number() {
        let req: StabilityQcReq =
            serde_json::from_str(r#"{"sample_category": "QC", "code": "L", "quantity": 3}"#)
                .unwrap();
        assert_eq!(req.to_request().unwrap().start_number, 1);
    }

    #[test]
    fn backend_error_prefers_message() {
        let body: BackendErrorRes =
            serde_json::from_str(r#"{"message": "wrong password", "error": "Unauthorized"}"#)
                .unwrap();
        assert_eq!(body.into_message().as_deref(), Some("wrong password"));
    }
}
