//! # Biobank Client
//!
//! HTTP client for the biobank backend contracts.
//!
//! [`BackendClient`] implements every collaborator trait of `biobank_core::collaborators` plus
//! the generation and rule calls, so the core state machines can run against a live backend.

mod error;

pub use error::{ClientError, ClientResult};

use api_shared::{
    AssignStorageReq, BackendErrorRes, CodeRuleRes, GenerateSampleCodesReq,
    GenerateSampleCodesRes, SaveCodeRuleReq, StabilityQcReq, StabilityQcRes,
    UpdateSampleCodeReq, VerifySignatureReq, API_KEY_HEADER,
};
use biobank_core::collaborators::{
    Credentials, ExpectedSampleSource, InventoryCompleter, SampleCodeUpdater, SignatureVerifier,
    StorageCommitter, VerifyError,
};
use biobank_core::scan::{ExpectedSample, InventoryReport};
use biobank_core::stability::StabilityQcRequest;
use biobank_core::storage::BoxAssignment;
use biobank_core::{CodeRule, GenerationRequest, NonEmptyText, ProjectId, SampleCode, SampleResult};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

/// Client for the biobank backend.
#[derive(Clone, Debug)]
pub struct BackendClient {
    base_url: String,
    http_client: reqwest::Client,
    api_key: Option<String>,
    bearer_token: Option<String>,
}

impl BackendClient {
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] unless `base_url` starts with `http://` or `https://`.
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(base_url));
        }

        Ok(Self {
            base_url,
            http_client: reqwest::Client::new(),
            api_key: None,
            bearer_token: None,
        })
    }

    /// Send `x-api-key` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Send a bearer token obtained from the session service.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .http_client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check(response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = backend_message(&text)
            .or_else(|| Some(text.trim().to_string()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> ClientResult<T> {
        let response = Self::check(builder.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn send_empty(builder: RequestBuilder) -> ClientResult<()> {
        Self::check(builder.send().await?).await?;
        Ok(())
    }

    // ============================================================================
    // GENERATION AND RULES
    // ============================================================================

    /// `POST /projects/{id}/generate-sample-codes`.
    pub async fn generate_sample_codes(
        &self,
        project_id: &ProjectId,
        request: &GenerationRequest,
    ) -> ClientResult<Vec<String>> {
        let body = GenerateSampleCodesReq::from(request);
        let res: GenerateSampleCodesRes = Self::send_json(
            self.request(
                Method::POST,
                &format!("/projects/{project_id}/generate-sample-codes"),
            )
            .json(&body),
        )
        .await?;
        Ok(res.sample_codes)
    }

    /// `POST /projects/{id}/generate-stability-qc-codes`.
    pub async fn generate_stability_qc_codes(
        &self,
        project_id: &ProjectId,
        request: &StabilityQcRequest,
    ) -> ClientResult<Vec<String>> {
        let body = StabilityQcReq::from(request);
        let res: StabilityQcRes = Self::send_json(
            self.request(
                Method::POST,
                &format!("/projects/{project_id}/generate-stability-qc-codes"),
            )
            .json(&body),
        )
        .await?;
        Ok(res.sample_codes)
    }

    /// `GET /projects/{id}/sample-code-rule`.
    pub async fn get_code_rule(&self, project_id: &ProjectId) -> ClientResult<CodeRule> {
        let res: CodeRuleRes = Self::send_json(self.request(
            Method::GET,
            &format!("/projects/{project_id}/sample-code-rule"),
        ))
        .await?;
        Ok(res.sample_code_rule)
    }

    /// `PUT /projects/{id}/sample-code-rule`.
    ///
    /// Callers authorise the save with a `save_code_rule` signature first.
    pub async fn save_code_rule(
        &self,
        project_id: &ProjectId,
        rule: &CodeRule,
        audit_reason: &NonEmptyText,
    ) -> ClientResult<()> {
        let body = SaveCodeRuleReq {
            sample_code_rule: rule.clone(),
            audit_reason: audit_reason.to_string(),
        };
        Self::send_empty(
            self.request(
                Method::PUT,
                &format!("/projects/{project_id}/sample-code-rule"),
            )
            .json(&body),
        )
        .await
    }
}

fn backend_message(text: &str) -> Option<String> {
    serde_json::from_str::<BackendErrorRes>(text)
        .ok()
        .and_then(BackendErrorRes::into_message)
}

// ============================================================================
// COLLABORATORS
// ============================================================================

impl SignatureVerifier for BackendClient {
    async fn verify(&self, credentials: &Credentials) -> Result<(), VerifyError> {
        let body = VerifySignatureReq {
            password: credentials.password(),
            purpose: credentials.purpose(),
        };
        let result = Self::send_empty(
            self.request(Method::POST, "/auth/verify-signature")
                .json(&body),
        )
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(ClientError::Status { status, message })
                if status == StatusCode::UNAUTHORIZED.as_u16() =>
            {
                Err(VerifyError::Rejected(message))
            }
            Err(ClientError::Status { message, .. }) => Err(VerifyError::Failed(message)),
            Err(other) => Err(VerifyError::Failed(other.to_string())),
        }
    }
}

impl SampleCodeUpdater for BackendClient {
    async fn update_sample_code(
        &self,
        sample_id: &str,
        code: &SampleCode,
        audit_reason: &NonEmptyText,
    ) -> SampleResult<()> {
        let body = UpdateSampleCodeReq {
            sample_code: code.to_string(),
            audit_reason: audit_reason.to_string(),
        };
        Self::send_empty(
            self.request(Method::PATCH, &format!("/samples/{sample_id}"))
                .json(&body),
        )
        .await
        .map_err(Into::into)
    }
}

impl ExpectedSampleSource for BackendClient {
    async fn expected_samples(&self, receive_record_id: &str) -> SampleResult<Vec<ExpectedSample>> {
        let samples: Vec<ExpectedSample> = Self::send_json(self.request(
            Method::GET,
            &format!("/samples/receive-records/{receive_record_id}/expected-samples"),
        ))
        .await?;
        tracing::debug!(receive_record_id, count = samples.len(), "expected samples loaded");
        Ok(samples)
    }
}

impl InventoryCompleter for BackendClient {
    async fn complete_inventory(
        &self,
        receive_record_id: &str,
        report: &InventoryReport,
    ) -> SampleResult<()> {
        Self::send_empty(
            self.request(
                Method::POST,
                &format!("/samples/receive-records/{receive_record_id}/complete-inventory"),
            )
            .json(report),
        )
        .await
        .map_err(Into::into)
    }
}

impl StorageCommitter for BackendClient {
    async fn assign_storage(
        &self,
        receive_record_id: &str,
        assignments: &[BoxAssignment],
    ) -> SampleResult<()> {
        let body = AssignStorageReq {
            receive_record_id: receive_record_id.to_string(),
            assignments: assignments.to_vec(),
        };
        Self::send_empty(
            self.request(Method::POST, "/samples/storage/assign")
                .json(&body),
        )
        .await
        .map_err(Into::into)
    }
}
