//! Stability, QC and validation codes.
//!
//! These codes do not come from the rule: they are a category, a short code and a running
//! number, e.g. `QC-L-031`.

use crate::constants::{CODE_SEPARATOR, MAX_STABILITY_QC_QUANTITY, STABILITY_QC_NUMBER_WIDTH};
use crate::error::{SampleError, SampleResult};
use biobank_types::SampleCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleCategory {
    #[serde(rename = "STB")]
    Stability,
    #[serde(rename = "QC")]
    QualityControl,
    #[serde(rename = "VAL")]
    Validation,
}

impl SampleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleCategory::Stability => "STB",
            SampleCategory::QualityControl => "QC",
            SampleCategory::Validation => "VAL",
        }
    }
}

impl fmt::Display for SampleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleCategory {
    type Err = SampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "STB" => Ok(SampleCategory::Stability),
            "QC" => Ok(SampleCategory::QualityControl),
            "VAL" => Ok(SampleCategory::Validation),
            other => Err(SampleError::InvalidInput(format!(
                "unknown sample category '{other}' (expected STB, QC or VAL)"
            ))),
        }
    }
}

/// Body of `POST /projects/{id}/generate-stability-qc-codes`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityQcRequest {
    pub sample_category: SampleCategory,
    pub code: String,
    pub quantity: u32,
    #[serde(default = "default_start_number")]
    pub start_number: u32,
}

fn default_start_number() -> u32 {
    1
}

/// Generate `quantity` consecutive codes starting at `start_number`.
///
/// # Errors
///
/// - [`SampleError::InvalidInput`] for a blank code, a zero quantity, or a number range that
///   overflows,
/// - [`SampleError::TooManyCodes`] above [`MAX_STABILITY_QC_QUANTITY`],
/// - [`SampleError::Text`] if the result is not a valid sample code.
pub fn generate_stability_qc(request: &StabilityQcRequest) -> SampleResult<Vec<String>> {
    let code = request.code.trim();
    if code.is_empty() {
        return Err(SampleError::InvalidInput("code is required".into()));
    }
    if request.quantity == 0 {
        return Err(SampleError::InvalidInput("quantity must be at least 1".into()));
    }
    if request.quantity > MAX_STABILITY_QC_QUANTITY {
        return Err(SampleError::TooManyCodes {
            count: request.quantity as usize,
            max: MAX_STABILITY_QC_QUANTITY as usize,
        });
    }
    request
        .start_number
        .checked_add(request.quantity - 1)
        .ok_or_else(|| SampleError::InvalidInput("start_number is too large".into()))?;

    let prefix = format!("{}{CODE_SEPARATOR}{code}{CODE_SEPARATOR}", request.sample_category);
    let codes = (0..request.quantity)
        .map(|offset| {
            let number = request.start_number + offset;
            let rendered = format!("{prefix}{number:0width$}", width = STABILITY_QC_NUMBER_WIDTH);
            SampleCode::parse(&rendered)
                .map(SampleCode::into_inner)
                .map_err(SampleError::from)
        })
        .collect::<SampleResult<Vec<_>>>()?;

    tracing::info!(
        category = %request.sample_category,
        count = codes.len(),
        "stability/QC codes generated"
    );
    Ok(codes)
}
