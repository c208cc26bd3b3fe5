//! Validated text primitives shared across the biobank crates.
//!
//! Values that arrive from operators, scanners or the backend are wrapped in these types at the
//! boundary so the rest of the code can rely on their shape.

/// Rejections raised while wrapping operator or backend text.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    #[error("text must contain at least one visible character")]
    Empty,

    #[error("sample code '{0}' contains whitespace or control characters")]
    InvalidCodeCharacter(String),

    /// Longer than a cryovial label can print.
    #[error("sample code exceeds {max} characters (got {len})")]
    CodeTooLong { len: usize, max: usize },
}

/// Trimmed text with at least one visible character, such as an audit or error reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// # Errors
    ///
    /// [`TextError::Empty`] when nothing is left after trimming.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        match input.as_ref().trim() {
            "" => Err(TextError::Empty),
            text => Ok(Self(text.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyText {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyText> for String {
    fn from(text: NonEmptyText) -> Self {
        text.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Longest code that still fits on a cryovial label.
pub const MAX_SAMPLE_CODE_LEN: usize = 64;

/// A sample code as printed on a label and read back by a barcode scanner.
///
/// Scanners emit the code as one token, so a valid code is non-empty, has no inner whitespace
/// or control characters, and is at most [`MAX_SAMPLE_CODE_LEN`] characters long. Surrounding
/// whitespace (for example a trailing newline from the scanner) is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleCode(String);

impl SampleCode {
    /// Validates and wraps a sample code.
    ///
    /// # Errors
    ///
    /// - [`TextError::Empty`] if nothing remains after trimming,
    /// - [`TextError::InvalidCodeCharacter`] for inner whitespace or control characters,
    /// - [`TextError::CodeTooLong`] above [`MAX_SAMPLE_CODE_LEN`].
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(TextError::InvalidCodeCharacter(trimmed.to_owned()));
        }
        let len = trimmed.chars().count();
        if len > MAX_SAMPLE_CODE_LEN {
            return Err(TextError::CodeTooLong {
                len,
                max: MAX_SAMPLE_CODE_LEN,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for SampleCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SampleCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for SampleCode {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SampleCode::parse(s)
    }
}

impl serde::Serialize for SampleCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for SampleCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SampleCode::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  damaged tube  ").unwrap();
        assert_eq!(text.as_str(), "damaged tube");
    }

    #[test]
    fn non_empty_text_rejects_whitespace_only() {
        assert_eq!(NonEmptyText::new(" \t\n"), Err(TextError::Empty));
    }

    #[test]
    fn sample_code_strips_scanner_newline() {
        let code = SampleCode::parse("SP2024-01-001\r\n").unwrap();
        assert_eq!(code.as_str(), "SP2024-01-001");
    }

    #[test]
    fn sample_code_rejects_inner_whitespace() {
        let err = SampleCode::parse("SP2024 01").unwrap_err();
        assert!(matches!(err, TextError::InvalidCodeCharacter(_)));
    }

    #[test]
    fn sample_code_rejects_overlong_labels() {
        let long = "A".repeat(MAX_SAMPLE_CODE_LEN + 1);
        let err = SampleCode::parse(&long).unwrap_err();
        assert_eq!(
            err,
            TextError::CodeTooLong {
                len: MAX_SAMPLE_CODE_LEN + 1,
                max: MAX_SAMPLE_CODE_LEN
            }
        );
    }

    #[test]
    fn sample_code_deserialize_validates() {
        let ok: SampleCode = serde_json::from_str("\"QC-L-031\"").unwrap();
        assert_eq!(ok.as_str(), "QC-L-031");

        let err = serde_json::from_str::<SampleCode>("\"\"").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
