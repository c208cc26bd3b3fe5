/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing API key")]
    Missing,
    #[error("invalid API key")]
    Invalid,
}

/// Expected API key, resolved once at startup. `None` disables the check.
#[derive(Clone, Debug, Default)]
pub struct ApiKey(Option<String>);

impl ApiKey {
    /// Blank values disable the check.
    pub fn new(expected: Option<String>) -> Self {
        Self(expected.filter(|k| !k.trim().is_empty()))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    /// Validates the provided API key against the expected one.
    pub fn validate(&self, provided: Option<&str>) -> Result<(), AuthError> {
        let Some(expected) = &self.0 else {
            return Ok(());
        };
        match provided {
            None => Err(AuthError::Missing),
            Some(key) if key == expected => Ok(()),
            Some(_) => Err(AuthError::Invalid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_key_accepts_anything() {
        let key = ApiKey::new(Some("  ".into()));
        assert!(!key.is_enabled());
        assert!(key.validate(None).is_ok());
    }

    #[test]
    fn enabled_key_checks_value() {
        let key = ApiKey::new(Some("s3cret".into()));
        assert_eq!(key.validate(None), Err(AuthError::Missing));
        assert_eq!(key.validate(Some("nope")), Err(AuthError::Invalid));
        assert!(key.validate(Some("s3cret")).is_ok());
    }
}
