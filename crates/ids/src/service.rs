//! Internal implementation of the identifier types.

use crate::{IdError, IdResult};
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};

pub use ::uuid::Uuid;

/// Canonical project identifier (32 lowercase hex characters, no hyphens).
///
/// Once constructed, the contained UUID is guaranteed to be in canonical form, so paths derived
/// from it are stable across the system.
///
/// # Construction
/// - [`ProjectId::new`] generates a fresh identifier for a new project.
/// - [`ProjectId::parse`] validates an externally supplied identifier.
///
/// # Display format
/// Always the canonical 32-character lowercase hex form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(Uuid);

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectId {
    /// Generates a new random (v4) project identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Validates and parses an identifier that must already be canonical.
    ///
    /// This does **not** normalise other UUID forms (hyphenated or uppercase).
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidInput`] if `input` is not in canonical form.
    pub fn parse(input: &str) -> IdResult<Self> {
        if !Self::is_canonical(input) {
            return Err(IdError::InvalidInput(format!(
                "project id must be 32 lowercase hex characters without hyphens, got: '{}'",
                input
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| IdError::InvalidInput(format!("invalid project id '{}': {}", input, e)))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true if `input` is exactly 32 characters of `0-9a-f`.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Returns `parent_dir/<s1>/<s2>/<id>/` where `s1`/`s2` are the first two hex pairs.
    pub fn sharded_dir(&self, parent_dir: &Path) -> PathBuf {
        let canonical = self.0.simple().to_string();
        let s1 = &canonical[0..2];
        let s2 = &canonical[2..4];
        parent_dir.join(s1).join(s2).join(&canonical)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ProjectId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectId::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ProjectId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ProjectId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ProjectId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Synthetic identifier of one generated code row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CodeId(u64);

impl CodeId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CodeId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(CodeId)
            .map_err(|_| IdError::InvalidInput(format!("invalid code id: '{}'", s)))
    }
}

/// Hands out strictly increasing [`CodeId`]s.
///
/// A generator can be resumed after the highest id already issued, so ids stay unique when a
/// second generation run is appended to an existing preview.
#[derive(Clone, Debug, Default)]
pub struct CodeIdGenerator {
    next: u64,
}

impl CodeIdGenerator {
    /// Starts at id 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Resumes strictly after `last`.
    pub fn after(last: CodeId) -> Self {
        Self {
            next: last.0.saturating_add(1),
        }
    }

    /// Returns the next id.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidInput`] once the id space is exhausted.
    pub fn next_id(&mut self) -> IdResult<CodeId> {
        if self.next == 0 {
            // Default-constructed generators start at 1 as well.
            self.next = 1;
        }
        if self.next == u64::MAX {
            return Err(IdError::InvalidInput("code id space exhausted".into()));
        }
        let id = CodeId(self.next);
        self.next += 1;
        Ok(id)
    }
}
