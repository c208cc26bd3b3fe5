//! File helpers shared by the repositories.

use crate::{SampleError, SampleResult};
use biobank_ids::ProjectId;
use serde::de::DeserializeOwned;
use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

/// Creates a unique sharded directory within `base_dir`.
///
/// Generates identifiers with `id_source` and retries up to 5 times if the directory already
/// exists.
///
/// # Errors
///
/// Returns [`SampleError::StorageDirCreation`] if:
/// - directory creation fails after 5 attempts,
/// - parent directory creation fails.
pub(crate) fn create_unique_project_dir(
    base_dir: &Path,
    mut id_source: impl FnMut() -> ProjectId,
) -> SampleResult<(ProjectId, PathBuf)> {
    for _attempt in 0..5 {
        let id = id_source();
        let candidate = id.sharded_dir(base_dir);

        if candidate.exists() {
            continue;
        }

        if let Some(parent) = candidate.parent() {
            fs::create_dir_all(parent).map_err(SampleError::StorageDirCreation)?;
        }

        match fs::create_dir(&candidate) {
            Ok(()) => return Ok((id, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(SampleError::StorageDirCreation(e)),
        }
    }

    Err(SampleError::StorageDirCreation(io::Error::new(
        ErrorKind::AlreadyExists,
        "failed to allocate a unique project directory after 5 attempts",
    )))
}

/// Parses YAML, reporting the path of the failing field (e.g. `dictionaries.subject_ranges[0].count`).
pub(crate) fn parse_yaml<T: DeserializeOwned>(yaml_text: &str) -> SampleResult<T> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        SampleError::YamlDeserialization(format!("{path}: {source}"))
    })
}

/// Lists the leaf directories of a `<s1>/<s2>/<id>` sharded tree. Missing trees are empty.
pub(crate) fn sharded_leaf_dirs(base_dir: &Path) -> Vec<PathBuf> {
    let mut leaves = Vec::new();
    let Ok(s1_iter) = fs::read_dir(base_dir) else {
        return leaves;
    };

    for s1 in s1_iter.flatten().filter(|e| e.path().is_dir()) {
        let Ok(s2_iter) = fs::read_dir(s1.path()) else {
            continue;
        };
        for s2 in s2_iter.flatten().filter(|e| e.path().is_dir()) {
            let Ok(id_iter) = fs::read_dir(s2.path()) else {
                continue;
            };
            leaves.extend(
                id_iter
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_dir()),
            );
        }
    }

    leaves
}
