//! File-backed project store.
//!
//! Each project lives in a sharded directory:
//!
//! ```text
//! <data_dir>/projects/<s1>/<s2>/<id>/
//!     project.yaml            name and project codes
//!     sample_code_rule.yaml   slot assignment and dictionaries
//!     audit.log               one JSON object per rule save
//! ```

use super::helpers::{create_unique_project_dir, parse_yaml, sharded_leaf_dirs};
use crate::config::CoreConfig;
use crate::constants::{AUDIT_LOG_FILENAME, PROJECT_FILENAME, RULE_FILENAME};
use crate::rule::{CodeRule, ElementKind, ProjectCodes};
use crate::{SampleError, SampleResult};
use biobank_ids::ProjectId;
use biobank_types::NonEmptyText;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// A project and its constants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub codes: ProjectCodes,
    pub created_at: DateTime<Utc>,
}

/// One line of `audit.log`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub audit_reason: String,
    pub slots: Vec<ElementKind>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectFile {
    id: String,
    name: String,
    #[serde(default)]
    sponsor_project_code: Option<String>,
    #[serde(default)]
    lab_project_code: Option<String>,
    created_at: DateTime<Utc>,
}

impl ProjectFile {
    fn from_project(project: &Project) -> Self {
        Self {
            id: project.id.to_string(),
            name: project.name.clone(),
            sponsor_project_code: project.codes.sponsor_project_code.clone(),
            lab_project_code: project.codes.lab_project_code.clone(),
            created_at: project.created_at,
        }
    }

    fn into_project(self) -> SampleResult<Project> {
        Ok(Project {
            id: ProjectId::parse(&self.id)?,
            name: self.name,
            codes: ProjectCodes {
                sponsor_project_code: self.sponsor_project_code,
                lab_project_code: self.lab_project_code,
            },
            created_at: self.created_at,
        })
    }
}

/// Service for creating, listing and configuring projects.
#[derive(Clone, Debug)]
pub struct ProjectService {
    cfg: Arc<CoreConfig>,
}

impl ProjectService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    fn project_dir(&self, id: &ProjectId) -> PathBuf {
        id.sharded_dir(&self.cfg.projects_dir())
    }

    fn existing_project_dir(&self, id: &ProjectId) -> SampleResult<PathBuf> {
        let dir = self.project_dir(id);
        if !dir.join(PROJECT_FILENAME).is_file() {
            return Err(SampleError::ProjectNotFound(id.to_string()));
        }
        Ok(dir)
    }

    /// Creates a new project in a freshly allocated directory.
    ///
    /// # Errors
    ///
    /// Returns `SampleError` if:
    /// - `name` is blank ([`SampleError::Text`]),
    /// - the project directory cannot be allocated,
    /// - `project.yaml` cannot be serialised or written. The directory is removed again in that
    ///   case.
    pub fn create(&self, name: &str, codes: ProjectCodes) -> SampleResult<Project> {
        let name = NonEmptyText::new(name)?;
        let (id, dir) = create_unique_project_dir(&self.cfg.projects_dir(), ProjectId::new)?;

        let project = Project {
            id,
            name: name.into_inner(),
            codes,
            created_at: Utc::now(),
        };

        let written = serde_yaml::to_string(&ProjectFile::from_project(&project))
            .map_err(SampleError::YamlSerialization)
            .and_then(|yaml| {
                fs::write(dir.join(PROJECT_FILENAME), yaml).map_err(SampleError::FileWrite)
            });
        if let Err(err) = written {
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                tracing::error!(dir = %dir.display(), error = %cleanup, "failed to clean up project directory");
            }
            return Err(err);
        }

        tracing::info!(project_id = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    /// # Errors
    ///
    /// Returns [`SampleError::ProjectNotFound`] if the project does not exist, or a read/parse
    /// error for a damaged `project.yaml`.
    pub fn load(&self, id: &ProjectId) -> SampleResult<Project> {
        let dir = self.existing_project_dir(id)?;
        let contents =
            fs::read_to_string(dir.join(PROJECT_FILENAME)).map_err(SampleError::FileRead)?;
        parse_yaml::<ProjectFile>(&contents)?.into_project()
    }

    /// Every readable project, ordered by creation time. Damaged records are skipped.
    pub fn list(&self) -> Vec<Project> {
        let mut projects: Vec<Project> = sharded_leaf_dirs(&self.cfg.projects_dir())
            .into_iter()
            .filter_map(|dir| {
                let path = dir.join(PROJECT_FILENAME);
                let contents = fs::read_to_string(&path).ok()?;
                match parse_yaml::<ProjectFile>(&contents).and_then(ProjectFile::into_project) {
                    Ok(project) => Some(project),
                    Err(e) => {
                        tracing::warn!("failed to parse project.yaml: {} - {}", path.display(), e);
                        None
                    }
                }
            })
            .collect();

        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        projects
    }

    /// Stores the sample code rule and appends an audit entry.
    ///
    /// The new rule is staged next to the live one and only replaces it once the audit entry is
    /// written, so a failed append leaves the previous rule in force.
    ///
    /// # Errors
    ///
    /// Returns `SampleError` if:
    /// - `audit_reason` is blank ([`SampleError::MissingAuditReason`]),
    /// - the project does not exist,
    /// - the rule dictionaries are invalid,
    /// - the rule or audit log cannot be written.
    pub fn save_rule(&self, id: &ProjectId, rule: &CodeRule, audit_reason: &str) -> SampleResult<()> {
        let audit_reason =
            NonEmptyText::new(audit_reason).map_err(|_| SampleError::MissingAuditReason)?;
        let dir = self.existing_project_dir(id)?;
        rule.validate()?;

        let yaml = serde_yaml::to_string(rule).map_err(SampleError::YamlSerialization)?;
        let staged = dir.join(format!("{RULE_FILENAME}.tmp"));
        fs::write(&staged, yaml).map_err(SampleError::FileWrite)?;

        let entry = AuditEntry {
            timestamp: Utc::now(),
            action: "save_code_rule".into(),
            audit_reason: audit_reason.into_inner(),
            slots: rule.ordered_slots(),
        };
        let appended = serde_json::to_string(&entry)
            .map_err(SampleError::Serialization)
            .and_then(|mut line| {
                line.push('\n');
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(dir.join(AUDIT_LOG_FILENAME))
                    .and_then(|mut file| file.write_all(line.as_bytes()))
                    .map_err(SampleError::FileWrite)
            });
        if let Err(e) = appended {
            tracing::error!(project_id = %id, error = %e, "audit append failed; rule not saved");
            let _ = fs::remove_file(&staged);
            return Err(e);
        }

        fs::rename(&staged, dir.join(RULE_FILENAME)).map_err(SampleError::FileWrite)?;

        tracing::info!(project_id = %id, slots = entry.slots.len(), "sample code rule saved");
        Ok(())
    }

    /// The stored rule, or an unconfigured rule if none was saved yet.
    pub fn load_rule(&self, id: &ProjectId) -> SampleResult<CodeRule> {
        let dir = self.existing_project_dir(id)?;
        match fs::read_to_string(dir.join(RULE_FILENAME)) {
            Ok(contents) => parse_yaml(&contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(CodeRule::new()),
            Err(e) => Err(SampleError::FileRead(e)),
        }
    }

    /// Rule save history, oldest first.
    pub fn audit_log(&self, id: &ProjectId) -> SampleResult<Vec<AuditEntry>> {
        let dir = self.existing_project_dir(id)?;
        let contents = match fs::read_to_string(dir.join(AUDIT_LOG_FILENAME)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SampleError::FileRead(e)),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(SampleError::Serialization))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Dictionaries;
    use std::path::Path;
    use tempfile::TempDir;

    fn service(data_dir: &Path) -> ProjectService {
        let cfg = CoreConfig::new(data_dir.to_path_buf(), 100).unwrap();
        ProjectService::new(Arc::new(cfg))
    }

    fn sample_rule() -> CodeRule {
        CodeRule::from_slots(&[
            Some(ElementKind::SponsorCode),
            Some(ElementKind::ClinicCode),
            Some(ElementKind::SubjectId),
        ])
        .unwrap()
        .with_dictionaries(Dictionaries {
            clinic_codes: vec!["01".into(), "02".into()],
            ..Default::default()
        })
    }

    #[test]
    fn create_writes_project_file_in_sharded_dir() {
        let temp = TempDir::new().unwrap();
        let svc = service(temp.path());

        let project = svc
            .create("Oncology 2024", ProjectCodes::new("SP2024", None))
            .unwrap();

        let dir = project.id.sharded_dir(&temp.path().join("projects"));
        assert!(dir.join(PROJECT_FILENAME).is_file());
        assert_eq!(svc.load(&project.id).unwrap(), project);
    }

    #[test]
    fn create_rejects_blank_name() {
        let temp = TempDir::new().unwrap();
        let svc = service(temp.path());
        assert!(matches!(
            svc.create("  ", ProjectCodes::default()),
            Err(SampleError::Text(_))
        ));
        assert!(svc.list().is_empty());
    }

    #[test]
    fn list_returns_projects_and_skips_damaged_records() {
        let temp = TempDir::new().unwrap();
        let svc = service(temp.path());
        let first = svc.create("First", ProjectCodes::default()).unwrap();
        let second = svc.create("Second", ProjectCodes::default()).unwrap();

        let damaged = ProjectId::new().sharded_dir(&temp.path().join("projects"));
        fs::create_dir_all(&damaged).unwrap();
        fs::write(damaged.join(PROJECT_FILENAME), "name: [unclosed").unwrap();

        let ids: Vec<ProjectId> = svc.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id));
        assert!(ids.contains(&second.id));
    }

    #[test]
    fn unknown_project_is_not_found() {
        let temp = TempDir::new().unwrap();
        let svc = service(temp.path());
        assert!(matches!(
            svc.load(&ProjectId::new()),
            Err(SampleError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn rule_round_trips_through_disk_with_audit_entry() {
        let temp = TempDir::new().unwrap();
        let svc = service(temp.path());
        let project = svc.create("P", ProjectCodes::new("SP2024", None)).unwrap();

        assert!(!svc.load_rule(&project.id).unwrap().is_configured());

        let rule = sample_rule();
        svc.save_rule(&project.id, &rule, "initial setup").unwrap();

        assert_eq!(svc.load_rule(&project.id).unwrap(), rule);
        let log = svc.audit_log(&project.id).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].audit_reason, "initial setup");
        assert_eq!(
            log[0].slots,
            vec![ElementKind::SponsorCode, ElementKind::ClinicCode, ElementKind::SubjectId]
        );
    }

    #[test]
    fn save_rule_requires_audit_reason() {
        let temp = TempDir::new().unwrap();
        let svc = service(temp.path());
        let project = svc.create("P", ProjectCodes::default()).unwrap();

        assert!(matches!(
            svc.save_rule(&project.id, &sample_rule(), " "),
            Err(SampleError::MissingAuditReason)
        ));
        assert!(svc.audit_log(&project.id).unwrap().is_empty());
    }

    #[test]
    fn damaged_rule_file_reports_field_path() {
        let temp = TempDir::new().unwrap();
        let svc = service(temp.path());
        let project = svc.create("P", ProjectCodes::default()).unwrap();
        let dir = project.id.sharded_dir(&temp.path().join("projects"));
        fs::write(
            dir.join(RULE_FILENAME),
            "slots: [sponsor_code]\ndictionaries:\n  clinic_codes: 12\n",
        )
        .unwrap();

        let err = svc.load_rule(&project.id).unwrap_err();
        assert!(matches!(err, SampleError::YamlDeserialization(_)));
        assert!(err.to_string().contains("clinic_codes"), "{err}");
    }

    #[test]
    fn failed_audit_append_keeps_previous_rule() {
        let temp = TempDir::new().unwrap();
        let svc = service(temp.path());
        let project = svc.create("P", ProjectCodes::new("SP2024", None)).unwrap();
        let previous = sample_rule();
        svc.save_rule(&project.id, &previous, "initial setup").unwrap();

        let dir = project.id.sharded_dir(&temp.path().join("projects"));
        fs::remove_file(dir.join(AUDIT_LOG_FILENAME)).unwrap();
        fs::create_dir(dir.join(AUDIT_LOG_FILENAME)).unwrap();

        let replacement = CodeRule::from_slots(&[Some(ElementKind::SponsorCode)]).unwrap();
        let err = svc
            .save_rule(&project.id, &replacement, "drop clinic")
            .unwrap_err();
        assert!(matches!(err, SampleError::FileWrite(_)));

        assert_eq!(svc.load_rule(&project.id).unwrap(), previous);
        assert!(!dir.join(format!("{RULE_FILENAME}.tmp")).exists());
    }
}
