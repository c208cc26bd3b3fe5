//! # Biobank Core
//!
//! Core logic for biobank sample code generation and reconciliation.
//!
//! This crate contains pure data operations and file management:
//! - Sample code rules (ordered slots plus value dictionaries)
//! - Cartesian-product code generation and stability/QC codes
//! - Signed code edits
//! - Scan reconciliation with box capacity, the scanner input adapter and storage assignment
//! - Project and rule storage under `BIOBANK_DATA_DIR`
//!
//! **No API concerns**: HTTP servers and clients belong in `api-rest` and `biobank-client`.
//! Backend calls the core depends on are traits in [`collaborators`].

pub mod cancel;
pub mod collaborators;
pub mod config;
pub mod constants;
pub mod edit;
pub mod error;
pub mod generator;
pub mod input;
pub mod repositories;
pub mod rule;
pub mod scan;
pub mod stability;
pub mod storage;

pub use biobank_ids::{CodeId, CodeIdGenerator, ProjectId};
pub use biobank_types::{NonEmptyText, SampleCode, TextError};
pub use cancel::CancellationToken;
pub use config::CoreConfig;
pub use error::{ErrorClass, SampleError, SampleResult};
pub use generator::{CodeGenerator, GeneratedCode, GenerationRequest};
pub use repositories::projects::{Project, ProjectService};
pub use rule::{CodeRule, Dictionaries, ElementKind, ProjectCodes};
pub use scan::{ScanPolicy, ScanSession};
pub use storage::StoragePlan;
