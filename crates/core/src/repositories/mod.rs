//! Repository management modules.
//!
//! File-backed storage for projects and their sample code rules.

mod helpers;
pub mod projects;
