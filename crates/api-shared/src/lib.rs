//! # API Shared
//!
//! Shared utilities and definitions for the biobank APIs.
//!
//! Contains:
//! - Wire types of the backend contracts (`dto` module)
//! - Shared services like `HealthService`
//! - API key validation
//!
//! Used by `api-rest` (server side) and `biobank-client` (client side).

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{ApiKey, AuthError, API_KEY_HEADER};
pub use dto::*;
pub use health::HealthService;
