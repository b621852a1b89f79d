//! metricregistry - a registry of versioned metric models
//!
//! This crate provides:
//! - Version allocation for `"<major>.<minor>"` model versions
//! - An atomic create-or-version registration workflow over SQLite
//! - CLI commands for registering models and inspecting their history

pub mod commands;
pub mod config;
pub mod error;
pub mod meta;
pub mod registry;
pub mod request;
pub mod version;

pub use config::Config;
pub use error::{Error, RegistryError, Result};
pub use registry::{Registry, RegistrationResult};
pub use request::RegistrationRequest;
