//! Registration requests
//!
//! Raw requests arrive as untyped JSON mappings. They are validated once,
//! here, into [`RegistrationRequest`] before the workflow runs.

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Descriptive metadata stored on the registry row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricMetadata {
    pub name: String,
    pub description: Option<String>,
    pub target_table: Option<String>,
}

/// Payload copied onto every version row.
///
/// Absent fields default to zero / empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionPayload {
    pub count: i64,
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
    pub measures: Vec<String>,
    pub identifiers: Vec<String>,
    pub depends_on: Vec<String>,
    pub tables_used: Vec<String>,
}

/// A validated registration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub metadata: MetricMetadata,
    pub filename: String,
    pub payload: VersionPayload,
}

/// Wire shape of a raw request; only used for deserialization
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRequest {
    name: Option<String>,
    filename: Option<String>,
    description: Option<String>,
    target_table: Option<String>,
    count: Option<i64>,
    metrics: Option<Vec<String>>,
    dimensions: Option<Vec<String>>,
    measures: Option<Vec<String>>,
    identifiers: Option<Vec<String>>,
    depends_on: Option<Vec<String>>,
    tables_used: Option<Vec<String>>,
}

impl RegistrationRequest {
    /// Build a request with only the required fields set
    pub fn new(name: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            metadata: MetricMetadata {
                name: name.into(),
                ..Default::default()
            },
            filename: filename.into(),
            payload: VersionPayload::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn with_target_table(mut self, target_table: impl Into<String>) -> Self {
        self.metadata.target_table = Some(target_table.into());
        self
    }

    pub fn with_payload(mut self, payload: VersionPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Validate a raw request mapping
    pub fn from_value(value: Value) -> Result<Self, RegistryError> {
        if !value.is_object() {
            return Err(RegistryError::Validation(
                "request must be a JSON object".to_string(),
            ));
        }

        let raw: RawRequest = serde_json::from_value(value)
            .map_err(|e| RegistryError::Validation(e.to_string()))?;

        let request = Self {
            metadata: MetricMetadata {
                name: raw.name.unwrap_or_default(),
                description: raw.description,
                target_table: raw.target_table,
            },
            filename: raw.filename.unwrap_or_default(),
            payload: VersionPayload {
                count: raw.count.unwrap_or(0),
                metrics: raw.metrics.unwrap_or_default(),
                dimensions: raw.dimensions.unwrap_or_default(),
                measures: raw.measures.unwrap_or_default(),
                identifiers: raw.identifiers.unwrap_or_default(),
                depends_on: raw.depends_on.unwrap_or_default(),
                tables_used: raw.tables_used.unwrap_or_default(),
            },
        };
        request.validate()?;
        Ok(request)
    }

    /// Check required fields and value ranges
    pub fn validate(&self) -> Result<(), RegistryError> {
        let name = self.metadata.name.trim();
        if name.is_empty() {
            return Err(RegistryError::Validation("'name' is required".to_string()));
        }
        if name.contains('/') {
            return Err(RegistryError::Validation(format!(
                "'name' must not contain '/': {}",
                self.metadata.name
            )));
        }

        let filename = self.filename.trim();
        if filename.is_empty() {
            return Err(RegistryError::Validation(
                "'filename' is required".to_string(),
            ));
        }

        if self.payload.count < 0 {
            return Err(RegistryError::Validation(format!(
                "'count' must be non-negative, got {}",
                self.payload.count
            )));
        }

        Ok(())
    }
}
