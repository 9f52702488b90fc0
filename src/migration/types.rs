//! Wire types returned by the engine. All serialize with camelCase names.

use super::definition::{ParameterDefinition, RawParameters};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Applied,
    Current,
    Pending,
    Available,
}

impl MigrationStatus {
    /// Status of an executable migration relative to the current version.
    pub fn relative_to(version: i64, current: i64) -> Self {
        match version.cmp(&current) {
            std::cmp::Ordering::Less => MigrationStatus::Applied,
            std::cmp::Ordering::Equal => MigrationStatus::Current,
            std::cmp::Ordering::Greater => MigrationStatus::Pending,
        }
    }
}

/// Runtime view of one registered migration. Recomputed on every scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationInfo {
    pub name: String,
    pub version: i64,
    pub description: String,
    pub status: MigrationStatus,
    pub can_execute: bool,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationInfo {
    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub version: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds.
    pub duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl MigrationResult {
    pub fn ok(version: i64, duration: u64, details: impl Into<String>) -> Self {
        Self {
            version,
            success: true,
            error: None,
            duration,
            details: Some(details.into()),
        }
    }

    pub fn failed(version: i64, duration: u64, error: impl Into<String>) -> Self {
        Self {
            version,
            success: false,
            error: Some(error.into()),
            duration,
            details: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationBatchResult {
    pub success: bool,
    pub from_version: i64,
    pub to_version: i64,
    pub results: Vec<MigrationResult>,
    pub total_duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationBatchResult {
    pub fn unchanged(version: i64) -> Self {
        Self {
            success: true,
            from_version: version,
            to_version: version,
            results: Vec::new(),
            total_duration: 0,
            error: None,
        }
    }

    /// A batch refused before any migration ran.
    pub fn aborted(
        from_version: i64,
        to_version: i64,
        total_duration: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            from_version,
            to_version,
            results: Vec::new(),
            total_duration,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemState {
    UpToDate,
    PendingMigrations,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSystemStatus {
    pub current_version: i64,
    pub latest_version: i64,
    pub pending_count: usize,
    pub needs_migration: bool,
    pub migrations: Vec<MigrationInfo>,
    pub status: SystemState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Options for forward and rollback batches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecuteOptions {
    pub target_version: Option<i64>,
    pub dry_run: bool,
    pub force: bool,
    /// Caps how many migrations one call executes. `None` or 0 means no cap.
    pub batch_size: Option<usize>,
    /// Parameters keyed by migration version.
    pub parameters: BTreeMap<i64, RawParameters>,
}

impl ExecuteOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn with_target(mut self, version: i64) -> Self {
        self.target_version = Some(version);
        self
    }

    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_parameters(mut self, version: i64, parameters: RawParameters) -> Self {
        self.parameters.insert(version, parameters);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRequirement {
    pub version: i64,
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchParameterRequirements {
    pub has_unmet_requirements: bool,
    pub requirements_with_parameters: Vec<ParameterRequirement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_parameters: Option<Vec<i64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub status: MigrationSystemStatus,
}
