//! Registry of known migrations, identifier parsing and sequence validation.

use super::builtin;
use super::definition::{Migration, ParameterDefinition, ParameterType, ParameterValue};
use super::params::full_match_regex;
use super::types::{MigrationInfo, MigrationStatus, SequenceValidation};
use super::version;
use crate::db::SqliteDatabase;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::warn;

static IDENTIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{3})_(.+)$").expect("identifier pattern is a valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentifier {
    pub version: i64,
    pub description: String,
}

/// Parses `NNN_some_description` into its version and a readable description.
///
/// Returns `None` when the identifier does not follow the naming convention or
/// the version is not positive.
pub fn parse_identifier(name: &str) -> Option<ParsedIdentifier> {
    let captures = IDENTIFIER_PATTERN.captures(name)?;
    let version: i64 = captures[1].parse().ok()?;
    if version <= 0 {
        return None;
    }
    Some(ParsedIdentifier {
        version,
        description: captures[2].replace('_', " "),
    })
}

/// Why a registered migration cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Invalid migration name: {0}")]
    InvalidName(String),

    #[error("Migration not registered: {0}")]
    NotRegistered(String),

    #[error("Migration {identifier} declares invalid version {version}")]
    InvalidVersion { identifier: String, version: i64 },

    #[error("Migration {0} has an empty description")]
    EmptyDescription(String),

    #[error("Version mismatch in {identifier}: file version {expected}, declared version {declared}")]
    VersionMismatch {
        identifier: String,
        expected: i64,
        declared: i64,
    },

    #[error("Migration {identifier}: parameter {index}: {reason}")]
    InvalidParameter {
        identifier: String,
        index: usize,
        reason: String,
    },
}

struct RegistryEntry {
    name: String,
    migration: Arc<dyn Migration>,
}

/// Ordered set of migrations known to this build, keyed by identifier.
#[derive(Default)]
pub struct MigrationRegistry {
    entries: Vec<RegistryEntry>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every migration shipped with the archive.
    pub fn builtin() -> Self {
        builtin::register_all(Self::new())
    }

    pub fn register(mut self, name: &str, migration: impl Migration + 'static) -> Self {
        self.entries.push(RegistryEntry {
            name: name.to_string(),
            migration: Arc::new(migration),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves `name` and checks the definition against its identifier.
    pub fn load_definition(&self, name: &str) -> Result<Arc<dyn Migration>, CatalogError> {
        let result = self.try_load(name);
        if let Err(e) = &result {
            warn!("Failed to load migration {}: {}", name, e);
        }
        result
    }

    fn try_load(&self, name: &str) -> Result<Arc<dyn Migration>, CatalogError> {
        let parsed =
            parse_identifier(name).ok_or_else(|| CatalogError::InvalidName(name.to_string()))?;

        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| CatalogError::NotRegistered(name.to_string()))?;
        let migration = Arc::clone(&entry.migration);

        let declared = migration.version();
        if declared <= 0 {
            return Err(CatalogError::InvalidVersion {
                identifier: name.to_string(),
                version: declared,
            });
        }
        if migration.description().trim().is_empty() {
            return Err(CatalogError::EmptyDescription(name.to_string()));
        }
        if declared != parsed.version {
            return Err(CatalogError::VersionMismatch {
                identifier: name.to_string(),
                expected: parsed.version,
                declared,
            });
        }

        check_parameter_definitions(&migration.parameters()).map_err(|(index, reason)| {
            CatalogError::InvalidParameter {
                identifier: name.to_string(),
                index,
                reason,
            }
        })?;

        Ok(migration)
    }

    /// Describes every registered migration relative to `current_version`, ascending.
    pub fn scan(&self, current_version: i64) -> Vec<MigrationInfo> {
        let mut infos: Vec<MigrationInfo> = self
            .entries
            .iter()
            .map(|entry| self.describe(&entry.name, current_version))
            .collect();

        infos.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.name.cmp(&b.name)));
        infos
    }

    pub async fn scan_database(&self, db: &SqliteDatabase) -> anyhow::Result<Vec<MigrationInfo>> {
        let current = version::get_current_version(db).await?;
        Ok(self.scan(current))
    }

    fn describe(&self, name: &str, current_version: i64) -> MigrationInfo {
        let Some(parsed) = parse_identifier(name) else {
            warn!("Skipping migration with invalid name: {}", name);
            return MigrationInfo {
                name: name.to_string(),
                version: 0,
                description: String::new(),
                status: MigrationStatus::Available,
                can_execute: false,
                parameters: Vec::new(),
                error: Some(CatalogError::InvalidName(name.to_string()).to_string()),
            };
        };

        match self.load_definition(name) {
            Ok(migration) => MigrationInfo {
                name: name.to_string(),
                version: parsed.version,
                description: migration.description().to_string(),
                status: MigrationStatus::relative_to(parsed.version, current_version),
                can_execute: true,
                parameters: migration.parameters(),
                error: None,
            },
            Err(e) => MigrationInfo {
                name: name.to_string(),
                version: parsed.version,
                description: parsed.description,
                status: MigrationStatus::Available,
                can_execute: false,
                parameters: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

fn check_parameter_definitions(definitions: &[ParameterDefinition]) -> Result<(), (usize, String)> {
    let mut seen = HashSet::new();
    for (index, def) in definitions.iter().enumerate() {
        if def.name.trim().is_empty() {
            return Err((index, "name must not be empty".to_string()));
        }
        if !seen.insert(def.name.as_str()) {
            return Err((index, format!("duplicate parameter name \"{}\"", def.name)));
        }
        if let Some(pattern) = def.validation.as_ref().and_then(|v| v.pattern.as_deref()) {
            if let Err(e) = full_match_regex(pattern) {
                return Err((index, format!("invalid validation pattern: {}", e)));
            }
        }
        if let Some(default) = &def.default_value {
            let matches = matches!(
                (def.param_type, default),
                (ParameterType::String | ParameterType::Url, ParameterValue::String(_))
                    | (ParameterType::Number, ParameterValue::Number(_))
                    | (ParameterType::Boolean, ParameterValue::Bool(_))
            );
            if !matches {
                return Err((
                    index,
                    format!("default value does not match type {}", def.param_type),
                ));
            }
        }
    }
    Ok(())
}

/// Checks that executable migrations form a gapless, duplicate-free sequence.
pub fn validate_sequence(infos: &[MigrationInfo]) -> SequenceValidation {
    let mut versions: Vec<i64> = infos
        .iter()
        .filter(|info| info.can_execute)
        .map(|info| info.version)
        .collect();
    versions.sort_unstable();

    let mut errors = Vec::new();
    for pair in versions.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if next == prev {
            errors.push(format!("Duplicate migration version {}", next));
        } else if next - prev != 1 {
            errors.push(format!("Migration sequence gap: missing version {}", prev + 1));
        }
    }

    SequenceValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}
