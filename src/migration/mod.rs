//! Versioned schema migrations for the archive database.

pub mod builtin;
pub mod catalog;
pub mod definition;
pub mod engine;
pub mod params;
pub mod rebuild;
pub mod types;
pub mod version;

pub use catalog::{parse_identifier, validate_sequence, CatalogError, MigrationRegistry};
pub use definition::{
    Migration, MigrationContext, MigrationParameters, ParameterDefinition, ParameterType,
    ParameterValue, RawParameters,
};
pub use engine::{MigrationEngine, MigrationError};
pub use params::{validate_parameters, ParameterValidation};
pub use types::{
    BatchParameterRequirements, ExecuteOptions, MigrationBatchResult, MigrationInfo,
    MigrationResult, MigrationStatus, MigrationSystemStatus, MigrationValidationReport,
    SequenceValidation, SystemState,
};
