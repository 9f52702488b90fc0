//! The `Migration` trait and the parameter schema migrations declare.

use crate::db::SqliteDatabase;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Url,
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Url => "url",
        };
        f.write_str(name)
    }
}

/// A validated parameter value handed to `up`/`down`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl ParameterValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Text form used for storage and enum comparison.
    pub fn to_text(&self) -> String {
        match self {
            ParameterValue::Bool(b) => b.to_string(),
            ParameterValue::Number(n) => format_number(*n),
            ParameterValue::String(s) => s.clone(),
        }
    }
}

/// Formats integral floats without a trailing `.0`.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Parameters as supplied by a caller, before validation.
pub type RawParameters = BTreeMap<String, serde_json::Value>;

/// Parameters after validation and coercion.
pub type MigrationParameters = BTreeMap<String, ParameterValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub description: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<ParameterValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ParameterRules>,
}

impl ParameterDefinition {
    pub fn new(name: &str, param_type: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: false,
            default_value: None,
            validation: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: ParameterValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.rules_mut().min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.rules_mut().max = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.rules_mut().pattern = Some(pattern.to_string());
        self
    }

    pub fn one_of(mut self, values: Vec<serde_json::Value>) -> Self {
        self.rules_mut().allowed = Some(values);
        self
    }

    fn rules_mut(&mut self) -> &mut ParameterRules {
        self.validation.get_or_insert_with(ParameterRules::default)
    }
}

/// Everything a migration body may touch: the database and its validated parameters.
pub struct MigrationContext<'a> {
    pub db: &'a SqliteDatabase,
    pub params: &'a MigrationParameters,
}

impl<'a> MigrationContext<'a> {
    pub fn new(db: &'a SqliteDatabase, params: &'a MigrationParameters) -> Self {
        Self { db, params }
    }

    pub fn param(&self, name: &str) -> Option<&ParameterValue> {
        self.params.get(name)
    }

    pub fn str_param(&self, name: &str) -> anyhow::Result<&str> {
        self.param(name)
            .and_then(ParameterValue::as_str)
            .ok_or_else(|| anyhow::anyhow!("parameter '{}' is not a string", name))
    }

    pub fn number_param(&self, name: &str) -> anyhow::Result<f64> {
        self.param(name)
            .and_then(ParameterValue::as_f64)
            .ok_or_else(|| anyhow::anyhow!("parameter '{}' is not a number", name))
    }
}

/// A versioned schema change with forward and reverse procedures.
///
/// Implementations are registered under an identifier of the form
/// `NNN_description`; `version()` must equal `NNN`.
#[async_trait]
pub trait Migration: Send + Sync {
    fn version(&self) -> i64;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ParameterDefinition> {
        Vec::new()
    }

    async fn up(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()>;

    async fn down(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()>;
}
