//! Validation and coercion of caller-supplied migration parameters.

use super::definition::{
    format_number, MigrationParameters, ParameterDefinition, ParameterRules, ParameterType,
    ParameterValue, RawParameters,
};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Present only when `valid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_values: Option<MigrationParameters>,
}

/// Validates `supplied` against `definitions`, collecting every error.
pub fn validate_parameters(
    definitions: &[ParameterDefinition],
    supplied: &RawParameters,
) -> ParameterValidation {
    let mut errors = Vec::new();
    let mut processed = MigrationParameters::new();

    for def in definitions {
        let value = supplied.get(&def.name).filter(|v| !is_absent(v));

        let Some(value) = value else {
            if def.required {
                errors.push(format!("Required parameter \"{}\" is missing", def.name));
            } else if let Some(default) = &def.default_value {
                processed.insert(def.name.clone(), default.clone());
            }
            continue;
        };

        let coerced = match coerce(def, value) {
            Ok(coerced) => coerced,
            Err(message) => {
                errors.push(message);
                continue;
            }
        };

        let before = errors.len();
        if let Some(rules) = &def.validation {
            check_rules(def, rules, &coerced, &mut errors);
        }
        if errors.len() == before {
            processed.insert(def.name.clone(), coerced);
        }
    }

    let valid = errors.is_empty();
    ParameterValidation {
        valid,
        errors,
        processed_values: valid.then_some(processed),
    }
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn coerce(def: &ParameterDefinition, value: &Value) -> Result<ParameterValue, String> {
    let name = &def.name;
    match def.param_type {
        ParameterType::String => match value {
            Value::String(s) => Ok(ParameterValue::String(s.clone())),
            _ => Err(format!("Parameter \"{}\" must be a string", name)),
        },
        ParameterType::Number => {
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match number {
                Some(n) if n.is_finite() => Ok(ParameterValue::Number(n)),
                _ => Err(format!("Parameter \"{}\" must be a valid number", name)),
            }
        }
        ParameterType::Boolean => match value {
            Value::Bool(b) => Ok(ParameterValue::Bool(*b)),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(ParameterValue::Bool(true)),
                "false" | "0" => Ok(ParameterValue::Bool(false)),
                _ => Err(format!("Parameter \"{}\" must be a boolean", name)),
            },
            _ => Err(format!("Parameter \"{}\" must be a boolean", name)),
        },
        ParameterType::Url => match value {
            Value::String(s) if url::Url::parse(s).is_ok() => Ok(ParameterValue::String(s.clone())),
            _ => Err(format!("Parameter \"{}\" must be a valid URL", name)),
        },
    }
}

fn check_rules(
    def: &ParameterDefinition,
    rules: &ParameterRules,
    value: &ParameterValue,
    errors: &mut Vec<String>,
) {
    let name = &def.name;

    match (def.param_type, value) {
        (ParameterType::Number, ParameterValue::Number(n)) => {
            if let Some(min) = rules.min.filter(|min| n < min) {
                errors.push(format!(
                    "Parameter \"{}\" must be at least {}",
                    name,
                    format_number(min)
                ));
            }
            if let Some(max) = rules.max.filter(|max| n > max) {
                errors.push(format!(
                    "Parameter \"{}\" must be at most {}",
                    name,
                    format_number(max)
                ));
            }
        }
        (ParameterType::String | ParameterType::Url, ParameterValue::String(s)) => {
            let length = s.chars().count() as f64;
            if let Some(min) = rules.min.filter(|min| length < *min) {
                errors.push(format!(
                    "Parameter \"{}\" must be at least {} characters long",
                    name,
                    format_number(min)
                ));
            }
            if let Some(max) = rules.max.filter(|max| length > *max) {
                errors.push(format!(
                    "Parameter \"{}\" must be at most {} characters long",
                    name,
                    format_number(max)
                ));
            }
            if let Some(pattern) = &rules.pattern {
                match full_match_regex(pattern) {
                    Ok(re) if !re.is_match(s) => errors.push(format!(
                        "Parameter \"{}\" does not match required pattern",
                        name
                    )),
                    Ok(_) => {}
                    Err(_) => errors.push(format!(
                        "Parameter \"{}\" has an invalid validation pattern",
                        name
                    )),
                }
            }
        }
        _ => {}
    }

    if let Some(allowed) = &rules.allowed {
        let text = value.to_text();
        if !allowed.iter().any(|candidate| json_text(candidate) == text) {
            let options: Vec<String> = allowed.iter().map(json_text).collect();
            errors.push(format!(
                "Parameter \"{}\" must be one of: {}",
                name,
                options.join(", ")
            ));
        }
    }
}

/// Compiles `pattern` so that it must match the entire input.
pub(crate) fn full_match_regex(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}
