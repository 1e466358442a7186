//! Built-in attribute validators

use crate::schema::{Block, Validator, ValidatorRequest, ValidatorResponse};
use crate::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use regex::Regex;

pub struct NumberRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumberRange {
    pub fn at_least(min: f64) -> Box<dyn Validator> {
        Box::new(Self {
            min: Some(min),
            max: None,
        })
    }

    pub fn between(min: f64, max: f64) -> Box<dyn Validator> {
        Box::new(Self {
            min: Some(min),
            max: Some(max),
        })
    }
}

impl Validator for NumberRange {
    fn description(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("value must be between {} and {}", min, max),
            (Some(min), None) => format!("value must be at least {}", min),
            (None, Some(max)) => format!("value must be at most {}", max),
            (None, None) => "any number".to_string(),
        }
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = vec![];
        if let Some(n) = request.config_value.value.as_number() {
            let below = self.min.is_some_and(|min| n < min);
            let above = self.max.is_some_and(|max| n > max);
            if below || above {
                diagnostics.push(
                    Diagnostic::error(
                        format!("Invalid value for {}", request.path),
                        format!("{}, got {}", self.description(), n),
                    )
                    .with_attribute(request.path),
                );
            }
        }
        ValidatorResponse { diagnostics }
    }
}

pub struct StringOneOf {
    pub allowed: Vec<String>,
}

impl StringOneOf {
    pub fn create(allowed: &[&str]) -> Box<dyn Validator> {
        Box::new(Self {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl Validator for StringOneOf {
    fn description(&self) -> String {
        format!("value must be one of: {}", self.allowed.join(", "))
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = vec![];
        if let Some(s) = request.config_value.value.as_str() {
            if !self.allowed.iter().any(|a| a == s) {
                diagnostics.push(
                    Diagnostic::error(
                        format!("Invalid value for {}", request.path),
                        format!("{}, got {:?}", self.description(), s),
                    )
                    .with_attribute(request.path),
                );
            }
        }
        ValidatorResponse { diagnostics }
    }
}

pub struct StringPattern {
    pattern: std::result::Result<Regex, regex::Error>,
    description: String,
}

impl StringPattern {
    /// An invalid pattern is reported as a diagnostic on every validation
    pub fn create(pattern: &str, description: &str) -> Box<dyn Validator> {
        Box::new(Self {
            pattern: Regex::new(pattern),
            description: description.to_string(),
        })
    }
}

impl Validator for StringPattern {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = vec![];
        let Some(s) = request.config_value.value.as_str() else {
            return ValidatorResponse { diagnostics };
        };

        match &self.pattern {
            Ok(pattern) if !pattern.is_match(s) => diagnostics.push(
                Diagnostic::error(
                    format!("Invalid value for {}", request.path),
                    format!("{}, got {:?}", self.description, s),
                )
                .with_attribute(request.path),
            ),
            Ok(_) => {}
            Err(e) => diagnostics.push(
                Diagnostic::error("Invalid validator pattern", e.to_string())
                    .with_attribute(request.path),
            ),
        }
        ValidatorResponse { diagnostics }
    }
}

/// Runs the validators of every attribute in `block`, including each
/// element of nested blocks. Null and unknown values are not validated.
pub fn validate_block(block: &Block, config: &Dynamic, path: &AttributePath) -> Vec<Diagnostic> {
    let mut diagnostics = vec![];
    let Some(map) = config.as_map() else {
        return diagnostics;
    };

    for attr in &block.attributes {
        let value = match map.get(&attr.name) {
            Some(v) if !v.is_null() && !v.is_unknown() => v,
            _ => continue,
        };
        for validator in &attr.validators {
            let response = validator.validate(ValidatorRequest {
                config_value: DynamicValue::new(value.clone()),
                path: path.clone().attribute(&attr.name),
            });
            diagnostics.extend(response.diagnostics);
        }
    }

    for nested in &block.block_types {
        let nested_path = path.clone().attribute(&nested.type_name);
        match map.get(&nested.type_name) {
            Some(Dynamic::List(items)) => {
                if nested.max_items > 0 && items.len() as i64 > nested.max_items {
                    diagnostics.push(
                        Diagnostic::error(
                            format!("Too many {} blocks", nested.type_name),
                            format!(
                                "at most {} block(s) allowed, got {}",
                                nested.max_items,
                                items.len()
                            ),
                        )
                        .with_attribute(nested_path.clone()),
                    );
                }
                for (idx, item) in items.iter().enumerate() {
                    diagnostics.extend(validate_block(
                        &nested.block,
                        item,
                        &nested_path.clone().index(idx as i64),
                    ));
                }
            }
            Some(item @ Dynamic::Map(_)) => {
                diagnostics.extend(validate_block(&nested.block, item, &nested_path));
            }
            _ => {}
        }
    }

    diagnostics
}
