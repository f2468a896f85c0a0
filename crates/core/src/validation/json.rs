//! JSON parse check and root shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use super::{read_source, ValidationReport};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonReport {
    #[serde(flatten)]
    pub report: ValidationReport,
    pub root_keys: Vec<String>,
    #[serde(skip)]
    pub data: Option<Value>,
}

impl JsonReport {
    /// Top-level keys whose value is an array
    pub fn array_keys(&self) -> Vec<String> {
        match &self.data {
            Some(Value::Object(map)) => map
                .iter()
                .filter(|(_, v)| v.is_array())
                .map(|(k, _)| k.clone())
                .collect(),
            _ => Vec::new(),
        }
    }
}

pub fn validate(content: &str) -> JsonReport {
    let mut report = ValidationReport::new();
    match serde_json::from_str::<Value>(content) {
        Ok(data) => {
            let root_keys = match &data {
                Value::Object(map) => map.keys().cloned().collect(),
                Value::Array(_) => {
                    report.warn("JSON root is an array, not an object");
                    Vec::new()
                }
                _ => Vec::new(),
            };
            JsonReport {
                report,
                root_keys,
                data: Some(data),
            }
        }
        Err(e) => {
            report.error(format!(
                "JSON parse error at line {} column {}: {}",
                e.line(),
                e.column(),
                e
            ));
            JsonReport {
                report,
                ..JsonReport::default()
            }
        }
    }
}

pub fn validate_file(path: &Path) -> JsonReport {
    match read_source(path) {
        Ok(content) => validate(&content),
        Err(report) => JsonReport {
            report,
            ..JsonReport::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_array_root() {
        let result = validate(r#"[{"id":1,"title":"x"}]"#);
        assert!(result.report.valid);
        assert!(result.report.errors.is_empty());
        assert_eq!(result.report.warnings, vec!["JSON root is an array, not an object"]);
    }

    #[test]
    fn test_truncated_json_reports_line() {
        let result = validate(r#"[{"id":1,"#);
        assert!(!result.report.valid);
        assert!(result.report.errors[0].starts_with("JSON parse error at line 1"));
    }

    #[test]
    fn test_root_keys_and_array_keys() {
        let result = validate(r#"{"items": [], "meta": {"count": 0}}"#);
        assert!(result.report.valid);
        assert_eq!(result.root_keys, vec!["items", "meta"]);
        assert_eq!(result.array_keys(), vec!["items"]);
    }
}
