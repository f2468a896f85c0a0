//! # Plan Types
//!
//! The planner's output: tasks, each a list of files with a role that
//! decides generation order.

use schemars::JsonSchema;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// What a planned file is for
///
/// Ordering priority: data, logic, style, view, entry point. Anything the
/// planner invents that is not recognized becomes `General` and sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileRole {
    Data,
    Logic,
    Style,
    View,
    EntryPoint,
    #[default]
    General,
}

impl FileRole {
    /// Generation priority; lower goes first
    pub fn priority(&self) -> u8 {
        match self {
            FileRole::Data => 0,
            FileRole::Logic => 1,
            FileRole::Style => 2,
            FileRole::View => 3,
            FileRole::EntryPoint => 4,
            FileRole::General => 99,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::Data => "data",
            FileRole::Logic => "logic",
            FileRole::Style => "style",
            FileRole::View => "view",
            FileRole::EntryPoint => "entry_point",
            FileRole::General => "general",
        }
    }
}

impl From<String> for FileRole {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "data" => FileRole::Data,
            "logic" | "functionality" => FileRole::Logic,
            "style" | "styling" => FileRole::Style,
            "view" | "detail_view" => FileRole::View,
            "entry_point" | "entrypoint" => FileRole::EntryPoint,
            _ => FileRole::General,
        }
    }
}

impl From<FileRole> for String {
    fn from(role: FileRole) -> Self {
        role.as_str().to_string()
    }
}

impl std::fmt::Display for FileRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Lenient field decoding
// ============================================================================

// Planner output is model-written: null means "use the default" and
// scalars of the wrong type are kept as their text.

fn scalar_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

fn lenient_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        other => vec![other],
    };
    Ok(items
        .into_iter()
        .map(scalar_text)
        .filter(|s| !s.trim().is_empty())
        .collect())
}

fn lenient_role<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FileRole, D::Error> {
    Ok(FileRole::from(scalar_text(Value::deserialize(deserializer)?)))
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        other => serde_json::from_value(other).map_err(D::Error::custom),
    }
}

/// One artifact to generate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileSpec {
    /// Relative path, e.g. "js/main.js"
    #[serde(default, deserialize_with = "lenient_string")]
    pub path: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    /// data, logic, style, view or entry_point
    #[serde(default, deserialize_with = "lenient_role")]
    #[schemars(with = "String")]
    pub role: FileRole,
}

impl FileSpec {
    pub fn new(path: &str, description: &str, role: FileRole) -> Self {
        Self {
            path: path.to_string(),
            description: description.to_string(),
            role,
        }
    }
}

fn unknown_task() -> String {
    "Unknown task".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskSpec {
    #[serde(default = "unknown_task", deserialize_with = "lenient_string")]
    pub task: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub files: Vec<FileSpec>,
}

fn unknown_time() -> String {
    "Unknown".to_string()
}

fn medium_priority() -> String {
    "medium".to_string()
}

/// Structured breakdown of a request into tasks and files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    #[serde(default, deserialize_with = "lenient_list")]
    pub task_list: Vec<TaskSpec>,
    #[serde(default = "unknown_time", deserialize_with = "lenient_string")]
    pub estimated_time: String,
    /// high, medium or low
    #[serde(default = "medium_priority", deserialize_with = "lenient_string")]
    pub priority: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub dependencies: Vec<String>,
}

impl Plan {
    /// Drop path-less files and fill fields that decoded empty
    pub fn normalize(mut self) -> Self {
        for task in &mut self.task_list {
            task.files.retain(|f| !f.path.trim().is_empty());
            if task.task.trim().is_empty() {
                task.task = unknown_task();
            }
        }
        if self.estimated_time.trim().is_empty() {
            self.estimated_time = unknown_time();
        }
        if self.priority.trim().is_empty() {
            self.priority = medium_priority();
        }
        self
    }

    pub fn file_count(&self) -> usize {
        self.task_list.iter().map(|t| t.files.len()).sum()
    }

    /// Every planned file across all tasks
    pub fn files(&self) -> impl Iterator<Item = &FileSpec> {
        self.task_list.iter().flat_map(|t| t.files.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_aliases() {
        assert_eq!(FileRole::from("styling".to_string()), FileRole::Style);
        assert_eq!(FileRole::from("Functionality".to_string()), FileRole::Logic);
        assert_eq!(FileRole::from("detail_view".to_string()), FileRole::View);
        assert_eq!(FileRole::from("entry-point".to_string()), FileRole::EntryPoint);
        assert_eq!(FileRole::from("detail_functionality".to_string()), FileRole::General);
    }

    #[test]
    fn test_plan_defaults_filled() {
        let plan: Plan = serde_json::from_str(
            r#"{"task_list": [{"files": [{"path": "main.py"}, {"description": "no path"}]}]}"#,
        )
        .unwrap();
        let plan = plan.normalize();

        assert_eq!(plan.estimated_time, "Unknown");
        assert_eq!(plan.priority, "medium");
        assert!(plan.dependencies.is_empty());
        assert_eq!(plan.task_list[0].task, "Unknown task");
        assert_eq!(plan.file_count(), 1);
        assert_eq!(plan.task_list[0].files[0].role, FileRole::General);
    }

    #[test]
    fn test_numeric_estimated_time_is_kept_as_text() {
        let plan: Plan = serde_json::from_str(
            r#"{"task_list": [{"task": "t", "files": [{"path": "main.py"}]}], "estimated_time": 2}"#,
        )
        .unwrap();
        assert_eq!(plan.normalize().estimated_time, "2");
    }

    #[test]
    fn test_null_fields_fall_back_to_defaults() {
        let plan: Plan = serde_json::from_str(
            r#"{"task_list": [{"task": null, "files": [
                   {"path": "app.py", "description": null, "role": null}
               ]}],
               "priority": null, "estimated_time": null, "dependencies": null}"#,
        )
        .unwrap();
        let plan = plan.normalize();

        let file = &plan.task_list[0].files[0];
        assert_eq!(file.description, "");
        assert_eq!(file.role, FileRole::General);
        assert_eq!(plan.task_list[0].task, "Unknown task");
        assert_eq!(plan.priority, "medium");
        assert_eq!(plan.estimated_time, "Unknown");
        assert!(plan.dependencies.is_empty());
    }

    #[test]
    fn test_mixed_dependencies_become_strings() {
        let plan: Plan = serde_json::from_str(
            r#"{"task_list": [], "dependencies": ["flask", 3, null], "priority": 1}"#,
        )
        .unwrap();
        assert_eq!(plan.dependencies, vec!["flask".to_string(), "3".to_string()]);
        assert_eq!(plan.priority, "1");

        let single: Plan = serde_json::from_str(r#"{"dependencies": "requests"}"#).unwrap();
        assert_eq!(single.dependencies, vec!["requests".to_string()]);
    }

    #[test]
    fn test_null_file_list_is_empty() {
        let plan: Plan =
            serde_json::from_str(r#"{"task_list": [{"task": "t", "files": null}]}"#).unwrap();
        assert_eq!(plan.file_count(), 0);
    }

    #[test]
    fn test_role_serializes_as_string() {
        let spec = FileSpec::new("index.html", "home", FileRole::EntryPoint);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["role"], "entry_point");
    }
}
