//! Plan: declared intent for a feature before any code exists.

mod validator;

pub use validator::{PlanPolicy, PlanValidator, DEFAULT_DENIED_TERMS};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Api,
    Utility,
    Ui,
    Integration,
    Data,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Api => "api",
            Category::Utility => "utility",
            Category::Ui => "ui",
            Category::Integration => "integration",
            Category::Data => "data",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredFile {
    pub path: String,
    #[serde(default)]
    pub purpose: String,
}

/// Declarative intent. Every field defaults so that an incomplete plan still
/// deserializes and is rejected by the schema check with a named field,
/// rather than failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default = "new_plan_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub complexity: Option<Complexity>,
    #[serde(default)]
    pub estimated_size: Option<u64>,
    #[serde(default)]
    pub declared_dependencies: BTreeSet<String>,
    #[serde(default)]
    pub declared_files: Vec<DeclaredFile>,
    #[serde(default)]
    pub declared_safety_notes: Option<String>,
}

fn new_plan_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Maximum length of a plan / feature id.
pub const MAX_ID_LEN: usize = 64;

/// Ids double as artifact file stems: ASCII alphanumerics, `-` and `_`,
/// starting with an alphanumeric.
pub fn is_valid_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    id.len() <= MAX_ID_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl Plan {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: Category,
        complexity: Complexity,
    ) -> Self {
        Self {
            id: new_plan_id(),
            title: title.into(),
            description: description.into(),
            category: Some(category),
            complexity: Some(complexity),
            estimated_size: None,
            declared_dependencies: BTreeSet::new(),
            declared_files: Vec::new(),
            declared_safety_notes: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.declared_dependencies.insert(name.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, purpose: impl Into<String>) -> Self {
        self.declared_files.push(DeclaredFile {
            path: path.into(),
            purpose: purpose.into(),
        });
        self
    }

    /// Parse a plan from JSON text (the generator's output).
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).map_err(|e| anyhow::anyhow!("Plan is not valid JSON: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_partial_json_defaults() {
        let plan = Plan::from_json(r#"{"title": "Doubler"}"#).unwrap();
        assert_eq!(plan.title, "Doubler");
        assert!(plan.category.is_none());
        assert!(!plan.id.is_empty());
    }

    #[test]
    fn test_plan_camel_case_fields() {
        let plan = Plan::from_json(
            r#"{"title":"T","description":"d","category":"api","complexity":"low",
                "declaredDependencies":["json"],"declaredFiles":[{"path":"a.rhai","purpose":"main"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.category, Some(Category::Api));
        assert!(plan.declared_dependencies.contains("json"));
        assert_eq!(plan.declared_files[0].path, "a.rhai");
    }

    #[test]
    fn test_id_validation() {
        assert!(is_valid_id(&new_plan_id()));
        assert!(is_valid_id("number-doubler_2"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("-leading"));
        assert!(!is_valid_id("../escape"));
        assert!(!is_valid_id("has space"));
        assert!(!is_valid_id(&"a".repeat(MAX_ID_LEN + 1)));
    }

    #[test]
    fn test_unknown_category_is_parse_error() {
        assert!(Plan::from_json(r#"{"title":"T","category":"weapon"}"#).is_err());
    }
}
