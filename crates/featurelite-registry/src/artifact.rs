//! Code artifacts and the persisted artifact format.
//!
//! A persisted feature is its original code followed by a metadata block
//! written as line comments, so the file stays a valid script:
//!
//! ```text
//! fn execute(input) { ... }
//! // ---- featurelite:metadata ----
//! // {"id":"...","title":"...","description":"...","category":"utility","complexity":"low","createdAt":"..."}
//! // ---- end featurelite:metadata ----
//! ```

use chrono::{DateTime, Utc};
use featurelite_core::observability::code_hash;
use featurelite_core::plan::{Category, Complexity, Plan};
use serde::{Deserialize, Serialize};

pub const METADATA_START: &str = "// ---- featurelite:metadata ----";
pub const METADATA_END: &str = "// ---- end featurelite:metadata ----";
const METADATA_LINE_PREFIX: &str = "// ";

/// Generated code text plus the plan it was written for. Never mutated; a
/// retry produces a new artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeArtifact {
    text: String,
    plan_id: String,
}

impl CodeArtifact {
    pub fn new(text: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            plan_id: plan_id.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn code_hash(&self) -> String {
        code_hash(&self.text)
    }
}

/// Persisted feature attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMetadata {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub complexity: Complexity,
    pub created_at: DateTime<Utc>,
}

impl FeatureMetadata {
    /// Metadata for a validated plan. `None` if the plan lacks category or
    /// complexity, which validation never lets through.
    pub fn from_plan(plan: &Plan, created_at: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            id: plan.id.clone(),
            title: plan.title.clone(),
            description: plan.description.clone(),
            category: plan.category?,
            complexity: plan.complexity?,
            created_at,
        })
    }
}

/// Render code + metadata block. `parse_persisted` returns the code unchanged.
pub fn render_persisted(code: &str, meta: &FeatureMetadata) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(meta)?;
    Ok(format!(
        "{}\n{}\n{}{}\n{}\n",
        code, METADATA_START, METADATA_LINE_PREFIX, json, METADATA_END
    ))
}

/// Split a persisted file into code and metadata.
pub fn parse_persisted(content: &str) -> Result<(String, FeatureMetadata), String> {
    let start_marker = format!("\n{}\n", METADATA_START);
    let start = content
        .rfind(&start_marker)
        .ok_or_else(|| "metadata block not found".to_string())?;
    let code = &content[..start];
    let block = &content[start + start_marker.len()..];

    let mut lines = block.lines();
    let json_line = lines
        .next()
        .and_then(|l| l.strip_prefix(METADATA_LINE_PREFIX))
        .ok_or_else(|| "metadata line missing".to_string())?;
    if lines.next() != Some(METADATA_END) {
        return Err("metadata block not terminated".to_string());
    }
    if lines.any(|l| !l.trim().is_empty()) {
        return Err("unexpected content after metadata block".to_string());
    }

    let meta: FeatureMetadata =
        serde_json::from_str(json_line).map_err(|e| format!("invalid metadata: {}", e))?;
    Ok((code.to_string(), meta))
}
