//! Feature commands: list, show, invoke, delete.

use crate::runtime::Runtime;
use anyhow::{Context, Result};
use featurelite_registry::Feature;
use serde_json::Value;

fn capabilities_line(feature: &Feature) -> String {
    feature
        .capabilities
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `featurelite list`
pub fn list(runtime: &Runtime, json_output: bool) -> Result<String> {
    let features = runtime.registry.list();
    let issues = runtime.registry.load_issues();
    if json_output {
        return Ok(serde_json::to_string_pretty(&serde_json::json!({
            "features": features,
            "loadIssues": issues,
        }))?);
    }

    let mut output = String::new();
    if features.is_empty() {
        output.push_str("No features registered.\n");
    } else {
        output.push_str(&format!("📦 {} feature(s)\n\n", features.len()));
        for feature in &features {
            output.push_str(&format!(
                "  {} {} ({}, {})\n     ├─ {}\n     └─ [{}]\n",
                if feature.active { "●" } else { "○" },
                feature.id,
                feature.category,
                feature.complexity,
                feature.display_name,
                capabilities_line(feature)
            ));
        }
    }
    for issue in &issues {
        output.push_str(&format!("\n⚠ skipped {}: {}", issue.path.display(), issue.reason));
    }
    Ok(output.trim_end().to_string())
}

/// `featurelite show <ID>`
pub fn show(runtime: &Runtime, id: &str) -> Result<String> {
    let feature = runtime
        .registry
        .get(id)
        .with_context(|| format!("Feature '{}' not found", id))?;
    Ok(serde_json::to_string_pretty(&feature)?)
}

/// `featurelite invoke <ID> [INPUT_JSON]`
pub fn invoke(runtime: &Runtime, id: &str, input_json: &str) -> Result<String> {
    let input: Value = serde_json::from_str(input_json).context("Input is not valid JSON")?;
    let result = runtime
        .registry
        .invoke(id, &input)
        .map_err(|e| anyhow::anyhow!("[{}] {}", e.kind(), e))?;
    Ok(serde_json::to_string_pretty(&result)?)
}

/// `featurelite delete <ID>`
pub fn delete(runtime: &Runtime, id: &str) -> Result<String> {
    runtime
        .registry
        .delete(id)
        .map_err(|e| anyhow::anyhow!("[{}] {}", e.kind(), e))?;
    Ok(format!("✅ Deleted feature '{}'", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Settings;
    use featurelite_core::plan::{Category, Complexity, Plan};
    use featurelite_registry::Outcome;

    fn runtime_with_doubler(root: &std::path::Path) -> Runtime {
        let runtime = Runtime::open(&Settings::rooted_at(root)).unwrap();
        let plan = Plan::new("Number doubler", "Doubles a number", Category::Utility, Complexity::Low)
            .with_id("doubler");
        let Outcome::Accepted(accepted) = runtime
            .pipeline
            .evaluate(&plan, "fn execute(input) { #{ doubled: input.value * 2 } }")
        else {
            panic!("doubler should be accepted");
        };
        runtime.registry.register(accepted).unwrap();
        runtime
    }

    #[test]
    fn test_list_and_show() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = runtime_with_doubler(tmp.path());
        assert!(list(&runtime, false).unwrap().contains("doubler (utility, low)"));
        assert!(show(&runtime, "doubler").unwrap().contains("\"displayName\": \"Number doubler\""));
        assert!(show(&runtime, "missing").is_err());
    }

    #[test]
    fn test_invoke_and_delete_across_restart() {
        let tmp = tempfile::tempdir().unwrap();
        drop(runtime_with_doubler(tmp.path()));

        let runtime = Runtime::open(&Settings::rooted_at(tmp.path())).unwrap();
        let output = invoke(&runtime, "doubler", r#"{"value": 5}"#).unwrap();
        assert!(output.contains("\"doubled\": 10"));

        delete(&runtime, "doubler").unwrap();
        let err = invoke(&runtime, "doubler", "{}").unwrap_err().to_string();
        assert!(err.starts_with("[NotFound]"));
    }
}
