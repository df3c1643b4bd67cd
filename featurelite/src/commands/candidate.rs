//! Candidate commands: check-plan, scan, sandbox, submit.

use crate::runtime::{Runtime, Settings};
use anyhow::{Context, Result};
use featurelite_core::plan::Plan;
use featurelite_registry::{Outcome, Rejection};
use featurelite_sandbox::security::format_scan_result;
use serde_json::json;
use std::fs;
use std::path::Path;

fn read_code(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read script: {}", path.display()))
}

fn read_plan(text: &str) -> Result<Plan> {
    Plan::from_json(text)
}

/// `featurelite check-plan <PLAN>`
pub fn check_plan(settings: &Settings, plan_json: &str) -> Result<String> {
    let plan = read_plan(plan_json)?;
    let report = settings.plan_validator().validate(&plan);
    let output = serde_json::to_string_pretty(&report)?;
    if !report.approved {
        anyhow::bail!("{}\nPlan rejected: {}", output, report.reason);
    }
    Ok(output)
}

/// `featurelite scan <CODE>`
pub fn scan(settings: &Settings, code_path: &Path, json_output: bool) -> Result<String> {
    let code = read_code(code_path)?;
    let analyzer = settings.analyzer()?;
    let report = analyzer.analyze(&code);

    let output = if json_output {
        serde_json::to_string_pretty(&json!({
            "report": report,
            "scan": analyzer.scan(&code),
        }))?
    } else {
        format!("{}\n\n{}", format_scan_result(&analyzer.scan(&code)), report.reason)
    };
    if !report.approved {
        anyhow::bail!("{}", output);
    }
    Ok(output)
}

/// `featurelite sandbox <CODE>`
pub fn sandbox(settings: &Settings, code_path: &Path) -> Result<String> {
    let code = read_code(code_path)?;
    let report = settings.executor().run(&code);
    let output = serde_json::to_string_pretty(&report)?;
    if !report.approved {
        anyhow::bail!("{}\nSandbox rejected the candidate: {}", output, report.reason);
    }
    Ok(output)
}

fn rejection_json(rejection: &Rejection) -> serde_json::Value {
    json!({
        "accepted": false,
        "stage": rejection.stage,
        "planId": rejection.plan_id,
        "kind": rejection.kind().map(|k| k.as_str()),
        "reason": rejection.reason(),
        "history": rejection.history(),
    })
}

/// `featurelite submit --plan <PLAN> --code <CODE>`
pub fn submit(runtime: &Runtime, plan_path: &Path, code_path: &Path) -> Result<String> {
    let plan_text = fs::read_to_string(plan_path)
        .with_context(|| format!("Failed to read plan: {}", plan_path.display()))?;
    let plan = read_plan(&plan_text)?;
    let code = read_code(code_path)?;

    match runtime.pipeline.evaluate(&plan, &code) {
        Outcome::Accepted(accepted) => {
            let history = accepted.history().to_vec();
            let feature = runtime.registry.register(accepted)?;
            if !feature.active {
                tracing::warn!(feature_id = %feature.id, "Feature registered but failed its self-test");
            }
            Ok(serde_json::to_string_pretty(&json!({
                "accepted": true,
                "history": history,
                "feature": feature,
            }))?)
        }
        Outcome::Rejected(rejection) => {
            let output = serde_json::to_string_pretty(&rejection_json(&rejection))?;
            anyhow::bail!("{}\nCandidate rejected at {} stage", output, rejection.stage)
        }
    }
}
