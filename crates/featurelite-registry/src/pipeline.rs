//! Validation Pipeline: `Proposed → PlanChecked → StaticChecked → SandboxChecked → {Accepted | Rejected}`.
//!
//! Each transition is gated by its stage reporting `approved`. The first
//! rejection short-circuits to `Rejected` with that stage's reason verbatim and
//! quarantines the candidate. `Accepted` can only be built here, so a feature
//! cannot be registered from a candidate that skipped a stage.

use crate::artifact::CodeArtifact;
use crate::quarantine::{QuarantineRecord, QuarantineStore};
use featurelite_core::error::ErrorKind;
use featurelite_core::observability;
use featurelite_core::plan::{Plan, PlanValidator};
use featurelite_core::report::{Severity, ValidationReport};
use featurelite_sandbox::{Program, SandboxExecutor, StaticAnalyzer};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CandidateState {
    Proposed,
    PlanChecked,
    StaticChecked,
    SandboxChecked,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Plan,
    Static,
    Sandbox,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Static => "static",
            Stage::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plan that passed the Plan Validator. Code may now be generated for it.
#[derive(Debug, Clone)]
pub struct ApprovedPlan {
    plan: Plan,
    report: ValidationReport,
}

impl ApprovedPlan {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn report(&self) -> &ValidationReport {
        &self.report
    }
}

/// Terminal success. Consumed by `FeatureRegistry::register`.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub(crate) artifact: CodeArtifact,
    pub(crate) plan: Plan,
    pub(crate) program: Program,
    reports: Vec<(Stage, ValidationReport)>,
    history: Vec<CandidateState>,
}

impl Accepted {
    pub fn artifact(&self) -> &CodeArtifact {
        &self.artifact
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn reports(&self) -> &[(Stage, ValidationReport)] {
        &self.reports
    }

    pub fn history(&self) -> &[CandidateState] {
        &self.history
    }
}

/// Terminal failure carrying the rejecting stage's report.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub stage: Stage,
    pub plan_id: String,
    pub report: ValidationReport,
    history: Vec<CandidateState>,
}

impl Rejection {
    pub fn reason(&self) -> &str {
        &self.report.reason
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.report.kind
    }

    pub fn history(&self) -> &[CandidateState] {
        &self.history
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Accepted(Accepted),
    Rejected(Rejection),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }

    pub fn history(&self) -> &[CandidateState] {
        match self {
            Outcome::Accepted(a) => a.history(),
            Outcome::Rejected(r) => r.history(),
        }
    }
}

pub struct ValidationPipeline {
    plan_validator: PlanValidator,
    analyzer: StaticAnalyzer,
    executor: Arc<SandboxExecutor>,
    quarantine: QuarantineStore,
}

impl ValidationPipeline {
    pub fn new(
        plan_validator: PlanValidator,
        analyzer: StaticAnalyzer,
        executor: Arc<SandboxExecutor>,
        quarantine: QuarantineStore,
    ) -> Self {
        Self {
            plan_validator,
            analyzer,
            executor,
            quarantine,
        }
    }

    pub fn executor(&self) -> &Arc<SandboxExecutor> {
        &self.executor
    }

    /// `Proposed → PlanChecked`, or `Rejected` with the plan quarantined.
    pub fn check_plan(&self, plan: &Plan) -> Result<ApprovedPlan, Rejection> {
        let report = self.plan_validator.validate(plan);
        if !report.approved {
            let text = serde_json::to_string_pretty(plan).unwrap_or_else(|_| format!("{:?}", plan));
            return Err(self.reject(
                Stage::Plan,
                &plan.id,
                &text,
                report,
                vec![CandidateState::Proposed],
            ));
        }
        Ok(ApprovedPlan {
            plan: plan.clone(),
            report,
        })
    }

    /// `PlanChecked → StaticChecked → SandboxChecked → Accepted`, each gated.
    pub fn check_code(&self, approved: &ApprovedPlan, code: &str) -> Outcome {
        let started = Instant::now();
        let plan = &approved.plan;
        let mut history = vec![CandidateState::Proposed, CandidateState::PlanChecked];
        let mut reports = vec![(Stage::Plan, approved.report.clone())];

        let static_report = self.analyzer.analyze_candidate(Some(&plan.id), code);
        if !static_report.approved {
            return Outcome::Rejected(self.reject(Stage::Static, &plan.id, code, static_report, history));
        }
        history.push(CandidateState::StaticChecked);
        reports.push((Stage::Static, static_report));

        let program = match self.executor.compile(code) {
            Ok(program) => program,
            Err(e) => {
                let report = ValidationReport::reject(e.kind(), Severity::High, e.to_string());
                return Outcome::Rejected(self.reject(Stage::Sandbox, &plan.id, code, report, history));
            }
        };
        let sandbox_report = self.executor.evaluate(&program).into_report();
        if !sandbox_report.approved {
            return Outcome::Rejected(self.reject(Stage::Sandbox, &plan.id, code, sandbox_report, history));
        }
        history.push(CandidateState::SandboxChecked);
        reports.push((Stage::Sandbox, sandbox_report));
        history.push(CandidateState::Accepted);

        let artifact = CodeArtifact::new(code, plan.id.clone());
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        observability::audit_candidate_accepted(&plan.id, &artifact.code_hash(), duration_ms);
        tracing::info!(plan_id = %plan.id, duration_ms, "Candidate accepted");

        Outcome::Accepted(Accepted {
            artifact,
            plan: plan.clone(),
            program,
            reports,
            history,
        })
    }

    /// Full run for one candidate.
    pub fn evaluate(&self, plan: &Plan, code: &str) -> Outcome {
        match self.check_plan(plan) {
            Ok(approved) => self.check_code(&approved, code),
            Err(rejection) => Outcome::Rejected(rejection),
        }
    }

    fn reject(
        &self,
        stage: Stage,
        plan_id: &str,
        artifact_text: &str,
        report: ValidationReport,
        mut history: Vec<CandidateState>,
    ) -> Rejection {
        history.push(CandidateState::Rejected);
        let record = QuarantineRecord::new(artifact_text, &report.reason, stage.as_str(), plan_id);
        if let Err(e) = self.quarantine.record(&record) {
            tracing::error!(plan_id = %plan_id, "Failed to quarantine rejected candidate: {}", e);
        }
        observability::audit_candidate_rejected(plan_id, stage.as_str(), &record.code_hash, &report.reason);
        tracing::info!(plan_id = %plan_id, stage = %stage, reason = %report.reason, "Candidate rejected");

        Rejection {
            stage,
            plan_id: plan_id.to_string(),
            report,
            history,
        }
    }
}
