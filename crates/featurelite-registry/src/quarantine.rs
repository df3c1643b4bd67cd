//! Quarantine Store: append-only JSONL record of rejected candidates.
//!
//! Records are written for audit only; nothing in the pipeline reads them back
//! and quarantined code is never executed.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use featurelite_core::observability::{append_jsonl, code_hash};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const QUARANTINE_FILE: &str = "quarantine.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineRecord {
    /// Rejected code, or the serialized plan for plan-stage rejections
    pub artifact_text: String,
    pub reason: String,
    /// Pipeline stage that rejected: plan, static or sandbox
    pub stage: String,
    pub plan_id: String,
    pub code_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl QuarantineRecord {
    pub fn new(artifact_text: &str, reason: &str, stage: &str, plan_id: &str) -> Self {
        Self {
            artifact_text: artifact_text.to_string(),
            reason: reason.to_string(),
            stage: stage.to_string(),
            plan_id: plan_id.to_string(),
            code_hash: code_hash(artifact_text),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuarantineStore {
    dir: PathBuf,
}

impl QuarantineStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(QUARANTINE_FILE)
    }

    pub fn record(&self, record: &QuarantineRecord) -> Result<(), StoreError> {
        let path = self.log_path();
        let value = serde_json::to_value(record).map_err(|e| StoreError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        append_jsonl(&path, &value).map_err(|e| StoreError::io(&path, e))?;
        tracing::info!(plan_id = %record.plan_id, stage = %record.stage, "Candidate quarantined");
        Ok(())
    }
}
