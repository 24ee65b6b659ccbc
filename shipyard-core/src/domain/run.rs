//! Run report domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Record of one invocation of the executor
///
/// Built by the runner while a plan executes; printed or serialized by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub id: Uuid,
    pub requested: String,
    pub status: RunStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub targets: Vec<TargetRecord>,
}

impl RunReport {
    /// Create a report with every planned target pending
    pub fn new(requested: impl Into<String>, plan: &[String]) -> Self {
        Self {
            id: Uuid::new_v4(),
            requested: requested.into(),
            status: RunStatus::Running,
            started_at: chrono::Utc::now(),
            completed_at: None,
            targets: plan.iter().map(TargetRecord::pending).collect(),
        }
    }

    pub fn target(&self, name: &str) -> Option<&TargetRecord> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn target_mut(&mut self, name: &str) -> Option<&mut TargetRecord> {
        self.targets.iter_mut().find(|t| t.name == name)
    }

    /// Names of targets whose body ran to completion
    pub fn succeeded(&self) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|t| t.status == TargetStatus::Succeeded)
            .map(|t| t.name.as_str())
            .collect()
    }

    /// The target that stopped the run, if any
    pub fn failed_target(&self) -> Option<&TargetRecord> {
        self.targets
            .iter()
            .find(|t| matches!(t.status, TargetStatus::Failed | TargetStatus::Interrupted))
    }

    /// Marks the run finished; remaining pending targets become skipped
    pub fn finish(&mut self, status: RunStatus) {
        for target in &mut self.targets {
            if target.status == TargetStatus::Pending {
                target.status = TargetStatus::Skipped;
            }
        }
        self.status = status;
        self.completed_at = Some(chrono::Utc::now());
    }
}

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Interrupted,
}

/// Status of a single planned target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Interrupted,
}

/// Execution record of one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRecord {
    pub name: String,
    pub status: TargetStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Non-secret values published by the target body
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Redacted failure message
    pub error: Option<String>,
}

impl TargetRecord {
    fn pending(name: &String) -> Self {
        Self {
            name: name.clone(),
            status: TargetStatus::Pending,
            started_at: None,
            completed_at: None,
            outputs: BTreeMap::new(),
            error: None,
        }
    }

    /// Duration of the body, when it has both started and completed
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
