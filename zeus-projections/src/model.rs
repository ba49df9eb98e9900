//! Read models consumed by the analysis engines
//!
//! These are deliberately minimal: each struct carries exactly what some
//! engine reads, nothing more. The full on-disk schema belongs to the CRUD
//! collaborators; unknown YAML fields are ignored on read.

use crate::status::{EntityStatus, RiskImpact, RiskLevel, RiskProbability, RiskStatus};
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task projection (also used for activities, which share the same shape)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Entity ID (`task-NNN` / `act-NNN`)
    pub id: String,

    /// Display title
    pub title: String,

    /// Lifecycle status
    #[serde(default)]
    pub status: EntityStatus,

    /// Parent entity (task, deliverable or objective)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Tasks this task depends on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Dot-separated WBS code, e.g. "1.2.3"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wbs_code: Option<String>,

    /// Planned start
    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,

    /// Planned completion
    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,

    /// Completion percentage 0–100
    #[serde(default)]
    pub progress: u8,

    /// Free-form priority label
    #[serde(default)]
    pub priority: String,

    /// Assigned owner
    #[serde(default)]
    pub assignee: String,

    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// UseCase this activity implements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usecase_id: Option<String>,

    /// Deliverable this task contributes to, when the caller knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliverable_id: Option<String>,

    /// Objective this task contributes to, when the caller knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_id: Option<String>,
}

/// Activities share the task projection
pub type ActivityInfo = TaskInfo;

/// UseCase projection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UseCaseInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: EntityStatus,
    /// Objective this usecase contributes to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_id: Option<String>,
    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Objective projection; objectives nest via `parent_id`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Deliverable projection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliverableInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: EntityStatus,
    /// Owning objective; empty means the deliverable is isolated
    #[serde(default)]
    pub objective_id: String,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Vision projection — the single root of the multi-entity breakdown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionInfo {
    pub id: String,
    pub title: String,
}

/// Risk projection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub probability: RiskProbability,
    #[serde(default)]
    pub impact: RiskImpact,
    #[serde(default)]
    pub status: RiskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliverable_id: Option<String>,
    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RiskInfo {
    /// Numeric score from the probability × impact table (1–12)
    pub fn score(&self) -> u8 {
        self.probability.weight() * self.impact.weight()
    }

    /// Bucketed level for the numeric score
    pub fn level(&self) -> RiskLevel {
        RiskLevel::from_score(self.score())
    }
}

/// Quality projection; references either a deliverable or an objective
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityInfo {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliverable_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gates: Vec<String>,
    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Aggregate counts inside a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub in_progress: u32,
    #[serde(default)]
    pub pending: u32,
}

/// Project state captured by a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    #[serde(default)]
    pub summary: SnapshotSummary,
    #[serde(default)]
    pub health: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<String>,
}

/// Append-only point-in-time record of project progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Capture time; snapshot file names derive from it
    #[serde(with = "timestamp::lenient_required")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub state: SnapshotState,
}

impl Snapshot {
    /// File name under `state/snapshots/` for this snapshot
    pub fn file_name(&self) -> String {
        format!(
            "snapshot_{}.yaml",
            timestamp::sanitize_for_filename(&self.timestamp)
        )
    }
}

/// One entry of the single-file constraint collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: EntityStatus,
}

/// Bookkeeping block of `constraints.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// `constraints.yaml` — all constraints share one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDocument {
    #[serde(default)]
    pub constraints: Vec<ConstraintInfo>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_reads_lenient_dates_and_ignores_unknown_fields() {
        let yaml = r#"
id: task-001
title: Build parser
status: in_progress
due_date: "2025-07-01"
dependencies: [task-002]
color: purple
"#;
        let task: TaskInfo = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(task.id, "task-001");
        assert_eq!(task.status, EntityStatus::InProgress);
        assert!(task.due_date.is_some());
        assert!(task.start_date.is_none());
        assert_eq!(task.dependencies, vec!["task-002"]);
    }

    #[test]
    fn unparseable_date_reads_as_absent() {
        let yaml = "id: task-001\ntitle: t\ndue_date: whenever\n";
        let task: TaskInfo = serde_yaml::from_str(yaml).unwrap();
        assert!(task.due_date.is_none());
    }

    #[test]
    fn risk_score_uses_the_table() {
        let risk = RiskInfo {
            id: "risk-001".to_string(),
            title: "Vendor slips".to_string(),
            probability: RiskProbability::High,
            impact: RiskImpact::Critical,
            ..Default::default()
        };
        assert_eq!(risk.score(), 12);
        assert_eq!(risk.level(), RiskLevel::Critical);
    }

    #[test]
    fn snapshot_file_name_is_sanitized() {
        let snapshot = Snapshot {
            timestamp: crate::timestamp::parse_flexible("2025-06-01T12:30:00Z").unwrap(),
            label: "weekly".to_string(),
            state: SnapshotState::default(),
        };
        assert_eq!(snapshot.file_name(), "snapshot_2025-06-01T12-30-00Z.yaml");
    }
}
