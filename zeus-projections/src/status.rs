//! Status enums and the risk score table

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status shared by tasks, activities, usecases, objectives and
/// deliverables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
    Draft,
    Active,
    Deprecated,
    OnHold,
}

impl EntityStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, EntityStatus::Completed)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, EntityStatus::Blocked)
    }

    /// Statuses hidden by the "hide completed" graph filter
    pub fn is_finished(&self) -> bool {
        matches!(self, EntityStatus::Completed | EntityStatus::Deprecated)
    }

    /// Wire name, identical to the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Pending => "pending",
            EntityStatus::InProgress => "in_progress",
            EntityStatus::Completed => "completed",
            EntityStatus::Blocked => "blocked",
            EntityStatus::Draft => "draft",
            EntityStatus::Active => "active",
            EntityStatus::Deprecated => "deprecated",
            EntityStatus::OnHold => "on_hold",
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    #[default]
    Identified,
    Mitigating,
    Mitigated,
    Accepted,
    Closed,
}

/// Risk probability bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskProbability {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskProbability {
    /// Numeric weight in the score table
    pub fn weight(&self) -> u8 {
        match self {
            RiskProbability::Low => 1,
            RiskProbability::Medium => 2,
            RiskProbability::High => 3,
        }
    }
}

/// Risk impact bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskImpact {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl RiskImpact {
    /// Numeric weight in the score table
    pub fn weight(&self) -> u8 {
        match self {
            RiskImpact::Low => 1,
            RiskImpact::Medium => 2,
            RiskImpact::High => 3,
            RiskImpact::Critical => 4,
        }
    }
}

/// Bucketed risk level derived from the numeric score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a probability × impact score: ≥9 Critical, ≥6 High,
    /// ≥3 Medium, else Low
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s >= 9 => RiskLevel::Critical,
            s if s >= 6 => RiskLevel::High,
            s if s >= 3 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}
