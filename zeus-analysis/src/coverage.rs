//! Objective coverage
//!
//! Checks that every objective has at least one descendant task, directly
//! or through a deliverable, and condenses the findings into a composite
//! coverage score.

use crate::{ensure_live, Result};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use zeus_projections::{DeliverableInfo, ObjectiveInfo, TaskInfo};
use zeus_store::CancelToken;

/// One uncovered objective
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageIssue {
    pub objective_id: String,
    pub message: String,
}

/// Immutable coverage result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub issues: Vec<CoverageIssue>,
    /// Composite score 0–100
    pub coverage_score: f64,
    /// Objectives with at least one descendant task, as a percentage
    pub objective_coverage: Option<f64>,
    /// Deliverables with at least one task, as a percentage
    pub deliverable_coverage: Option<f64>,
}

/// Coverage analyzer
#[derive(Debug)]
pub struct CoverageAnalyzer {
    objectives: Vec<ObjectiveInfo>,
    deliverables: Vec<DeliverableInfo>,
    tasks: Vec<TaskInfo>,
}

impl CoverageAnalyzer {
    pub fn new(
        objectives: &[ObjectiveInfo],
        deliverables: &[DeliverableInfo],
        tasks: &[TaskInfo],
    ) -> Self {
        Self {
            objectives: objectives.to_vec(),
            deliverables: deliverables.to_vec(),
            tasks: tasks.to_vec(),
        }
    }

    pub fn analyze(&self, cancel: &CancelToken) -> Result<CoverageReport> {
        ensure_live(cancel)?;

        let objective_of_deliverable: HashMap<&str, &str> = self
            .deliverables
            .iter()
            .filter(|d| !d.objective_id.is_empty())
            .map(|d| (d.id.as_str(), d.objective_id.as_str()))
            .collect();

        // Objectives and deliverables that some task lands on.
        let mut covered_objectives: HashSet<&str> = HashSet::new();
        let mut covered_deliverables: HashSet<&str> = HashSet::new();
        for task in &self.tasks {
            ensure_live(cancel)?;
            for link in [
                task.deliverable_id.as_deref(),
                task.objective_id.as_deref(),
                task.parent_id.as_deref(),
            ]
            .into_iter()
            .flatten()
            {
                if let Some(objective) = objective_of_deliverable.get(link) {
                    covered_deliverables.insert(link);
                    covered_objectives.insert(objective);
                } else {
                    covered_objectives.insert(link);
                }
            }
        }

        let mut issues = Vec::new();
        for objective in &self.objectives {
            if !covered_objectives.contains(objective.id.as_str()) {
                issues.push(CoverageIssue {
                    objective_id: objective.id.clone(),
                    message: format!("objective '{}' has no tasks", objective.title),
                });
            }
        }

        let objective_coverage = if self.objectives.is_empty() {
            None
        } else {
            let covered = self.objectives.len() - issues.len();
            Some(covered as f64 * 100.0 / self.objectives.len() as f64)
        };

        let deliverable_coverage = if self.deliverables.is_empty() {
            None
        } else {
            let covered = self
                .deliverables
                .iter()
                .filter(|d| covered_deliverables.contains(d.id.as_str()))
                .count();
            Some(covered as f64 * 100.0 / self.deliverables.len() as f64)
        };

        let coverage_score = match (objective_coverage, deliverable_coverage) {
            (Some(o), Some(d)) => (o + d) / 2.0,
            (Some(o), None) => o,
            (None, Some(d)) => d,
            (None, None) => {
                if self.tasks.is_empty() {
                    100.0
                } else {
                    // Task-only input: score is the share of linked tasks.
                    let referenced: HashSet<&str> = self
                        .tasks
                        .iter()
                        .flat_map(|t| t.dependencies.iter().map(String::as_str))
                        .chain(self.tasks.iter().filter_map(|t| t.parent_id.as_deref()))
                        .collect();
                    let orphans = self
                        .tasks
                        .iter()
                        .filter(|t| {
                            t.parent_id.is_none()
                                && t.dependencies.is_empty()
                                && !referenced.contains(t.id.as_str())
                        })
                        .count();
                    100.0 - orphans as f64 * 100.0 / self.tasks.len() as f64
                }
            }
        };

        Ok(CoverageReport {
            issues,
            coverage_score,
            objective_coverage,
            deliverable_coverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objective(id: &str) -> ObjectiveInfo {
        ObjectiveInfo {
            id: id.to_string(),
            title: format!("Objective {}", id),
            ..Default::default()
        }
    }

    fn deliverable(id: &str, objective: &str) -> DeliverableInfo {
        DeliverableInfo {
            id: id.to_string(),
            title: format!("Deliverable {}", id),
            objective_id: objective.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn task_through_deliverable_covers_the_objective() {
        let task = TaskInfo {
            id: "task-001".to_string(),
            title: "t".to_string(),
            deliverable_id: Some("del-001".to_string()),
            ..Default::default()
        };

        let report = CoverageAnalyzer::new(
            &[objective("obj-001"), objective("obj-002")],
            &[deliverable("del-001", "obj-001")],
            &[task],
        )
        .analyze(&CancelToken::new())
        .unwrap();

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].objective_id, "obj-002");
        assert_eq!(report.objective_coverage, Some(50.0));
        assert_eq!(report.deliverable_coverage, Some(100.0));
        assert!((report.coverage_score - 75.0).abs() < 1e-9);
    }

    #[test]
    fn direct_objective_link_counts() {
        let task = TaskInfo {
            id: "task-001".to_string(),
            title: "t".to_string(),
            objective_id: Some("obj-001".to_string()),
            ..Default::default()
        };
        let report = CoverageAnalyzer::new(&[objective("obj-001")], &[], &[task])
            .analyze(&CancelToken::new())
            .unwrap();

        assert!(report.issues.is_empty());
        assert_eq!(report.coverage_score, 100.0);
    }

    #[test]
    fn empty_inputs_score_perfect() {
        let report = CoverageAnalyzer::new(&[], &[], &[])
            .analyze(&CancelToken::new())
            .unwrap();
        assert_eq!(report.coverage_score, 100.0);
        assert!(report.objective_coverage.is_none());
    }

    #[test]
    fn task_only_input_scores_by_orphans() {
        let linked = TaskInfo {
            id: "task-001".to_string(),
            title: "linked".to_string(),
            dependencies: vec!["task-002".to_string()],
            ..Default::default()
        };
        let dependency = TaskInfo {
            id: "task-002".to_string(),
            title: "dep".to_string(),
            ..Default::default()
        };
        let orphan = TaskInfo {
            id: "task-003".to_string(),
            title: "orphan".to_string(),
            ..Default::default()
        };
        let another_orphan = TaskInfo {
            id: "task-004".to_string(),
            title: "orphan".to_string(),
            ..Default::default()
        };

        let report = CoverageAnalyzer::new(&[], &[], &[linked, dependency, orphan, another_orphan])
            .analyze(&CancelToken::new())
            .unwrap();

        // 2 of 4 tasks are orphans.
        assert!((report.coverage_score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn pre_cancelled_token_short_circuits() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = CoverageAnalyzer::new(&[], &[], &[]).analyze(&cancel).unwrap_err();
        assert!(matches!(err, crate::AnalysisError::Cancelled));
    }
}
