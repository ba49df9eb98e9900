//! Stale entity detection
//!
//! Lifecycle hygiene over the task set: long-finished work, long-blocked
//! work, orphaned leftovers and tasks that never moved. Each finding
//! carries a recommendation (archive / review / delete).

use crate::{ensure_live, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeus_projections::TaskInfo;
use zeus_store::CancelToken;

/// Why an entity counts as stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleCategory {
    CompletedOld,
    BlockedLong,
    Orphaned,
    NoProgress,
}

/// Suggested cleanup action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Archive,
    Review,
    Delete,
}

/// One stale finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleItem {
    pub id: String,
    pub title: String,
    pub category: StaleCategory,
    /// Days since the relevant timestamp
    pub idle_days: i64,
    pub recommendation: Recommendation,
}

/// Immutable stale report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleReport {
    pub items: Vec<StaleItem>,
}

/// Stale analyzer with per-category day thresholds
#[derive(Debug)]
pub struct StaleAnalyzer {
    tasks: Vec<TaskInfo>,
    /// Completed-and-old threshold (default 30)
    completed_days: i64,
    /// Blocked-long threshold (default 14)
    blocked_days: i64,
    /// No-progress threshold (default 21)
    no_progress_days: i64,
    now: DateTime<Utc>,
}

impl StaleAnalyzer {
    pub fn new(tasks: &[TaskInfo]) -> Self {
        Self {
            tasks: tasks.to_vec(),
            completed_days: 30,
            blocked_days: 14,
            no_progress_days: 21,
            now: Utc::now(),
        }
    }

    pub fn with_thresholds(mut self, completed: i64, blocked: i64, no_progress: i64) -> Self {
        self.completed_days = completed;
        self.blocked_days = blocked;
        self.no_progress_days = no_progress;
        self
    }

    /// Override the wall clock (reproducible tests)
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn analyze(&self, cancel: &CancelToken) -> Result<StaleReport> {
        ensure_live(cancel)?;

        let referenced: std::collections::HashSet<&str> = self
            .tasks
            .iter()
            .flat_map(|t| t.dependencies.iter().map(String::as_str))
            .chain(self.tasks.iter().filter_map(|t| t.parent_id.as_deref()))
            .collect();

        let mut items = Vec::new();
        for task in &self.tasks {
            ensure_live(cancel)?;
            let idle_days = match task.updated_at {
                Some(updated) => (self.now - updated).num_days(),
                None => continue,
            };

            if task.status.is_completed() {
                let unlinked = task.parent_id.is_none()
                    && task.dependencies.is_empty()
                    && !referenced.contains(task.id.as_str());
                if unlinked {
                    items.push(StaleItem {
                        id: task.id.clone(),
                        title: task.title.clone(),
                        category: StaleCategory::Orphaned,
                        idle_days,
                        recommendation: Recommendation::Delete,
                    });
                    continue;
                }
                if idle_days >= self.completed_days {
                    items.push(StaleItem {
                        id: task.id.clone(),
                        title: task.title.clone(),
                        category: StaleCategory::CompletedOld,
                        idle_days,
                        recommendation: Recommendation::Archive,
                    });
                }
                continue;
            }

            if task.status.is_blocked() && idle_days >= self.blocked_days {
                items.push(StaleItem {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    category: StaleCategory::BlockedLong,
                    idle_days,
                    recommendation: Recommendation::Review,
                });
                continue;
            }

            if task.progress == 0 && idle_days >= self.no_progress_days {
                items.push(StaleItem {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    category: StaleCategory::NoProgress,
                    idle_days,
                    recommendation: Recommendation::Review,
                });
            }
        }

        Ok(StaleReport { items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeus_projections::timestamp::parse_flexible;
    use zeus_projections::EntityStatus;

    fn now() -> DateTime<Utc> {
        parse_flexible("2025-05-01T00:00:00Z").unwrap()
    }

    fn task(id: &str, status: EntityStatus, updated: &str) -> TaskInfo {
        TaskInfo {
            id: id.to_string(),
            title: format!("Task {}", id),
            status,
            updated_at: parse_flexible(updated),
            ..Default::default()
        }
    }

    #[test]
    fn detectors_route_to_their_categories() {
        let mut completed_linked = task("task-a", EntityStatus::Completed, "2025-03-01T00:00:00Z");
        completed_linked.parent_id = Some("task-x".to_string());
        let blocked = task("task-b", EntityStatus::Blocked, "2025-04-10T00:00:00Z");
        let mut never_moved = task("task-c", EntityStatus::Pending, "2025-04-01T00:00:00Z");
        never_moved.progress = 0;
        never_moved.dependencies = vec!["task-b".to_string()];
        let orphan_done = task("task-d", EntityStatus::Completed, "2025-04-20T00:00:00Z");

        let report = StaleAnalyzer::new(&[completed_linked, blocked, never_moved, orphan_done])
            .with_now(now())
            .analyze(&CancelToken::new())
            .unwrap();

        let categories: Vec<(&str, StaleCategory)> = report
            .items
            .iter()
            .map(|i| (i.id.as_str(), i.category))
            .collect();
        assert!(categories.contains(&("task-a", StaleCategory::CompletedOld)));
        assert!(categories.contains(&("task-b", StaleCategory::BlockedLong)));
        assert!(categories.contains(&("task-c", StaleCategory::NoProgress)));
        assert!(categories.contains(&("task-d", StaleCategory::Orphaned)));
    }

    #[test]
    fn recommendations_match_categories() {
        let orphan = task("task-a", EntityStatus::Completed, "2025-04-30T00:00:00Z");
        let report = StaleAnalyzer::new(&[orphan])
            .with_now(now())
            .analyze(&CancelToken::new())
            .unwrap();
        assert_eq!(report.items[0].recommendation, Recommendation::Delete);
    }

    #[test]
    fn fresh_tasks_are_quiet() {
        let mut fresh = task("task-a", EntityStatus::InProgress, "2025-04-29T00:00:00Z");
        fresh.progress = 40;
        let report = StaleAnalyzer::new(&[fresh])
            .with_now(now())
            .analyze(&CancelToken::new())
            .unwrap();
        assert!(report.items.is_empty());
    }

    #[test]
    fn thresholds_are_tunable() {
        let blocked = task("task-a", EntityStatus::Blocked, "2025-04-28T00:00:00Z");
        let report = StaleAnalyzer::new(&[blocked])
            .with_now(now())
            .with_thresholds(30, 2, 21)
            .analyze(&CancelToken::new())
            .unwrap();
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].category, StaleCategory::BlockedLong);
    }

    #[test]
    fn pre_cancelled_token_short_circuits() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = StaleAnalyzer::new(&[]).analyze(&cancel).unwrap_err();
        assert!(matches!(err, crate::AnalysisError::Cancelled));
    }
}
