//! Completion prediction
//!
//! Forecasts from the current task projection plus snapshot history
//! (newest first): weekly velocity, estimated completion date with
//! confidence and margin, trailing velocity windows with a trend, and a
//! factor-based risk score.

use crate::{ensure_live, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use zeus_projections::{Snapshot, TaskInfo};
use zeus_store::CancelToken;

/// Velocity assumed when history is too thin to measure (tasks/week)
const DEFAULT_VELOCITY: f64 = 2.0;

/// Velocity floor for degenerate measurements
const MIN_VELOCITY: f64 = 0.5;

/// Completion forecast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPrediction {
    /// Forecast date; `None` renders as "N/A" (zero velocity)
    pub estimated_date: Option<NaiveDate>,
    /// Days until the forecast date
    pub estimated_days: i64,
    /// Confidence percentage from history depth
    pub confidence: u8,
    /// Uncertainty margin in days
    pub margin_days: i64,
    /// Tasks not yet completed
    pub remaining: usize,
    /// Measured weekly velocity
    pub velocity: f64,
}

/// Velocity trend over the trailing windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityTrend {
    Increasing,
    Decreasing,
    Stable,
    Unknown,
}

/// Completed-task deltas over trailing windows
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VelocityReport {
    pub last_7_days: i64,
    pub last_14_days: i64,
    pub last_30_days: i64,
    pub trend: VelocityTrend,
}

/// One contributor to the risk score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub description: String,
    /// 1–10
    pub impact: u8,
}

/// Project risk level from the factor score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRiskLevel {
    Low,
    Medium,
    High,
}

/// Factor-based risk summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    /// 0–100
    pub score: u8,
    pub level: ProjectRiskLevel,
    pub factors: Vec<RiskFactor>,
}

/// Forecasting engine
#[derive(Debug)]
pub struct Predictor {
    tasks: Vec<TaskInfo>,
    /// Snapshot history, newest first
    history: Vec<Snapshot>,
    now: DateTime<Utc>,
}

impl Predictor {
    /// `history` must be sorted newest first (the repository loads it that
    /// way)
    pub fn new(tasks: &[TaskInfo], history: &[Snapshot]) -> Self {
        Self {
            tasks: tasks.to_vec(),
            history: history.to_vec(),
            now: Utc::now(),
        }
    }

    /// Override the wall clock (reproducible tests)
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Completed tasks per week measured over the whole history.
    ///
    /// Fewer than two snapshots fall back to 2.0; a non-positive completed
    /// delta reads as the 0.5 floor.
    pub fn weekly_velocity(&self) -> f64 {
        if self.history.len() < 2 {
            return DEFAULT_VELOCITY;
        }

        let newest = &self.history[0];
        let oldest = &self.history[self.history.len() - 1];
        let delta =
            newest.state.summary.completed as i64 - oldest.state.summary.completed as i64;
        if delta <= 0 {
            return MIN_VELOCITY;
        }

        let days = (newest.timestamp - oldest.timestamp).num_days();
        let weeks = (days as f64 / 7.0).max(1.0);
        (delta as f64 / weeks).max(MIN_VELOCITY)
    }

    /// Forecast the completion date
    pub fn predict_completion(&self, cancel: &CancelToken) -> Result<CompletionPrediction> {
        ensure_live(cancel)?;

        let remaining = self
            .tasks
            .iter()
            .filter(|t| !t.status.is_completed())
            .count();
        let today = self.now.date_naive();

        if remaining == 0 {
            return Ok(CompletionPrediction {
                estimated_date: Some(today),
                estimated_days: 0,
                confidence: 100,
                margin_days: 0,
                remaining,
                velocity: self.weekly_velocity(),
            });
        }

        let velocity = self.weekly_velocity();
        if velocity <= 0.0 {
            return Ok(CompletionPrediction {
                estimated_date: None,
                estimated_days: 0,
                confidence: 0,
                margin_days: 0,
                remaining,
                velocity,
            });
        }

        let estimated_days = (remaining as f64 / velocity * 7.0).ceil() as i64;
        let confidence: u8 = match self.history.len() {
            n if n >= 10 => 85,
            n if n >= 5 => 70,
            n if n >= 2 => 50,
            _ => 30,
        };
        let margin_days =
            ((estimated_days as f64 * (100 - confidence) as f64 / 100.0 * 0.5) as i64).max(1);

        Ok(CompletionPrediction {
            estimated_date: Some(today + Duration::days(estimated_days)),
            estimated_days,
            confidence,
            margin_days,
            remaining,
            velocity,
        })
    }

    /// Completed counts over trailing 7/14/30-day windows, with a trend
    pub fn velocity_report(&self, cancel: &CancelToken) -> Result<VelocityReport> {
        ensure_live(cancel)?;

        let last_7_days = self.window_delta(7);
        let last_14_days = self.window_delta(14);
        let last_30_days = self.window_delta(30);

        let trend = if last_7_days == 0 && last_14_days == 0 && last_30_days == 0 {
            VelocityTrend::Unknown
        } else {
            let previous_7 = last_14_days - last_7_days;
            let diff = last_7_days - previous_7;
            if diff > 1 {
                VelocityTrend::Increasing
            } else if diff < -1 {
                VelocityTrend::Decreasing
            } else {
                VelocityTrend::Stable
            }
        };

        Ok(VelocityReport {
            last_7_days,
            last_14_days,
            last_30_days,
            trend,
        })
    }

    /// Completed delta between the nearest snapshots at the window bounds
    fn window_delta(&self, days: i64) -> i64 {
        let window_start = self.now - Duration::days(days);
        let at_end = self.nearest_at_or_before(self.now);
        let at_start = self.nearest_at_or_before(window_start);

        match (at_end, at_start) {
            (Some(end), Some(start)) => {
                end.state.summary.completed as i64 - start.state.summary.completed as i64
            }
            _ => 0,
        }
    }

    fn nearest_at_or_before(&self, bound: DateTime<Utc>) -> Option<&Snapshot> {
        // History is newest first; the first snapshot at or before the
        // bound is the nearest one.
        self.history.iter().find(|s| s.timestamp <= bound)
    }

    /// Factor-based risk score
    pub fn risk_score(&self, cancel: &CancelToken) -> Result<RiskScore> {
        ensure_live(cancel)?;

        let total = self.tasks.len();
        let mut factors: Vec<RiskFactor> = Vec::new();

        let blocked = self.tasks.iter().filter(|t| t.status.is_blocked()).count();
        if blocked > 0 && total > 0 {
            let blocked_pct = blocked * 100 / total;
            let impact = (blocked_pct / 10).clamp(1, 10) as u8;
            factors.push(RiskFactor {
                name: "blocked_tasks".to_string(),
                description: format!("{} of {} tasks are blocked", blocked, total),
                impact,
            });
        }

        if total > 0 {
            let completed = self
                .tasks
                .iter()
                .filter(|t| t.status.is_completed())
                .count();
            let completion_pct = completed * 100 / total;
            if completion_pct < 30 {
                factors.push(RiskFactor {
                    name: "low_completion".to_string(),
                    description: format!("only {}% of tasks completed", completion_pct),
                    impact: 7,
                });
            }
        }

        let in_progress = self
            .tasks
            .iter()
            .filter(|t| t.status == zeus_projections::EntityStatus::InProgress)
            .count();
        if in_progress > 5 {
            factors.push(RiskFactor {
                name: "high_wip".to_string(),
                description: format!("{} tasks in progress at once", in_progress),
                impact: 5,
            });
        }

        if self.history.len() >= 2
            && self.history[0].state.summary.completed == self.history[1].state.summary.completed
        {
            factors.push(RiskFactor {
                name: "stalled_progress".to_string(),
                description: "no tasks completed between the latest snapshots".to_string(),
                impact: 6,
            });
        }

        let score = if factors.is_empty() {
            0
        } else {
            let sum: u32 = factors.iter().map(|f| f.impact as u32).sum();
            (sum * 100 / (factors.len() as u32 * 10)).min(100) as u8
        };

        let level = if score >= 70 {
            ProjectRiskLevel::High
        } else if score >= 40 {
            ProjectRiskLevel::Medium
        } else {
            ProjectRiskLevel::Low
        };

        Ok(RiskScore {
            score,
            level,
            factors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeus_projections::timestamp::parse_flexible;
    use zeus_projections::{EntityStatus, SnapshotState, SnapshotSummary};

    fn snapshot(ts: &str, completed: u32) -> Snapshot {
        Snapshot {
            timestamp: parse_flexible(ts).unwrap(),
            label: String::new(),
            state: SnapshotState {
                summary: SnapshotSummary {
                    total: 20,
                    completed,
                    in_progress: 2,
                    pending: 20 - completed - 2,
                },
                ..Default::default()
            },
        }
    }

    fn task(id: &str, status: EntityStatus) -> TaskInfo {
        TaskInfo {
            id: id.to_string(),
            title: id.to_string(),
            status,
            ..Default::default()
        }
    }

    fn now() -> DateTime<Utc> {
        parse_flexible("2025-03-01T00:00:00Z").unwrap()
    }

    #[test]
    fn thin_history_uses_the_default_velocity() {
        let predictor = Predictor::new(&[], &[snapshot("2025-02-01", 3)]);
        assert_eq!(predictor.weekly_velocity(), 2.0);
    }

    #[test]
    fn velocity_is_completed_delta_per_week() {
        let history = vec![
            snapshot("2025-02-28T00:00:00Z", 10),
            snapshot("2025-02-14T00:00:00Z", 4),
        ];
        let predictor = Predictor::new(&[], &history);
        // 6 completed over 2 weeks.
        assert!((predictor.weekly_velocity() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn non_positive_delta_floors_at_half() {
        let history = vec![
            snapshot("2025-02-28T00:00:00Z", 4),
            snapshot("2025-02-14T00:00:00Z", 4),
        ];
        let predictor = Predictor::new(&[], &history);
        assert_eq!(predictor.weekly_velocity(), 0.5);
    }

    #[test]
    fn prediction_scales_remaining_by_velocity() {
        let history = vec![
            snapshot("2025-02-28T00:00:00Z", 10),
            snapshot("2025-02-14T00:00:00Z", 4),
        ];
        let tasks: Vec<TaskInfo> = (0..6)
            .map(|i| task(&format!("task-{:03}", i + 1), EntityStatus::Pending))
            .collect();

        let prediction = Predictor::new(&tasks, &history)
            .with_now(now())
            .predict_completion(&CancelToken::new())
            .unwrap();

        // 6 remaining at 3/week = 14 days.
        assert_eq!(prediction.estimated_days, 14);
        assert_eq!(prediction.confidence, 50);
        assert_eq!(prediction.margin_days, 3);
        assert_eq!(
            prediction.estimated_date,
            Some(now().date_naive() + Duration::days(14))
        );
    }

    #[test]
    fn nothing_remaining_predicts_today() {
        let prediction = Predictor::new(&[task("task-001", EntityStatus::Completed)], &[])
            .with_now(now())
            .predict_completion(&CancelToken::new())
            .unwrap();

        assert_eq!(prediction.estimated_date, Some(now().date_naive()));
        assert_eq!(prediction.confidence, 100);
        assert_eq!(prediction.margin_days, 0);
    }

    #[test]
    fn trend_compares_the_trailing_weeks() {
        // 5 completed in the last week, 1 the week before.
        let history = vec![
            snapshot("2025-02-28T00:00:00Z", 12),
            snapshot("2025-02-21T00:00:00Z", 7),
            snapshot("2025-02-14T00:00:00Z", 6),
            snapshot("2025-01-20T00:00:00Z", 2),
        ];
        let report = Predictor::new(&[], &history)
            .with_now(now())
            .velocity_report(&CancelToken::new())
            .unwrap();

        assert_eq!(report.last_7_days, 5);
        assert_eq!(report.last_14_days, 6);
        assert_eq!(report.last_30_days, 10);
        assert_eq!(report.trend, VelocityTrend::Increasing);
    }

    #[test]
    fn empty_windows_read_unknown() {
        let report = Predictor::new(&[], &[])
            .with_now(now())
            .velocity_report(&CancelToken::new())
            .unwrap();
        assert_eq!(report.trend, VelocityTrend::Unknown);
    }

    #[test]
    fn risk_factors_accumulate() {
        let mut tasks = vec![
            task("task-001", EntityStatus::Blocked),
            task("task-002", EntityStatus::Blocked),
            task("task-003", EntityStatus::Pending),
            task("task-004", EntityStatus::Pending),
        ];
        for i in 0..6 {
            tasks.push(task(&format!("task-01{}", i), EntityStatus::InProgress));
        }

        let history = vec![
            snapshot("2025-02-28T00:00:00Z", 4),
            snapshot("2025-02-21T00:00:00Z", 4),
        ];

        let risk = Predictor::new(&tasks, &history)
            .with_now(now())
            .risk_score(&CancelToken::new())
            .unwrap();

        let names: Vec<&str> = risk.factors.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "blocked_tasks",
                "low_completion",
                "high_wip",
                "stalled_progress"
            ]
        );
        // Impacts: 2, 7, 5, 6 -> 20/40 of max -> 50, Medium.
        assert_eq!(risk.score, 50);
        assert_eq!(risk.level, ProjectRiskLevel::Medium);
    }

    #[test]
    fn no_factors_is_low_risk() {
        let tasks = vec![
            task("task-001", EntityStatus::Completed),
            task("task-002", EntityStatus::Completed),
        ];
        let risk = Predictor::new(&tasks, &[])
            .risk_score(&CancelToken::new())
            .unwrap();
        assert_eq!(risk.score, 0);
        assert_eq!(risk.level, ProjectRiskLevel::Low);
    }

    #[test]
    fn pre_cancelled_token_short_circuits() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = Predictor::new(&[], &[]).predict_completion(&cancel).unwrap_err();
        assert!(matches!(err, crate::AnalysisError::Cancelled));
    }
}
