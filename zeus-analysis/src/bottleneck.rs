//! Bottleneck analysis
//!
//! Five detectors over the current projection: chains of blocked tasks,
//! overdue work, stagnating work, isolated entities and un-mitigated
//! high risks. Each finding carries a severity, the entities involved and
//! a suggested remedy; the final list is ranked critical first.

use crate::{ensure_live, Result};
use chrono::{DateTime, Utc};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeus_projections::{DeliverableInfo, ObjectiveInfo, RiskInfo, RiskStatus, TaskInfo};
use zeus_store::CancelToken;

/// Detector that produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckType {
    BlockChain,
    Overdue,
    Stagnation,
    Isolated,
    HighRisk,
}

/// Severity buckets, ranked critical < high < medium < warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Warning,
}

/// One finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bottleneck {
    pub kind: BottleneckType,
    pub severity: Severity,
    /// Entities involved, sorted
    pub entities: Vec<String>,
    pub message: String,
    /// What the finding endangers (parent deliverable/objective when
    /// resolvable)
    pub impact: String,
    pub suggestion: String,
}

/// Findings per severity bucket
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BottleneckSummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub warning: usize,
}

/// Immutable analysis result, ranked by severity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckReport {
    pub items: Vec<Bottleneck>,
    pub summary: BottleneckSummary,
}

/// Bottleneck analyzer
#[derive(Debug)]
pub struct BottleneckAnalyzer {
    tasks: Vec<TaskInfo>,
    deliverables: Vec<DeliverableInfo>,
    objectives: Vec<ObjectiveInfo>,
    risks: Vec<RiskInfo>,
    /// Days without update before stagnation reports (default 14)
    stagnation_days: i64,
    /// Grace days before past-due reports (default 0)
    overdue_days: i64,
    now: DateTime<Utc>,
}

impl BottleneckAnalyzer {
    pub fn new(
        tasks: &[TaskInfo],
        deliverables: &[DeliverableInfo],
        objectives: &[ObjectiveInfo],
        risks: &[RiskInfo],
    ) -> Self {
        Self {
            tasks: tasks.to_vec(),
            deliverables: deliverables.to_vec(),
            objectives: objectives.to_vec(),
            risks: risks.to_vec(),
            stagnation_days: 14,
            overdue_days: 0,
            now: Utc::now(),
        }
    }

    pub fn with_stagnation_days(mut self, days: i64) -> Self {
        self.stagnation_days = days;
        self
    }

    pub fn with_overdue_days(mut self, days: i64) -> Self {
        self.overdue_days = days;
        self
    }

    /// Override the wall clock (reproducible tests)
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Run all detectors and rank the findings
    pub fn analyze(&self, cancel: &CancelToken) -> Result<BottleneckReport> {
        let mut items = Vec::new();

        self.detect_block_chains(cancel, &mut items)?;
        self.detect_overdue(cancel, &mut items)?;
        self.detect_stagnation(cancel, &mut items)?;
        self.detect_isolated(cancel, &mut items)?;
        self.detect_high_risks(cancel, &mut items)?;

        // Stable sort: severity rank first, detector order preserved within
        // a bucket.
        items.sort_by_key(|item| item.severity);

        let mut summary = BottleneckSummary::default();
        for item in &items {
            match item.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Warning => summary.warning += 1,
            }
        }

        debug!(
            critical = summary.critical,
            high = summary.high,
            medium = summary.medium,
            warning = summary.warning,
            "bottleneck analysis finished"
        );
        Ok(BottleneckReport { items, summary })
    }

    /// Connected chains of blocked tasks joined by dependency edges.
    /// A chain of two or more blocked tasks is one critical finding.
    fn detect_block_chains(&self, cancel: &CancelToken, items: &mut Vec<Bottleneck>) -> Result<()> {
        ensure_live(cancel)?;

        let blocked: HashMap<&str, &TaskInfo> = self
            .tasks
            .iter()
            .filter(|t| t.status.is_blocked())
            .map(|t| (t.id.as_str(), t))
            .collect();

        // Undirected adjacency restricted to blocked tasks, both directions
        // of each dependency edge.
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for task in blocked.values() {
            for dep in &task.dependencies {
                if blocked.contains_key(dep.as_str()) {
                    adjacency.entry(task.id.as_str()).or_default().push(dep.as_str());
                    adjacency.entry(dep.as_str()).or_default().push(task.id.as_str());
                }
            }
        }

        let mut ids: Vec<&str> = blocked.keys().copied().collect();
        ids.sort();

        let mut visited: HashSet<&str> = HashSet::new();
        for start in ids {
            ensure_live(cancel)?;
            if visited.contains(start) {
                continue;
            }

            let mut chain: Vec<&str> = Vec::new();
            let mut stack = vec![start];
            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    continue;
                }
                chain.push(id);
                for neighbor in adjacency.get(id).into_iter().flatten() {
                    if !visited.contains(neighbor) {
                        stack.push(neighbor);
                    }
                }
            }

            if chain.len() >= 2 {
                let mut entities: Vec<String> = chain.iter().map(|s| s.to_string()).collect();
                entities.sort();
                items.push(Bottleneck {
                    kind: BottleneckType::BlockChain,
                    severity: Severity::Critical,
                    message: format!("{} blocked tasks form a dependency chain", entities.len()),
                    impact: "every task downstream of the chain is stalled".to_string(),
                    suggestion: "unblock the chain head first; the rest follows".to_string(),
                    entities,
                });
            }
        }

        Ok(())
    }

    /// Past-due tasks: >7 days critical, ≤1 day medium, otherwise high
    fn detect_overdue(&self, cancel: &CancelToken, items: &mut Vec<Bottleneck>) -> Result<()> {
        ensure_live(cancel)?;
        let today = self.now.date_naive();

        for task in &self.tasks {
            if task.status.is_completed() {
                continue;
            }
            let Some(due) = task.due_date.map(|d| d.date_naive()) else {
                continue;
            };
            let days_over = (today - due).num_days();
            if days_over <= self.overdue_days {
                continue;
            }

            let severity = if days_over > 7 {
                Severity::Critical
            } else if days_over <= 1 {
                Severity::Medium
            } else {
                Severity::High
            };

            items.push(Bottleneck {
                kind: BottleneckType::Overdue,
                severity,
                entities: vec![task.id.clone()],
                message: format!("'{}' is {} days past due", task.title, days_over),
                impact: self.parent_impact(task),
                suggestion: "re-plan the due date or raise the priority".to_string(),
            });
        }

        Ok(())
    }

    /// Name the parent deliverable/objective a late task endangers
    fn parent_impact(&self, task: &TaskInfo) -> String {
        let parent = task
            .deliverable_id
            .as_deref()
            .or(task.parent_id.as_deref());
        if let Some(id) = parent {
            if let Some(deliverable) = self.deliverables.iter().find(|d| d.id == id) {
                return format!("delays deliverable '{}'", deliverable.title);
            }
        }
        let objective = task
            .objective_id
            .as_deref()
            .or(task.parent_id.as_deref());
        if let Some(id) = objective {
            if let Some(objective) = self.objectives.iter().find(|o| o.id == id) {
                return format!("delays objective '{}'", objective.title);
            }
        }
        "delays dependent work".to_string()
    }

    /// Tasks untouched for `stagnation_days` (medium) or over 30 days
    /// (high); completed tasks are skipped
    fn detect_stagnation(&self, cancel: &CancelToken, items: &mut Vec<Bottleneck>) -> Result<()> {
        ensure_live(cancel)?;

        for task in &self.tasks {
            if task.status.is_completed() {
                continue;
            }
            let Some(updated) = task.updated_at else {
                continue;
            };
            let idle_days = (self.now - updated).num_days();
            if idle_days < self.stagnation_days {
                continue;
            }

            let severity = if idle_days > 30 {
                Severity::High
            } else {
                Severity::Medium
            };

            items.push(Bottleneck {
                kind: BottleneckType::Stagnation,
                severity,
                entities: vec![task.id.clone()],
                message: format!("'{}' has not moved in {} days", task.title, idle_days),
                impact: "work may be silently abandoned".to_string(),
                suggestion: "confirm the task is still owned and planned".to_string(),
            });
        }

        Ok(())
    }

    /// Deliverables without an objective; tasks with no links at all
    fn detect_isolated(&self, cancel: &CancelToken, items: &mut Vec<Bottleneck>) -> Result<()> {
        ensure_live(cancel)?;

        for deliverable in &self.deliverables {
            if deliverable.objective_id.is_empty() {
                items.push(Bottleneck {
                    kind: BottleneckType::Isolated,
                    severity: Severity::Warning,
                    entities: vec![deliverable.id.clone()],
                    message: format!("deliverable '{}' has no objective", deliverable.title),
                    impact: "unanchored scope".to_string(),
                    suggestion: "link the deliverable to an objective or retire it".to_string(),
                });
            }
        }

        let referenced: HashSet<&str> = self
            .tasks
            .iter()
            .flat_map(|t| t.dependencies.iter().map(String::as_str))
            .chain(
                self.tasks
                    .iter()
                    .filter_map(|t| t.parent_id.as_deref()),
            )
            .collect();

        for task in &self.tasks {
            ensure_live(cancel)?;
            let linked = task.parent_id.is_some()
                || !task.dependencies.is_empty()
                || referenced.contains(task.id.as_str());
            if !linked {
                items.push(Bottleneck {
                    kind: BottleneckType::Isolated,
                    severity: Severity::Warning,
                    entities: vec![task.id.clone()],
                    message: format!("'{}' has no parent, dependencies or referrers", task.title),
                    impact: "invisible to every breakdown".to_string(),
                    suggestion: "attach the task to a parent or dependency".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Identified risks with score ≥ 6 (critical at ≥ 9)
    fn detect_high_risks(&self, cancel: &CancelToken, items: &mut Vec<Bottleneck>) -> Result<()> {
        ensure_live(cancel)?;

        for risk in &self.risks {
            if risk.status != RiskStatus::Identified {
                continue;
            }
            let score = risk.score();
            if score < 6 {
                continue;
            }

            let severity = if score >= 9 {
                Severity::Critical
            } else {
                Severity::High
            };

            items.push(Bottleneck {
                kind: BottleneckType::HighRisk,
                severity,
                entities: vec![risk.id.clone()],
                message: format!("risk '{}' scores {} and has no mitigation", risk.title, score),
                impact: "exposure is unbounded while unmitigated".to_string(),
                suggestion: "plan a mitigation or accept the risk explicitly".to_string(),
            });
        }

        Ok(())
    }
}
