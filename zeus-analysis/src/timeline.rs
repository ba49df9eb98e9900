//! Critical-path timeline
//!
//! Classic CPM over dated tasks: topological order, forward pass for
//! ES/EF, backward pass for LS/LF, slack as `LS − ES`. Only tasks with at
//! least one date join the timeline; dependencies on excluded or unknown
//! tasks are ignored for traversal.

use crate::{ensure_live, Result};
use chrono::{DateTime, NaiveDate, Utc};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use zeus_projections::TaskInfo;
use zeus_store::CancelToken;

/// Scheduled view of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineTask {
    pub id: String,
    pub title: String,
    pub start: Option<NaiveDate>,
    pub due: Option<NaiveDate>,
    /// Working length in days (`due − start`, else 1)
    pub duration_days: i64,
    /// Earliest start offset from project day zero
    pub early_start: i64,
    /// Earliest finish
    pub early_finish: i64,
    /// Latest start
    pub late_start: i64,
    /// Latest finish
    pub late_finish: i64,
    /// `late_start − early_start`; zero on the critical path
    pub slack: i64,
    pub on_critical_path: bool,
}

/// Aggregate timeline statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimelineStats {
    /// Mean over non-negative slacks
    pub average_slack: f64,
    pub on_critical_path: usize,
}

/// Immutable CPM result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    /// Included tasks in topological order
    pub tasks: Vec<TimelineTask>,
    /// Earliest start date across included tasks
    pub project_start: Option<NaiveDate>,
    /// Latest due date across included tasks
    pub project_end: Option<NaiveDate>,
    /// `project_end − project_start` in days
    pub total_duration_days: i64,
    /// Zero-slack task IDs in topological order
    pub critical_path: Vec<String>,
    /// Not completed and past due, sorted
    pub overdue: Vec<String>,
    /// Completed tasks that carried a due date, sorted
    pub completed_on_time: Vec<String>,
    pub stats: TimelineStats,
}

/// Builder for [`Timeline`]
#[derive(Debug)]
pub struct TimelineBuilder {
    tasks: Vec<TaskInfo>,
    now: DateTime<Utc>,
}

impl TimelineBuilder {
    pub fn new(tasks: &[TaskInfo]) -> Self {
        Self {
            tasks: tasks.to_vec(),
            now: Utc::now(),
        }
    }

    /// Override the wall clock (reproducible tests)
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn build(&self, cancel: &CancelToken) -> Result<Timeline> {
        ensure_live(cancel)?;
        let today = self.now.date_naive();

        // Only dated tasks join the timeline.
        let included: Vec<&TaskInfo> = self
            .tasks
            .iter()
            .filter(|t| t.start_date.is_some() || t.due_date.is_some())
            .collect();
        let included_ids: HashSet<&str> = included.iter().map(|t| t.id.as_str()).collect();

        let mut overdue = Vec::new();
        let mut completed_on_time = Vec::new();
        for task in &included {
            let due = task.due_date.map(|d| d.date_naive());
            if task.status.is_completed() {
                if due.is_some() {
                    completed_on_time.push(task.id.clone());
                }
            } else if let Some(due) = due {
                if due < today {
                    overdue.push(task.id.clone());
                }
            }
        }
        overdue.sort();
        completed_on_time.sort();

        let project_start = included
            .iter()
            .filter_map(|t| t.start_date.map(|d| d.date_naive()))
            .min();
        let project_end = included
            .iter()
            .filter_map(|t| t.due_date.map(|d| d.date_naive()))
            .max();
        let total_duration_days = match (project_start, project_end) {
            (Some(start), Some(end)) => (end - start).num_days(),
            _ => 0,
        };

        let order = topological_order(cancel, &included, &included_ids)?;

        // Forward pass.
        ensure_live(cancel)?;
        let by_id: HashMap<&str, &TaskInfo> =
            included.iter().map(|t| (t.id.as_str(), *t)).collect();
        let duration = |task: &TaskInfo| -> i64 {
            match (task.start_date, task.due_date) {
                (Some(start), Some(due)) => (due.date_naive() - start.date_naive()).num_days(),
                _ => 1,
            }
        };

        let mut early_start: HashMap<&str, i64> = HashMap::new();
        let mut early_finish: HashMap<&str, i64> = HashMap::new();
        for id in &order {
            let task = by_id[id.as_str()];
            let es = task
                .dependencies
                .iter()
                .filter_map(|dep| early_finish.get(dep.as_str()))
                .copied()
                .max()
                .unwrap_or(0);
            early_start.insert(task.id.as_str(), es);
            early_finish.insert(task.id.as_str(), es + duration(task));
        }
        let project_span = early_finish.values().copied().max().unwrap_or(0);

        // Successors for the backward pass.
        let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
        for task in &included {
            for dep in &task.dependencies {
                if included_ids.contains(dep.as_str()) {
                    successors.entry(dep.as_str()).or_default().push(task.id.as_str());
                }
            }
        }

        ensure_live(cancel)?;
        let mut late_finish: HashMap<&str, i64> = HashMap::new();
        let mut late_start: HashMap<&str, i64> = HashMap::new();
        for id in order.iter().rev() {
            let task = by_id[id.as_str()];
            let lf = match successors.get(id.as_str()) {
                Some(next) if !next.is_empty() => next
                    .iter()
                    .filter_map(|s| late_start.get(s).copied())
                    .min()
                    .unwrap_or(project_span),
                _ => project_span,
            };
            late_finish.insert(task.id.as_str(), lf);
            late_start.insert(task.id.as_str(), lf - duration(task));
        }

        let mut tasks = Vec::with_capacity(order.len());
        let mut critical_path = Vec::new();
        for id in &order {
            let task = by_id[id.as_str()];
            let es = early_start[task.id.as_str()];
            let ls = late_start[task.id.as_str()];
            let slack = ls - es;
            let critical = slack == 0;
            if critical {
                critical_path.push(task.id.clone());
            }
            tasks.push(TimelineTask {
                id: task.id.clone(),
                title: task.title.clone(),
                start: task.start_date.map(|d| d.date_naive()),
                due: task.due_date.map(|d| d.date_naive()),
                duration_days: duration(task),
                early_start: es,
                early_finish: early_finish[task.id.as_str()],
                late_start: ls,
                late_finish: late_finish[task.id.as_str()],
                slack,
                on_critical_path: critical,
            });
        }

        let non_negative: Vec<i64> = tasks.iter().map(|t| t.slack).filter(|s| *s >= 0).collect();
        let stats = TimelineStats {
            average_slack: if non_negative.is_empty() {
                0.0
            } else {
                non_negative.iter().sum::<i64>() as f64 / non_negative.len() as f64
            },
            on_critical_path: critical_path.len(),
        };

        Ok(Timeline {
            tasks,
            project_start,
            project_end,
            total_duration_days,
            critical_path,
            overdue,
            completed_on_time,
            stats,
        })
    }
}

impl Timeline {
    /// Tabular text view in topological order
    pub fn to_text(&self) -> String {
        let mut out = String::from("id              ES   EF   LS   LF  slack\n");
        for task in &self.tasks {
            out.push_str(&format!(
                "{:<14} {:>4} {:>4} {:>4} {:>4} {:>6}{}\n",
                task.id,
                task.early_start,
                task.early_finish,
                task.late_start,
                task.late_finish,
                task.slack,
                if task.on_critical_path { "  *" } else { "" }
            ));
        }
        out
    }

    /// Mermaid gantt chart; critical tasks carry the `crit` tag
    pub fn to_mermaid(&self) -> String {
        let mut body = String::from("gantt\n    dateFormat YYYY-MM-DD\n    title Timeline\n");
        for task in &self.tasks {
            let Some(start) = task.start else {
                continue;
            };
            let tag = if task.on_critical_path { "crit, " } else { "" };
            body.push_str(&format!(
                "    {} :{}{}, {}, {}d\n",
                crate::render::mermaid_label(&task.title),
                tag,
                crate::render::mermaid_id(&task.id),
                start.format("%Y-%m-%d"),
                task.duration_days.max(1)
            ));
        }
        crate::render::mermaid_fence(&body)
    }
}

/// DFS visiting dependencies first; gray re-entries (cycles) are skipped
/// rather than followed, keeping the pass cycle-safe.
fn topological_order(
    cancel: &CancelToken,
    included: &[&TaskInfo],
    included_ids: &HashSet<&str>,
) -> Result<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Visiting,
        Done,
    }

    let by_id: HashMap<&str, &TaskInfo> = included.iter().map(|t| (t.id.as_str(), *t)).collect();
    let mut marks: HashMap<&str, Mark> = included
        .iter()
        .map(|t| (t.id.as_str(), Mark::Unvisited))
        .collect();
    let mut order: Vec<String> = Vec::with_capacity(included.len());

    let mut ids: Vec<&str> = included.iter().map(|t| t.id.as_str()).collect();
    ids.sort();

    for start in ids {
        ensure_live(cancel)?;
        if marks[start] != Mark::Unvisited {
            continue;
        }

        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        while let Some((id, next_dep)) = stack.pop() {
            if next_dep == 0 {
                if marks[id] == Mark::Done {
                    continue;
                }
                marks.insert(id, Mark::Visiting);
            }

            let deps = &by_id[id].dependencies;
            if next_dep < deps.len() {
                stack.push((id, next_dep + 1));
                let dep = deps[next_dep].as_str();
                if included_ids.contains(dep) && marks[dep] == Mark::Unvisited {
                    stack.push((dep, 0));
                }
            } else {
                marks.insert(id, Mark::Done);
                order.push(id.to_string());
            }
        }
    }

    Ok(order)
}
