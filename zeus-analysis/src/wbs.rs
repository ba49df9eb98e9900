//! Work-breakdown structure
//!
//! Two builders share one node shape: [`WbsBuilder`] decomposes a single
//! task set along `parent_id`, [`MultiEntityWbsBuilder`] assembles the
//! five-layer Vision → Objective → Objective → Deliverable → Task tree.
//! Parent cycles fail the build with the offending path; missing parents
//! demote the child to a root instead of failing.

use crate::render::{mermaid_fence, mermaid_id, mermaid_label};
use crate::{ensure_live, AnalysisError, Result};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use zeus_projections::{DeliverableInfo, EntityStatus, ObjectiveInfo, TaskInfo, VisionInfo};
use zeus_store::CancelToken;

/// Entity kind of a WBS node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WbsNodeKind {
    Vision,
    Objective,
    Deliverable,
    Task,
}

/// One node of the breakdown tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WbsNode {
    pub id: String,
    pub title: String,
    /// Dot-separated code, empty when not yet assigned
    pub wbs_code: String,
    pub status: EntityStatus,
    pub progress: u8,
    pub priority: String,
    pub assignee: String,
    pub kind: WbsNodeKind,
    pub children: Vec<WbsNode>,
    pub depth: usize,
}

/// Aggregate tree statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WbsStats {
    pub total_nodes: usize,
    pub root_count: usize,
    pub leaf_count: usize,
    pub max_depth: usize,
    pub avg_progress: f64,
    pub completed_pct: f64,
}

/// Immutable breakdown tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WbsTree {
    pub roots: Vec<WbsNode>,
    pub stats: WbsStats,
}

/// Natural WBS-code ordering: numeric per dot-segment, a prefix sorts
/// before its extensions, the empty code sorts last.
///
/// `"1.2" < "1.2.1" < "1.2.10" < "1.3"`
pub fn compare_wbs_codes(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ls), Some(rs)) => {
                let ln: u64 = ls.parse().unwrap_or(u64::MAX);
                let rn: u64 = rs.parse().unwrap_or(u64::MAX);
                match ln.cmp(&rn) {
                    Ordering::Equal => continue,
                    unequal => return unequal,
                }
            }
        }
    }
}

/// Single-entity breakdown along task `parent_id` chains
#[derive(Debug)]
pub struct WbsBuilder {
    tasks: Vec<TaskInfo>,
}

impl WbsBuilder {
    pub fn new(tasks: &[TaskInfo]) -> Self {
        Self {
            tasks: tasks.to_vec(),
        }
    }

    pub fn build(&self, cancel: &CancelToken) -> Result<WbsTree> {
        ensure_live(cancel)?;

        detect_parent_cycles(cancel, &self.tasks)?;

        let index: HashMap<&str, &TaskInfo> =
            self.tasks.iter().map(|t| (t.id.as_str(), t)).collect();

        // Children in input order; the sibling sort happens per level.
        let mut children: HashMap<&str, Vec<&TaskInfo>> = HashMap::new();
        let mut roots: Vec<&TaskInfo> = Vec::new();
        for task in &self.tasks {
            match task
                .parent_id
                .as_deref()
                .filter(|pid| index.contains_key(pid))
            {
                Some(parent) => children.entry(parent).or_default().push(task),
                None => roots.push(task),
            }
        }

        let mut root_nodes: Vec<WbsNode> = roots
            .iter()
            .map(|task| build_task_node(cancel, task, &children, 0))
            .collect::<Result<_>>()?;
        sort_siblings(&mut root_nodes);

        let stats = compute_stats(&root_nodes, false);
        Ok(WbsTree {
            roots: root_nodes,
            stats,
        })
    }
}

fn build_task_node(
    cancel: &CancelToken,
    task: &TaskInfo,
    children: &HashMap<&str, Vec<&TaskInfo>>,
    depth: usize,
) -> Result<WbsNode> {
    ensure_live(cancel)?;

    let mut child_nodes: Vec<WbsNode> = children
        .get(task.id.as_str())
        .map(|kids| {
            kids.iter()
                .map(|kid| build_task_node(cancel, kid, children, depth + 1))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();
    sort_siblings(&mut child_nodes);

    Ok(WbsNode {
        id: task.id.clone(),
        title: task.title.clone(),
        wbs_code: task.wbs_code.clone().unwrap_or_default(),
        status: task.status,
        progress: task.progress,
        priority: task.priority.clone(),
        assignee: task.assignee.clone(),
        kind: WbsNodeKind::Task,
        children: child_nodes,
        depth,
    })
}

fn sort_siblings(nodes: &mut [WbsNode]) {
    nodes.sort_by(|a, b| {
        compare_wbs_codes(&a.wbs_code, &b.wbs_code).then_with(|| a.id.cmp(&b.id))
    });
}

/// Tri-color walk over `parent_id` chains; a gray hit is a cycle and the
/// build fails with the path that closed it.
fn detect_parent_cycles(cancel: &CancelToken, tasks: &[TaskInfo]) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let parent_of: HashMap<&str, &str> = tasks
        .iter()
        .filter_map(|t| t.parent_id.as_deref().map(|p| (t.id.as_str(), p)))
        .collect();
    let known: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

    let mut colors: HashMap<&str, Color> =
        known.iter().map(|id| (*id, Color::White)).collect();

    let mut ids: Vec<&str> = known.iter().copied().collect();
    ids.sort();

    for start in ids {
        ensure_live(cancel)?;
        if colors[start] != Color::White {
            continue;
        }

        let mut path: Vec<&str> = Vec::new();
        let mut current = start;
        loop {
            colors.insert(current, Color::Gray);
            path.push(current);

            let Some(&parent) = parent_of.get(current).filter(|p| known.contains(*p)) else {
                break;
            };
            match colors[parent] {
                Color::White => current = parent,
                Color::Gray => {
                    let entry = path.iter().position(|&p| p == parent).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[entry..].iter().map(|s| s.to_string()).collect();
                    cycle.push(parent.to_string());
                    return Err(AnalysisError::ParentCycle { path: cycle });
                }
                Color::Black => break,
            }
        }
        for id in path {
            colors.insert(id, Color::Black);
        }
    }

    Ok(())
}

/// Five-layer breakdown: Vision → Objective (L2) → Objective (L3) →
/// Deliverable → Task
#[derive(Debug, Default)]
pub struct MultiEntityWbsBuilder {
    vision: Option<VisionInfo>,
    objectives: Vec<ObjectiveInfo>,
    deliverables: Vec<DeliverableInfo>,
    tasks: Vec<TaskInfo>,
}

impl MultiEntityWbsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vision(mut self, vision: Option<VisionInfo>) -> Self {
        self.vision = vision;
        self
    }

    pub fn with_objectives(mut self, objectives: &[ObjectiveInfo]) -> Self {
        self.objectives = objectives.to_vec();
        self
    }

    pub fn with_deliverables(mut self, deliverables: &[DeliverableInfo]) -> Self {
        self.deliverables = deliverables.to_vec();
        self
    }

    pub fn with_tasks(mut self, tasks: &[TaskInfo]) -> Self {
        self.tasks = tasks.to_vec();
        self
    }

    pub fn build(&self, cancel: &CancelToken) -> Result<WbsTree> {
        ensure_live(cancel)?;

        let objective_ids: HashSet<&str> =
            self.objectives.iter().map(|o| o.id.as_str()).collect();
        let deliverable_ids: HashSet<&str> =
            self.deliverables.iter().map(|d| d.id.as_str()).collect();

        // Tasks attach under a deliverable or objective when the projection
        // carries the link; everything else stays an orphan at root level.
        let mut tasks_by_parent: HashMap<&str, Vec<&TaskInfo>> = HashMap::new();
        let mut orphan_tasks: Vec<&TaskInfo> = Vec::new();
        for task in &self.tasks {
            ensure_live(cancel)?;
            let attachment = task
                .deliverable_id
                .as_deref()
                .filter(|id| deliverable_ids.contains(id))
                .or_else(|| {
                    task.objective_id
                        .as_deref()
                        .filter(|id| objective_ids.contains(id))
                })
                .or_else(|| {
                    task.parent_id.as_deref().filter(|id| {
                        deliverable_ids.contains(id) || objective_ids.contains(id)
                    })
                });
            match attachment {
                Some(parent) => tasks_by_parent.entry(parent).or_default().push(task),
                None => orphan_tasks.push(task),
            }
        }

        let deliverable_node = |deliverable: &DeliverableInfo, depth: usize| -> WbsNode {
            let mut children: Vec<WbsNode> = tasks_by_parent
                .get(deliverable.id.as_str())
                .map(|tasks| {
                    tasks
                        .iter()
                        .map(|t| leaf_task_node(t, depth + 1))
                        .collect()
                })
                .unwrap_or_default();
            sort_siblings(&mut children);
            WbsNode {
                id: deliverable.id.clone(),
                title: deliverable.title.clone(),
                wbs_code: String::new(),
                status: deliverable.status,
                progress: deliverable.progress,
                priority: String::new(),
                assignee: String::new(),
                kind: WbsNodeKind::Deliverable,
                children,
                depth,
            }
        };

        let objective_node = |objective: &ObjectiveInfo, depth: usize, with_children: bool| {
            let mut children: Vec<WbsNode> = Vec::new();
            if with_children {
                children.extend(
                    self.deliverables
                        .iter()
                        .filter(|d| d.objective_id == objective.id)
                        .map(|d| deliverable_node(d, depth + 1)),
                );
                children.extend(
                    tasks_by_parent
                        .get(objective.id.as_str())
                        .into_iter()
                        .flatten()
                        .map(|t| leaf_task_node(t, depth + 1)),
                );
                sort_siblings(&mut children);
            }
            WbsNode {
                id: objective.id.clone(),
                title: objective.title.clone(),
                wbs_code: String::new(),
                status: objective.status,
                progress: objective.progress,
                priority: String::new(),
                assignee: String::new(),
                kind: WbsNodeKind::Objective,
                children,
                depth,
            }
        };

        // L2 objectives carry no resolvable parent; L3 objectives nest
        // under their L2 parent.
        let mut level2: Vec<WbsNode> = Vec::new();
        for objective in &self.objectives {
            ensure_live(cancel)?;
            let has_parent = objective
                .parent_id
                .as_deref()
                .map(|p| objective_ids.contains(p))
                .unwrap_or(false);
            if has_parent {
                continue;
            }

            let depth = if self.vision.is_some() { 1 } else { 0 };
            let mut node = objective_node(objective, depth, true);
            let mut nested: Vec<WbsNode> = self
                .objectives
                .iter()
                .filter(|o| o.parent_id.as_deref() == Some(objective.id.as_str()))
                .map(|o| objective_node(o, depth + 1, true))
                .collect();
            sort_siblings(&mut nested);
            node.children.extend(nested);
            level2.push(node);
        }
        sort_siblings(&mut level2);

        let mut roots: Vec<WbsNode> = match &self.vision {
            Some(vision) => vec![WbsNode {
                id: vision.id.clone(),
                title: vision.title.clone(),
                wbs_code: String::new(),
                status: EntityStatus::Active,
                progress: 0,
                priority: String::new(),
                assignee: String::new(),
                kind: WbsNodeKind::Vision,
                children: level2,
                depth: 0,
            }],
            None => level2,
        };

        // Orphans land at root level, after the structured tree.
        let mut orphans: Vec<WbsNode> =
            orphan_tasks.iter().map(|t| leaf_task_node(t, 0)).collect();
        sort_siblings(&mut orphans);
        roots.extend(orphans);

        normalize_depths(&mut roots, 0);

        let stats = compute_stats(&roots, true);
        Ok(WbsTree { roots, stats })
    }
}

fn leaf_task_node(task: &TaskInfo, depth: usize) -> WbsNode {
    WbsNode {
        id: task.id.clone(),
        title: task.title.clone(),
        wbs_code: task.wbs_code.clone().unwrap_or_default(),
        status: task.status,
        progress: task.progress,
        priority: task.priority.clone(),
        assignee: task.assignee.clone(),
        kind: WbsNodeKind::Task,
        children: Vec::new(),
        depth,
    }
}

fn normalize_depths(nodes: &mut [WbsNode], depth: usize) {
    for node in nodes {
        node.depth = depth;
        normalize_depths(&mut node.children, depth + 1);
    }
}

fn compute_stats(roots: &[WbsNode], exclude_vision_progress: bool) -> WbsStats {
    fn walk<'a>(node: &'a WbsNode, all: &mut Vec<&'a WbsNode>) {
        all.push(node);
        for child in &node.children {
            walk(child, all);
        }
    }

    let mut all: Vec<&WbsNode> = Vec::new();
    for root in roots {
        walk(root, &mut all);
    }

    let progress_nodes: Vec<&&WbsNode> = all
        .iter()
        .filter(|n| !(exclude_vision_progress && n.kind == WbsNodeKind::Vision))
        .collect();

    let total = all.len();
    let completed = all
        .iter()
        .filter(|n| n.status == EntityStatus::Completed)
        .count();

    WbsStats {
        total_nodes: total,
        root_count: roots.len(),
        leaf_count: all.iter().filter(|n| n.children.is_empty()).count(),
        max_depth: all.iter().map(|n| n.depth).max().unwrap_or(0),
        avg_progress: if progress_nodes.is_empty() {
            0.0
        } else {
            progress_nodes.iter().map(|n| n.progress as f64).sum::<f64>()
                / progress_nodes.len() as f64
        },
        completed_pct: if total == 0 {
            0.0
        } else {
            completed as f64 * 100.0 / total as f64
        },
    }
}

impl WbsTree {
    /// Reassign codes top-down in the current sibling order:
    /// "1", "1.1", "1.1.2", …
    pub fn generate_wbs_codes(&mut self) {
        fn assign(nodes: &mut [WbsNode], prefix: &str) {
            for (index, node) in nodes.iter_mut().enumerate() {
                let code = if prefix.is_empty() {
                    format!("{}", index + 1)
                } else {
                    format!("{}.{}", prefix, index + 1)
                };
                assign(&mut node.children, &code);
                node.wbs_code = code;
            }
        }
        assign(&mut self.roots, "");
    }

    /// ASCII tree with a 10-cell progress bar and status icon per node
    pub fn to_text(&self) -> String {
        fn icon(status: EntityStatus) -> char {
            match status {
                EntityStatus::Completed => '✓',
                EntityStatus::InProgress => '●',
                EntityStatus::Blocked => '✗',
                _ => '○',
            }
        }

        fn bar(progress: u8) -> String {
            let filled = (progress.min(100) / 10) as usize;
            format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled))
        }

        fn line(node: &WbsNode, prefix: &str, is_last: bool, is_root: bool, out: &mut String) {
            let code = if node.wbs_code.is_empty() {
                String::new()
            } else {
                format!("[{}] ", node.wbs_code)
            };
            if is_root {
                out.push_str(&format!(
                    "{} {}{} {} {}%\n",
                    icon(node.status),
                    code,
                    node.title,
                    bar(node.progress),
                    node.progress
                ));
            } else {
                let connector = if is_last { "└─" } else { "├─" };
                out.push_str(&format!(
                    "{}{} {} {}{} {} {}%\n",
                    prefix,
                    connector,
                    icon(node.status),
                    code,
                    node.title,
                    bar(node.progress),
                    node.progress
                ));
            }

            for (i, child) in node.children.iter().enumerate() {
                let last = i + 1 == node.children.len();
                let child_prefix = if is_root {
                    String::new()
                } else {
                    format!("{}{}", prefix, if is_last { "   " } else { "│  " })
                };
                line(child, &child_prefix, last, false, out);
            }
        }

        let mut out = String::new();
        for root in &self.roots {
            line(root, "", true, true, &mut out);
        }
        out
    }

    /// Mermaid rendering with per-kind shapes and progress-bucket classes
    pub fn to_mermaid(&self) -> String {
        fn shape(node: &WbsNode) -> String {
            let id = mermaid_id(&node.id);
            let label = mermaid_label(&node.title);
            match node.kind {
                WbsNodeKind::Vision => format!("{}((\"{}\"))", id, label),
                WbsNodeKind::Objective => format!("{}[\"{}\"]", id, label),
                WbsNodeKind::Deliverable => format!("{}([\"{}\"])", id, label),
                WbsNodeKind::Task => format!("{}{{{{\"{}\"}}}}", id, label),
            }
        }

        fn bucket(progress: u8) -> &'static str {
            if progress >= 100 {
                "done"
            } else if progress > 0 {
                "active"
            } else {
                "idle"
            }
        }

        fn emit(node: &WbsNode, body: &mut String) {
            body.push_str(&format!("    {}\n", shape(node)));
            body.push_str(&format!(
                "    class {} {}\n",
                mermaid_id(&node.id),
                bucket(node.progress)
            ));
            for child in &node.children {
                body.push_str(&format!(
                    "    {} --> {}\n",
                    mermaid_id(&node.id),
                    mermaid_id(&child.id)
                ));
                emit(child, body);
            }
        }

        let mut body = String::from("graph TD\n");
        body.push_str("    classDef done fill:#9f9,stroke:#090\n");
        body.push_str("    classDef active fill:#ff9,stroke:#990\n");
        body.push_str("    classDef idle fill:#ddd,stroke:#999\n");
        for root in &self.roots {
            emit(root, &mut body);
        }
        mermaid_fence(&body)
    }
}
