//! Task dependency graph
//!
//! Builds a DAG over tasks where an edge `A -> B` means "A depends on B".
//! Cycles are detected and surfaced, never executed through: depth
//! propagation and rendering stay bounded on cyclic input.

use crate::render::{dot_escape, mermaid_fence, mermaid_id, mermaid_label};
use crate::{ensure_live, Result};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeus_projections::{EntityStatus, TaskInfo};
use zeus_store::CancelToken;

/// Node of the dependency graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// The projected task
    pub task: TaskInfo,

    /// Dependency IDs, verbatim from the projection (targets may not exist)
    pub children: Vec<String>,

    /// Tasks that depend on this one
    pub parents: Vec<String>,

    /// BFS depth from the nearest root (0 for roots and disconnected nodes)
    pub depth: usize,
}

/// Directed edge `from` depends on `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

/// Aggregate graph statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub cycle_count: usize,
    pub isolated_count: usize,
    pub max_depth: usize,
}

/// Immutable dependency graph result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: HashMap<String, GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Each cycle lists its nodes in discovery order, closed by repeating
    /// the entry node
    pub cycles: Vec<Vec<String>>,
    /// Nodes with neither dependencies nor dependents, sorted
    pub isolated: Vec<String>,
    pub stats: GraphStats,
}

/// Builder for [`DependencyGraph`]
#[derive(Debug)]
pub struct GraphBuilder {
    tasks: Vec<TaskInfo>,
}

impl GraphBuilder {
    pub fn new(tasks: &[TaskInfo]) -> Self {
        Self {
            tasks: tasks.to_vec(),
        }
    }

    /// Build the graph: nodes, reverse edges, cycles, isolation, depth.
    pub fn build(&self, cancel: &CancelToken) -> Result<DependencyGraph> {
        ensure_live(cancel)?;

        let mut nodes: HashMap<String, GraphNode> = HashMap::with_capacity(self.tasks.len());
        let mut edges = Vec::new();

        for task in &self.tasks {
            for dep in &task.dependencies {
                edges.push(GraphEdge {
                    from: task.id.clone(),
                    to: dep.clone(),
                });
            }
            nodes.insert(
                task.id.clone(),
                GraphNode {
                    children: task.dependencies.clone(),
                    parents: Vec::new(),
                    depth: 0,
                    task: task.clone(),
                },
            );
        }

        // Reverse edges; unresolved targets stay recorded in `edges` but do
        // not materialize a parent entry.
        for task in &self.tasks {
            for dep in &task.dependencies {
                if let Some(node) = nodes.get_mut(dep.as_str()) {
                    node.parents.push(task.id.clone());
                }
            }
        }

        let cycles = detect_cycles(cancel, &nodes)?;

        ensure_live(cancel)?;
        let mut isolated: Vec<String> = nodes
            .iter()
            .filter(|(_, node)| node.children.is_empty() && node.parents.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        isolated.sort();

        assign_depths(cancel, &mut nodes)?;

        let max_depth = nodes.values().map(|n| n.depth).max().unwrap_or(0);
        let stats = GraphStats {
            total_nodes: nodes.len(),
            total_edges: edges.len(),
            cycle_count: cycles.len(),
            isolated_count: isolated.len(),
            max_depth,
        };
        debug!(
            nodes = stats.total_nodes,
            edges = stats.total_edges,
            cycles = stats.cycle_count,
            "dependency graph built"
        );

        Ok(DependencyGraph {
            nodes,
            edges,
            cycles,
            isolated,
            stats,
        })
    }
}

/// Tri-color DFS cycle detection.
///
/// White = unvisited, gray = on the current stack, black = finished.
/// Meeting a gray neighbor closes a cycle: the reported slice starts at
/// that neighbor's position on the stack and repeats it at the end.
fn detect_cycles(
    cancel: &CancelToken,
    nodes: &HashMap<String, GraphNode>,
) -> Result<Vec<Vec<String>>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut colors: HashMap<&str, Color> =
        nodes.keys().map(|id| (id.as_str(), Color::White)).collect();
    let mut cycles = Vec::new();

    let mut ids: Vec<&String> = nodes.keys().collect();
    ids.sort();

    for start in ids {
        ensure_live(cancel)?;
        if colors[start.as_str()] != Color::White {
            continue;
        }

        // Iterative DFS keeping the explicit gray path for cycle extraction.
        let mut path: Vec<&str> = Vec::new();
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];

        while let Some((id, next_child)) = stack.pop() {
            if next_child == 0 {
                colors.insert(id, Color::Gray);
                path.push(id);
            }

            let children = &nodes[id].children;
            if next_child < children.len() {
                stack.push((id, next_child + 1));
                let child = children[next_child].as_str();
                match colors.get(child) {
                    Some(Color::White) => stack.push((child, 0)),
                    Some(Color::Gray) => {
                        let entry = path.iter().position(|&p| p == child).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[entry..].iter().map(|s| s.to_string()).collect();
                        cycle.push(child.to_string());
                        cycles.push(cycle);
                    }
                    _ => {}
                }
            } else {
                colors.insert(id, Color::Black);
                path.pop();
            }
        }
    }

    Ok(cycles)
}

/// Forward BFS from the roots, relaxing each child to
/// `max(current, parent + 1)`. Depth is capped below the node count so a
/// cycle cannot relax forever; disconnected nodes keep depth 0.
fn assign_depths(cancel: &CancelToken, nodes: &mut HashMap<String, GraphNode>) -> Result<()> {
    ensure_live(cancel)?;

    let limit = nodes.len();
    let mut queue: std::collections::VecDeque<String> = nodes
        .iter()
        .filter(|(_, node)| node.parents.is_empty())
        .map(|(id, _)| id.clone())
        .collect();

    while let Some(id) = queue.pop_front() {
        let (depth, children) = {
            let node = &nodes[&id];
            (node.depth, node.children.clone())
        };
        for child in children {
            if let Some(child_node) = nodes.get_mut(&child) {
                let proposed = depth + 1;
                if proposed > child_node.depth && proposed < limit {
                    child_node.depth = proposed;
                    queue.push_back(child);
                }
            }
        }
    }

    Ok(())
}

impl DependencyGraph {
    /// IDs transitively depending on `id` (follows `parents`), sorted
    pub fn downstream_tasks(&self, id: &str) -> Vec<String> {
        self.traverse(id, |node| &node.parents)
    }

    /// IDs `id` transitively depends on (follows `children`), sorted
    pub fn upstream_tasks(&self, id: &str) -> Vec<String> {
        self.traverse(id, |node| &node.children)
    }

    fn traverse<'a, F>(&'a self, id: &str, next: F) -> Vec<String>
    where
        F: Fn(&'a GraphNode) -> &'a Vec<String>,
    {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                for neighbor in next(node) {
                    if neighbor != id && seen.insert(neighbor.as_str()) {
                        stack.push(neighbor);
                    }
                }
            }
        }

        let mut result: Vec<String> = seen.into_iter().map(String::from).collect();
        result.sort();
        result
    }

    /// ASCII tree from the roots
    pub fn to_text(&self) -> String {
        let mut roots: Vec<&String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parents.is_empty())
            .map(|(id, _)| id)
            .collect();
        roots.sort();

        let mut out = String::new();
        for root in roots {
            let mut visited = HashSet::new();
            self.render_subtree(root, "", true, true, &mut visited, &mut out);
        }
        out
    }

    fn render_subtree(
        &self,
        id: &str,
        prefix: &str,
        is_last: bool,
        is_root: bool,
        visited: &mut HashSet<String>,
        out: &mut String,
    ) {
        let title = self
            .nodes
            .get(id)
            .map(|n| n.task.title.as_str())
            .unwrap_or("?");

        if is_root {
            out.push_str(&format!("{} [{}]\n", title, id));
        } else {
            let connector = if is_last { "└─" } else { "├─" };
            out.push_str(&format!("{}{} {} [{}]\n", prefix, connector, title, id));
        }

        if !visited.insert(id.to_string()) {
            return;
        }

        let children: Vec<&String> = match self.nodes.get(id) {
            Some(node) => node
                .children
                .iter()
                .filter(|c| self.nodes.contains_key(c.as_str()))
                .collect(),
            None => Vec::new(),
        };

        for (i, child) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            let child_prefix = if is_root {
                String::new()
            } else {
                format!("{}{}", prefix, if is_last { "   " } else { "│  " })
            };
            self.render_subtree(child, &child_prefix, last, false, visited, out);
        }
    }

    /// Graphviz rendering with status fill colors
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph dependencies {\n");
        out.push_str("  rankdir=TB;\n  node [shape=box, style=filled];\n");

        let mut ids: Vec<&String> = self.nodes.keys().collect();
        ids.sort();
        for id in ids {
            let node = &self.nodes[id.as_str()];
            let fill = match node.task.status {
                EntityStatus::Completed => "lightgreen",
                EntityStatus::InProgress => "lightyellow",
                EntityStatus::Blocked => "lightcoral",
                _ => "white",
            };
            out.push_str(&format!(
                "  \"{}\" [label=\"{}\", fillcolor={}];\n",
                dot_escape(id),
                dot_escape(&node.task.title),
                fill
            ));
        }

        let mut edges = self.edges.clone();
        edges.sort_by(|a, b| (a.from.as_str(), a.to.as_str()).cmp(&(b.from.as_str(), b.to.as_str())));
        for edge in &edges {
            out.push_str(&format!(
                "  \"{}\" -> \"{}\";\n",
                dot_escape(&edge.from),
                dot_escape(&edge.to)
            ));
        }

        out.push_str("}\n");
        out
    }

    /// Mermaid rendering
    pub fn to_mermaid(&self) -> String {
        let mut body = String::from("graph TD\n");

        let mut ids: Vec<&String> = self.nodes.keys().collect();
        ids.sort();
        for id in ids {
            let node = &self.nodes[id.as_str()];
            body.push_str(&format!(
                "    {}[\"{}\"]\n",
                mermaid_id(id),
                mermaid_label(&node.task.title)
            ));
        }

        let mut edges = self.edges.clone();
        edges.sort_by(|a, b| (a.from.as_str(), a.to.as_str()).cmp(&(b.from.as_str(), b.to.as_str())));
        for edge in &edges {
            body.push_str(&format!(
                "    {} --> {}\n",
                mermaid_id(&edge.from),
                mermaid_id(&edge.to)
            ));
        }

        mermaid_fence(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> TaskInfo {
        TaskInfo {
            id: id.to_string(),
            title: format!("Task {}", id),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn cycle_a_b_c_is_reported() {
        let tasks = vec![
            task("task-a", &["task-b"]),
            task("task-b", &["task-c"]),
            task("task-c", &["task-a"]),
        ];
        let graph = GraphBuilder::new(&tasks).build(&CancelToken::new()).unwrap();

        assert!(!graph.cycles.is_empty());
        let mut members: Vec<&str> = graph.cycles[0].iter().map(String::as_str).collect();
        members.dedup();
        members.sort();
        assert_eq!(members, vec!["task-a", "task-b", "task-c"]);
    }

    #[test]
    fn isolated_nodes_are_sorted() {
        let tasks = vec![
            task("task-z", &[]),
            task("task-a", &[]),
            task("task-b", &["task-a"]),
        ];
        let graph = GraphBuilder::new(&tasks).build(&CancelToken::new()).unwrap();
        assert_eq!(graph.isolated, vec!["task-z"]);
    }

    #[test]
    fn depth_is_max_over_parents() {
        // d depends on c and a; c depends on a: d must sit below c.
        let tasks = vec![
            task("task-a", &[]),
            task("task-c", &["task-a"]),
            task("task-d", &["task-c", "task-a"]),
        ];
        let graph = GraphBuilder::new(&tasks).build(&CancelToken::new()).unwrap();

        // task-d is the only root (nothing depends on it).
        assert_eq!(graph.nodes["task-d"].depth, 0);
        assert_eq!(graph.nodes["task-c"].depth, 1);
        assert_eq!(graph.nodes["task-a"].depth, 2);
        assert_eq!(graph.stats.max_depth, 2);
    }

    #[test]
    fn unresolved_dependency_is_recorded_but_not_traversed() {
        let tasks = vec![task("task-a", &["task-ghost"])];
        let graph = GraphBuilder::new(&tasks).build(&CancelToken::new()).unwrap();

        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].to, "task-ghost");
        assert!(!graph.nodes.contains_key("task-ghost"));
        assert!(graph.cycles.is_empty());
    }

    #[test]
    fn upstream_downstream_are_sorted_unique() {
        let tasks = vec![
            task("task-a", &[]),
            task("task-b", &["task-a"]),
            task("task-c", &["task-b", "task-a"]),
        ];
        let graph = GraphBuilder::new(&tasks).build(&CancelToken::new()).unwrap();

        assert_eq!(graph.upstream_tasks("task-c"), vec!["task-a", "task-b"]);
        assert_eq!(graph.downstream_tasks("task-a"), vec!["task-b", "task-c"]);
        assert!(graph.downstream_tasks("task-c").is_empty());
    }

    #[test]
    fn pre_cancelled_token_returns_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = GraphBuilder::new(&[task("task-a", &[])])
            .build(&cancel)
            .unwrap_err();
        assert!(matches!(err, crate::AnalysisError::Cancelled));
    }

    #[test]
    fn renderers_are_deterministic() {
        let tasks = vec![
            task("task-b", &["task-a"]),
            task("task-a", &[]),
        ];
        let graph = GraphBuilder::new(&tasks).build(&CancelToken::new()).unwrap();

        assert_eq!(graph.to_dot(), graph.to_dot());
        assert!(graph.to_dot().contains("\"task-b\" -> \"task-a\""));
        assert!(graph.to_mermaid().contains("task_b --> task_a"));
        assert!(graph.to_mermaid().starts_with("```mermaid\n"));
    }

    #[test]
    fn dot_colors_follow_status() {
        let mut done = task("task-a", &[]);
        done.status = EntityStatus::Completed;
        let mut stuck = task("task-b", &["task-a"]);
        stuck.status = EntityStatus::Blocked;

        let graph = GraphBuilder::new(&[done, stuck]).build(&CancelToken::new()).unwrap();
        let dot = graph.to_dot();
        assert!(dot.contains("fillcolor=lightgreen"));
        assert!(dot.contains("fillcolor=lightcoral"));
    }
}
