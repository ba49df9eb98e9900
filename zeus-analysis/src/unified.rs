//! Unified structural graph
//!
//! Two-layer graph over activities and usecases, with objectives modeled
//! as *groups*. Grouping objectives (instead of making them nodes) means
//! `contributes` edges never materialize, which removes the transitive
//! cycle family those edges invited; the edge-rule matrix in
//! [`validate_edge`] still carries the full contract so a deployment that
//! turns objectives into nodes keeps the same rules.
//!
//! Candidate edges that violate the rule matrix are recorded in
//! `validation_errors` and dropped — they never abort an otherwise valid
//! build.

use crate::render::{dot_escape, mermaid_fence, mermaid_id, mermaid_label};
use crate::{ensure_live, Result};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeus_projections::{ActivityInfo, EntityStatus, ObjectiveInfo, UseCaseInfo};
use zeus_store::CancelToken;

/// Node types of the unified graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Activity,
    UseCase,
    Objective,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Activity => "activity",
            NodeType::UseCase => "usecase",
            NodeType::Objective => "objective",
        }
    }
}

/// Edge layers. Only the structural layer is modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeLayer {
    Structural,
}

impl EdgeLayer {
    pub fn as_str(&self) -> &'static str {
        "structural"
    }
}

/// Edge relations of the structural layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRelation {
    Implements,
    Contributes,
}

impl EdgeRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeRelation::Implements => "implements",
            EdgeRelation::Contributes => "contributes",
        }
    }
}

/// Node of the unified graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedNode {
    pub id: String,
    pub title: String,
    pub node_type: NodeType,
    pub status: EntityStatus,
    /// Structural predecessors (edge sources pointing at this node)
    pub structural_parents: Vec<String>,
    /// Structural successors
    pub structural_children: Vec<String>,
    /// Longest structural distance from a parentless node (0 for cycle
    /// remnants)
    pub depth: usize,
}

/// Edge of the unified graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedEdge {
    pub from: String,
    pub to: String,
    pub layer: EdgeLayer,
    pub relation: EdgeRelation,
}

/// Named node subset rendered as a container; groups never join edges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphGroup {
    pub id: String,
    pub title: String,
    /// Member node IDs, sorted
    pub node_ids: Vec<String>,
}

/// Display / reachability filter, applied in declaration order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphFilter {
    /// Keep only these node types (empty = all)
    pub include_types: Vec<NodeType>,
    /// Remove these node types
    pub exclude_types: Vec<NodeType>,
    /// Drop nodes with status completed or deprecated
    pub hide_completed: bool,
    /// Drop draft nodes
    pub hide_draft: bool,
    /// Keep only members of the named groups
    pub group_ids: Vec<String>,
    /// Keep only nodes reachable from this node ...
    pub focus_id: Option<String>,
    /// ... within this many undirected hops
    pub focus_depth: usize,
}

/// Aggregate statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedGraphStats {
    pub activity_count: usize,
    pub usecase_count: usize,
    pub objective_count: usize,
    pub total_nodes: usize,
    pub edges_by_layer: std::collections::BTreeMap<String, usize>,
    pub edges_by_relation: std::collections::BTreeMap<String, usize>,
    /// Activities retired from the structural graph (status `deprecated`)
    pub completed_activities: usize,
    pub max_structural_depth: usize,
}

/// Immutable unified graph result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedGraph {
    pub nodes: HashMap<String, UnifiedNode>,
    pub edges: Vec<UnifiedEdge>,
    pub groups: Vec<GraphGroup>,
    pub cycles: Vec<Vec<String>>,
    /// Nodes that are neither source nor target of any remaining edge,
    /// sorted
    pub isolated: Vec<String>,
    /// Soft validation failures; owned strings, stable across rebuilds
    pub validation_errors: Vec<String>,
    pub stats: UnifiedGraphStats,
}

/// Check a candidate edge against the rule matrix.
///
/// `implements` must be activity→usecase and `contributes` must be
/// usecase→objective, both on the structural layer. Anything else is an
/// error string for `validation_errors`.
pub fn validate_edge(
    from: &str,
    from_type: NodeType,
    to: &str,
    to_type: NodeType,
    layer: EdgeLayer,
    relation: EdgeRelation,
) -> std::result::Result<(), String> {
    let expected = match relation {
        EdgeRelation::Implements => (NodeType::Activity, NodeType::UseCase),
        EdgeRelation::Contributes => (NodeType::UseCase, NodeType::Objective),
    };

    if layer != EdgeLayer::Structural {
        return Err(format!(
            "edge {} -> {}: relation {} requires the structural layer",
            from,
            to,
            relation.as_str()
        ));
    }

    if (from_type, to_type) != expected {
        return Err(format!(
            "edge {} -> {}: relation {} requires {} -> {}, got {} -> {}",
            from,
            to,
            relation.as_str(),
            expected.0.as_str(),
            expected.1.as_str(),
            from_type.as_str(),
            to_type.as_str()
        ));
    }

    Ok(())
}

/// Fluent builder for [`UnifiedGraph`]
#[derive(Debug, Default)]
pub struct UnifiedGraphBuilder {
    activities: Vec<ActivityInfo>,
    usecases: Vec<UseCaseInfo>,
    objectives: Vec<ObjectiveInfo>,
    filter: Option<GraphFilter>,
}

impl UnifiedGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_activities(mut self, activities: &[ActivityInfo]) -> Self {
        self.activities = activities.to_vec();
        self
    }

    pub fn with_usecases(mut self, usecases: &[UseCaseInfo]) -> Self {
        self.usecases = usecases.to_vec();
        self
    }

    pub fn with_objectives(mut self, objectives: &[ObjectiveInfo]) -> Self {
        self.objectives = objectives.to_vec();
        self
    }

    pub fn with_filter(mut self, filter: GraphFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Build nodes, edges, groups; apply the filter passes; compute depth,
    /// cycles, isolation and statistics.
    pub fn build(&self, cancel: &CancelToken) -> Result<UnifiedGraph> {
        ensure_live(cancel)?;

        let mut nodes: HashMap<String, UnifiedNode> = HashMap::new();
        let mut validation_errors = Vec::new();

        for activity in &self.activities {
            nodes.insert(
                activity.id.clone(),
                UnifiedNode {
                    id: activity.id.clone(),
                    title: activity.title.clone(),
                    node_type: NodeType::Activity,
                    status: activity.status,
                    structural_parents: Vec::new(),
                    structural_children: Vec::new(),
                    depth: 0,
                },
            );
        }
        for usecase in &self.usecases {
            nodes.insert(
                usecase.id.clone(),
                UnifiedNode {
                    id: usecase.id.clone(),
                    title: usecase.title.clone(),
                    node_type: NodeType::UseCase,
                    status: usecase.status,
                    structural_parents: Vec::new(),
                    structural_children: Vec::new(),
                    depth: 0,
                },
            );
        }

        // Objectives become groups: each collects its usecases plus the
        // activities implementing them.
        let mut groups = self.build_groups();

        // Candidate edges, each through the rule validator.
        let mut edges: Vec<UnifiedEdge> = Vec::new();
        for activity in &self.activities {
            ensure_live(cancel)?;
            let Some(usecase_id) = activity.usecase_id.as_deref() else {
                continue;
            };
            if usecase_id.is_empty() {
                continue;
            }

            let Some(target) = nodes.get(usecase_id) else {
                validation_errors.push(format!(
                    "edge {} -> {}: unknown target",
                    activity.id, usecase_id
                ));
                continue;
            };

            match validate_edge(
                &activity.id,
                NodeType::Activity,
                usecase_id,
                target.node_type,
                EdgeLayer::Structural,
                EdgeRelation::Implements,
            ) {
                Ok(()) => edges.push(UnifiedEdge {
                    from: activity.id.clone(),
                    to: usecase_id.to_string(),
                    layer: EdgeLayer::Structural,
                    relation: EdgeRelation::Implements,
                }),
                Err(message) => validation_errors.push(message),
            }
        }

        rebuild_adjacency(&mut nodes, &edges);

        if let Some(filter) = &self.filter {
            apply_filter(cancel, filter, &mut nodes, &mut edges, &groups, &mut validation_errors)?;
            rebuild_adjacency(&mut nodes, &edges);
        }

        // Prune group membership to surviving nodes.
        for group in &mut groups {
            group.node_ids.retain(|id| nodes.contains_key(id.as_str()));
        }

        assign_depths(cancel, &mut nodes)?;
        let cycles = detect_cycles(cancel, &nodes, &edges)?;

        ensure_live(cancel)?;
        let endpoint_ids: HashSet<String> = edges
            .iter()
            .flat_map(|e| [e.from.clone(), e.to.clone()])
            .collect();
        let mut isolated: Vec<String> = nodes
            .keys()
            .filter(|id| !endpoint_ids.contains(*id))
            .cloned()
            .collect();
        isolated.sort();

        let stats = compute_stats(&nodes, &edges);

        // Stable edge order for rendering and equality.
        edges.sort_by(|a, b| {
            (a.from.as_str(), a.to.as_str(), a.layer, a.relation)
                .cmp(&(b.from.as_str(), b.to.as_str(), b.layer, b.relation))
        });

        debug!(
            nodes = stats.total_nodes,
            edges = edges.len(),
            groups = groups.len(),
            rejected = validation_errors.len(),
            "unified graph built"
        );

        Ok(UnifiedGraph {
            nodes,
            edges,
            groups,
            cycles,
            isolated,
            validation_errors,
            stats,
        })
    }

    fn build_groups(&self) -> Vec<GraphGroup> {
        let mut groups = Vec::with_capacity(self.objectives.len());
        for objective in &self.objectives {
            let usecase_ids: HashSet<&str> = self
                .usecases
                .iter()
                .filter(|uc| uc.objective_id.as_deref() == Some(objective.id.as_str()))
                .map(|uc| uc.id.as_str())
                .collect();

            let mut node_ids: Vec<String> = usecase_ids.iter().map(|id| id.to_string()).collect();
            node_ids.extend(
                self.activities
                    .iter()
                    .filter(|act| {
                        act.usecase_id
                            .as_deref()
                            .map(|uc| usecase_ids.contains(uc))
                            .unwrap_or(false)
                    })
                    .map(|act| act.id.clone()),
            );
            node_ids.sort();
            node_ids.dedup();

            groups.push(GraphGroup {
                id: objective.id.clone(),
                title: objective.title.clone(),
                node_ids,
            });
        }
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        groups
    }
}

fn rebuild_adjacency(nodes: &mut HashMap<String, UnifiedNode>, edges: &[UnifiedEdge]) {
    for node in nodes.values_mut() {
        node.structural_parents.clear();
        node.structural_children.clear();
    }
    for edge in edges {
        if let Some(node) = nodes.get_mut(edge.to.as_str()) {
            node.structural_parents.push(edge.from.clone());
        }
        if let Some(node) = nodes.get_mut(edge.from.as_str()) {
            node.structural_children.push(edge.to.clone());
        }
    }
    for node in nodes.values_mut() {
        node.structural_parents.sort();
        node.structural_children.sort();
    }
}

/// Apply the filter passes in order, pruning dangling edges after each one.
fn apply_filter(
    cancel: &CancelToken,
    filter: &GraphFilter,
    nodes: &mut HashMap<String, UnifiedNode>,
    edges: &mut Vec<UnifiedEdge>,
    groups: &[GraphGroup],
    validation_errors: &mut Vec<String>,
) -> Result<()> {
    let prune = |nodes: &HashMap<String, UnifiedNode>, edges: &mut Vec<UnifiedEdge>| {
        edges.retain(|e| nodes.contains_key(e.from.as_str()) && nodes.contains_key(e.to.as_str()));
    };

    if !filter.include_types.is_empty() {
        ensure_live(cancel)?;
        nodes.retain(|_, node| filter.include_types.contains(&node.node_type));
        prune(nodes, edges);
    }

    if !filter.exclude_types.is_empty() {
        ensure_live(cancel)?;
        nodes.retain(|_, node| !filter.exclude_types.contains(&node.node_type));
        prune(nodes, edges);
    }

    if filter.hide_completed {
        ensure_live(cancel)?;
        nodes.retain(|_, node| !node.status.is_finished());
        prune(nodes, edges);
    }

    if filter.hide_draft {
        ensure_live(cancel)?;
        nodes.retain(|_, node| node.status != EntityStatus::Draft);
        prune(nodes, edges);
    }

    if !filter.group_ids.is_empty() {
        ensure_live(cancel)?;
        let mut member_ids: HashSet<&str> = HashSet::new();
        for group_id in &filter.group_ids {
            match groups.iter().find(|g| &g.id == group_id) {
                Some(group) => member_ids.extend(group.node_ids.iter().map(String::as_str)),
                None => validation_errors.push(format!("filter names unknown group {}", group_id)),
            }
        }
        let member_ids: HashSet<String> = member_ids.iter().map(|id| id.to_string()).collect();
        nodes.retain(|id, _| member_ids.contains(id.as_str()));
        prune(nodes, edges);
    }

    if let Some(focus_id) = filter.focus_id.as_deref() {
        ensure_live(cancel)?;
        if !nodes.contains_key(focus_id) {
            // A vanished focus node would silently empty the graph; record
            // the problem and keep the current node set instead.
            validation_errors.push(format!("focus node {} not in graph", focus_id));
        } else {
            let reachable = undirected_reachable(focus_id, filter.focus_depth, edges);
            nodes.retain(|id, _| reachable.contains(id.as_str()));
            prune(nodes, edges);
        }
    }

    Ok(())
}

/// BFS over undirected adjacency, bounded by `max_depth` hops
fn undirected_reachable(
    start: &str,
    max_depth: usize,
    edges: &[UnifiedEdge],
) -> HashSet<String> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
        adjacency.entry(edge.to.as_str()).or_default().push(edge.from.as_str());
    }

    let mut reached: HashSet<String> = HashSet::new();
    reached.insert(start.to_string());
    let mut frontier: Vec<&str> = vec![start];

    for _ in 0..max_depth {
        let mut next = Vec::new();
        for id in frontier {
            for neighbor in adjacency.get(id).into_iter().flatten() {
                if reached.insert(neighbor.to_string()) {
                    next.push(*neighbor);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    reached
}

/// Fixed-point depth relaxation from parentless nodes; nodes a cycle keeps
/// unlabeled are clamped to 0.
fn assign_depths(cancel: &CancelToken, nodes: &mut HashMap<String, UnifiedNode>) -> Result<()> {
    ensure_live(cancel)?;

    let mut depths: HashMap<String, Option<usize>> = nodes
        .iter()
        .map(|(id, node)| {
            let initial = if node.structural_parents.is_empty() {
                Some(0)
            } else {
                None
            };
            (id.clone(), initial)
        })
        .collect();

    let rounds = nodes.len();
    for _ in 0..rounds {
        ensure_live(cancel)?;
        let mut changed = false;
        for (id, node) in nodes.iter() {
            let Some(depth) = depths[id.as_str()] else {
                continue;
            };
            for child in &node.structural_children {
                if let Some(slot) = depths.get_mut(child.as_str()) {
                    let proposed = depth + 1;
                    if slot.map(|d| proposed > d).unwrap_or(true) && proposed < rounds.max(1) {
                        *slot = Some(proposed);
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    for (id, node) in nodes.iter_mut() {
        node.depth = depths[id.as_str()].unwrap_or(0);
    }

    Ok(())
}

/// Tri-color DFS over the full edge set
fn detect_cycles(
    cancel: &CancelToken,
    nodes: &HashMap<String, UnifiedNode>,
    edges: &[UnifiedEdge],
) -> Result<Vec<Vec<String>>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        successors
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }
    for list in successors.values_mut() {
        list.sort();
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

        let mut path: Vec<&str> = Vec::new();
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];

        while let Some((id, next_index)) = stack.pop() {
            if next_index == 0 {
                colors.insert(id, Color::Gray);
                path.push(id);
            }

            let empty: Vec<&str> = Vec::new();
            let children = successors.get(id).unwrap_or(&empty);
            if next_index < children.len() {
                stack.push((id, next_index + 1));
                let child = children[next_index];
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

fn compute_stats(nodes: &HashMap<String, UnifiedNode>, edges: &[UnifiedEdge]) -> UnifiedGraphStats {
    let mut stats = UnifiedGraphStats {
        total_nodes: nodes.len(),
        ..Default::default()
    };

    for node in nodes.values() {
        match node.node_type {
            NodeType::Activity => {
                stats.activity_count += 1;
                if node.status == EntityStatus::Deprecated {
                    stats.completed_activities += 1;
                }
            }
            NodeType::UseCase => stats.usecase_count += 1,
            NodeType::Objective => stats.objective_count += 1,
        }
        stats.max_structural_depth = stats.max_structural_depth.max(node.depth);
    }

    for edge in edges {
        *stats
            .edges_by_layer
            .entry(edge.layer.as_str().to_string())
            .or_default() += 1;
        *stats
            .edges_by_relation
            .entry(edge.relation.as_str().to_string())
            .or_default() += 1;
    }

    stats
}

impl UnifiedGraph {
    /// Plain-text listing: groups, then nodes by (depth, id), then edges
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        for group in &self.groups {
            out.push_str(&format!("[{}] {}\n", group.id, group.title));
            for member in &group.node_ids {
                out.push_str(&format!("  - {}\n", member));
            }
        }

        let mut ids: Vec<&UnifiedNode> = self.nodes.values().collect();
        ids.sort_by(|a, b| (a.depth, a.id.as_str()).cmp(&(b.depth, b.id.as_str())));
        for node in ids {
            out.push_str(&format!(
                "{}{} ({}, {})\n",
                "  ".repeat(node.depth),
                node.id,
                node.node_type.as_str(),
                node.status
            ));
        }

        for edge in &self.edges {
            out.push_str(&format!(
                "{} -{}-> {}\n",
                edge.from,
                edge.relation.as_str(),
                edge.to
            ));
        }

        out
    }

    /// Graphviz rendering: group clusters, shaped nodes, styled edges
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph unified {\n  rankdir=TB;\n");

        for (index, group) in self.groups.iter().enumerate() {
            out.push_str(&format!(
                "  subgraph cluster_{} {{\n    label=\"{}\";\n",
                index,
                dot_escape(&group.title)
            ));
            for member in &group.node_ids {
                out.push_str(&format!("    \"{}\";\n", dot_escape(member)));
            }
            out.push_str("  }\n");
        }

        let mut nodes: Vec<&UnifiedNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        for node in nodes {
            let shape = match node.node_type {
                NodeType::Activity => "box, style=rounded",
                NodeType::UseCase => "ellipse",
                NodeType::Objective => "diamond",
            };
            out.push_str(&format!(
                "  \"{}\" [label=\"{}\", shape={}];\n",
                dot_escape(&node.id),
                dot_escape(&node.title),
                shape
            ));
        }

        for edge in &self.edges {
            let style = match edge.relation {
                EdgeRelation::Implements => "color=blue, penwidth=2",
                EdgeRelation::Contributes => "color=purple, penwidth=2",
            };
            out.push_str(&format!(
                "  \"{}\" -> \"{}\" [{}];\n",
                dot_escape(&edge.from),
                dot_escape(&edge.to),
                style
            ));
        }

        out.push_str("}\n");
        out
    }

    /// Mermaid rendering with group subgraphs
    pub fn to_mermaid(&self) -> String {
        let mut body = String::from("graph TD\n");

        for group in &self.groups {
            body.push_str(&format!(
                "    subgraph {}[\"{}\"]\n",
                mermaid_id(&group.id),
                mermaid_label(&group.title)
            ));
            for member in &group.node_ids {
                body.push_str(&format!("        {}\n", mermaid_id(member)));
            }
            body.push_str("    end\n");
        }

        let mut nodes: Vec<&UnifiedNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        for node in nodes {
            let label = mermaid_label(&node.title);
            let rendered = match node.node_type {
                NodeType::Activity => format!("{}(\"{}\")", mermaid_id(&node.id), label),
                NodeType::UseCase => format!("{}([\"{}\"])", mermaid_id(&node.id), label),
                NodeType::Objective => format!("{}{{\"{}\"}}", mermaid_id(&node.id), label),
            };
            body.push_str(&format!("    {}\n", rendered));
        }

        for edge in &self.edges {
            body.push_str(&format!(
                "    {} -->|{}| {}\n",
                mermaid_id(&edge.from),
                edge.relation.as_str(),
                mermaid_id(&edge.to)
            ));
        }

        mermaid_fence(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(id: &str, usecase: Option<&str>) -> ActivityInfo {
        ActivityInfo {
            id: id.to_string(),
            title: format!("Activity {}", id),
            usecase_id: usecase.map(String::from),
            ..Default::default()
        }
    }

    fn usecase(id: &str, objective: Option<&str>) -> UseCaseInfo {
        UseCaseInfo {
            id: id.to_string(),
            title: format!("UseCase {}", id),
            objective_id: objective.map(String::from),
            ..Default::default()
        }
    }

    fn objective(id: &str) -> ObjectiveInfo {
        ObjectiveInfo {
            id: id.to_string(),
            title: format!("Objective {}", id),
            ..Default::default()
        }
    }

    fn two_group_builder() -> UnifiedGraphBuilder {
        UnifiedGraphBuilder::new()
            .with_activities(&[
                activity("act-001", Some("uc-001")),
                activity("act-002", Some("uc-002")),
            ])
            .with_usecases(&[
                usecase("uc-001", Some("obj-001")),
                usecase("uc-002", Some("obj-002")),
            ])
            .with_objectives(&[objective("obj-001"), objective("obj-002")])
    }

    #[test]
    fn implements_edges_are_built_and_validated() {
        let graph = two_group_builder().build(&CancelToken::new()).unwrap();

        assert_eq!(graph.edges.len(), 2);
        assert!(graph.validation_errors.is_empty());
        assert!(graph
            .edges
            .iter()
            .all(|e| e.relation == EdgeRelation::Implements && e.layer == EdgeLayer::Structural));
        assert_eq!(graph.stats.edges_by_relation["implements"], 2);
    }

    #[test]
    fn objectives_become_groups_with_their_members() {
        let graph = two_group_builder().build(&CancelToken::new()).unwrap();

        assert_eq!(graph.groups.len(), 2);
        assert_eq!(graph.groups[0].id, "obj-001");
        assert_eq!(graph.groups[0].node_ids, vec!["act-001", "uc-001"]);
        // Objectives are not nodes in this policy.
        assert!(!graph.nodes.contains_key("obj-001"));
    }

    #[test]
    fn unknown_edge_target_is_a_soft_error() {
        let graph = UnifiedGraphBuilder::new()
            .with_activities(&[activity("act-001", Some("uc-404"))])
            .build(&CancelToken::new())
            .unwrap();

        assert!(graph.edges.is_empty());
        assert_eq!(graph.validation_errors.len(), 1);
        assert!(graph.validation_errors[0].contains("unknown target"));
    }

    #[test]
    fn edge_rule_matrix_rejects_wrong_endpoint_types() {
        let err = validate_edge(
            "uc-001",
            NodeType::UseCase,
            "act-001",
            NodeType::Activity,
            EdgeLayer::Structural,
            EdgeRelation::Implements,
        )
        .unwrap_err();
        assert!(err.contains("requires activity -> usecase"));

        validate_edge(
            "uc-001",
            NodeType::UseCase,
            "obj-001",
            NodeType::Objective,
            EdgeLayer::Structural,
            EdgeRelation::Contributes,
        )
        .unwrap();
    }

    #[test]
    fn group_filter_retains_exactly_the_named_group() {
        let filter = GraphFilter {
            group_ids: vec!["obj-001".to_string()],
            ..Default::default()
        };
        let graph = two_group_builder()
            .with_filter(filter)
            .build(&CancelToken::new())
            .unwrap();

        let mut ids: Vec<&String> = graph.nodes.keys().collect();
        ids.sort();
        assert_eq!(ids, vec!["act-001", "uc-001"]);
        assert_eq!(graph.edges.len(), 1);
        assert!(graph
            .edges
            .iter()
            .all(|e| e.from == "act-001" && e.to == "uc-001"));
    }

    #[test]
    fn filters_are_idempotent() {
        let filter = GraphFilter {
            hide_completed: true,
            group_ids: vec!["obj-001".to_string()],
            ..Default::default()
        };

        let once = two_group_builder()
            .with_filter(filter.clone())
            .build(&CancelToken::new())
            .unwrap();

        // Feed the filtered survivors back through the same filter.
        let surviving_activities: Vec<ActivityInfo> = [activity("act-001", Some("uc-001"))]
            .into_iter()
            .filter(|a| once.nodes.contains_key(a.id.as_str()))
            .collect();
        let surviving_usecases: Vec<UseCaseInfo> = [usecase("uc-001", Some("obj-001"))]
            .into_iter()
            .filter(|u| once.nodes.contains_key(u.id.as_str()))
            .collect();

        let again = UnifiedGraphBuilder::new()
            .with_activities(&surviving_activities)
            .with_usecases(&surviving_usecases)
            .with_objectives(&[objective("obj-001"), objective("obj-002")])
            .with_filter(filter)
            .build(&CancelToken::new())
            .unwrap();

        assert_eq!(once.edges, again.edges);
        let mut a: Vec<&String> = once.nodes.keys().collect();
        let mut b: Vec<&String> = again.nodes.keys().collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn focus_filter_limits_reach() {
        let filter = GraphFilter {
            focus_id: Some("uc-001".to_string()),
            focus_depth: 1,
            ..Default::default()
        };
        let graph = two_group_builder()
            .with_filter(filter)
            .build(&CancelToken::new())
            .unwrap();

        let mut ids: Vec<&String> = graph.nodes.keys().collect();
        ids.sort();
        assert_eq!(ids, vec!["act-001", "uc-001"]);
    }

    #[test]
    fn depth_starts_at_parentless_nodes() {
        let graph = two_group_builder().build(&CancelToken::new()).unwrap();
        assert_eq!(graph.nodes["act-001"].depth, 0);
        assert_eq!(graph.nodes["uc-001"].depth, 1);
        assert_eq!(graph.stats.max_structural_depth, 1);
    }

    #[test]
    fn isolated_nodes_have_no_edges() {
        let graph = UnifiedGraphBuilder::new()
            .with_activities(&[activity("act-001", None)])
            .with_usecases(&[usecase("uc-001", None)])
            .build(&CancelToken::new())
            .unwrap();

        assert_eq!(graph.isolated, vec!["act-001", "uc-001"]);
    }

    #[test]
    fn renderers_escape_and_stay_stable() {
        let graph = UnifiedGraphBuilder::new()
            .with_activities(&[ActivityInfo {
                id: "act-001".to_string(),
                title: "Parse [input] (fast)".to_string(),
                usecase_id: Some("uc-001".to_string()),
                ..Default::default()
            }])
            .with_usecases(&[usecase("uc-001", None)])
            .build(&CancelToken::new())
            .unwrap();

        let mermaid = graph.to_mermaid();
        assert!(mermaid.contains("#91;input#93;"));
        assert!(mermaid.contains("act_001 -->|implements| uc_001"));
        assert_eq!(graph.to_dot(), graph.to_dot());
        assert!(graph.to_dot().contains("color=blue"));
    }

    #[test]
    fn pre_cancelled_token_short_circuits() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = two_group_builder().build(&cancel).unwrap_err();
        assert!(matches!(err, crate::AnalysisError::Cancelled));
    }
}
