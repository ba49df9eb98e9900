//! Affinity graph
//!
//! Weighted multi-relation graph for concept-map views. Three relations
//! contribute edges (parent-child, sibling, reference); identical
//! `(source, target)` pairs merge with a type union and score as the sum
//! of their relation weights, clamped to 1.0. Large sibling groups
//! compress through a hub instead of emitting the full pair set.

use crate::{ensure_live, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeus_projections::{
    DeliverableInfo, ObjectiveInfo, QualityInfo, RiskInfo, TaskInfo, VisionInfo,
};
use zeus_store::CancelToken;

/// Relation kinds contributing to an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffinityRelation {
    ParentChild,
    Sibling,
    Reference,
}

/// Weighted edge; `types` is the sorted union of contributing relations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffinityEdge {
    pub source: String,
    pub target: String,
    pub types: Vec<AffinityRelation>,
    pub score: f64,
}

/// Objective-centered cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffinityCluster {
    pub id: String,
    pub name: String,
    /// Objective first, then its deliverables
    pub members: Vec<String>,
}

/// Per-run relation weights
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AffinityWeights {
    pub parent_child: f64,
    pub sibling: f64,
    pub reference: f64,
    pub category: f64,
}

impl Default for AffinityWeights {
    fn default() -> Self {
        Self {
            parent_child: 1.0,
            sibling: 0.7,
            reference: 0.5,
            category: 0.3,
        }
    }
}

/// Immutable affinity result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffinityGraph {
    /// Edges sorted by (source, target)
    pub edges: Vec<AffinityEdge>,
    pub clusters: Vec<AffinityCluster>,
    /// Weights actually used for this run
    pub weights: AffinityWeights,
    /// Whether any sibling group was compressed through a hub
    pub used_hub_mode: bool,
}

/// Affinity calculator
#[derive(Debug)]
pub struct AffinityCalculator {
    vision: Option<VisionInfo>,
    objectives: Vec<ObjectiveInfo>,
    deliverables: Vec<DeliverableInfo>,
    tasks: Vec<TaskInfo>,
    risks: Vec<RiskInfo>,
    quality: Vec<QualityInfo>,
    /// Sibling group size beyond which hub mode engages (default 20)
    max_siblings: usize,
    /// Edges scoring below this are dropped
    min_score: f64,
    /// Keep only the strongest N edges when positive
    max_edges: usize,
}

impl AffinityCalculator {
    pub fn new() -> Self {
        Self {
            vision: None,
            objectives: Vec::new(),
            deliverables: Vec::new(),
            tasks: Vec::new(),
            risks: Vec::new(),
            quality: Vec::new(),
            max_siblings: 20,
            min_score: 0.0,
            max_edges: 0,
        }
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

    pub fn with_risks(mut self, risks: &[RiskInfo]) -> Self {
        self.risks = risks.to_vec();
        self
    }

    pub fn with_quality(mut self, quality: &[QualityInfo]) -> Self {
        self.quality = quality.to_vec();
        self
    }

    pub fn with_max_siblings(mut self, max_siblings: usize) -> Self {
        self.max_siblings = max_siblings.max(1);
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_max_edges(mut self, max_edges: usize) -> Self {
        self.max_edges = max_edges;
        self
    }

    /// Detect edges, weigh them, filter, and cluster
    pub fn calculate(&self, cancel: &CancelToken) -> Result<AffinityGraph> {
        ensure_live(cancel)?;

        let mut detected: Vec<(String, String, AffinityRelation)> = Vec::new();
        let mut used_hub_mode = false;

        self.detect_parent_child(&mut detected);
        ensure_live(cancel)?;
        self.detect_siblings(&mut detected, &mut used_hub_mode);
        ensure_live(cancel)?;
        self.detect_references(&mut detected);

        // Merge identical (source, target) pairs with a type union.
        let mut merged: HashMap<(String, String), Vec<AffinityRelation>> = HashMap::new();
        for (source, target, relation) in detected {
            let types = merged.entry((source, target)).or_default();
            if !types.contains(&relation) {
                types.push(relation);
            }
        }

        let weights = self.compute_weights(&merged);

        ensure_live(cancel)?;
        let mut edges: Vec<AffinityEdge> = merged
            .into_iter()
            .map(|((source, target), mut types)| {
                types.sort();
                let score: f64 = types
                    .iter()
                    .map(|t| match t {
                        AffinityRelation::ParentChild => weights.parent_child,
                        AffinityRelation::Sibling => weights.sibling,
                        AffinityRelation::Reference => weights.reference,
                    })
                    .sum();
                AffinityEdge {
                    source,
                    target,
                    types,
                    score: score.min(1.0),
                }
            })
            .filter(|edge| edge.score >= self.min_score)
            .collect();

        if self.max_edges > 0 && edges.len() > self.max_edges {
            edges.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| (a.source.as_str(), a.target.as_str())
                        .cmp(&(b.source.as_str(), b.target.as_str())))
            });
            edges.truncate(self.max_edges);
        }

        edges.sort_by(|a, b| {
            (a.source.as_str(), a.target.as_str()).cmp(&(b.source.as_str(), b.target.as_str()))
        });

        let clusters = self.build_clusters(cancel)?;

        debug!(
            edges = edges.len(),
            clusters = clusters.len(),
            hub_mode = used_hub_mode,
            "affinity graph calculated"
        );

        Ok(AffinityGraph {
            edges,
            clusters,
            weights,
            used_hub_mode,
        })
    }

    fn detect_parent_child(&self, detected: &mut Vec<(String, String, AffinityRelation)>) {
        if let Some(vision) = &self.vision {
            for objective in &self.objectives {
                if objective.parent_id.is_none() {
                    detected.push((
                        vision.id.clone(),
                        objective.id.clone(),
                        AffinityRelation::ParentChild,
                    ));
                }
            }
        }

        for objective in &self.objectives {
            if let Some(parent) = &objective.parent_id {
                detected.push((
                    parent.clone(),
                    objective.id.clone(),
                    AffinityRelation::ParentChild,
                ));
            }
        }

        for deliverable in &self.deliverables {
            if !deliverable.objective_id.is_empty() {
                detected.push((
                    deliverable.objective_id.clone(),
                    deliverable.id.clone(),
                    AffinityRelation::ParentChild,
                ));
            }
        }

        for task in &self.tasks {
            if let Some(parent) = &task.parent_id {
                detected.push((parent.clone(), task.id.clone(), AffinityRelation::ParentChild));
            }
        }
    }

    /// Sibling edges inside each parent group. Groups above `max_siblings`
    /// compress through a hub: the first member in input order links to
    /// every other member, which keeps the edge count linear. Input order
    /// is stable (file-listing order), so the hub choice is deterministic.
    fn detect_siblings(
        &self,
        detected: &mut Vec<(String, String, AffinityRelation)>,
        used_hub_mode: &mut bool,
    ) {
        let mut groups: Vec<Vec<&str>> = Vec::new();

        let mut by_objective: HashMap<&str, Vec<&str>> = HashMap::new();
        for deliverable in &self.deliverables {
            if !deliverable.objective_id.is_empty() {
                by_objective
                    .entry(deliverable.objective_id.as_str())
                    .or_default()
                    .push(deliverable.id.as_str());
            }
        }
        let mut objective_keys: Vec<&str> = by_objective.keys().copied().collect();
        objective_keys.sort();
        groups.extend(objective_keys.into_iter().map(|k| by_objective[k].clone()));

        let mut by_parent: HashMap<&str, Vec<&str>> = HashMap::new();
        for task in &self.tasks {
            if let Some(parent) = task.parent_id.as_deref() {
                by_parent.entry(parent).or_default().push(task.id.as_str());
            }
        }
        let mut parent_keys: Vec<&str> = by_parent.keys().copied().collect();
        parent_keys.sort();
        groups.extend(parent_keys.into_iter().map(|k| by_parent[k].clone()));

        for ids in groups {
            if ids.len() < 2 {
                continue;
            }
            if ids.len() > self.max_siblings {
                *used_hub_mode = true;
                let hub = ids[0];
                for other in &ids[1..] {
                    detected.push((
                        hub.to_string(),
                        other.to_string(),
                        AffinityRelation::Sibling,
                    ));
                }
            } else {
                for i in 0..ids.len() {
                    for j in (i + 1)..ids.len() {
                        detected.push((
                            ids[i].to_string(),
                            ids[j].to_string(),
                            AffinityRelation::Sibling,
                        ));
                    }
                }
            }
        }
    }

    fn detect_references(&self, detected: &mut Vec<(String, String, AffinityRelation)>) {
        for quality in &self.quality {
            if let Some(deliverable) = &quality.deliverable_id {
                detected.push((
                    quality.id.clone(),
                    deliverable.clone(),
                    AffinityRelation::Reference,
                ));
            }
        }
        for risk in &self.risks {
            if let Some(objective) = &risk.objective_id {
                detected.push((risk.id.clone(), objective.clone(), AffinityRelation::Reference));
            }
            if let Some(deliverable) = &risk.deliverable_id {
                detected.push((
                    risk.id.clone(),
                    deliverable.clone(),
                    AffinityRelation::Reference,
                ));
            }
        }
    }

    /// Per-run weight adjustment: sibling weight drops as groups grow,
    /// reference weight rises with reference density.
    fn compute_weights(
        &self,
        merged: &HashMap<(String, String), Vec<AffinityRelation>>,
    ) -> AffinityWeights {
        let mut weights = AffinityWeights::default();

        let mut group_sizes: Vec<usize> = Vec::new();
        let mut by_objective: HashMap<&str, usize> = HashMap::new();
        for deliverable in &self.deliverables {
            if !deliverable.objective_id.is_empty() {
                *by_objective.entry(deliverable.objective_id.as_str()).or_default() += 1;
            }
        }
        group_sizes.extend(by_objective.values().copied().filter(|n| *n >= 2));
        let mut by_parent: HashMap<&str, usize> = HashMap::new();
        for task in &self.tasks {
            if let Some(parent) = task.parent_id.as_deref() {
                *by_parent.entry(parent).or_default() += 1;
            }
        }
        group_sizes.extend(by_parent.values().copied().filter(|n| *n >= 2));

        if !group_sizes.is_empty() {
            let average = group_sizes.iter().sum::<usize>() as f64 / group_sizes.len() as f64;
            weights.sibling = (0.8 - average * 0.015).clamp(0.5, 0.8);
        }

        let total_entities = self.objectives.len()
            + self.deliverables.len()
            + self.tasks.len()
            + self.risks.len()
            + self.quality.len()
            + usize::from(self.vision.is_some());
        if total_entities > 0 {
            let reference_count = merged
                .values()
                .filter(|types| types.contains(&AffinityRelation::Reference))
                .count();
            let ratio = reference_count as f64 / total_entities as f64;
            weights.reference = (0.4 + ratio).clamp(0.4, 0.7);
        }

        weights
    }

    /// One cluster per objective with more than one member: the objective
    /// plus its deliverables, pre-indexed so the pass stays linear.
    fn build_clusters(&self, cancel: &CancelToken) -> Result<Vec<AffinityCluster>> {
        ensure_live(cancel)?;

        let mut deliverables_by_objective: HashMap<&str, Vec<&str>> = HashMap::new();
        for deliverable in &self.deliverables {
            if !deliverable.objective_id.is_empty() {
                deliverables_by_objective
                    .entry(deliverable.objective_id.as_str())
                    .or_default()
                    .push(deliverable.id.as_str());
            }
        }

        let mut clusters = Vec::new();
        for objective in &self.objectives {
            let mut members = vec![objective.id.clone()];
            members.extend(
                deliverables_by_objective
                    .get(objective.id.as_str())
                    .into_iter()
                    .flatten()
                    .map(|id| id.to_string()),
            );
            if members.len() > 1 {
                clusters.push(AffinityCluster {
                    id: objective.id.clone(),
                    name: objective.title.clone(),
                    members,
                });
            }
        }
        clusters.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(clusters)
    }
}

impl Default for AffinityCalculator {
    fn default() -> Self {
        Self::new()
    }
}
