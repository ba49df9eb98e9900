//! # Zeus Analysis Engines
//!
//! The analytical core of Zeus: seven engines that reason over entity
//! projections and return immutable, deterministic reports.
//!
//! - [`depgraph`] — task dependency DAG with cycle detection and BFS depth
//! - [`unified`] — two-layer structural graph over activities, usecases and
//!   objectives, with edge-rule validation, filters and groups
//! - [`wbs`] — single- and multi-entity work-breakdown trees
//! - [`timeline`] — critical-path (CPM) schedule computation
//! - [`predictor`] — completion forecasts from snapshot history
//! - [`bottleneck`] — block chains, overdue, stagnation, isolation,
//!   un-mitigated risks
//! - [`affinity`] — weighted multi-relation graph with hub-mode compression
//! - [`stale`] / [`coverage`] — lifecycle hygiene
//! - [`render`] — shared DOT / Mermaid escape helpers
//!
//! ## Contract
//!
//! Engines are pure: they borrow projections read-only, never touch the
//! store, and two invocations over the same input produce byte-identical
//! output. Every public operation takes a [`zeus_store::CancelToken`] and
//! returns [`AnalysisError::Cancelled`] without partial results once the
//! token fires.

pub mod affinity;
pub mod bottleneck;
pub mod coverage;
pub mod depgraph;
pub mod predictor;
pub mod render;
pub mod stale;
pub mod timeline;
pub mod unified;
pub mod wbs;

pub use affinity::{
    AffinityCalculator, AffinityCluster, AffinityEdge, AffinityGraph, AffinityRelation,
    AffinityWeights,
};
pub use bottleneck::{
    Bottleneck, BottleneckAnalyzer, BottleneckReport, BottleneckSummary, BottleneckType, Severity,
};
pub use coverage::{CoverageAnalyzer, CoverageIssue, CoverageReport};
pub use depgraph::{DependencyGraph, GraphBuilder, GraphEdge, GraphNode, GraphStats};
pub use predictor::{
    CompletionPrediction, Predictor, ProjectRiskLevel, RiskFactor, RiskScore, VelocityReport,
    VelocityTrend,
};
pub use stale::{Recommendation, StaleAnalyzer, StaleCategory, StaleItem, StaleReport};
pub use timeline::{Timeline, TimelineBuilder, TimelineStats, TimelineTask};
pub use unified::{
    validate_edge, EdgeLayer, EdgeRelation, GraphFilter, GraphGroup, NodeType, UnifiedEdge,
    UnifiedGraph, UnifiedGraphBuilder, UnifiedGraphStats, UnifiedNode,
};
pub use wbs::{
    compare_wbs_codes, MultiEntityWbsBuilder, WbsBuilder, WbsNode, WbsNodeKind, WbsStats, WbsTree,
};

use thiserror::Error;

/// Analysis engine errors
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Cancellation token fired
    #[error("operation cancelled")]
    Cancelled,

    /// `parent_id` chain loops back on itself
    #[error("parent cycle detected: {}", path.join(" -> "))]
    ParentCycle { path: Vec<String> },

    /// Input projection cannot be analyzed
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Guard helper: every detector / traversal entry point calls this
pub(crate) fn ensure_live(cancel: &zeus_store::CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }
    Ok(())
}
