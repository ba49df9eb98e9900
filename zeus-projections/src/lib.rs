//! # Zeus Projections
//!
//! Minimal read models the analysis engines consume, plus the repository
//! that materializes them from the sandboxed store. Engines borrow these
//! projections read-only for the duration of one call; the repository is
//! the only component that writes entity files.
//!
//! ## Contents
//!
//! - [`id`] — `<kind-prefix>-<NNN>` identifiers and issuance
//! - [`status`] — entity/risk status enums and the risk score table
//! - [`timestamp`] — lenient date parsing (RFC3339 / `...Z` / `YYYY-MM-DD`)
//! - [`model`] — TaskInfo, UseCaseInfo, ObjectiveInfo, DeliverableInfo,
//!   RiskInfo, QualityInfo, Snapshot
//! - [`repository`] — load/add/update/delete over the store with advisory
//!   locking and optimistic stale checks

pub mod id;
pub mod model;
pub mod repository;
pub mod status;
pub mod timestamp;

pub use id::{format_id, next_number, parse_id, EntityKind, ParsedId};
pub use model::{
    ActivityInfo, ConstraintDocument, ConstraintInfo, DeliverableInfo, DocumentMetadata,
    ObjectiveInfo, QualityInfo, RiskInfo, Snapshot, SnapshotState, SnapshotSummary, TaskInfo,
    UseCaseInfo, VisionInfo,
};
pub use repository::{Entity, EntityRepository};
pub use status::{EntityStatus, RiskImpact, RiskLevel, RiskProbability, RiskStatus};

use thiserror::Error;

/// Projection / repository errors
#[derive(Error, Debug)]
pub enum ProjectionError {
    /// Cancellation token fired
    #[error("operation cancelled")]
    Cancelled,

    /// Identifier does not match `<kind-prefix>-<NNN>`
    #[error("invalid entity id: {0}")]
    InvalidId(String),

    /// Referenced entity does not exist
    #[error("{id} references missing entity {reference}")]
    InvalidReference { id: String, reference: String },

    /// Entity file does not exist
    #[error("entity {0} not found")]
    NotFound(String),

    /// Optimistic stale check failed: the file changed since it was read
    #[error("entity {id} was modified concurrently")]
    Conflict { id: String },

    /// Store-layer failure
    #[error(transparent)]
    Store(zeus_store::StoreError),
}

impl From<zeus_store::StoreError> for ProjectionError {
    fn from(err: zeus_store::StoreError) -> Self {
        match err {
            zeus_store::StoreError::Cancelled => ProjectionError::Cancelled,
            other => ProjectionError::Store(other),
        }
    }
}

/// Result type for projection operations
pub type Result<T> = std::result::Result<T, ProjectionError>;
