//! File-backed entity repository
//!
//! Materializes projections from the store layout
//! (`<entity-plural>/<id>.yaml`, `state/current.yaml`,
//! `state/snapshots/`, `constraints.yaml`) and owns the mutating flows.
//! Every mutation follows the same discipline: acquire the per-file
//! advisory lock, re-read, optimistic `updated_at` check, write, release.
//! Snapshots are append-only and never rewritten.

use crate::id::{format_id, next_number, parse_id, EntityKind};
use crate::model::{ConstraintDocument, Snapshot, SnapshotState};
use crate::{ProjectionError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};
use zeus_store::{read_yaml, write_yaml, CancelToken, LockProvider, Store, StoreLock};

/// How long a mutating flow waits for the per-file lock
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Behavior shared by every entity that lives in its own YAML file
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Current entity ID ("" before `add` issues one)
    fn id(&self) -> &str;

    /// Install the issued ID
    fn set_id(&mut self, id: String);

    /// Last write time, if known
    fn updated_at(&self) -> Option<DateTime<Utc>>;

    /// Record a write: bump `updated_at` (and stamp `created_at` on first
    /// touch where the projection carries one)
    fn touch(&mut self, now: DateTime<Utc>);

    /// Hard references that must resolve on add/update
    /// (objectives/deliverables); soft parent links are not listed here —
    /// readers drop those to orphans instead
    fn references(&self) -> Vec<String> {
        Vec::new()
    }
}

macro_rules! impl_entity {
    ($ty:ty { $($reference:ident),* }) => {
        impl Entity for $ty {
            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn updated_at(&self) -> Option<DateTime<Utc>> {
                self.updated_at
            }

            fn touch(&mut self, now: DateTime<Utc>) {
                self.updated_at = Some(now);
            }

            fn references(&self) -> Vec<String> {
                let mut refs: Vec<String> = Vec::new();
                $(
                    refs.extend(self.$reference.clone());
                )*
                refs
            }
        }
    };
}

impl Entity for crate::model::TaskInfo {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
    }

    fn references(&self) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();
        refs.extend(self.deliverable_id.clone());
        refs.extend(self.objective_id.clone());
        refs
    }
}

impl_entity!(crate::model::UseCaseInfo { objective_id });
impl_entity!(crate::model::RiskInfo { objective_id, deliverable_id });
impl_entity!(crate::model::QualityInfo { deliverable_id, objective_id });

impl Entity for crate::model::ObjectiveInfo {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }

    // parent_id is a soft link: a missing parent demotes the objective to
    // a root on read, it does not fail the write.
}

impl Entity for crate::model::DeliverableInfo {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }

    fn references(&self) -> Vec<String> {
        if self.objective_id.is_empty() {
            Vec::new()
        } else {
            vec![self.objective_id.clone()]
        }
    }
}

/// Repository over any [`Store`] + [`LockProvider`] implementation
#[derive(Debug)]
pub struct EntityRepository<S> {
    store: S,
}

impl<S: Store + LockProvider> EntityRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    fn entity_path(kind: EntityKind, id: &str) -> String {
        format!("{}/{}.yaml", kind.dir_name(), id)
    }

    /// IDs present in a kind's namespace, sorted
    pub async fn list_ids(&self, cancel: &CancelToken, kind: EntityKind) -> Result<Vec<String>> {
        let pattern = format!("{}/*.yaml", kind.dir_name());
        let paths = self.store.glob(cancel, &pattern).await?;
        let ids = paths
            .iter()
            .filter_map(|path| {
                let stem = path.rsplit('/').next()?.strip_suffix(".yaml")?;
                parse_id(stem).ok().map(|_| stem.to_string())
            })
            .collect();
        Ok(ids)
    }

    /// Issue the next ID in a kind's namespace
    pub async fn next_id(&self, cancel: &CancelToken, kind: EntityKind) -> Result<String> {
        let ids = self.list_ids(cancel, kind).await?;
        let number = next_number(kind, ids.iter().map(String::as_str));
        Ok(format_id(kind, number))
    }

    /// Load a single entity by ID; the kind is taken from the prefix
    pub async fn get<T: DeserializeOwned>(&self, cancel: &CancelToken, id: &str) -> Result<T> {
        let parsed = parse_id(id)?;
        let path = Self::entity_path(parsed.kind, id);
        if !self.store.exists(cancel, &path).await? {
            return Err(ProjectionError::NotFound(id.to_string()));
        }
        Ok(read_yaml(&self.store, cancel, &path).await?)
    }

    /// Load every entity of a kind, in sorted file order (the stable input
    /// order the engines rely on)
    pub async fn load_kind<T: DeserializeOwned>(
        &self,
        cancel: &CancelToken,
        kind: EntityKind,
    ) -> Result<Vec<T>> {
        let pattern = format!("{}/*.yaml", kind.dir_name());
        let paths = self.store.glob(cancel, &pattern).await?;

        let mut entities = Vec::with_capacity(paths.len());
        for path in &paths {
            if cancel.is_cancelled() {
                return Err(ProjectionError::Cancelled);
            }
            entities.push(read_yaml(&self.store, cancel, path).await?);
        }
        Ok(entities)
    }

    /// Create a new entity.
    ///
    /// An empty ID is replaced by the next number in the namespace; a
    /// non-empty ID must have the right prefix and must not already exist.
    /// `created_at`/`updated_at` are stamped with the current time.
    pub async fn add<T: Entity>(
        &self,
        cancel: &CancelToken,
        kind: EntityKind,
        entity: &mut T,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(ProjectionError::Cancelled);
        }

        let id = if entity.id().is_empty() {
            let issued = self.next_id(cancel, kind).await?;
            entity.set_id(issued.clone());
            issued
        } else {
            let parsed = parse_id(entity.id())?;
            if parsed.kind != kind {
                return Err(ProjectionError::InvalidId(entity.id().to_string()));
            }
            entity.id().to_string()
        };

        let path = Self::entity_path(kind, &id);
        if self.store.exists(cancel, &path).await? {
            return Err(ProjectionError::Conflict { id });
        }

        self.verify_references(cancel, &id, &entity.references())
            .await?;

        let lock = self.store.lock_for(&path)?;
        lock.lock_with_timeout(cancel, LOCK_TIMEOUT).await?;

        entity.touch(Utc::now());
        let outcome = write_yaml(&self.store, cancel, &path, entity).await;
        lock.unlock()?;
        outcome?;

        info!(id = %id, kind = %kind, "entity created");
        Ok(id)
    }

    /// Rewrite an existing entity.
    ///
    /// Acquires the per-file lock, re-reads the stored copy and refuses the
    /// write when its `updated_at` no longer matches the caller's.
    pub async fn update<T: Entity>(
        &self,
        cancel: &CancelToken,
        kind: EntityKind,
        entity: &mut T,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(ProjectionError::Cancelled);
        }

        let id = entity.id().to_string();
        let parsed = parse_id(&id)?;
        if parsed.kind != kind {
            return Err(ProjectionError::InvalidId(id));
        }

        let path = Self::entity_path(kind, &id);
        if !self.store.exists(cancel, &path).await? {
            return Err(ProjectionError::NotFound(id));
        }

        self.verify_references(cancel, &id, &entity.references())
            .await?;

        let lock = self.store.lock_for(&path)?;
        lock.lock_with_timeout(cancel, LOCK_TIMEOUT).await?;

        let outcome = async {
            let stored: T = read_yaml(&self.store, cancel, &path).await?;
            if stored.updated_at() != entity.updated_at() {
                return Err(ProjectionError::Conflict { id: id.clone() });
            }
            entity.touch(Utc::now());
            write_yaml(&self.store, cancel, &path, entity).await?;
            Ok(())
        }
        .await;

        lock.unlock()?;
        outcome?;

        debug!(id = %entity.id(), "entity updated");
        Ok(())
    }

    /// Remove an entity file. Dependents are not rewritten; their dangling
    /// references read as orphans afterwards.
    pub async fn delete(&self, cancel: &CancelToken, id: &str) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(ProjectionError::Cancelled);
        }

        let parsed = parse_id(id)?;
        let path = Self::entity_path(parsed.kind, id);
        if !self.store.exists(cancel, &path).await? {
            return Err(ProjectionError::NotFound(id.to_string()));
        }

        let lock = self.store.lock_for(&path)?;
        lock.lock_with_timeout(cancel, LOCK_TIMEOUT).await?;
        let outcome = self.store.delete(cancel, &path).await;
        lock.unlock()?;
        outcome?;

        info!(id, "entity deleted");
        Ok(())
    }

    /// Current project state, when one has been written
    pub async fn load_current_state(&self, cancel: &CancelToken) -> Result<Option<SnapshotState>> {
        if !self.store.exists(cancel, "state/current.yaml").await? {
            return Ok(None);
        }
        Ok(Some(
            read_yaml(&self.store, cancel, "state/current.yaml").await?,
        ))
    }

    /// Replace the current project state
    pub async fn save_current_state(
        &self,
        cancel: &CancelToken,
        state: &SnapshotState,
    ) -> Result<()> {
        write_yaml(&self.store, cancel, "state/current.yaml", state).await?;
        Ok(())
    }

    /// All snapshots, newest first
    pub async fn load_snapshots(&self, cancel: &CancelToken) -> Result<Vec<Snapshot>> {
        let paths = self
            .store
            .glob(cancel, "state/snapshots/snapshot_*.yaml")
            .await?;

        let mut snapshots: Vec<Snapshot> = Vec::with_capacity(paths.len());
        for path in &paths {
            if cancel.is_cancelled() {
                return Err(ProjectionError::Cancelled);
            }
            snapshots.push(read_yaml(&self.store, cancel, path).await?);
        }
        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(snapshots)
    }

    /// Append a snapshot. Snapshots are never rewritten; a second snapshot
    /// with the same timestamp is a conflict.
    pub async fn record_snapshot(
        &self,
        cancel: &CancelToken,
        snapshot: &Snapshot,
    ) -> Result<String> {
        let path = format!("state/snapshots/{}", snapshot.file_name());
        if self.store.exists(cancel, &path).await? {
            return Err(ProjectionError::Conflict {
                id: snapshot.file_name(),
            });
        }
        write_yaml(&self.store, cancel, &path, snapshot).await?;
        info!(label = %snapshot.label, "snapshot recorded");
        Ok(path)
    }

    /// The single-document constraint collection; an absent file reads as
    /// an empty document
    pub async fn load_constraints(&self, cancel: &CancelToken) -> Result<ConstraintDocument> {
        if !self.store.exists(cancel, "constraints.yaml").await? {
            return Ok(ConstraintDocument::default());
        }
        Ok(read_yaml(&self.store, cancel, "constraints.yaml").await?)
    }

    /// Rewrite the constraint collection under its lock, bumping the
    /// metadata timestamps
    pub async fn save_constraints(
        &self,
        cancel: &CancelToken,
        document: &mut ConstraintDocument,
    ) -> Result<()> {
        let lock = self.store.lock_for("constraints.yaml")?;
        lock.lock_with_timeout(cancel, LOCK_TIMEOUT).await?;

        let now = Utc::now();
        if document.metadata.created_at.is_none() {
            document.metadata.created_at = Some(now);
        }
        document.metadata.updated_at = Some(now);

        let outcome = write_yaml(&self.store, cancel, "constraints.yaml", document).await;
        lock.unlock()?;
        outcome?;
        Ok(())
    }

    async fn verify_references(
        &self,
        cancel: &CancelToken,
        id: &str,
        references: &[String],
    ) -> Result<()> {
        for reference in references {
            let parsed = parse_id(reference)?;
            let path = Self::entity_path(parsed.kind, reference);
            if !self.store.exists(cancel, &path).await? {
                return Err(ProjectionError::InvalidReference {
                    id: id.to_string(),
                    reference: reference.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectiveInfo, SnapshotSummary, TaskInfo};
    use crate::status::EntityStatus;
    use zeus_store::MemoryStore;

    fn repository() -> EntityRepository<MemoryStore> {
        EntityRepository::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn add_issues_sequential_ids() {
        let repo = repository();
        let cancel = CancelToken::new();

        let mut first = TaskInfo {
            title: "First".to_string(),
            ..Default::default()
        };
        let mut second = TaskInfo {
            title: "Second".to_string(),
            ..Default::default()
        };

        let id1 = repo.add(&cancel, EntityKind::Task, &mut first).await.unwrap();
        let id2 = repo.add(&cancel, EntityKind::Task, &mut second).await.unwrap();

        assert_eq!(id1, "task-001");
        assert_eq!(id2, "task-002");
        assert!(first.created_at.is_some());
        assert!(first.updated_at.is_some());
    }

    #[tokio::test]
    async fn update_bumps_updated_at_and_detects_staleness() {
        let repo = repository();
        let cancel = CancelToken::new();

        let mut task = TaskInfo {
            title: "Evolving".to_string(),
            ..Default::default()
        };
        repo.add(&cancel, EntityKind::Task, &mut task).await.unwrap();

        let mut fresh: TaskInfo = repo.get(&cancel, "task-001").await.unwrap();
        fresh.status = EntityStatus::InProgress;
        repo.update(&cancel, EntityKind::Task, &mut fresh).await.unwrap();

        // The first copy still carries the pre-update timestamp.
        task.status = EntityStatus::Blocked;
        let err = repo
            .update(&cancel, EntityKind::Task, &mut task)
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectionError::Conflict { .. }));
    }

    #[tokio::test]
    async fn add_rejects_missing_references() {
        let repo = repository();
        let cancel = CancelToken::new();

        let mut task = TaskInfo {
            title: "Linked".to_string(),
            objective_id: Some("obj-001".to_string()),
            ..Default::default()
        };
        let err = repo
            .add(&cancel, EntityKind::Task, &mut task)
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectionError::InvalidReference { .. }));

        let mut objective = ObjectiveInfo {
            title: "Ship it".to_string(),
            ..Default::default()
        };
        repo.add(&cancel, EntityKind::Objective, &mut objective)
            .await
            .unwrap();

        task.id.clear();
        repo.add(&cancel, EntityKind::Task, &mut task).await.unwrap();
    }

    #[tokio::test]
    async fn delete_leaves_dependents_dangling() {
        let repo = repository();
        let cancel = CancelToken::new();

        let mut a = TaskInfo {
            title: "a".to_string(),
            ..Default::default()
        };
        repo.add(&cancel, EntityKind::Task, &mut a).await.unwrap();

        let mut b = TaskInfo {
            title: "b".to_string(),
            dependencies: vec!["task-001".to_string()],
            ..Default::default()
        };
        repo.add(&cancel, EntityKind::Task, &mut b).await.unwrap();

        repo.delete(&cancel, "task-001").await.unwrap();

        let survivors: Vec<TaskInfo> = repo.load_kind(&cancel, EntityKind::Task).await.unwrap();
        assert_eq!(survivors.len(), 1);
        // The dangling dependency is preserved verbatim for readers to drop.
        assert_eq!(survivors[0].dependencies, vec!["task-001"]);
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found_and_bad_id_is_invalid() {
        let repo = repository();
        let cancel = CancelToken::new();

        let err = repo.get::<TaskInfo>(&cancel, "task-999").await.unwrap_err();
        assert!(matches!(err, ProjectionError::NotFound(_)));

        let err = repo.get::<TaskInfo>(&cancel, "nonsense").await.unwrap_err();
        assert!(matches!(err, ProjectionError::InvalidId(_)));
    }

    #[tokio::test]
    async fn snapshots_sort_newest_first_and_never_overwrite() {
        let repo = repository();
        let cancel = CancelToken::new();

        for (ts, label) in [
            ("2025-06-01T10:00:00Z", "older"),
            ("2025-06-08T10:00:00Z", "newer"),
        ] {
            let snapshot = Snapshot {
                timestamp: crate::timestamp::parse_flexible(ts).unwrap(),
                label: label.to_string(),
                state: SnapshotState {
                    summary: SnapshotSummary {
                        total: 10,
                        completed: 4,
                        in_progress: 3,
                        pending: 3,
                    },
                    ..Default::default()
                },
            };
            repo.record_snapshot(&cancel, &snapshot).await.unwrap();
        }

        let history = repo.load_snapshots(&cancel).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].label, "newer");

        let duplicate = Snapshot {
            timestamp: crate::timestamp::parse_flexible("2025-06-08T10:00:00Z").unwrap(),
            label: "again".to_string(),
            state: SnapshotState::default(),
        };
        let err = repo.record_snapshot(&cancel, &duplicate).await.unwrap_err();
        assert!(matches!(err, ProjectionError::Conflict { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_mutations() {
        let repo = repository();
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut task = TaskInfo::default();
        let err = repo
            .add(&cancel, EntityKind::Task, &mut task)
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectionError::Cancelled));
        assert!(repo.store().is_empty());
    }
}
