//! Index reconciliation
//!
//! Brings each collection's live indexes in line with its declared
//! [`CollectionSpec`]. Any difference (a missing index, a leftover from an
//! older schema, an index whose keys or options drifted) is repaired the blunt
//! way: drop every index on the collection and build the declared set again.
//! That is O(collection size) and blocks, which is fine for the small
//! collections this runs against at startup.

use crate::config::default_ignored_indexes;
use crate::error::{Result, StoreError};
use crate::schema::{CollectionSpec, IndexInformation, PRIMARY_KEY_INDEX};
use crate::store::DocumentStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Differences between declared and live indexes of one collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDiff {
    /// Declared but not present
    pub missing: Vec<String>,
    /// Present but not declared (includes `legacy`)
    pub stale: Vec<String>,
    /// Stale names the collection spec knows from earlier schema versions
    pub legacy: Vec<String>,
    /// Present under a declared name with different keys or options
    pub changed: Vec<String>,
}

impl IndexDiff {
    /// Compare declared index names against live metadata.
    ///
    /// Names in `ignored` are neither stale nor expected. A live entry is
    /// only checked for drift when the backend described its key spec.
    pub fn compute(
        spec: &CollectionSpec,
        declared: &[String],
        live: &IndexInformation,
        ignored: &[String],
    ) -> Self {
        let is_ignored = |name: &str| ignored.iter().any(|i| i == name);
        let mut diff = IndexDiff::default();

        for name in declared {
            match live.get(name) {
                None => diff.missing.push(name.clone()),
                Some(info) if info.is_described() => {
                    if let Some(definition) = spec.index(name) {
                        if !info.matches(definition) {
                            diff.changed.push(name.clone());
                        }
                    }
                }
                Some(_) => {}
            }
        }

        for name in live.keys() {
            if is_ignored(name) || declared.contains(name) {
                continue;
            }
            if spec.is_legacy_index(name) {
                diff.legacy.push(name.clone());
            }
            diff.stale.push(name.clone());
        }

        diff
    }

    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.stale.is_empty() && self.changed.is_empty()
    }
}

/// Why a collection's indexes were rebuilt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RebuildReason {
    /// Live indexes differed from the declared ones
    Mismatch(IndexDiff),
    /// The declared index list could not be produced
    ListFailed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Unchanged,
    Rebuilt { reason: RebuildReason },
}

impl ReconcileOutcome {
    pub fn was_rebuilt(&self) -> bool {
        matches!(self, ReconcileOutcome::Rebuilt { .. })
    }
}

/// Reconciliation result for one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub collection: String,
    pub outcome: ReconcileOutcome,
}

/// Compares and repairs collection indexes
pub struct IndexReconciler<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    ignored: Vec<String>,
}

impl<'a, S: DocumentStore + ?Sized> IndexReconciler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            ignored: default_ignored_indexes(),
        }
    }

    /// Replace the set of live index names never treated as stale.
    /// The primary key index is always kept in the set: no drop removes it.
    pub fn with_ignored(mut self, mut ignored: Vec<String>) -> Self {
        if !ignored.iter().any(|name| name == PRIMARY_KEY_INDEX) {
            ignored.push(PRIMARY_KEY_INDEX.to_string());
        }
        self.ignored = ignored;
        self
    }

    /// Compute the diff for a collection without changing anything
    pub async fn plan(&self, spec: &CollectionSpec) -> Result<IndexDiff> {
        let declared = self.store.list_indexes(spec).await?;
        let live = self.store.index_information(spec.name()).await?;
        Ok(IndexDiff::compute(spec, &declared, &live, &self.ignored))
    }

    /// Make the live indexes of `spec`'s collection match its declaration.
    ///
    /// Drop and build failures propagate; the caller decides whether the
    /// bootstrap can go on.
    pub async fn reconcile(&self, spec: &CollectionSpec) -> Result<ReconcileOutcome> {
        let declared = match self.store.list_indexes(spec).await {
            Ok(names) => names,
            Err(StoreError::IndexBuild(error)) => {
                warn!(
                    "Could not list indexes for {}: {}. Dropping and rebuilding",
                    spec.name(),
                    error
                );
                self.rebuild(spec).await?;
                return Ok(ReconcileOutcome::Rebuilt {
                    reason: RebuildReason::ListFailed { error },
                });
            }
            Err(e) => return Err(e.into()),
        };

        let live = self.store.index_information(spec.name()).await?;
        let diff = IndexDiff::compute(spec, &declared, &live, &self.ignored);

        if diff.is_clean() {
            debug!("Indexes for {} are up to date", spec.name());
            return Ok(ReconcileOutcome::Unchanged);
        }

        if !diff.legacy.is_empty() {
            warn!(
                "Found legacy {} indexes: {}",
                spec.name(),
                diff.legacy.join(", ")
            );
        }
        if !diff.missing.is_empty() {
            warn!(
                "Found missing {} indexes: {}",
                spec.name(),
                diff.missing.join(", ")
            );
        }
        if !diff.changed.is_empty() {
            warn!(
                "Found changed {} indexes: {}",
                spec.name(),
                diff.changed.join(", ")
            );
        }
        if diff.stale.len() > diff.legacy.len() {
            warn!(
                "Found unexpected {} indexes: {}",
                spec.name(),
                diff.stale
                    .iter()
                    .filter(|n| !diff.legacy.contains(n))
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        self.rebuild(spec).await?;
        Ok(ReconcileOutcome::Rebuilt {
            reason: RebuildReason::Mismatch(diff),
        })
    }

    async fn rebuild(&self, spec: &CollectionSpec) -> Result<()> {
        warn!("Dropping all indexes for {}", spec.name());
        self.store.drop_indexes(spec.name()).await?;

        info!("Indexes dropped, rebuilding indexes for {}", spec.name());
        self.store.ensure_indexes(spec).await?;

        info!("Rebuilt {} indexes for {}", spec.indexes().len(), spec.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::schema::{builtin_collections, IndexDefinition, IndexInfo};
    use crate::store::{MemoryStore, Operation};

    fn single_index_spec(collection: &str) -> CollectionSpec {
        CollectionSpec::new(collection).with_index(IndexDefinition::ascending("a").named("index1"))
    }

    fn two_index_spec(collection: &str) -> CollectionSpec {
        single_index_spec(collection)
            .with_index(IndexDefinition::ascending("b").named("index2"))
    }

    #[tokio::test]
    async fn test_same_indexes_is_noop() {
        let store = MemoryStore::new();
        let reconciler = IndexReconciler::new(&store);

        for name in ["request", "system", "role", "job"] {
            store.set_index_names(name, ["index1"]);
            let outcome = reconciler.reconcile(&single_index_spec(name)).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::Unchanged);
        }

        assert_eq!(store.call_count(Operation::DropIndexes), 0);
        assert_eq!(store.call_count(Operation::EnsureIndexes), 0);
    }

    #[tokio::test]
    async fn test_missing_index_rebuilds() {
        let store = MemoryStore::new();
        store.set_index_names("job", ["index1"]);

        let outcome = IndexReconciler::new(&store)
            .reconcile(&two_index_spec("job"))
            .await
            .unwrap();

        match outcome {
            ReconcileOutcome::Rebuilt {
                reason: RebuildReason::Mismatch(diff),
            } => assert_eq!(diff.missing, vec!["index2".to_string()]),
            other => panic!("expected mismatch rebuild, got {other:?}"),
        }
        assert_eq!(store.call_count(Operation::DropIndexes), 1);
        assert_eq!(store.call_count(Operation::EnsureIndexes), 1);
        assert_eq!(store.index_names("job"), vec!["_id_", "index1", "index2"]);
    }

    #[tokio::test]
    async fn test_stale_index_rebuilds_once() {
        let store = MemoryStore::new();
        let spec = single_index_spec("request").with_legacy_index("parent_instance_index");
        store.set_index_names("request", ["index1", "parent_instance_index"]);

        let outcome = IndexReconciler::new(&store).reconcile(&spec).await.unwrap();

        match outcome {
            ReconcileOutcome::Rebuilt {
                reason: RebuildReason::Mismatch(diff),
            } => {
                assert_eq!(diff.stale, vec!["parent_instance_index".to_string()]);
                assert_eq!(diff.legacy, vec!["parent_instance_index".to_string()]);
                assert!(diff.missing.is_empty());
            }
            other => panic!("expected mismatch rebuild, got {other:?}"),
        }
        assert_eq!(store.call_count_on(Operation::DropIndexes, "request"), 1);
        assert_eq!(store.call_count_on(Operation::EnsureIndexes, "request"), 1);
        assert!(!store
            .index_names("request")
            .contains(&"parent_instance_index".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_extra_index_rebuilds() {
        let store = MemoryStore::new();
        store.set_index_names("system", ["index1", "hand_made_index"]);

        let outcome = IndexReconciler::new(&store)
            .reconcile(&single_index_spec("system"))
            .await
            .unwrap();

        assert!(outcome.was_rebuilt());
        assert_eq!(store.index_names("system"), vec!["_id_", "index1"]);
    }

    #[tokio::test]
    async fn test_primary_key_index_is_ignored() {
        let store = MemoryStore::new();
        store.set_index_names("role", ["_id_", "index1"]);

        let outcome = IndexReconciler::new(&store)
            .reconcile(&single_index_spec("role"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_changed_definition_rebuilds() {
        let store = MemoryStore::new();
        let spec = CollectionSpec::new("role")
            .with_index(IndexDefinition::ascending("name").named("role_name_index").unique());
        // Same name, but built before the index was made unique
        store.put_index(
            "role",
            "role_name_index",
            IndexInfo::from(&IndexDefinition::ascending("name")),
        );

        let diff = IndexReconciler::new(&store).plan(&spec).await.unwrap();
        assert_eq!(diff.changed, vec!["role_name_index".to_string()]);

        let outcome = IndexReconciler::new(&store).reconcile(&spec).await.unwrap();
        assert!(outcome.was_rebuilt());

        let rebuilt = IndexReconciler::new(&store).plan(&spec).await.unwrap();
        assert!(rebuilt.is_clean());
    }

    #[tokio::test]
    async fn test_list_failure_rebuilds_only_that_collection() {
        let store = MemoryStore::new();
        let reconciler = IndexReconciler::new(&store);
        store.fail_next_on(
            Operation::ListIndexes,
            "request",
            StoreError::IndexBuild("corrupt index".to_string()),
        );

        for name in ["request", "system", "role", "job"] {
            store.set_index_names(name, ["index1"]);
            reconciler.reconcile(&single_index_spec(name)).await.unwrap();
        }

        assert_eq!(store.call_count(Operation::DropIndexes), 1);
        assert_eq!(store.call_count_on(Operation::DropIndexes, "request"), 1);
        assert_eq!(store.call_count_on(Operation::EnsureIndexes, "request"), 1);
        // Listing failed, so live metadata was never consulted
        assert_eq!(
            store.call_count_on(Operation::IndexInformation, "request"),
            0
        );
    }

    #[tokio::test]
    async fn test_list_failure_other_than_index_build_propagates() {
        let store = MemoryStore::new();
        store.fail_next(
            Operation::ListIndexes,
            StoreError::Operation("not authorized".to_string()),
        );

        let result = IndexReconciler::new(&store)
            .reconcile(&single_index_spec("job"))
            .await;

        assert!(matches!(
            result,
            Err(Error::Store(StoreError::Operation(_)))
        ));
        assert_eq!(store.call_count(Operation::DropIndexes), 0);
    }

    #[tokio::test]
    async fn test_drop_failure_propagates() {
        let store = MemoryStore::new();
        store.set_index_names("job", ["index1", "stale"]);
        store.fail_next(
            Operation::DropIndexes,
            StoreError::Operation("drop failed".to_string()),
        );

        let result = IndexReconciler::new(&store)
            .reconcile(&single_index_spec("job"))
            .await;

        assert!(matches!(
            result,
            Err(Error::Store(StoreError::Operation(_)))
        ));
        assert_eq!(store.call_count(Operation::EnsureIndexes), 0);
    }

    #[tokio::test]
    async fn test_rebuild_failure_propagates() {
        let store = MemoryStore::new();
        store.fail_next(
            Operation::ListIndexes,
            StoreError::IndexBuild("corrupt index".to_string()),
        );
        store.fail_next(
            Operation::EnsureIndexes,
            StoreError::IndexBuild("cannot create index".to_string()),
        );

        let result = IndexReconciler::new(&store)
            .reconcile(&single_index_spec("job"))
            .await;

        assert!(matches!(
            result,
            Err(Error::Store(StoreError::IndexBuild(_)))
        ));
        assert_eq!(store.call_count(Operation::DropIndexes), 1);
    }

    #[tokio::test]
    async fn test_builtin_collections_converge() {
        let store = MemoryStore::new();
        let reconciler = IndexReconciler::new(&store);

        for spec in builtin_collections() {
            let first = reconciler.reconcile(&spec).await.unwrap();
            assert!(first.was_rebuilt(), "{} should be built", spec.name());

            let second = reconciler.reconcile(&spec).await.unwrap();
            assert_eq!(second, ReconcileOutcome::Unchanged);

            let live = store.index_names(spec.name());
            for declared in spec.index_names() {
                assert!(live.contains(&declared));
            }
        }
    }

    #[tokio::test]
    async fn test_custom_ignored_list_keeps_primary_key() {
        let store = MemoryStore::new();
        let reconciler =
            IndexReconciler::new(&store).with_ignored(vec!["shard_key".to_string()]);
        let spec = single_index_spec("job");

        assert!(reconciler.reconcile(&spec).await.unwrap().was_rebuilt());
        store.put_index("job", "shard_key", IndexInfo::default());

        let second = reconciler.reconcile(&spec).await.unwrap();
        assert_eq!(second, ReconcileOutcome::Unchanged);
        assert_eq!(store.call_count(Operation::DropIndexes), 1);
        assert_eq!(store.call_count(Operation::EnsureIndexes), 1);
    }

    #[test]
    fn test_diff_ignores_configured_names() {
        let spec = single_index_spec("job");
        let mut live = IndexInformation::new();
        live.insert("index1".to_string(), IndexInfo::default());
        live.insert("_id_".to_string(), IndexInfo::default());
        live.insert("shard_key".to_string(), IndexInfo::default());

        let declared = spec.index_names();
        let diff = IndexDiff::compute(&spec, &declared, &live, &["_id_".to_string()]);
        assert_eq!(diff.stale, vec!["shard_key".to_string()]);

        let ignored = vec!["_id_".to_string(), "shard_key".to_string()];
        assert!(IndexDiff::compute(&spec, &declared, &live, &ignored).is_clean());
    }
}
