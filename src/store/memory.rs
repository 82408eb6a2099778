//! In-memory document store
//!
//! Behaves like a single-node cluster: indexes are tracked per collection,
//! role names are unique, and every call is recorded. Faults can be queued
//! per operation to reproduce timeouts, corrupt indexes, failed drops and
//! lost creation races.

use super::{ConnectOptions, Connector, DocumentStore};
use crate::error::{StoreError, StoreResult};
use crate::roles::RoleDefinition;
use crate::schema::{
    CollectionSpec, IndexDirection, IndexField, IndexInfo, IndexInformation, PRIMARY_KEY_INDEX,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Storage operations, as recorded by [`MemoryStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Ping,
    ListIndexes,
    IndexInformation,
    DropIndexes,
    EnsureIndexes,
    GetRole,
    SaveRole,
    CountRoles,
}

/// One recorded call. `target` is the collection, role or connection alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub target: Option<String>,
}

struct Fault {
    operation: Operation,
    target: Option<String>,
    error: StoreError,
}

#[derive(Default)]
struct State {
    indexes: BTreeMap<String, IndexInformation>,
    roles: BTreeMap<String, RoleDefinition>,
    faults: VecDeque<Fault>,
    competitors: HashSet<String>,
    connections: Vec<ConnectOptions>,
    calls: Vec<Call>,
}

impl State {
    /// Record the call, then hand back the first queued fault that applies
    fn enter(&mut self, operation: Operation, target: Option<&str>) -> StoreResult<()> {
        self.calls.push(Call {
            operation,
            target: target.map(str::to_string),
        });

        let position = self.faults.iter().position(|f| {
            f.operation == operation
                && match (&f.target, target) {
                    (None, _) => true,
                    (Some(want), Some(got)) => want == got,
                    (Some(_), None) => false,
                }
        });

        match position.and_then(|i| self.faults.remove(i)) {
            Some(fault) => Err(fault.error),
            None => Ok(()),
        }
    }
}

/// Shared in-memory store. Clones see the same data, the way two processes
/// see the same cluster.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a failure for the next call of `operation`, whatever its target
    pub fn fail_next(&self, operation: Operation, error: StoreError) {
        self.state().faults.push_back(Fault {
            operation,
            target: None,
            error,
        });
    }

    /// Queue a failure for the next call of `operation` on `target`
    pub fn fail_next_on(&self, operation: Operation, target: &str, error: StoreError) {
        self.state().faults.push_back(Fault {
            operation,
            target: Some(target.to_string()),
            error,
        });
    }

    /// Make another process win the race for `role`: the role appears in
    /// storage right before this store's next attempt to save it.
    pub fn race_on_save(&self, role: &str) {
        self.state().competitors.insert(role.to_string());
    }

    /// Replace the live indexes of a collection with name-only entries
    pub fn set_index_names<I, N>(&self, collection: &str, names: I)
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let indexes = names
            .into_iter()
            .map(|n| (n.into(), IndexInfo::default()))
            .collect();
        self.state().indexes.insert(collection.to_string(), indexes);
    }

    /// Insert or replace one fully described live index
    pub fn put_index(&self, collection: &str, name: &str, info: IndexInfo) {
        self.state()
            .indexes
            .entry(collection.to_string())
            .or_default()
            .insert(name.to_string(), info);
    }

    /// Seed a role as if an earlier bootstrap created it
    pub fn put_role(&self, role: RoleDefinition) {
        self.state().roles.insert(role.name.clone(), role);
    }

    pub fn index_names(&self, collection: &str) -> Vec<String> {
        self.state()
            .indexes
            .get(collection)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn role(&self, name: &str) -> Option<RoleDefinition> {
        self.state().roles.get(name).cloned()
    }

    pub fn role_names(&self) -> Vec<String> {
        self.state().roles.keys().cloned().collect()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn call_count_on(&self, operation: Operation, target: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation && c.target.as_deref() == Some(target))
            .count()
    }

    /// Connection options passed to [`MemoryConnector::connect`], in order
    pub fn connections(&self) -> Vec<ConnectOptions> {
        self.state().connections.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

fn primary_key_index() -> IndexInfo {
    IndexInfo {
        keys: vec![IndexField::new("_id", IndexDirection::Ascending)],
        options: Default::default(),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.state().enter(Operation::Ping, None)
    }

    async fn list_indexes(&self, spec: &CollectionSpec) -> StoreResult<Vec<String>> {
        self.state().enter(Operation::ListIndexes, Some(spec.name()))?;
        spec.validate().map_err(StoreError::IndexBuild)?;
        Ok(spec.index_names())
    }

    async fn index_information(&self, collection: &str) -> StoreResult<IndexInformation> {
        let mut state = self.state();
        state.enter(Operation::IndexInformation, Some(collection))?;
        Ok(state.indexes.get(collection).cloned().unwrap_or_default())
    }

    async fn drop_indexes(&self, collection: &str) -> StoreResult<()> {
        let mut state = self.state();
        state.enter(Operation::DropIndexes, Some(collection))?;
        if let Some(indexes) = state.indexes.get_mut(collection) {
            indexes.retain(|name, _| name == PRIMARY_KEY_INDEX);
        }
        Ok(())
    }

    async fn ensure_indexes(&self, spec: &CollectionSpec) -> StoreResult<()> {
        let mut state = self.state();
        state.enter(Operation::EnsureIndexes, Some(spec.name()))?;
        spec.validate().map_err(StoreError::IndexBuild)?;

        let live = state.indexes.entry(spec.name().to_string()).or_default();
        for definition in spec.indexes() {
            let name = definition.name();
            if let Some(existing) = live.get(&name) {
                if existing.is_described() && !existing.matches(definition) {
                    return Err(StoreError::IndexBuild(format!(
                        "index '{}' on '{}' already exists with different options",
                        name,
                        spec.name()
                    )));
                }
            }
        }

        live.entry(PRIMARY_KEY_INDEX.to_string())
            .or_insert_with(primary_key_index);
        for definition in spec.indexes() {
            live.insert(definition.name(), IndexInfo::from(definition));
        }
        Ok(())
    }

    async fn get_role(&self, name: &str) -> StoreResult<RoleDefinition> {
        let mut state = self.state();
        state.enter(Operation::GetRole, Some(name))?;
        state
            .roles
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("role '{}'", name)))
    }

    async fn save_role(&self, role: &RoleDefinition) -> StoreResult<()> {
        let mut state = self.state();
        state.enter(Operation::SaveRole, Some(&role.name))?;

        if state.competitors.remove(&role.name) {
            state.roles.insert(role.name.clone(), role.clone());
        }

        if state.roles.contains_key(&role.name) {
            return Err(StoreError::Conflict(format!(
                "duplicate key: role name '{}'",
                role.name
            )));
        }

        state.roles.insert(role.name.clone(), role.clone());
        Ok(())
    }

    async fn count_roles(&self) -> StoreResult<u64> {
        let mut state = self.state();
        state.enter(Operation::CountRoles, None)?;
        Ok(state.roles.len() as u64)
    }
}

/// Connector handing out views of one shared [`MemoryStore`]
#[derive(Clone, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Store = MemoryStore;

    async fn connect(&self, options: &ConnectOptions) -> StoreResult<MemoryStore> {
        let mut state = self.store.state();
        state.connections.push(options.clone());
        state.enter(Operation::Connect, Some(&options.alias))?;
        Ok(self.store.clone())
    }
}
