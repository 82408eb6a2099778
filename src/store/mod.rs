//! Storage boundary
//!
//! The bootstrap components never talk to a database driver directly. They
//! depend on the narrow capabilities below:
//! - [`Connector`] opens a store from [`ConnectOptions`]
//! - [`DocumentStore`] lists, drops and builds indexes, and gets, saves and
//!   counts role documents
//!
//! Not-found and uniqueness-violation outcomes come back as typed
//! [`StoreError`] variants so callers can decide which ones to recover from.

mod memory;
mod mongo;

pub use memory::*;
pub use mongo::*;

use crate::config::DbConfig;
use crate::error::{StoreError, StoreResult};
use crate::roles::RoleDefinition;
use crate::schema::{CollectionSpec, IndexInformation};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Alias of the connection the application keeps using after bootstrap
pub const DEFAULT_ALIAS: &str = "default";

/// Alias of the short-timeout connection used only to probe reachability
pub const LIVENESS_ALIAS: &str = "aliveness";

/// Everything a backend needs to open one connection
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub alias: String,
    pub db: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub server_selection_timeout: Option<Duration>,
    pub socket_timeout: Option<Duration>,
}

impl ConnectOptions {
    /// Options carrying exactly the configured database fields and no timeouts
    pub fn from_config(alias: &str, db: &DbConfig) -> Self {
        Self {
            alias: alias.to_string(),
            db: db.name.clone(),
            host: db.connection.host.clone(),
            port: db.connection.port,
            username: db.connection.username.clone(),
            password: db.connection.resolved_password(),
            server_selection_timeout: None,
            socket_timeout: None,
        }
    }

    /// Apply the same server-selection and socket timeout
    pub fn with_timeouts(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self.socket_timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("alias", &self.alias)
            .field("db", &self.db)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("server_selection_timeout", &self.server_selection_timeout)
            .field("socket_timeout", &self.socket_timeout)
            .finish()
    }
}

/// Opens connections to a database cluster
#[async_trait]
pub trait Connector: Send + Sync {
    type Store: DocumentStore;

    /// Open (or register) a connection. Drivers may connect lazily, so a
    /// successful return says nothing about reachability; call
    /// [`DocumentStore::ping`] for that.
    async fn connect(&self, options: &ConnectOptions) -> StoreResult<Self::Store>;
}

/// Storage capabilities the bootstrap components rely on
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Round-trip to the server
    async fn ping(&self) -> StoreResult<()>;

    /// Names the declared indexes of `spec` are stored under.
    ///
    /// Fails with [`StoreError::IndexBuild`] when the declaration cannot be
    /// turned into buildable indexes.
    async fn list_indexes(&self, spec: &CollectionSpec) -> StoreResult<Vec<String>> {
        spec.validate().map_err(StoreError::IndexBuild)?;
        Ok(spec.index_names())
    }

    /// Live index metadata for a collection, keyed by index name.
    /// A collection that does not exist yet has no indexes.
    async fn index_information(&self, collection: &str) -> StoreResult<IndexInformation>;

    /// Drop every index on a collection except the primary key index
    async fn drop_indexes(&self, collection: &str) -> StoreResult<()>;

    /// Build every declared index that is not already present
    async fn ensure_indexes(&self, spec: &CollectionSpec) -> StoreResult<()>;

    /// Fetch a role by name; [`StoreError::NotFound`] when absent
    async fn get_role(&self, name: &str) -> StoreResult<RoleDefinition>;

    /// Insert a new role; [`StoreError::Conflict`] when the name is taken
    async fn save_role(&self, role: &RoleDefinition) -> StoreResult<()>;

    /// Number of stored roles
    async fn count_roles(&self) -> StoreResult<u64>;
}
