//! Connection establishment
//!
//! A bootstrap first opens a throwaway connection with very short timeouts and
//! pings it, so an unreachable cluster fails in about a second instead of
//! after the driver's default server-selection timeout. Only then is the
//! primary connection registered with the plain configured fields.

use crate::config::{default_liveness_timeout_ms, DbConfig};
use crate::error::StoreResult;
use crate::store::{ConnectOptions, Connector, DocumentStore, DEFAULT_ALIAS, LIVENESS_ALIAS};
use std::time::Duration;
use tracing::{debug, info, warn};

/// An open, verified connection. Owned by whoever ran the establisher and
/// passed by reference to every component that needs storage.
pub struct Connection<S> {
    options: ConnectOptions,
    store: S,
}

impl<S: DocumentStore> Connection<S> {
    pub fn alias(&self) -> &str {
        &self.options.alias
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Opens the liveness and primary connections
pub struct ConnectionEstablisher<'a, C: Connector> {
    connector: &'a C,
    liveness_timeout: Duration,
}

impl<'a, C: Connector> ConnectionEstablisher<'a, C> {
    pub fn new(connector: &'a C) -> Self {
        Self {
            connector,
            liveness_timeout: Duration::from_millis(default_liveness_timeout_ms()),
        }
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    /// Probe the cluster through a short-timeout connection.
    ///
    /// Never fails: any connection or timeout error is logged and reported
    /// as `false`.
    pub async fn check_liveness(&self, db: &DbConfig) -> bool {
        let options =
            ConnectOptions::from_config(LIVENESS_ALIAS, db).with_timeouts(self.liveness_timeout);

        match self.probe(&options).await {
            Ok(()) => {
                debug!(
                    "Database at {}:{} is reachable",
                    options.host, options.port
                );
                true
            }
            Err(e) if e.is_unreachable() => {
                warn!(
                    "Database at {}:{} is unreachable: {}",
                    options.host, options.port, e
                );
                false
            }
            Err(e) => {
                warn!(
                    "Liveness check against {}:{} failed: {}",
                    options.host, options.port, e
                );
                false
            }
        }
    }

    async fn probe(&self, options: &ConnectOptions) -> StoreResult<()> {
        // Dropped on return; its timeouts are too short for real work
        let store = self.connector.connect(options).await?;
        store.ping().await
    }

    /// Verify reachability, then register the primary connection.
    ///
    /// Returns `None` when the cluster cannot be reached; this is the only
    /// place a storage error is turned into a plain failure.
    pub async fn establish(&self, db: &DbConfig) -> Option<Connection<C::Store>> {
        if !self.check_liveness(db).await {
            return None;
        }

        let options = ConnectOptions::from_config(DEFAULT_ALIAS, db);
        match self.connector.connect(&options).await {
            Ok(store) => {
                info!(
                    "Connected to database '{}' at {}:{}",
                    options.db, options.host, options.port
                );
                Some(Connection { options, store })
            }
            Err(e) => {
                warn!("Could not register connection '{}': {}", options.alias, e);
                None
            }
        }
    }
}
