//! Database bootstrap
//!
//! Runs the three provisioning steps in order: establish a verified
//! connection, reconcile the indexes of every registered collection, then
//! seed the role catalog. An unreachable database is the only condition
//! reported as a plain "not ready"; every other failure is an error.

use crate::config::{Config, DbConfig};
use crate::connection::ConnectionEstablisher;
use crate::error::Result;
use crate::indexes::{CollectionReport, IndexReconciler};
use crate::roles::{RoleCatalog, RoleSeeder, SeedReport};
use crate::schema::{builtin_collections, CollectionSpec};
use crate::store::{Connector, DocumentStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// What one bootstrap run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub collections: Vec<CollectionReport>,
    pub roles: SeedReport,
}

impl BootstrapReport {
    pub fn rebuilt_collections(&self) -> usize {
        self.collections
            .iter()
            .filter(|c| c.outcome.was_rebuilt())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    /// The liveness check failed; nothing was provisioned
    Unreachable,
    /// Indexes and roles are in place
    Ready(BootstrapReport),
}

impl BootstrapOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, BootstrapOutcome::Ready(_))
    }

    pub fn report(&self) -> Option<&BootstrapReport> {
        match self {
            BootstrapOutcome::Ready(report) => Some(report),
            BootstrapOutcome::Unreachable => None,
        }
    }
}

/// Provisions one database
pub struct Bootstrap<'a, C: Connector> {
    connector: &'a C,
    db: DbConfig,
    liveness_timeout: Duration,
    collections: Vec<CollectionSpec>,
    catalog: RoleCatalog,
    ignored_indexes: Vec<String>,
    max_race_losses: Option<usize>,
}

impl<'a, C: Connector> Bootstrap<'a, C> {
    /// Bootstrap the built-in collections and roles using `config`
    pub fn new(connector: &'a C, config: &Config) -> Self {
        Self {
            connector,
            db: config.db.clone(),
            liveness_timeout: config.liveness.timeout(),
            collections: builtin_collections(),
            catalog: RoleCatalog::builtin(),
            ignored_indexes: config.indexes.ignored.clone(),
            max_race_losses: config.roles.max_race_losses,
        }
    }

    pub fn with_collections(mut self, collections: Vec<CollectionSpec>) -> Self {
        self.collections = collections;
        self
    }

    pub fn with_catalog(mut self, catalog: RoleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub async fn run(&self) -> Result<BootstrapOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!("bootstrap", run_id = %run_id, db = %self.db.name);
        self.run_with_id(run_id).instrument(span).await
    }

    async fn run_with_id(&self, run_id: Uuid) -> Result<BootstrapOutcome> {
        let started_at = Utc::now();

        let establisher =
            ConnectionEstablisher::new(self.connector).with_liveness_timeout(self.liveness_timeout);
        let Some(connection) = establisher.establish(&self.db).await else {
            warn!("Unable to connect to database '{}'", self.db.name);
            return Ok(BootstrapOutcome::Unreachable);
        };

        let collections = self.provision_indexes(connection.store()).await?;

        info!("Verifying role definitions");
        let roles = RoleSeeder::new(connection.store(), &self.catalog)
            .with_max_race_losses(self.max_race_losses)
            .ensure_role_catalog()
            .await?;

        let report = BootstrapReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            collections,
            roles,
        };

        info!(
            "Database '{}' ready: {} of {} collections rebuilt, {} roles created",
            self.db.name,
            report.rebuilt_collections(),
            report.collections.len(),
            report.roles.created()
        );

        Ok(BootstrapOutcome::Ready(report))
    }

    async fn provision_indexes<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<Vec<CollectionReport>> {
        info!("Checking indexes");
        let reconciler = IndexReconciler::new(store).with_ignored(self.ignored_indexes.clone());

        let mut reports = Vec::with_capacity(self.collections.len());
        for spec in &self.collections {
            let outcome = reconciler.reconcile(spec).await?;
            reports.push(CollectionReport {
                collection: spec.name().to_string(),
                outcome,
            });
        }
        Ok(reports)
    }
}

/// Provision the database described by `config`.
///
/// `Ok(false)` means the database could not be reached. Index and role
/// failures are returned as errors.
pub async fn setup_database<C: Connector>(connector: &C, config: &Config) -> Result<bool> {
    let outcome = Bootstrap::new(connector, config).run().await?;
    Ok(outcome.is_ready())
}
