//! Role seeding
//!
//! Makes sure the built-in roles exist. Multiple service replicas may run this
//! at the same time against one cluster; there is no lock. Each role is looked
//! up, created if missing, and a uniqueness violation on create means another
//! process got there first, which is just as good.

mod catalog;

pub use catalog::*;

use crate::error::{Result, StoreError};
use crate::store::DocumentStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// How a single role ended up after seeding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleState {
    /// Already present; left untouched
    Exists,
    /// Missing and created by this process
    Persisted,
    /// Missing at lookup, created concurrently by another process
    RaceLost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleOutcome {
    pub name: String,
    pub mandatory: bool,
    pub state: RoleState,
}

/// Result of one seeding pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    /// No roles existed when the pass started
    pub fresh_install: bool,
    pub roles: Vec<RoleOutcome>,
}

impl SeedReport {
    fn count(&self, state: RoleState) -> usize {
        self.roles.iter().filter(|r| r.state == state).count()
    }

    pub fn created(&self) -> usize {
        self.count(RoleState::Persisted)
    }

    pub fn existing(&self) -> usize {
        self.count(RoleState::Exists)
    }

    pub fn race_losses(&self) -> usize {
        self.count(RoleState::RaceLost)
    }
}

/// Ensures a [`RoleCatalog`] is present in storage
pub struct RoleSeeder<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    catalog: &'a RoleCatalog,
    max_race_losses: Option<usize>,
}

impl<'a, S: DocumentStore + ?Sized> RoleSeeder<'a, S> {
    pub fn new(store: &'a S, catalog: &'a RoleCatalog) -> Self {
        Self {
            store,
            catalog,
            max_race_losses: None,
        }
    }

    /// Bound how many lost races one pass tolerates (`None` = unbounded)
    pub fn with_max_race_losses(mut self, max: Option<usize>) -> Self {
        self.max_race_losses = max;
        self
    }

    /// Create whichever catalog roles are missing.
    ///
    /// On a fresh install (no roles stored) every catalog entry is checked,
    /// convenience roles first. Otherwise only the mandatory roles are. The
    /// first error that is not a lost race stops the pass.
    pub async fn ensure_role_catalog(&self) -> Result<SeedReport> {
        let fresh_install = self.store.count_roles().await? == 0;
        let mut report = SeedReport {
            fresh_install,
            roles: Vec::with_capacity(self.catalog.len()),
        };
        let mut race_losses = 0;

        if fresh_install {
            warn!("No roles found: creating convenience roles");
            for role in self.catalog.convenience() {
                let state = self.ensure_role(role, &mut race_losses).await?;
                report.roles.push(outcome(role, state));
            }
        }

        for role in self.catalog.mandatory() {
            let state = self.ensure_role(role, &mut race_losses).await?;
            report.roles.push(outcome(role, state));
        }

        info!(
            "Roles verified: {} existing, {} created, {} created concurrently",
            report.existing(),
            report.created(),
            report.race_losses()
        );

        Ok(report)
    }

    /// Look the role up and create it if missing. Never overwrites.
    pub async fn ensure_role(
        &self,
        role: &RoleDefinition,
        race_losses: &mut usize,
    ) -> Result<RoleState> {
        match self.store.get_role(&role.name).await {
            Ok(_) => {
                debug!("Role {} already exists", role.name);
                return Ok(RoleState::Exists);
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        warn!("Role {} missing, about to create", role.name);
        match self.store.save_role(role).await {
            Ok(()) => {
                info!("Created role {}", role.name);
                Ok(RoleState::Persisted)
            }
            Err(StoreError::Conflict(msg)) => {
                if self.max_race_losses.is_some_and(|max| *race_losses >= max) {
                    return Err(StoreError::Conflict(msg).into());
                }
                *race_losses += 1;
                info!(
                    "Role {} was created by another process in the meantime",
                    role.name
                );
                Ok(RoleState::RaceLost)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn outcome(role: &RoleDefinition, state: RoleState) -> RoleOutcome {
    RoleOutcome {
        name: role.name.clone(),
        mandatory: role.mandatory,
        state,
    }
}
