//! Roles command - seed or inspect the role catalog

use crate::commands::require_connection;
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::roles::{RoleCatalog, RoleSeeder, SeedReport};
use crate::store::{Connector, DocumentStore};
use serde::{Deserialize, Serialize};

/// Whether a catalog role is present in storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleStatus {
    pub name: String,
    pub mandatory: bool,
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RolesResult {
    Listed { roles: Vec<RoleStatus> },
    Seeded { report: SeedReport },
}

/// Seed the built-in roles, or with `list` only report which exist
pub async fn cmd_roles<C: Connector>(
    connector: &C,
    config: &Config,
    list: bool,
) -> Result<RolesResult> {
    let connection = require_connection(connector, config).await?;
    let catalog = RoleCatalog::builtin();

    if list {
        let roles = list_roles(connection.store(), &catalog).await?;
        return Ok(RolesResult::Listed { roles });
    }

    let report = RoleSeeder::new(connection.store(), &catalog)
        .with_max_race_losses(config.roles.max_race_losses)
        .ensure_role_catalog()
        .await?;
    Ok(RolesResult::Seeded { report })
}

async fn list_roles<S: DocumentStore + ?Sized>(
    store: &S,
    catalog: &RoleCatalog,
) -> Result<Vec<RoleStatus>> {
    let mut statuses = Vec::with_capacity(catalog.len());
    for role in catalog.roles() {
        let present = match store.get_role(&role.name).await {
            Ok(_) => true,
            Err(StoreError::NotFound(_)) => false,
            Err(e) => return Err(e.into()),
        };
        statuses.push(RoleStatus {
            name: role.name.clone(),
            mandatory: role.mandatory,
            present,
            description: role.description.clone(),
        });
    }
    Ok(statuses)
}

pub fn print_roles(result: &RolesResult) {
    match result {
        RolesResult::Listed { roles } => {
            println!("\n🔐 Role catalog\n");
            for role in roles {
                let marker = if role.present { "✓" } else { "✗" };
                let kind = if role.mandatory { "mandatory" } else { "convenience" };
                println!("{} {} [{}]", marker, role.name, kind);
                if let Some(description) = &role.description {
                    println!("  {}", description);
                }
            }
        }
        RolesResult::Seeded { report } => {
            println!(
                "✓ Roles verified: {} existing, {} created, {} created concurrently",
                report.existing(),
                report.created(),
                report.race_losses()
            );
        }
    }
}
