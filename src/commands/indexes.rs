//! Indexes command - check or reconcile collection indexes

use crate::commands::require_connection;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::indexes::{CollectionReport, IndexDiff, IndexReconciler};
use crate::schema::{builtin_collections, find_collection, CollectionSpec};
use crate::store::Connector;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct IndexesOptions {
    /// Only report differences; change nothing
    pub check: bool,
    /// Restrict to one registered collection
    pub collection: Option<String>,
}

/// Planned changes for one collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionPlan {
    pub collection: String,
    pub declared: Vec<String>,
    pub diff: IndexDiff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", content = "collections", rename_all = "snake_case")]
pub enum IndexesResult {
    Checked(Vec<CollectionPlan>),
    Reconciled(Vec<CollectionReport>),
}

impl IndexesResult {
    /// Whether every inspected collection already matched its declaration
    pub fn is_clean(&self) -> bool {
        match self {
            IndexesResult::Checked(plans) => plans.iter().all(|p| p.diff.is_clean()),
            IndexesResult::Reconciled(reports) => {
                reports.iter().all(|r| !r.outcome.was_rebuilt())
            }
        }
    }
}

/// Registered collections to operate on
pub fn select_collections(name: Option<&str>) -> Result<Vec<CollectionSpec>> {
    match name {
        Some(name) => find_collection(name)
            .map(|spec| vec![spec])
            .ok_or_else(|| Error::UnknownCollection(name.to_string())),
        None => Ok(builtin_collections()),
    }
}

pub async fn cmd_indexes<C: Connector>(
    connector: &C,
    config: &Config,
    options: IndexesOptions,
) -> Result<IndexesResult> {
    let collections = select_collections(options.collection.as_deref())?;
    let connection = require_connection(connector, config).await?;
    let reconciler =
        IndexReconciler::new(connection.store()).with_ignored(config.indexes.ignored.clone());

    if options.check {
        info!("Checking indexes for {} collections", collections.len());
        let mut plans = Vec::with_capacity(collections.len());
        for spec in &collections {
            let diff = reconciler.plan(spec).await?;
            plans.push(CollectionPlan {
                collection: spec.name().to_string(),
                declared: spec.index_names(),
                diff,
            });
        }
        return Ok(IndexesResult::Checked(plans));
    }

    let mut reports = Vec::with_capacity(collections.len());
    for spec in &collections {
        let outcome = reconciler.reconcile(spec).await?;
        reports.push(CollectionReport {
            collection: spec.name().to_string(),
            outcome,
        });
    }
    Ok(IndexesResult::Reconciled(reports))
}

pub fn print_indexes(result: &IndexesResult) {
    match result {
        IndexesResult::Checked(plans) => {
            println!("\n🔍 Index check\n");
            for plan in plans {
                if plan.diff.is_clean() {
                    println!("✓ {} ({} indexes)", plan.collection, plan.declared.len());
                    continue;
                }
                println!("✗ {}", plan.collection);
                for name in &plan.diff.missing {
                    println!("  missing: {}", name);
                }
                for name in &plan.diff.stale {
                    if plan.diff.legacy.contains(name) {
                        println!("  legacy:  {}", name);
                    } else {
                        println!("  extra:   {}", name);
                    }
                }
                for name in &plan.diff.changed {
                    println!("  changed: {}", name);
                }
            }
            if !result.is_clean() {
                println!("\nRun 'docboot indexes' to rebuild.");
            }
        }
        IndexesResult::Reconciled(reports) => {
            for report in reports {
                if report.outcome.was_rebuilt() {
                    println!("✓ {}: rebuilt", report.collection);
                } else {
                    println!("✓ {}: up to date", report.collection);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{MemoryConnector, Operation};

    #[test]
    fn test_select_unknown_collection() {
        let result = select_collections(Some("nope"));
        assert!(matches!(result, Err(Error::UnknownCollection(name)) if name == "nope"));
        assert_eq!(select_collections(None).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_check_changes_nothing() {
        let connector = MemoryConnector::default();
        connector
            .store()
            .set_index_names("request", ["parent_instance_index"]);

        let result = cmd_indexes(
            &connector,
            &Config::default(),
            IndexesOptions {
                check: true,
                collection: Some("request".to_string()),
            },
        )
        .await
        .unwrap();

        assert!(!result.is_clean());
        let IndexesResult::Checked(plans) = &result else {
            panic!("expected a check result");
        };
        assert_eq!(plans[0].diff.legacy, vec!["parent_instance_index".to_string()]);
        assert_eq!(connector.store().call_count(Operation::DropIndexes), 0);
        assert_eq!(connector.store().call_count(Operation::EnsureIndexes), 0);
    }

    #[tokio::test]
    async fn test_reconcile_then_check_is_clean() {
        let connector = MemoryConnector::default();
        let config = Config::default();

        let reconciled = cmd_indexes(&connector, &config, IndexesOptions::default())
            .await
            .unwrap();
        assert!(!reconciled.is_clean());

        let checked = cmd_indexes(
            &connector,
            &config,
            IndexesOptions {
                check: true,
                collection: None,
            },
        )
        .await
        .unwrap();
        assert!(checked.is_clean());
    }

    #[tokio::test]
    async fn test_unreachable_database_is_an_error() {
        let connector = MemoryConnector::default();
        connector.store().fail_next(
            Operation::Ping,
            StoreError::Timeout("no servers".to_string()),
        );

        let result = cmd_indexes(&connector, &Config::default(), IndexesOptions::default()).await;
        assert!(matches!(result, Err(Error::Unreachable(_))));
    }
}
