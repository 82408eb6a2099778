//! Bootstrap command implementation

use crate::bootstrap::{Bootstrap, BootstrapOutcome};
use crate::config::Config;
use crate::error::Result;
use crate::indexes::{RebuildReason, ReconcileOutcome};
use crate::roles::RoleState;
use crate::store::Connector;
use tracing::info;

/// Run a full bootstrap against the configured database
pub async fn cmd_bootstrap<C: Connector>(
    connector: &C,
    config: &Config,
) -> Result<BootstrapOutcome> {
    info!("Bootstrapping database '{}'", config.db.name);
    Bootstrap::new(connector, config).run().await
}

/// Print bootstrap results to console
pub fn print_bootstrap(outcome: &BootstrapOutcome) {
    let report = match outcome {
        BootstrapOutcome::Ready(report) => report,
        BootstrapOutcome::Unreachable => {
            println!("✗ Database unreachable, nothing was provisioned");
            return;
        }
    };

    println!("\n✓ Database ready (run {})\n", report.run_id);

    println!("Indexes:");
    for collection in &report.collections {
        let status = match &collection.outcome {
            ReconcileOutcome::Unchanged => "up to date".to_string(),
            ReconcileOutcome::Rebuilt {
                reason: RebuildReason::ListFailed { error },
            } => format!("rebuilt (listing failed: {})", error),
            ReconcileOutcome::Rebuilt {
                reason: RebuildReason::Mismatch(diff),
            } => format!(
                "rebuilt ({} missing, {} stale, {} changed)",
                diff.missing.len(),
                diff.stale.len(),
                diff.changed.len()
            ),
        };
        println!("  {}: {}", collection.collection, status);
    }

    println!("\nRoles:");
    if report.roles.fresh_install {
        println!("  (fresh install: full catalog checked)");
    }
    for role in &report.roles.roles {
        let state = match role.state {
            RoleState::Exists => "exists",
            RoleState::Persisted => "created",
            RoleState::RaceLost => "created concurrently",
        };
        println!("  {}: {}", role.name, state);
    }

    let elapsed = report.finished_at - report.started_at;
    println!("\nCompleted in {} ms", elapsed.num_milliseconds());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{MemoryConnector, Operation};

    #[tokio::test]
    async fn test_cmd_bootstrap_ready() {
        let connector = MemoryConnector::default();
        let outcome = cmd_bootstrap(&connector, &Config::default()).await.unwrap();

        assert!(outcome.is_ready());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["collections"][0]["outcome"]["action"], "rebuilt");
    }

    #[tokio::test]
    async fn test_cmd_bootstrap_unreachable() {
        let connector = MemoryConnector::default();
        connector.store().fail_next(
            Operation::Ping,
            StoreError::Timeout("no servers".to_string()),
        );

        let outcome = cmd_bootstrap(&connector, &Config::default()).await.unwrap();

        assert_eq!(outcome, BootstrapOutcome::Unreachable);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "unreachable");
    }
}
