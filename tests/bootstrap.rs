//! End-to-end bootstrap runs against the in-memory store

use docboot::config::{Config, ConnectionConfig, DbConfig};
use docboot::error::{Error, StoreError};
use docboot::indexes::ReconcileOutcome;
use docboot::roles::RoleCatalog;
use docboot::schema::builtin_collections;
use docboot::store::{MemoryConnector, MemoryStore, Operation};
use docboot::{setup_database, Bootstrap, BootstrapOutcome};

fn config() -> Config {
    let mut config = Config::default();
    config.db = DbConfig {
        name: "db_name".to_string(),
        connection: ConnectionConfig {
            host: "db_host".to_string(),
            port: 27017,
            username: Some("db_username".to_string()),
            password: Some("db_password".to_string()),
            password_env: None,
        },
    };
    config
}

#[tokio::test]
async fn test_fresh_database_is_fully_provisioned() {
    let connector = MemoryConnector::default();

    assert!(setup_database(&connector, &config()).await.unwrap());

    let store = connector.store();
    for spec in builtin_collections() {
        let live = store.index_names(spec.name());
        for declared in spec.index_names() {
            assert!(live.contains(&declared), "{} lacks {}", spec.name(), declared);
        }
    }
    for role in RoleCatalog::builtin().roles() {
        assert!(store.role(&role.name).is_some(), "{} missing", role.name);
    }
}

#[tokio::test]
async fn test_upgrade_from_legacy_indexes() {
    let store = MemoryStore::new();
    store.set_index_names("request", ["_id_", "parent_instance_index", "status_1"]);
    for role in RoleCatalog::builtin().roles() {
        store.put_role(role.clone());
    }
    let connector = MemoryConnector::new(store.clone());

    let outcome = Bootstrap::new(&connector, &config()).run().await.unwrap();

    let BootstrapOutcome::Ready(report) = outcome else {
        panic!("expected a ready database");
    };
    let request = &report.collections[0];
    assert_eq!(request.collection, "request");
    assert!(request.outcome.was_rebuilt());
    assert!(!store
        .index_names("request")
        .contains(&"parent_instance_index".to_string()));

    // Existing install: only the mandatory roles are looked up
    assert_eq!(store.call_count(Operation::GetRole), 3);
    assert_eq!(store.call_count(Operation::SaveRole), 0);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let connector = MemoryConnector::default();
    let config = config();

    assert!(setup_database(&connector, &config).await.unwrap());
    let roles = connector.store().role_names();
    connector.store().clear_calls();

    let outcome = Bootstrap::new(&connector, &config).run().await.unwrap();
    let report = outcome.report().expect("ready");

    assert!(report
        .collections
        .iter()
        .all(|c| c.outcome == ReconcileOutcome::Unchanged));
    assert_eq!(connector.store().role_names(), roles);
    assert_eq!(connector.store().call_count(Operation::DropIndexes), 0);
    assert_eq!(connector.store().call_count(Operation::EnsureIndexes), 0);
}

#[tokio::test]
async fn test_unreachable_then_recovered() {
    let connector = MemoryConnector::default();
    connector.store().fail_next(
        Operation::Connect,
        StoreError::Connection("connection refused".to_string()),
    );

    assert!(!setup_database(&connector, &config()).await.unwrap());
    assert!(connector.store().role_names().is_empty());

    assert!(setup_database(&connector, &config()).await.unwrap());
    assert_eq!(connector.store().role_names().len(), 5);
}

#[tokio::test]
async fn test_failed_rebuild_is_an_error() {
    let connector = MemoryConnector::default();
    connector.store().fail_next_on(
        Operation::EnsureIndexes,
        "role",
        StoreError::IndexBuild("cannot create index".to_string()),
    );

    let err = setup_database(&connector, &config()).await.unwrap_err();

    assert!(matches!(err, Error::Store(StoreError::IndexBuild(_))));
    assert_eq!(connector.store().call_count_on(Operation::ListIndexes, "job"), 0);
    assert!(connector.store().role_names().is_empty());
}
