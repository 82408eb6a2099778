//! MongoDB backend
//!
//! Wraps the official driver and maps its errors onto [`StoreError`] so the
//! bootstrap components can tell a lost race from a broken index.

use super::{ConnectOptions, Connector, DocumentStore};
use crate::error::{StoreError, StoreResult};
use crate::roles::RoleDefinition;
use crate::schema::{
    CollectionSpec, IndexDefinition, IndexDirection, IndexField, IndexInfo, IndexInformation,
    IndexOptions, ROLE_COLLECTION,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::{
    ClientOptions, Credential, IndexOptions as MongoIndexOptions, ServerAddress,
};
use mongodb::{Client, Collection, Database, IndexModel};
use std::time::Duration;
use tracing::debug;

const DUPLICATE_KEY: i32 = 11000;
const NAMESPACE_NOT_FOUND: i32 = 26;
const CANNOT_CREATE_INDEX: i32 = 67;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
const INVALID_INDEX_SPECIFICATION_OPTION: i32 = 197;

/// Connector opening [`MongoStore`]s
#[derive(Debug, Clone, Default)]
pub struct MongoConnector;

#[async_trait]
impl Connector for MongoConnector {
    type Store = MongoStore;

    async fn connect(&self, options: &ConnectOptions) -> StoreResult<MongoStore> {
        MongoStore::connect(options)
    }
}

/// MongoDB store handle
#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
    alias: String,
}

impl MongoStore {
    /// Build a client for `options`. The driver connects lazily; nothing
    /// touches the network until the first operation.
    pub fn connect(options: &ConnectOptions) -> StoreResult<Self> {
        debug!(
            "Registering connection '{}' to {}:{}/{}",
            options.alias, options.host, options.port, options.db
        );

        let mut client_options = ClientOptions::builder()
            .hosts(vec![ServerAddress::Tcp {
                host: options.host.clone(),
                port: Some(options.port),
            }])
            .build();
        client_options.app_name = Some(format!("docboot-{}", options.alias));
        client_options.default_database = Some(options.db.clone());
        client_options.server_selection_timeout = options.server_selection_timeout;
        // The driver has no socket timeout; bound connection establishment instead
        client_options.connect_timeout = options.socket_timeout;

        if options.username.is_some() || options.password.is_some() {
            let mut credential = Credential::default();
            credential.username = options.username.clone();
            credential.password = options.password.clone();
            client_options.credential = Some(credential);
        }

        let client = Client::with_options(client_options)?;
        let db = client.database(&options.db);

        Ok(Self {
            db,
            alias: options.alias.clone(),
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    fn roles(&self) -> Collection<RoleDefinition> {
        self.db.collection::<RoleDefinition>(ROLE_COLLECTION)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> StoreResult<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn index_information(&self, collection: &str) -> StoreResult<IndexInformation> {
        let cursor = match self.collection(collection).list_indexes().await {
            Ok(cursor) => cursor,
            Err(e) if is_missing_namespace(&e) => {
                return Ok(IndexInformation::new());
            }
            Err(e) => return Err(e.into()),
        };

        let models: Vec<IndexModel> = cursor.try_collect().await?;
        let mut info = IndexInformation::new();
        for model in models {
            let Some(name) = model.options.as_ref().and_then(|o| o.name.clone()) else {
                continue;
            };
            info.insert(name, index_info_from_model(&model));
        }

        Ok(info)
    }

    async fn drop_indexes(&self, collection: &str) -> StoreResult<()> {
        match self.collection(collection).drop_indexes().await {
            Ok(()) => Ok(()),
            Err(e) if is_missing_namespace(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_indexes(&self, spec: &CollectionSpec) -> StoreResult<()> {
        spec.validate().map_err(StoreError::IndexBuild)?;
        if spec.indexes().is_empty() {
            return Ok(());
        }

        let models: Vec<IndexModel> = spec.indexes().iter().map(index_model).collect();
        self.collection(spec.name()).create_indexes(models).await?;
        Ok(())
    }

    async fn get_role(&self, name: &str) -> StoreResult<RoleDefinition> {
        self.roles()
            .find_one(doc! { "name": name })
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("role '{}'", name)))
    }

    async fn save_role(&self, role: &RoleDefinition) -> StoreResult<()> {
        self.roles().insert_one(role).await?;
        Ok(())
    }

    async fn count_roles(&self) -> StoreResult<u64> {
        Ok(self.roles().count_documents(doc! {}).await?)
    }
}

impl From<MongoError> for StoreError {
    fn from(err: MongoError) -> Self {
        let message = err.to_string();
        match err.kind.as_ref() {
            ErrorKind::ServerSelection { .. } => StoreError::Timeout(message),
            ErrorKind::Io(_)
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::ConnectionPoolCleared { .. } => StoreError::Connection(message),
            ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => {
                StoreError::Conflict(message)
            }
            ErrorKind::Command(e) if e.code == DUPLICATE_KEY => StoreError::Conflict(message),
            ErrorKind::Command(e) if is_index_build_code(e.code) => {
                StoreError::IndexBuild(message)
            }
            _ => StoreError::Operation(message),
        }
    }
}

fn command_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(e) => Some(e.code),
        _ => None,
    }
}

/// The collection does not exist yet; it has no indexes to list or drop
fn is_missing_namespace(err: &MongoError) -> bool {
    command_code(err) == Some(NAMESPACE_NOT_FOUND)
}

fn is_index_build_code(code: i32) -> bool {
    matches!(
        code,
        CANNOT_CREATE_INDEX
            | INDEX_OPTIONS_CONFLICT
            | INDEX_KEY_SPECS_CONFLICT
            | INVALID_INDEX_SPECIFICATION_OPTION
    )
}

fn direction_to_bson(direction: IndexDirection) -> Bson {
    match direction {
        IndexDirection::Ascending => Bson::Int32(1),
        IndexDirection::Descending => Bson::Int32(-1),
        IndexDirection::Text => Bson::String("text".to_string()),
        IndexDirection::Hashed => Bson::String("hashed".to_string()),
    }
}

fn direction_from_bson(value: &Bson) -> Option<IndexDirection> {
    let numeric = match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        Bson::String(s) if s == "text" => return Some(IndexDirection::Text),
        Bson::String(s) if s == "hashed" => return Some(IndexDirection::Hashed),
        _ => None,
    }?;

    if numeric > 0.0 {
        Some(IndexDirection::Ascending)
    } else if numeric < 0.0 {
        Some(IndexDirection::Descending)
    } else {
        None
    }
}

fn index_model(definition: &IndexDefinition) -> IndexModel {
    let mut keys = Document::new();
    for key in definition.keys() {
        keys.insert(key.field.clone(), direction_to_bson(key.direction));
    }

    let declared = definition.options();
    let mut options = MongoIndexOptions::default();
    options.name = Some(definition.name());
    options.unique = declared.unique.then_some(true);
    options.sparse = declared.sparse.then_some(true);
    options.expire_after = declared.expire_after_secs.map(Duration::from_secs);

    IndexModel::builder().keys(keys).options(options).build()
}

/// Describe a live index. Text indexes are stored under internal `_fts`
/// keys that never match the declared fields, and special kinds such as
/// `2dsphere` have no declared counterpart; both are left undescribed so
/// they are compared by name only.
fn index_info_from_model(model: &IndexModel) -> IndexInfo {
    let mut keys = Vec::with_capacity(model.keys.len());
    for (field, value) in &model.keys {
        if field == "_fts" || field == "_ftsx" {
            return IndexInfo::default();
        }
        match direction_from_bson(value) {
            Some(direction) => keys.push(IndexField::new(field.clone(), direction)),
            None => return IndexInfo::default(),
        }
    }

    let options = model
        .options
        .as_ref()
        .map(|o| IndexOptions {
            unique: o.unique.unwrap_or(false),
            sparse: o.sparse.unwrap_or(false),
            expire_after_secs: o.expire_after.map(|d| d.as_secs()),
        })
        .unwrap_or_default();

    IndexInfo { keys, options }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_error(code: i32, code_name: &str) -> MongoError {
        let error = mongodb::bson::from_document(doc! {
            "code": code,
            "codeName": code_name,
            "errmsg": "server said no",
        })
        .unwrap();
        MongoError::from(ErrorKind::Command(error))
    }

    #[test]
    fn test_duplicate_key_is_conflict() {
        let err = command_error(DUPLICATE_KEY, "DuplicateKey");
        assert_eq!(command_code(&err), Some(11000));
        assert!(matches!(StoreError::from(err), StoreError::Conflict(_)));
    }

    #[test]
    fn test_index_build_codes() {
        for (code, name) in [
            (67, "CannotCreateIndex"),
            (85, "IndexOptionsConflict"),
            (86, "IndexKeySpecsConflict"),
            (197, "InvalidIndexSpecificationOption"),
        ] {
            let err = command_error(code, name);
            assert!(
                matches!(StoreError::from(err), StoreError::IndexBuild(_)),
                "{name} should be an index build error"
            );
        }
    }

    #[test]
    fn test_missing_namespace_is_tolerated() {
        let err = command_error(NAMESPACE_NOT_FOUND, "NamespaceNotFound");
        assert!(is_missing_namespace(&err));
        // Anywhere it is not tolerated it stays a plain failure
        assert!(matches!(StoreError::from(err), StoreError::Operation(_)));

        assert!(!is_missing_namespace(&command_error(13, "Unauthorized")));
    }

    #[test]
    fn test_other_command_errors_are_operations() {
        let err = command_error(13, "Unauthorized");
        let mapped = StoreError::from(err);
        assert!(matches!(mapped, StoreError::Operation(_)));
        assert!(!mapped.is_unreachable());
    }

    #[test]
    fn test_index_model_round_trips_through_info() {
        let definition = IndexDefinition::new([
            ("status", IndexDirection::Ascending),
            ("created_at", IndexDirection::Descending),
        ])
        .unique();

        let model = index_model(&definition);
        assert_eq!(
            model.options.as_ref().and_then(|o| o.name.clone()).as_deref(),
            Some("status_1_created_at_-1")
        );

        let info = index_info_from_model(&model);
        assert!(info.matches(&definition));
    }

    #[test]
    fn test_text_index_is_left_undescribed() {
        let model = IndexModel::builder()
            .keys(doc! { "_fts": "text", "_ftsx": 1 })
            .build();
        assert!(!index_info_from_model(&model).is_described());
    }

    #[test]
    fn test_direction_from_bson() {
        assert_eq!(
            direction_from_bson(&Bson::Double(-1.0)),
            Some(IndexDirection::Descending)
        );
        assert_eq!(
            direction_from_bson(&Bson::Int64(1)),
            Some(IndexDirection::Ascending)
        );
        assert_eq!(
            direction_from_bson(&Bson::String("hashed".to_string())),
            Some(IndexDirection::Hashed)
        );
        assert_eq!(
            direction_from_bson(&Bson::String("2dsphere".to_string())),
            None
        );
    }

    #[tokio::test]
    async fn test_connect_is_lazy() {
        let options = ConnectOptions {
            alias: "aliveness".to_string(),
            db: "db_name".to_string(),
            host: "127.0.0.1".to_string(),
            port: 1,
            username: None,
            password: None,
            server_selection_timeout: Some(Duration::from_millis(10)),
            socket_timeout: Some(Duration::from_millis(10)),
        };

        let store = MongoStore::connect(&options).expect("client should build without I/O");
        assert_eq!(store.alias(), "aliveness");
    }
}
