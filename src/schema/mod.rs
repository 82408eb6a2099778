//! Declared collection schemas
//!
//! Every document collection docboot provisions is described by a
//! [`CollectionSpec`]: the collection name plus the indexes the application
//! expects to find on it. Specs are built once from the registry in
//! [`registry`] and never change at runtime.

mod registry;

pub use registry::*;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

/// Name of the index every collection gets on its primary key
pub const PRIMARY_KEY_INDEX: &str = "_id_";

/// Direction (or kind) of one field in an index key spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexDirection {
    Ascending,
    Descending,
    Text,
    Hashed,
}

impl fmt::Display for IndexDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexDirection::Ascending => write!(f, "1"),
            IndexDirection::Descending => write!(f, "-1"),
            IndexDirection::Text => write!(f, "text"),
            IndexDirection::Hashed => write!(f, "hashed"),
        }
    }
}

/// One `field: direction` entry of a key spec
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexField {
    pub field: String,
    pub direction: IndexDirection,
}

impl IndexField {
    pub fn new(field: impl Into<String>, direction: IndexDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Index options that change what an index enforces
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexOptions {
    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub sparse: bool,

    /// TTL in seconds; documents expire this long after the indexed date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after_secs: Option<u64>,
}

/// A single declared index.
///
/// Equality is structural: two definitions are the same index when their key
/// specs and options match, whatever explicit name either one carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    keys: Vec<IndexField>,
    #[serde(default)]
    options: IndexOptions,
}

impl PartialEq for IndexDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys && self.options == other.options
    }
}

impl Eq for IndexDefinition {}

impl IndexDefinition {
    /// Build a definition from an ordered key spec
    pub fn new<I, F>(keys: I) -> Self
    where
        I: IntoIterator<Item = (F, IndexDirection)>,
        F: Into<String>,
    {
        Self {
            name: None,
            keys: keys
                .into_iter()
                .map(|(field, direction)| IndexField::new(field, direction))
                .collect(),
            options: IndexOptions::default(),
        }
    }

    /// Single-field ascending index
    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new([(field.into(), IndexDirection::Ascending)])
    }

    /// Single-field descending index
    pub fn descending(field: impl Into<String>) -> Self {
        Self::new([(field.into(), IndexDirection::Descending)])
    }

    /// Text index over the given fields
    pub fn text<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self::new(fields.into_iter().map(|f| (f, IndexDirection::Text)))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.options.unique = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.options.sparse = true;
        self
    }

    pub fn expire_after(mut self, ttl: Duration) -> Self {
        self.options.expire_after_secs = Some(ttl.as_secs());
        self
    }

    /// Name the index is stored under: the explicit name if one was given,
    /// otherwise the conventional `field_dir` join (`status_1_created_at_-1`)
    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .keys
                .iter()
                .map(|k| format!("{}_{}", k.field, k.direction))
                .collect::<Vec<_>>()
                .join("_"),
        }
    }

    pub fn explicit_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn keys(&self) -> &[IndexField] {
        &self.keys
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub fn is_text(&self) -> bool {
        self.keys.iter().any(|k| k.direction == IndexDirection::Text)
    }

    /// Check the definition is something a storage engine could build
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.keys.is_empty() {
            return Err(format!("index '{}' has an empty key spec", self.name()));
        }

        let mut seen = HashSet::new();
        for key in &self.keys {
            if key.field.is_empty() {
                return Err(format!("index '{}' has an empty field name", self.name()));
            }
            if !seen.insert(key.field.as_str()) {
                return Err(format!(
                    "index '{}' lists field '{}' twice",
                    self.name(),
                    key.field
                ));
            }
        }

        if self.options.expire_after_secs.is_some() && self.keys.len() > 1 {
            return Err(format!(
                "TTL index '{}' must be on a single field",
                self.name()
            ));
        }

        if self.options.unique && self.keys.iter().any(|k| k.direction == IndexDirection::Hashed)
        {
            return Err(format!("hashed index '{}' cannot be unique", self.name()));
        }

        Ok(())
    }
}

/// What storage reports about one live index.
///
/// Backends that only know the index name leave `keys` empty; such entries
/// are compared by name alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    #[serde(default)]
    pub keys: Vec<IndexField>,
    #[serde(default)]
    pub options: IndexOptions,
}

impl IndexInfo {
    /// Whether the backend described the key spec at all
    pub fn is_described(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Structural match against a declared definition
    pub fn matches(&self, definition: &IndexDefinition) -> bool {
        self.keys == definition.keys && self.options == definition.options
    }
}

impl From<&IndexDefinition> for IndexInfo {
    fn from(definition: &IndexDefinition) -> Self {
        Self {
            keys: definition.keys.clone(),
            options: definition.options.clone(),
        }
    }
}

/// Live index metadata keyed by index name
pub type IndexInformation = BTreeMap<String, IndexInfo>;

/// Declared shape of one document collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    name: String,
    indexes: Vec<IndexDefinition>,
    /// Index names earlier schema versions created and this one no longer does
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    legacy_indexes: Vec<String>,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
            legacy_indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_legacy_index(mut self, name: impl Into<String>) -> Self {
        self.legacy_indexes.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    pub fn legacy_indexes(&self) -> &[String] {
        &self.legacy_indexes
    }

    pub fn is_legacy_index(&self, name: &str) -> bool {
        self.legacy_indexes.iter().any(|n| n == name)
    }

    /// Declared index by storage name
    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|i| i.name() == name)
    }

    /// Storage names of every declared index, in declaration order
    pub fn index_names(&self) -> Vec<String> {
        self.indexes.iter().map(IndexDefinition::name).collect()
    }

    /// Check every index builds and that they can coexist on one collection
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut names = HashSet::new();
        for index in &self.indexes {
            index.validate()?;

            let name = index.name();
            if name == PRIMARY_KEY_INDEX {
                return Err(format!(
                    "collection '{}' declares the reserved index name '{}'",
                    self.name, PRIMARY_KEY_INDEX
                ));
            }
            if !names.insert(name.clone()) {
                return Err(format!(
                    "collection '{}' declares index '{}' twice",
                    self.name, name
                ));
            }
        }

        for (i, index) in self.indexes.iter().enumerate() {
            if self.indexes[..i].contains(index) {
                return Err(format!(
                    "collection '{}' declares index '{}' with the same keys and options as another",
                    self.name,
                    index.name()
                ));
            }
        }

        if self.indexes.iter().filter(|i| i.is_text()).count() > 1 {
            return Err(format!(
                "collection '{}' declares more than one text index",
                self.name
            ));
        }

        if let Some(legacy) = self.legacy_indexes.iter().find(|l| names.contains(*l)) {
            return Err(format!(
                "collection '{}' lists '{}' as both declared and legacy",
                self.name, legacy
            ));
        }

        Ok(())
    }
}
