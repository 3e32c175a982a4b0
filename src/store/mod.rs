pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A stored document: opaque id plus a JSON object of fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Deserialize the fields into a model type, injecting the document id
    /// under `id` the way snapshot data is consumed everywhere here.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(fields))
            .map_err(|err| StoreError::Malformed(format!("document {}: {err}", self.id)))
    }
}

/// Equality filter for queries; `field` may be a dotted path.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub equals: Value,
}

impl Filter {
    pub fn field_eq(field: impl Into<String>, equals: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            equals: equals.into(),
        }
    }
}

/// A single field mutation inside a write. Paths are dotted
/// (`account.cod_balance`).
#[derive(Debug, Clone)]
pub enum FieldWrite {
    Set(Value),
    /// Numeric add; a missing field counts as zero.
    Increment(f64),
    /// Resolved to the store's clock at commit time.
    ServerTimestamp,
}

#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Create or replace a document.
    Put {
        collection: String,
        id: String,
        fields: Vec<(String, FieldWrite)>,
    },
    /// Mutate fields of an existing document; fails when it is missing.
    Update {
        collection: String,
        id: String,
        fields: Vec<(String, FieldWrite)>,
    },
}

/// A set of writes applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<K: Into<String>>(
        mut self,
        collection: &str,
        id: &str,
        fields: Vec<(K, FieldWrite)>,
    ) -> Self {
        self.ops.push(WriteOp::Put {
            collection: collection.to_string(),
            id: id.to_string(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        });
        self
    }

    pub fn update<K: Into<String>>(
        mut self,
        collection: &str,
        id: &str,
        fields: Vec<(K, FieldWrite)>,
    ) -> Self {
        self.ops.push(WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

/// One delivery on a live document feed: the document's current state, its
/// absence, or a subscription-level error.
pub type Snapshot = Result<Option<Document>, StoreError>;

/// The external document database, reduced to the operations the session
/// core needs. Subscriptions are watch channels seeded with the current
/// state; dropping the receiver detaches the listener.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> Result<Vec<Document>, StoreError>;

    /// Apply every write in the batch atomically, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    fn subscribe(&self, collection: &str, id: &str) -> watch::Receiver<Snapshot>;
}
