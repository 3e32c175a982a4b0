use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use tokio::sync::watch;

use crate::store::{
    Document, DocumentStore, FieldWrite, Filter, Snapshot, StoreError, WriteBatch, WriteOp,
};

type Key = (String, String);

/// In-memory document store backing the service. Batches are staged and
/// validated in full before anything is applied, so a failing op leaves
/// every document untouched. The commit lock also orders subscription
/// seeding against batches, keeping every feed's deliveries in write
/// order.
#[derive(Default)]
pub struct MemoryStore {
    documents: DashMap<Key, Map<String, Value>>,
    watchers: DashMap<Key, watch::Sender<Snapshot>>,
    commit_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Live listeners on one document; used to verify re-initialization
    /// does not leak feeds.
    pub fn watcher_count(&self, collection: &str, id: &str) -> usize {
        self.watchers
            .get(&(collection.to_string(), id.to_string()))
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, key: &Key, fields: &Map<String, Value>) {
        if let Some(sender) = self.watchers.get(key) {
            sender.send_replace(Ok(Some(Document::new(key.1.clone(), fields.clone()))));
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let key = (collection.to_string(), id.to_string());
        Ok(self
            .documents
            .get(&key)
            .map(|entry| Document::new(id, entry.value().clone())))
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> Result<Vec<Document>, StoreError> {
        let mut matches: Vec<Document> = self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .filter(|entry| {
                filters
                    .iter()
                    .all(|filter| lookup(entry.value(), &filter.field) == Some(&filter.equals))
            })
            .map(|entry| Document::new(entry.key().1.clone(), entry.value().clone()))
            .collect();

        // deterministic fetch order
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let _guard = self.lock_commits();
        let now = Utc::now();

        // Stage every op against a scratch view first; only a fully valid
        // batch reaches the live map.
        let mut staged: Vec<(Key, Map<String, Value>)> = Vec::new();

        for op in batch.ops() {
            let (key, base, writes) = match op {
                WriteOp::Put {
                    collection,
                    id,
                    fields,
                } => (
                    (collection.clone(), id.clone()),
                    Map::new(),
                    fields,
                ),
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                } => {
                    let key = (collection.clone(), id.clone());
                    let base = staged
                        .iter()
                        .rev()
                        .find(|(staged_key, _)| *staged_key == key)
                        .map(|(_, fields)| fields.clone())
                        .or_else(|| self.documents.get(&key).map(|entry| entry.value().clone()))
                        .ok_or_else(|| StoreError::NotFound {
                            collection: collection.clone(),
                            id: id.clone(),
                        })?;
                    (key, base, fields)
                }
            };

            let mut fields = base;
            for (path, write) in writes {
                apply_write(&mut fields, path, write, now)?;
            }
            staged.push((key, fields));
        }

        for (key, fields) in staged {
            self.documents.insert(key.clone(), fields.clone());
            self.notify(&key, &fields);
        }

        Ok(())
    }

    fn subscribe(&self, collection: &str, id: &str) -> watch::Receiver<Snapshot> {
        let key = (collection.to_string(), id.to_string());
        // seed under the commit lock so a batch cannot land between the
        // document read and the channel creation; an existing sender
        // already carries the latest state and must not be rewound
        let _guard = self.lock_commits();
        let sender = self.watchers.entry(key.clone()).or_insert_with(|| {
            let current: Snapshot = Ok(self
                .documents
                .get(&key)
                .map(|entry| Document::new(key.1.clone(), entry.value().clone())));
            watch::channel(current).0
        });
        sender.subscribe()
    }
}

fn lookup<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut current = fields;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let value = current.get(segment)?;
        if segments.peek().is_none() {
            return Some(value);
        }
        current = value.as_object()?;
    }
    None
}

fn apply_write(
    fields: &mut Map<String, Value>,
    path: &str,
    write: &FieldWrite,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let mut current = fields;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            match write {
                FieldWrite::Set(value) => {
                    current.insert(segment.to_string(), value.clone());
                }
                FieldWrite::Increment(amount) => {
                    let existing = current.get(segment);
                    if matches!(existing, Some(v) if !v.is_number() && !v.is_null()) {
                        return Err(StoreError::Malformed(format!(
                            "cannot increment non-numeric field {path}"
                        )));
                    }
                    let base = existing.and_then(Value::as_f64).unwrap_or(0.0);
                    current.insert(segment.to_string(), json!(base + amount));
                }
                FieldWrite::ServerTimestamp => {
                    current.insert(segment.to_string(), json!(now.to_rfc3339()));
                }
            }
            return Ok(());
        }

        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(nested) = entry else {
            return Err(StoreError::Malformed(format!(
                "field path {path} crosses a non-object value"
            )));
        };
        current = nested;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(value: Value) -> FieldWrite {
        FieldWrite::Set(value)
    }

    async fn seed(store: &MemoryStore, collection: &str, id: &str, fields: Value) {
        let writes = fields
            .as_object()
            .expect("seed takes an object")
            .iter()
            .map(|(k, v)| (k.clone(), set(v.clone())))
            .collect();
        store
            .commit(WriteBatch::new().put(collection, id, writes))
            .await
            .expect("seed commit");
    }

    #[tokio::test]
    async fn update_missing_document_fails() {
        let store = MemoryStore::new();
        let err = store
            .commit(WriteBatch::new().update("tasks", "t1", vec![("status", set(json!("x")))]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn failed_batch_applies_nothing() {
        let store = MemoryStore::new();
        seed(&store, "tasks", "t1", json!({ "status": "assigned" })).await;

        let batch = WriteBatch::new()
            .update("tasks", "t1", vec![("status", set(json!("picked_up")))])
            .update("orders", "missing", vec![("status", set(json!("X")))]);
        assert!(store.commit(batch).await.is_err());

        let doc = store.get("tasks", "t1").await.unwrap().unwrap();
        assert_eq!(doc.fields["status"], json!("assigned"));
    }

    #[tokio::test]
    async fn increment_creates_and_adds_nested_field() {
        let store = MemoryStore::new();
        seed(&store, "riders", "r1", json!({ "name": "Asha" })).await;

        let batch = WriteBatch::new().update(
            "riders",
            "r1",
            vec![("account.cod_balance", FieldWrite::Increment(250.0))],
        );
        store.commit(batch).await.unwrap();

        let batch = WriteBatch::new().update(
            "riders",
            "r1",
            vec![("account.cod_balance", FieldWrite::Increment(50.0))],
        );
        store.commit(batch).await.unwrap();

        let doc = store.get("riders", "r1").await.unwrap().unwrap();
        assert_eq!(lookup(&doc.fields, "account.cod_balance"), Some(&json!(300.0)));
    }

    #[tokio::test]
    async fn server_timestamp_resolves_at_commit() {
        let store = MemoryStore::new();
        seed(&store, "tasks", "t1", json!({ "status": "arrived_drop" })).await;

        store
            .commit(WriteBatch::new().update(
                "tasks",
                "t1",
                vec![("completedAt", FieldWrite::ServerTimestamp)],
            ))
            .await
            .unwrap();

        let doc = store.get("tasks", "t1").await.unwrap().unwrap();
        let stamp = doc.fields["completedAt"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[tokio::test]
    async fn subscribe_sees_current_state_and_changes() {
        let store = MemoryStore::new();
        seed(&store, "riders", "r1", json!({ "name": "Asha" })).await;

        let mut rx = store.subscribe("riders", "r1");
        let first = rx.borrow_and_update().clone().unwrap().unwrap();
        assert_eq!(first.fields["name"], json!("Asha"));

        store
            .commit(WriteBatch::new().update("riders", "r1", vec![("name", set(json!("Banu")))]))
            .await
            .unwrap();

        rx.changed().await.unwrap();
        let second = rx.borrow_and_update().clone().unwrap().unwrap();
        assert_eq!(second.fields["name"], json!("Banu"));
    }

    #[tokio::test]
    async fn late_subscriber_does_not_rewind_existing_feeds() {
        let store = MemoryStore::new();
        seed(&store, "riders", "r1", json!({ "name": "Asha" })).await;

        let mut first = store.subscribe("riders", "r1");
        first.borrow_and_update();

        store
            .commit(WriteBatch::new().update("riders", "r1", vec![("name", set(json!("Banu")))]))
            .await
            .unwrap();
        first.changed().await.unwrap();
        first.borrow_and_update();

        // attaching another listener must not push a stale value back
        // through the shared channel
        let mut second = store.subscribe("riders", "r1");
        let seen = second.borrow_and_update().clone().unwrap().unwrap();
        assert_eq!(seen.fields["name"], json!("Banu"));
        assert!(!first.has_changed().unwrap());
    }

    #[tokio::test]
    async fn subscribe_to_missing_document_yields_absent() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe("tasks", "ghost");
        assert!(rx.borrow_and_update().clone().unwrap().is_none());
    }

    #[tokio::test]
    async fn query_filters_on_nested_equality() {
        let store = MemoryStore::new();
        seed(&store, "tasks", "t2", json!({ "riderId": "r1", "status": "assigned" })).await;
        seed(&store, "tasks", "t1", json!({ "riderId": "r1", "status": "completed" })).await;
        seed(&store, "tasks", "t3", json!({ "riderId": "r2", "status": "assigned" })).await;

        let docs = store
            .query(
                "tasks",
                &[
                    Filter::field_eq("riderId", "r1"),
                    Filter::field_eq("status", "assigned"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "t2");
    }
}
