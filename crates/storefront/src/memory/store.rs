use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::RwLock;

use crate::backend::{
    BackendError, DocPath, Document, DocumentStore, FieldTransform, Fields, FieldsExt, Filter,
    Value, Write, new_document_id,
};

type Collections = BTreeMap<String, BTreeMap<String, Document>>;

/// Document store held in process memory.
///
/// Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    collections: RwLock<Collections>,
    pending_failures: AtomicU32,
    commits: AtomicU64,
    id_token: std::sync::RwLock<Option<SecretString>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes (commits and creates) fail with
    /// `BackendError::Unavailable`.
    pub fn fail_next_writes(&self, count: u32) {
        self.inner.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::SeqCst)
    }

    /// The ID token last handed over through `authorize`.
    #[must_use]
    pub fn authorized_token(&self) -> Option<SecretString> {
        self.inner
            .id_token
            .read()
            .ok()
            .and_then(|token| token.clone())
    }

    /// Insert a document directly, bypassing failure injection.
    pub async fn insert(&self, collection: &str, id: &str, fields: Fields) {
        let mut collections = self.inner.collections.write().await;
        collections.entry(collection.to_string()).or_default().insert(
            id.to_string(),
            Document {
                id: id.to_string(),
                fields,
                update_time: Some(Utc::now()),
            },
        );
    }

    /// Number of documents in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.inner
            .collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn take_failure(&self) -> Result<(), BackendError> {
        let injected = self
            .inner
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(BackendError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

fn apply_transform(
    fields: &mut Fields,
    field: &str,
    transform: &FieldTransform,
    now: DateTime<Utc>,
) {
    // A missing or non-array field counts as an empty array.
    match transform {
        FieldTransform::ArrayUnion(values) => {
            let mut current = fields.array(field).to_vec();
            for value in values {
                if !current.contains(value) {
                    current.push(value.clone());
                }
            }
            fields.insert(field.to_string(), Value::Array(current));
        }
        FieldTransform::ArrayRemove(values) => {
            let mut current = fields.array(field).to_vec();
            current.retain(|v| !values.contains(v));
            fields.insert(field.to_string(), Value::Array(current));
        }
        FieldTransform::ServerTimestamp => {
            fields.insert(field.to_string(), Value::Timestamp(now));
        }
    }
}

fn apply_write(
    collections: &mut Collections,
    write: Write,
    now: DateTime<Utc>,
) -> Result<(), BackendError> {
    let (path, fields, transforms, must_exist, replace) = match write {
        Write::Delete { path } => {
            if let Some(docs) = collections.get_mut(&path.collection) {
                docs.remove(&path.id);
            }
            return Ok(());
        }
        Write::Set {
            path,
            fields,
            transforms,
        } => (path, fields, transforms, false, true),
        Write::Merge {
            path,
            fields,
            transforms,
        } => (path, fields, transforms, false, false),
        Write::Update {
            path,
            fields,
            transforms,
        } => (path, fields, transforms, true, false),
    };

    let docs = collections.entry(path.collection.clone()).or_default();
    let existing = docs.remove(&path.id);
    if must_exist && existing.is_none() {
        return Err(BackendError::Precondition(format!("no document to update: {path}")));
    }

    let mut merged = match existing {
        Some(doc) if !replace => doc.fields,
        _ => Fields::new(),
    };
    merged.extend(fields);
    for (field, transform) in &transforms {
        apply_transform(&mut merged, field, transform, now);
    }

    docs.insert(
        path.id.clone(),
        Document {
            id: path.id,
            fields: merged,
            update_time: Some(now),
        },
    );
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, BackendError> {
        let collections = self.inner.collections.read().await;
        Ok(collections
            .get(&path.collection)
            .and_then(|docs| docs.get(&path.id))
            .cloned())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, BackendError> {
        let collections = self.inner.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, BackendError> {
        let collections = self.inner.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| filter.matches(&doc.fields))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<Document, BackendError> {
        self.take_failure()?;
        let document = Document {
            id: new_document_id(),
            fields,
            update_time: Some(Utc::now()),
        };
        let mut collections = self.inner.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(document.id.clone(), document.clone());
        Ok(document)
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), BackendError> {
        self.take_failure()?;
        let now = Utc::now();
        let mut collections = self.inner.collections.write().await;

        // Apply to a copy so a failing write leaves nothing behind.
        let mut staged = collections.clone();
        for write in writes {
            apply_write(&mut staged, write, now)?;
        }
        *collections = staged;
        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn authorize(&self, id_token: Option<SecretString>) {
        if let Ok(mut slot) = self.inner.id_token.write() {
            *slot = id_token;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fields;

    fn path(id: &str) -> DocPath {
        DocPath::new("users", id)
    }

    #[tokio::test]
    async fn test_merge_creates_and_keeps_other_fields() {
        let store = MemoryStore::new();
        store.insert("users", "u1", fields! { "fullName" => "Lan" }).await;

        store
            .merge(path("u1"), fields! { "cart" => Value::Array(vec![]) }, vec![])
            .await
            .unwrap();
        store
            .merge(path("u2"), fields! { "fullName" => "Minh" }, vec![])
            .await
            .unwrap();

        let u1 = store.get(&path("u1")).await.unwrap().unwrap();
        assert_eq!(u1.fields["fullName"], Value::from("Lan"));
        assert!(u1.fields.contains_key("cart"));
        assert!(store.get(&path("u2")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let store = MemoryStore::new();
        let err = store
            .update(path("ghost"), fields! { "fullName" => "x" })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Precondition(_)));
        assert_eq!(store.len("users").await, 0);
    }

    #[tokio::test]
    async fn test_commit_is_atomic() {
        let store = MemoryStore::new();
        let writes = vec![
            Write::set(path("u1"), fields! { "fullName" => "Lan" }),
            Write::Update {
                path: path("ghost"),
                fields: Fields::new(),
                transforms: vec![],
            },
        ];
        assert!(store.commit(writes).await.is_err());
        assert!(store.get(&path("u1")).await.unwrap().is_none());
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_array_union_and_remove() {
        let store = MemoryStore::new();
        let union = |v: &str| {
            vec![(
                "wishlist".to_string(),
                FieldTransform::ArrayUnion(vec![Value::from(v)]),
            )]
        };
        store.merge(path("u1"), Fields::new(), union("a")).await.unwrap();
        store.merge(path("u1"), Fields::new(), union("a")).await.unwrap();
        store.merge(path("u1"), Fields::new(), union("b")).await.unwrap();

        let doc = store.get(&path("u1")).await.unwrap().unwrap();
        assert_eq!(
            doc.fields["wishlist"],
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );

        let remove = vec![(
            "wishlist".to_string(),
            FieldTransform::ArrayRemove(vec![Value::from("a")]),
        )];
        store.merge(path("u1"), Fields::new(), remove).await.unwrap();
        let doc = store.get(&path("u1")).await.unwrap().unwrap();
        assert_eq!(doc.fields["wishlist"], Value::Array(vec![Value::from("b")]));
    }

    #[tokio::test]
    async fn test_server_timestamp_transform() {
        let store = MemoryStore::new();
        let before = Utc::now();
        store
            .commit(vec![Write::Set {
                path: path("u1"),
                fields: Fields::new(),
                transforms: vec![("createdAt".to_string(), FieldTransform::ServerTimestamp)],
            }])
            .await
            .unwrap();
        let doc = store.get(&path("u1")).await.unwrap().unwrap();
        assert!(doc.fields["createdAt"].as_timestamp().unwrap() >= before);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        store.fail_next_writes(1);
        let err = store.create("products", Fields::new()).await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
        assert!(store.create("products", Fields::new()).await.is_ok());
        assert_eq!(store.len("products").await, 1);
    }

    #[tokio::test]
    async fn test_query_filters_documents() {
        let store = MemoryStore::new();
        store.insert("products", "p1", fields! { "category" => "ceramics" }).await;
        store.insert("products", "p2", fields! { "category" => "weaving" }).await;

        let found = store
            .query("products", &Filter::equal("category", "weaving"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "p2");
    }
}
