use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{DocumentStore, FieldValue, Fields, Query, StoreError, StoreErrorKind};

/// In-process document store. Server timestamps resolve to the write time.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, Fields>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(fields: Fields) -> Fields {
        let now = Utc::now();
        fields
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    FieldValue::ServerTimestamp => FieldValue::Timestamp(now),
                    other => other,
                };
                (name, value)
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Fields>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn set_document(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default().insert(id.to_string(), Self::resolve(fields));
        Ok(())
    }

    async fn update_document(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::new(StoreErrorKind::NotFound, format!("{collection}/{id}")))?;

        document.extend(Self::resolve(fields));
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Fields)>, StoreError> {
        let collections = self.collections.read().await;

        let mut matches: Vec<(String, Fields)> = collections
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|(_, fields)| query.matches(fields))
            .map(|(id, fields)| (id.clone(), fields.clone()))
            .collect();

        matches.sort_by(|(a_id, a), (b_id, b)| query.order((a_id.as_str(), a), (b_id.as_str(), b)));
        if let Some(limit) = query.limit {
            matches.truncate(limit as usize);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::document::Direction;

    fn name(value: &str) -> Fields {
        Fields::from([("displayName".to_string(), FieldValue::String(value.to_string()))])
    }

    #[tokio::test]
    async fn test_server_timestamp_is_resolved() {
        let store = MemoryStore::new();
        let fields = Fields::from([("createdAt".to_string(), FieldValue::ServerTimestamp)]);

        store.set_document("users", "u1", fields).await.unwrap();

        let stored = store.get_document("users", "u1").await.unwrap().unwrap();
        assert!(matches!(stored["createdAt"], FieldValue::Timestamp(_)));
    }

    #[tokio::test]
    async fn test_update_requires_existing_document() {
        let store = MemoryStore::new();

        let err = store.update_document("users", "ghost", name("Ada")).await.unwrap_err();

        assert_eq!(err.kind, StoreErrorKind::NotFound);
        assert_eq!(store.get_document("users", "ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_keeps_other_fields() {
        let store = MemoryStore::new();
        let mut fields = name("Ada");
        fields.insert("bio".to_string(), FieldValue::String("math".to_string()));
        store.set_document("users", "u1", fields).await.unwrap();

        store.update_document("users", "u1", name("Ada L.")).await.unwrap();

        let stored = store.get_document("users", "u1").await.unwrap().unwrap();
        assert_eq!(stored["displayName"], FieldValue::String("Ada L.".to_string()));
        assert_eq!(stored["bio"], FieldValue::String("math".to_string()));
    }

    #[tokio::test]
    async fn test_query_prefix() {
        let store = MemoryStore::new();
        store.set_document("users", "u1", name("Ada")).await.unwrap();
        store.set_document("users", "u2", name("Adele")).await.unwrap();
        store.set_document("users", "u3", name("Grace")).await.unwrap();

        let found = store.query("users", &Query::prefix("displayName", "Ad")).await.unwrap();
        let ids: Vec<_> = found.iter().map(|(id, _)| id.as_str()).collect();

        assert_eq!(ids, vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_query_orders_and_limits() {
        let store = MemoryStore::new();
        store.set_document("users", "u1", name("Ada")).await.unwrap();
        store.set_document("users", "u2", name("Grace")).await.unwrap();
        store.set_document("users", "u3", name("Barbara")).await.unwrap();
        store.set_document("users", "u4", Fields::new()).await.unwrap();

        let query = Query::new().order_by("displayName", Direction::Descending).limit(2);
        let found = store.query("users", &query).await.unwrap();
        let ids: Vec<_> = found.iter().map(|(id, _)| id.as_str()).collect();

        assert_eq!(ids, vec!["u2", "u3"]);
        assert!(store.query("posts", &Query::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = MemoryStore::new();
        assert!(store.delete_document("users", "ghost").await.is_ok());
    }
}
