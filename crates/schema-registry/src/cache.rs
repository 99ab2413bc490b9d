//! Process-wide registry cache.

use async_trait::async_trait;
use kafka_types::SchemaId;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::error::Result;
use crate::SchemaRegistry;

/// Caches successful registry answers in front of another registry.
///
/// Entries are never invalidated: a schema id always names the same schema,
/// and a (subject, schema) pair keeps the id it was first given. Failures
/// are not cached, so a registry outage heals as soon as the registry does.
///
/// Lookups only take read locks once an entry is present, and no lock is
/// held while the inner registry is awaited, so concurrent subscribers share
/// one instance without contention.
pub struct CachedSchemaRegistry<R> {
    inner: R,
    ids: RwLock<HashMap<(String, String), SchemaId>>,
    schemas: RwLock<HashMap<SchemaId, String>>,
}

impl<R: SchemaRegistry> CachedSchemaRegistry<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            ids: RwLock::new(HashMap::new()),
            schemas: RwLock::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of cached schema documents.
    pub fn cached_schemas(&self) -> usize {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl<R: SchemaRegistry> SchemaRegistry for CachedSchemaRegistry<R> {
    async fn register(&self, subject: &str, schema: &str) -> Result<SchemaId> {
        let key = (subject.to_string(), schema.to_string());
        let cached = self
            .ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied();
        if let Some(id) = cached {
            return Ok(id);
        }

        let id = self.inner.register(subject, schema).await?;
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, id);
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_insert_with(|| schema.to_string());
        debug!("Cached schema id {id} for subject '{subject}'");
        Ok(id)
    }

    async fn lookup(&self, id: SchemaId) -> Result<String> {
        let cached = self
            .schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();
        if let Some(schema) = cached {
            return Ok(schema);
        }

        let schema = self.inner.lookup(id).await?;
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, schema.clone());
        debug!("Cached schema {id}");
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::MemorySchemaRegistry;
    use std::sync::Arc;

    const USERS: &str = r#"{"type":"record","name":"Users","fields":[{"name":"id","type":"int"}]}"#;

    #[tokio::test]
    async fn test_register_hits_inner_once() {
        let cached = CachedSchemaRegistry::new(MemorySchemaRegistry::new());
        let a = cached.register("users-value", USERS).await.unwrap();
        let b = cached.register("users-value", USERS).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(cached.inner().register_calls(), 1);

        // A registered schema is known without a lookup round trip.
        assert_eq!(cached.lookup(a).await.unwrap(), USERS);
        assert_eq!(cached.inner().lookup_calls(), 0);
    }

    #[tokio::test]
    async fn test_lookup_hits_inner_once() {
        let registry = Arc::new(MemorySchemaRegistry::new());
        let id = registry.register("users-value", USERS).await.unwrap();

        let cached = CachedSchemaRegistry::new(registry.clone());
        cached.lookup(id).await.unwrap();
        cached.lookup(id).await.unwrap();
        assert_eq!(registry.lookup_calls(), 1);
        assert_eq!(cached.cached_schemas(), 1);
    }

    #[tokio::test]
    async fn test_failures_not_cached() {
        let registry = Arc::new(MemorySchemaRegistry::new());
        let id = registry.register("users-value", USERS).await.unwrap();
        let cached = CachedSchemaRegistry::new(registry.clone());

        registry.set_available(false);
        assert!(matches!(
            cached.lookup(id).await,
            Err(RegistryError::Unavailable(_))
        ));

        registry.set_available(true);
        assert!(cached.lookup(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_cached_entries_survive_outage() {
        let registry = Arc::new(MemorySchemaRegistry::new());
        let cached = CachedSchemaRegistry::new(registry.clone());
        let id = cached.register("users-value", USERS).await.unwrap();

        registry.set_available(false);
        assert_eq!(cached.register("users-value", USERS).await, Ok(id));
        assert_eq!(cached.lookup(id).await.unwrap(), USERS);
    }

    #[tokio::test]
    async fn test_concurrent_readers() {
        let registry = Arc::new(MemorySchemaRegistry::new());
        let id = registry.register("users-value", USERS).await.unwrap();
        let cached = Arc::new(CachedSchemaRegistry::new(registry.clone()));
        cached.lookup(id).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cached = cached.clone();
            handles.push(tokio::spawn(async move { cached.lookup(id).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), USERS);
        }
        assert_eq!(registry.lookup_calls(), 1);
    }
}
