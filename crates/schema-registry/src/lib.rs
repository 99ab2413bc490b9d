//! Schema registry client.
//!
//! Resolves schema documents to registry-assigned ids and back. Three
//! implementations of [`SchemaRegistry`] are provided:
//!
//! - [`HttpSchemaRegistry`] - the Confluent-compatible REST API
//! - [`MemorySchemaRegistry`] - an in-process registry for tests and demos
//! - [`CachedSchemaRegistry`] - a never-invalidated cache in front of either
//!
//! ```rust,no_run
//! use schema_registry::{CachedSchemaRegistry, HttpSchemaRegistry, SchemaRegistry};
//! use std::time::Duration;
//!
//! # async fn run() -> schema_registry::Result<()> {
//! let registry = CachedSchemaRegistry::new(HttpSchemaRegistry::new(
//!     "http://localhost:8081",
//!     Duration::from_secs(10),
//! )?);
//! let schema = r#"{"type":"record","name":"Users","fields":[{"name":"id","type":"int"}]}"#;
//! let id = registry.register("users-value", schema).await?;
//! assert_eq!(registry.lookup(id).await?, schema);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use kafka_types::SchemaId;
use std::sync::Arc;

pub mod cache;
pub mod error;
pub mod http;
pub mod memory;
pub mod subject;

pub use cache::CachedSchemaRegistry;
pub use error::{RegistryError, Result};
pub use http::{HttpSchemaRegistry, DEFAULT_REQUEST_TIMEOUT};
pub use memory::MemorySchemaRegistry;
pub use subject::SubjectNameStrategy;

/// Register and resolve schema documents.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    /// Register `schema` under `subject`, returning its id. Registering an
    /// already-known schema returns the existing id.
    async fn register(&self, subject: &str, schema: &str) -> Result<SchemaId>;

    /// The schema document registered with `id`.
    async fn lookup(&self, id: SchemaId) -> Result<String>;
}

#[async_trait]
impl<R: SchemaRegistry + ?Sized> SchemaRegistry for Arc<R> {
    async fn register(&self, subject: &str, schema: &str) -> Result<SchemaId> {
        (**self).register(subject, schema).await
    }

    async fn lookup(&self, id: SchemaId) -> Result<String> {
        (**self).lookup(id).await
    }
}
