//! In-process registry.

use async_trait::async_trait;
use kafka_types::SchemaId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{RegistryError, Result};
use crate::SchemaRegistry;

#[derive(Debug)]
struct MemoryState {
    /// Index `i` holds the schema with id `i + 1`.
    schemas: Vec<serde_json::Value>,
    subjects: HashMap<String, Vec<SchemaId>>,
    available: bool,
    register_calls: usize,
    lookup_calls: usize,
}

/// A registry living in process memory.
///
/// Behaves like the HTTP registry: the same schema document always gets the
/// same id (whitespace-insensitive), ids start at 1, and every subject keeps
/// its list of versions. Availability can be switched off to simulate an
/// outage, and calls are counted so caching can be observed.
#[derive(Debug)]
pub struct MemorySchemaRegistry {
    state: Mutex<MemoryState>,
}

impl Default for MemorySchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySchemaRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                schemas: Vec::new(),
                subjects: HashMap::new(),
                available: true,
                register_calls: 0,
                lookup_calls: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    pub fn register_calls(&self) -> usize {
        self.state().register_calls
    }

    pub fn lookup_calls(&self) -> usize {
        self.state().lookup_calls
    }

    /// Schema ids registered under a subject, oldest first.
    pub fn versions(&self, subject: &str) -> Vec<SchemaId> {
        self.state()
            .subjects
            .get(subject)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SchemaRegistry for MemorySchemaRegistry {
    async fn register(&self, subject: &str, schema: &str) -> Result<SchemaId> {
        let mut state = self.state();
        state.register_calls += 1;
        if !state.available {
            return Err(RegistryError::Unavailable("registry is down".into()));
        }

        let document: serde_json::Value = serde_json::from_str(schema)
            .map_err(|e| RegistryError::InvalidSchema(format!("schema is not JSON: {e}")))?;

        let id = match state.schemas.iter().position(|s| *s == document) {
            Some(index) => SchemaId(index as u32 + 1),
            None => {
                state.schemas.push(document);
                SchemaId(state.schemas.len() as u32)
            }
        };

        let versions = state.subjects.entry(subject.to_string()).or_default();
        if !versions.contains(&id) {
            versions.push(id);
        }
        Ok(id)
    }

    async fn lookup(&self, id: SchemaId) -> Result<String> {
        let mut state = self.state();
        state.lookup_calls += 1;
        if !state.available {
            return Err(RegistryError::Unavailable("registry is down".into()));
        }

        id.0.checked_sub(1)
            .and_then(|index| state.schemas.get(index as usize))
            .map(|document| document.to_string())
            .ok_or(RegistryError::NotFound(id))
    }
}
