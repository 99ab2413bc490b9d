use apache_avro::Schema;
use kafka_types::{Error, Record, RecordSchema, Result, SchemaId};
use schema_registry::{RegistryError, SchemaRegistry};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::convert::{avro_to_record, check_representable};
use crate::wire;

/// A decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub schema_id: SchemaId,
    pub record: Record,
}

/// Decodes framed payloads using the writer schema named by their id.
///
/// Without a reader schema, records come back in the writer's shape. With
/// one, Avro schema resolution projects the writer's data onto it, so a
/// consumer can keep reading a fixed shape across writer versions.
pub struct Decoder<R> {
    registry: R,
    reader_schema: Option<Schema>,
    writers: RwLock<HashMap<SchemaId, Arc<Schema>>>,
}

impl<R: SchemaRegistry> Decoder<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            reader_schema: None,
            writers: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve every payload against `schema`.
    pub fn with_reader_schema(mut self, schema: &RecordSchema) -> Result<Self> {
        let parsed = Schema::parse_str(&schema.to_avro_json())
            .map_err(|e| Error::InvalidConfig(format!("invalid reader schema: {e}")))?;
        self.reader_schema = Some(parsed);
        Ok(self)
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub async fn decode(&self, bytes: &[u8]) -> Result<Decoded> {
        let (schema_id, body) = wire::split(bytes)?;
        let writer = self.writer_schema(schema_id).await?;

        let mut reader = body;
        let value = apache_avro::from_avro_datum(&writer, &mut reader, self.reader_schema.as_ref())
            .map_err(|e| Error::MalformedPayload(format!("avro decode with schema {schema_id}: {e}")))?;
        if !reader.is_empty() {
            return Err(Error::MalformedPayload(format!(
                "{} trailing bytes after record with schema {schema_id}",
                reader.len()
            )));
        }

        Ok(Decoded {
            schema_id,
            record: avro_to_record(value)?,
        })
    }

    async fn writer_schema(&self, id: SchemaId) -> Result<Arc<Schema>> {
        let cached = self
            .writers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();
        if let Some(schema) = cached {
            return Ok(schema);
        }

        let document = self.registry.lookup(id).await.map_err(from_registry)?;
        let schema = Schema::parse_str(&document)
            .map_err(|e| Error::MalformedPayload(format!("registry schema {id} is not valid avro: {e}")))?;
        check_representable(self.reader_schema.as_ref().unwrap_or(&schema))?;

        debug!("Loaded writer schema {id}");
        let schema = Arc::new(schema);
        self.writers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, schema.clone());
        Ok(schema)
    }
}

fn from_registry(err: RegistryError) -> Error {
    match err {
        RegistryError::NotFound(id) => Error::UnknownSchema(id),
        RegistryError::Unavailable(message) => Error::RegistryUnavailable(message),
        RegistryError::Rejected { status, message } => {
            Error::RegistryUnavailable(format!("registry returned {status}: {message}"))
        }
        other => Error::MalformedPayload(other.to_string()),
    }
}
