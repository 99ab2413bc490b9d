use apache_avro::Schema;
use kafka_types::{Error, Record, RecordSchema, Result, SchemaId};
use schema_registry::{RegistryError, SchemaRegistry, SubjectNameStrategy};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::convert::record_to_avro;
use crate::wire;

/// An encoded record: the framed bytes and the schema id they carry.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedMessage {
    pub schema_id: SchemaId,
    pub bytes: Vec<u8>,
}

/// Encodes records against a schema registered in the registry.
pub struct Encoder<R> {
    registry: R,
    strategy: SubjectNameStrategy,
    parsed: RwLock<HashMap<String, Arc<Schema>>>,
}

impl<R: SchemaRegistry> Encoder<R> {
    pub fn new(registry: R, strategy: SubjectNameStrategy) -> Self {
        Self {
            registry,
            strategy,
            parsed: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Encode `record` under `schema`.
    ///
    /// The record is validated before the registry is contacted, so a
    /// non-conforming record never registers anything and never produces bytes.
    pub async fn encode(&self, record: &Record, schema: &RecordSchema) -> Result<EncodedMessage> {
        schema.validate(record)?;

        let document = schema.to_avro_json();
        let subject = self.strategy.subject(&schema.full_name());
        let schema_id = self
            .registry
            .register(&subject, &document)
            .await
            .map_err(from_registry)?;

        let avro_schema = self.parsed_schema(&document)?;
        let body = apache_avro::to_avro_datum(&avro_schema, record_to_avro(record))
            .map_err(|e| Error::SchemaMismatch(format!("avro encode: {e}")))?;

        debug!(
            "Encoded {} record with schema {schema_id} ({} body bytes)",
            schema.full_name(),
            body.len()
        );
        Ok(EncodedMessage {
            schema_id,
            bytes: wire::frame(schema_id, &body),
        })
    }

    fn parsed_schema(&self, document: &str) -> Result<Arc<Schema>> {
        if let Some(schema) = self
            .parsed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document)
        {
            return Ok(schema.clone());
        }

        let schema = Arc::new(
            Schema::parse_str(document)
                .map_err(|e| Error::SchemaMismatch(format!("invalid avro schema: {e}")))?,
        );
        self.parsed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document.to_string(), schema.clone());
        Ok(schema)
    }
}

fn from_registry(err: RegistryError) -> Error {
    match err {
        RegistryError::Unavailable(message) => Error::RegistryUnavailable(message),
        other => Error::SchemaMismatch(other.to_string()),
    }
}
