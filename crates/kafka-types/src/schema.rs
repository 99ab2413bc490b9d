//! Record schemas.
//!
//! A [`RecordSchema`] is an immutable, named list of typed fields. It is
//! rendered as an Avro record schema document when registered, and parsed
//! back from one when it comes from somewhere else (a config value, a test
//! fixture).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::record::Record;

/// Field types a record may carry. All are Avro primitives; none is nullable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int,
    Long,
    Float,
    Double,
    Boolean,
    String,
    Bytes,
}

impl FieldType {
    pub fn avro_name(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Long => "long",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
        }
    }

    fn from_avro_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(FieldType::Int),
            "long" => Some(FieldType::Long),
            "float" => Some(FieldType::Float),
            "double" => Some(FieldType::Double),
            "boolean" => Some(FieldType::Boolean),
            "string" => Some(FieldType::String),
            "bytes" => Some(FieldType::Bytes),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.avro_name())
    }
}

/// One named field of a record schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// An immutable record schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordSchema {
    name: String,
    namespace: Option<String>,
    fields: Vec<FieldSchema>,
}

#[derive(Serialize, Deserialize)]
struct AvroRecordDocument {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    fields: Vec<AvroFieldDocument>,
}

#[derive(Serialize, Deserialize)]
struct AvroFieldDocument {
    name: String,
    #[serde(rename = "type")]
    field_type: serde_json::Value,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            fields: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            field_type,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// `namespace.name`, or just `name` without a namespace.
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{ns}.{}", self.name),
            _ => self.name.clone(),
        }
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Check that a record carries exactly this schema's fields, in order,
    /// with matching types.
    pub fn validate(&self, record: &Record) -> Result<()> {
        if record.len() != self.fields.len() {
            let expected: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
            let actual: Vec<&str> = record.fields().iter().map(|(n, _)| n.as_str()).collect();
            return Err(Error::SchemaMismatch(format!(
                "schema {} expects fields {expected:?}, record has {actual:?}",
                self.full_name()
            )));
        }

        for (field, (name, value)) in self.fields.iter().zip(record.fields()) {
            if field.name != *name {
                return Err(Error::SchemaMismatch(format!(
                    "expected field '{}' but found '{name}'",
                    field.name
                )));
            }
            if value.field_type() != field.field_type {
                return Err(Error::SchemaMismatch(format!(
                    "field '{name}' must be {}, got {}",
                    field.field_type,
                    value.field_type()
                )));
            }
        }

        Ok(())
    }

    /// Render as an Avro record schema document.
    pub fn to_avro_json(&self) -> String {
        let doc = AvroRecordDocument {
            kind: "record".to_string(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| AvroFieldDocument {
                    name: f.name.clone(),
                    field_type: serde_json::Value::String(f.field_type.avro_name().to_string()),
                })
                .collect(),
        };
        // Serializing plain strings and vectors cannot fail.
        serde_json::to_string(&doc).unwrap_or_default()
    }

    /// Parse an Avro record schema document whose fields are all primitives.
    pub fn from_avro_json(json: &str) -> Result<Self> {
        let doc: AvroRecordDocument = serde_json::from_str(json)
            .map_err(|e| Error::SchemaMismatch(format!("invalid schema document: {e}")))?;

        if doc.kind != "record" {
            return Err(Error::SchemaMismatch(format!(
                "expected a record schema, got '{}'",
                doc.kind
            )));
        }

        let mut schema = RecordSchema::new(doc.name);
        schema.namespace = doc.namespace;
        for field in doc.fields {
            let type_name = match &field.field_type {
                serde_json::Value::String(s) => s.as_str(),
                serde_json::Value::Object(obj) => {
                    obj.get("type").and_then(|t| t.as_str()).unwrap_or_default()
                }
                _ => "",
            };
            let field_type = FieldType::from_avro_name(type_name).ok_or_else(|| {
                Error::SchemaMismatch(format!(
                    "field '{}' has unsupported type {}",
                    field.name, field.field_type
                ))
            })?;
            schema = schema.field(field.name, field_type);
        }

        Ok(schema)
    }
}
