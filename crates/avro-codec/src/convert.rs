use apache_avro::types::Value;
use apache_avro::Schema;
use kafka_types::{Error, FieldValue, Record, Result};

// ═══════════════════════════════════════════════════════════════
//  Record → Avro
// ═══════════════════════════════════════════════════════════════

pub(crate) fn record_to_avro(record: &Record) -> Value {
    Value::Record(
        record
            .fields()
            .iter()
            .map(|(name, value)| (name.clone(), field_to_avro(value)))
            .collect(),
    )
}

fn field_to_avro(value: &FieldValue) -> Value {
    match value {
        FieldValue::Int(v) => Value::Int(*v),
        FieldValue::Long(v) => Value::Long(*v),
        FieldValue::Float(v) => Value::Float(*v),
        FieldValue::Double(v) => Value::Double(*v),
        FieldValue::Boolean(v) => Value::Boolean(*v),
        FieldValue::String(v) => Value::String(v.clone()),
        FieldValue::Bytes(v) => Value::Bytes(v.clone()),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Avro → Record
// ═══════════════════════════════════════════════════════════════

pub(crate) fn avro_to_record(value: Value) -> Result<Record> {
    let Value::Record(fields) = value else {
        return Err(Error::MalformedPayload(format!(
            "expected a record, decoded {value:?}"
        )));
    };

    fields
        .into_iter()
        .map(|(name, value)| {
            let field = avro_to_field(&name, value)?;
            Ok((name, field))
        })
        .collect()
}

fn avro_to_field(name: &str, value: Value) -> Result<FieldValue> {
    match value {
        Value::Int(v) => Ok(FieldValue::Int(v)),
        Value::Long(v) => Ok(FieldValue::Long(v)),
        Value::Float(v) => Ok(FieldValue::Float(v)),
        Value::Double(v) => Ok(FieldValue::Double(v)),
        Value::Boolean(v) => Ok(FieldValue::Boolean(v)),
        Value::String(v) => Ok(FieldValue::String(v)),
        Value::Bytes(v) => Ok(FieldValue::Bytes(v)),
        Value::Union(_, inner) => avro_to_field(name, *inner),
        Value::Null => Err(Error::MalformedPayload(format!("field '{name}' is null"))),
        other => Err(Error::MalformedPayload(format!(
            "field '{name}' holds unsupported value {other:?}"
        ))),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Schema shape
// ═══════════════════════════════════════════════════════════════

/// Check that records written with `schema` can be represented as a [`Record`]:
/// a record whose fields are primitives, or unions of primitives and null
/// with at least one non-null branch.
pub(crate) fn check_representable(schema: &Schema) -> Result<()> {
    let Schema::Record(record) = schema else {
        return Err(Error::MalformedPayload(
            "writer schema is not a record schema".to_string(),
        ));
    };

    for field in &record.fields {
        let supported = match &field.schema {
            Schema::Union(union) => {
                let variants = union.variants();
                variants.iter().all(|v| is_primitive(v) || *v == Schema::Null)
                    && variants.iter().any(is_primitive)
            }
            other => is_primitive(other),
        };
        if !supported {
            return Err(Error::MalformedPayload(format!(
                "field '{}' has a type that cannot be represented: {:?}",
                field.name, field.schema
            )));
        }
    }
    Ok(())
}

fn is_primitive(schema: &Schema) -> bool {
    matches!(
        schema,
        Schema::Int
            | Schema::Long
            | Schema::Float
            | Schema::Double
            | Schema::Boolean
            | Schema::String
            | Schema::Bytes
    )
}
