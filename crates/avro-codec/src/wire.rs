//! Framing of encoded records.
//!
//! Every payload starts with a zero magic byte and the big-endian schema id
//! of the writer schema, followed by the Avro binary body.

use kafka_types::{Error, Result, SchemaId};

pub const MAGIC_BYTE: u8 = 0;

/// Magic byte plus the four id bytes.
pub const HEADER_LEN: usize = 5;

pub fn frame(schema_id: SchemaId, body: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.push(MAGIC_BYTE);
    bytes.extend_from_slice(&schema_id.0.to_be_bytes());
    bytes.extend_from_slice(body);
    bytes
}

/// Split a payload into its schema id and Avro body.
pub fn split(bytes: &[u8]) -> Result<(SchemaId, &[u8])> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::MalformedPayload(format!(
            "payload of {} bytes is shorter than the {HEADER_LEN}-byte header",
            bytes.len()
        )));
    }
    if bytes[0] != MAGIC_BYTE {
        return Err(Error::MalformedPayload(format!(
            "unknown magic byte {:#04x}",
            bytes[0]
        )));
    }
    let id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    Ok((SchemaId(id), &bytes[HEADER_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let bytes = frame(SchemaId(258), &[0xAA, 0xBB]);
        assert_eq!(bytes, vec![0, 0, 0, 1, 2, 0xAA, 0xBB]);
    }

    #[test]
    fn test_split() {
        let (id, body) = split(&[0, 0, 0, 0, 7, 1, 2, 3]).unwrap();
        assert_eq!(id, SchemaId(7));
        assert_eq!(body, &[1, 2, 3]);

        // An empty body is left for the Avro reader to reject.
        let (_, body) = split(&[0, 0, 0, 0, 7]).unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn test_split_short() {
        for len in 0..HEADER_LEN {
            let bytes = vec![0u8; len];
            assert!(matches!(split(&bytes), Err(Error::MalformedPayload(_))));
        }
    }

    #[test]
    fn test_split_bad_magic() {
        let err = split(&[1, 0, 0, 0, 7, 0]).unwrap_err();
        assert_eq!(
            err,
            Error::MalformedPayload("unknown magic byte 0x01".into())
        );
    }
}
