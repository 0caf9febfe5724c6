//! CBOR encoding of values and records.
//!
//! Encoding goes through [`ciborium::Value`]; records are written as CBOR
//! maps with text keys in name order, so equal records encode to equal
//! bytes.

use crate::error::{CodecError, CodecResult};
use crate::record::Record;
use crate::value::Value;
use ciborium::value::{Integer, Value as Cbor};
use std::collections::BTreeMap;

/// Encodes a single value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the CBOR writer fails.
pub fn encode_value(value: &Value) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(&to_cbor(value), &mut buffer)
        .map_err(|e| CodecError::encoding_failed(format!("{e:?}")))?;
    Ok(buffer)
}

/// Decodes a single value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR or contain floats,
/// tags, non-text map keys or integers outside the `i64` range.
pub fn decode_value(bytes: &[u8]) -> CodecResult<Value> {
    let cbor: Cbor = ciborium::de::from_reader(bytes)
        .map_err(|e| CodecError::decoding_failed(format!("{e:?}")))?;
    from_cbor(cbor)
}

/// Encodes a record as a CBOR map.
///
/// # Errors
///
/// Returns an error if the CBOR writer fails.
pub fn encode_record(record: &Record) -> CodecResult<Vec<u8>> {
    encode_value(&Value::from(record.clone()))
}

/// Decodes a record from a CBOR map.
///
/// # Errors
///
/// Returns [`CodecError::NotARecord`] if the top-level item is not a map,
/// or any error [`decode_value`] can return.
pub fn decode_record(bytes: &[u8]) -> CodecResult<Record> {
    match decode_value(bytes)? {
        Value::Map(fields) => Ok(fields.into_iter().collect()),
        other => Err(CodecError::NotARecord {
            found: other.type_name(),
        }),
    }
}

pub(crate) fn to_cbor(value: &Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Integer(n) => Cbor::Integer(Integer::from(*n)),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::Array(items) => Cbor::Array(items.iter().map(to_cbor).collect()),
        Value::Map(map) => Cbor::Map(
            map.iter()
                .map(|(key, item)| (Cbor::Text(key.clone()), to_cbor(item)))
                .collect(),
        ),
    }
}

pub(crate) fn from_cbor(cbor: Cbor) -> CodecResult<Value> {
    match cbor {
        Cbor::Null => Ok(Value::Null),
        Cbor::Bool(b) => Ok(Value::Bool(b)),
        Cbor::Integer(n) => i64::try_from(n)
            .map(Value::Integer)
            .map_err(|_| CodecError::IntegerOverflow),
        Cbor::Text(s) => Ok(Value::Text(s)),
        Cbor::Bytes(b) => Ok(Value::Bytes(b)),
        Cbor::Array(items) => items
            .into_iter()
            .map(from_cbor)
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Array),
        Cbor::Map(entries) => {
            let mut map = BTreeMap::new();
            for (key, item) in entries {
                let Cbor::Text(key) = key else {
                    return Err(CodecError::unsupported_type("non-text map key"));
                };
                map.insert(key, from_cbor(item)?);
            }
            Ok(Value::Map(map))
        }
        Cbor::Float(_) => Err(CodecError::FloatForbidden),
        Cbor::Tag(tag, _) => Err(CodecError::unsupported_type(format!("tag {tag}"))),
        #[allow(unreachable_patterns)]
        _ => Err(CodecError::unsupported_type("unknown CBOR item")),
    }
}
