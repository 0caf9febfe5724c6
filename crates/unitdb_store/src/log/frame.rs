//! Commit frames written to a log.
//!
//! ```text
//! +-------+---------+---------+-------------------+
//! | magic | len u32 | crc u32 | payload (len)     |
//! +-------+---------+---------+-------------------+
//! ```
//!
//! The payload is a CBOR array with one map per write. Preconditions are
//! not persisted: a frame only exists if its batch already passed them.

use crate::error::{StoreError, StoreResult};
use crate::key::{Precondition, RecordKey};
use crate::tables::Write;
use std::collections::BTreeMap;
use unitdb_codec::{decode_value, encode_value, Record, Value};

/// Magic bytes opening every frame.
pub(crate) const FRAME_MAGIC: [u8; 4] = *b"UDBF";

/// magic (4) + length (4) + crc (4)
pub(crate) const HEADER_SIZE: usize = 12;

const OP_PUT: &str = "put";
const OP_DELETE: &str = "delete";

/// Encodes a batch into one frame.
pub(crate) fn encode_frame(writes: &[Write]) -> StoreResult<Vec<u8>> {
    let items = writes.iter().map(write_to_value).collect();
    let payload = encode_value(&Value::Array(items))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::backend("commit batch too large for one frame"))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Result of scanning a log.
#[derive(Debug)]
pub(crate) struct Scan {
    /// Decoded batches in log order.
    pub(crate) batches: Vec<Vec<Write>>,
    /// Length of the valid prefix; anything after it is a torn tail.
    pub(crate) valid_len: usize,
}

/// Scans a log, stopping at the first incomplete frame.
///
/// A frame cut short by a crash (incomplete header or payload, or a bad
/// checksum on the very last frame) ends the scan. A bad checksum or magic
/// anywhere else is corruption.
pub(crate) fn scan(bytes: &[u8]) -> StoreResult<Scan> {
    let mut batches = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < HEADER_SIZE {
            break;
        }
        if rest[..4] != FRAME_MAGIC {
            return Err(StoreError::corrupted(format!(
                "bad frame magic at offset {offset}"
            )));
        }
        let len = read_u32(&rest[4..8]) as usize;
        let crc = read_u32(&rest[8..12]);
        let end = HEADER_SIZE + len;
        if rest.len() < end {
            break;
        }
        let payload = &rest[HEADER_SIZE..end];
        if compute_crc32(payload) != crc {
            if offset + end == bytes.len() {
                break;
            }
            return Err(StoreError::corrupted(format!(
                "checksum mismatch in frame at offset {offset}"
            )));
        }
        batches.push(decode_payload(payload)?);
        offset += end;
    }
    Ok(Scan {
        batches,
        valid_len: offset,
    })
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn write_to_value(write: &Write) -> Value {
    let mut map = BTreeMap::new();
    let key = write.key();
    map.insert("type".to_string(), Value::from(key.entity_type.as_str()));
    map.insert("id".to_string(), Value::from(key.id.as_str()));
    match write {
        Write::Put { record, .. } => {
            map.insert("op".to_string(), Value::from(OP_PUT));
            map.insert("record".to_string(), Value::from(record.clone()));
        }
        Write::Delete { .. } => {
            map.insert("op".to_string(), Value::from(OP_DELETE));
        }
    }
    Value::Map(map)
}

fn decode_payload(payload: &[u8]) -> StoreResult<Vec<Write>> {
    let Value::Array(items) = decode_value(payload)? else {
        return Err(StoreError::corrupted("frame payload is not an array"));
    };
    items.into_iter().map(value_to_write).collect()
}

fn value_to_write(value: Value) -> StoreResult<Write> {
    let Value::Map(mut map) = value else {
        return Err(StoreError::corrupted("frame entry is not a map"));
    };
    let mut text = |name: &str| match map.remove(name) {
        Some(Value::Text(s)) => Ok(s),
        _ => Err(StoreError::corrupted(format!("frame entry lacks `{name}`"))),
    };
    let op = text("op")?;
    let key = RecordKey::new(text("type")?, text("id")?);
    match op.as_str() {
        OP_PUT => {
            let Some(Value::Map(fields)) = map.remove("record") else {
                return Err(StoreError::corrupted("put entry lacks its record"));
            };
            Ok(Write::Put {
                key,
                record: fields.into_iter().collect::<Record>(),
                precondition: Precondition::None,
            })
        }
        OP_DELETE => Ok(Write::Delete {
            key,
            precondition: Precondition::None,
        }),
        other => Err(StoreError::corrupted(format!("unknown frame op `{other}`"))),
    }
}

/// Computes CRC32 checksum for data (IEEE polynomial).
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
    }) ^ 0xFFFF_FFFF
}
