//! # UnitDB Codec
//!
//! Dynamic values and property records for UnitDB.
//!
//! Entities are persisted as [`Record`]s: ordered maps from property name to
//! [`Value`]. A property that is absent from the record is *unset*.
//!
//! Records can be encoded to CBOR for byte-oriented stores:
//!
//! ```
//! use unitdb_codec::{decode_record, encode_record, Record, Value};
//!
//! let mut record = Record::new();
//! record.set("name", Value::from("Ulli"));
//! record.set("age", Value::Integer(42));
//!
//! let bytes = encode_record(&record).unwrap();
//! assert_eq!(decode_record(&bytes).unwrap(), record);
//! ```
//!
//! Floats are intentionally not representable; numeric properties are
//! 64-bit signed integers.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod record;
mod value;

pub use cbor::{decode_record, decode_value, encode_record, encode_value};
pub use error::{CodecError, CodecResult};
pub use record::Record;
pub use value::Value;
