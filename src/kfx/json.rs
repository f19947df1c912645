//! JSON rendering of decoded values.
//!
//! Blobs become base64 strings, timestamps ISO-8601 strings and decimals
//! plain numbers. Struct fields keep their decoded order.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::ion::{IonValue, TypedValue};
use super::metadata::Metadata;
use super::reader::Decoded;
use crate::error::Result;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

impl Serialize for IonValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            IonValue::Null => serializer.serialize_unit(),
            IonValue::Bool(b) => serializer.serialize_bool(*b),
            IonValue::Int(n) => serializer.serialize_i128(*n),
            IonValue::Float(f) => serializer.serialize_f64(*f),
            IonValue::Decimal(d) => serializer.serialize_f64(d.to_f64()),
            IonValue::Timestamp(ts) => serializer.collect_str(&ts.format(TIMESTAMP_FORMAT)),
            IonValue::Symbol(s) | IonValue::String(s) | IonValue::Clob(s) => {
                serializer.serialize_str(s)
            }
            IonValue::Blob(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            IonValue::List(items) | IonValue::Sexp(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            IonValue::Struct(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            IonValue::Typed(typed) => typed.serialize(serializer),
        }
    }
}

impl Serialize for TypedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("type", &self.type_name)?;
        map.serialize_entry("id", &self.id_name)?;
        map.serialize_entry("value", &self.value)?;
        map.end()
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for Decoded {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Decoded::Entities(entities) => entities.serialize(serializer),
            Decoded::Values(values) => values.serialize(serializer),
        }
    }
}

/// Pretty-printed JSON for any decoded value.
pub fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
