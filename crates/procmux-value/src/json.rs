//! Conversion between [`Value`] trees and `serde_json` values.
//!
//! JSON has no separate integer width or byte-string type, so the mapping is
//! lossy in both directions:
//!
//! - integral numbers that fit `i32` become [`Value::Int32`], every other
//!   number becomes [`Value::Double`];
//! - [`Value::Binary`] is written as an array of byte numbers;
//! - non-finite doubles are written as `null`.

use serde_json::{Map, Number};

use crate::array::ArrayValue;
use crate::binary::BinaryValue;
use crate::object::ObjectValue;
use crate::value::Value;

impl Value {
    /// Build a value tree from parsed JSON. Object key order is preserved.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => number_to_value(n),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect::<ArrayValue>())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect::<ObjectValue>(),
            ),
        }
    }

    /// Render the tree as JSON for display or scripting.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int32(i) => serde_json::Value::from(*i),
            Value::Double(d) => Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Binary(b) => binary_to_json(b),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(object) => {
                let mut map = Map::with_capacity(object.size());
                for (key, item) in object.iter() {
                    map.insert(key.to_string(), item.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        value.to_json()
    }
}

fn number_to_value(n: &Number) -> Value {
    if let Some(i) = n.as_i64().and_then(|i| i32::try_from(i).ok()) {
        return Value::Int32(i);
    }
    Value::Double(n.as_f64().unwrap_or(f64::NAN))
}

fn binary_to_json(binary: &BinaryValue) -> serde_json::Value {
    serde_json::Value::Array(
        binary
            .as_bytes()
            .iter()
            .map(|b| serde_json::Value::from(*b))
            .collect(),
    )
}
