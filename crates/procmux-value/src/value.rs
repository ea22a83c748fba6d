use std::fmt;

use crate::array::ArrayValue;
use crate::binary::BinaryValue;
use crate::object::ObjectValue;

/// The tag of a [`Value`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Bool,
    Int32,
    Double,
    String,
    Binary,
    Array,
    Object,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int32 => "int32",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Binary => "binary",
            ValueType::Array => "array",
            ValueType::Object => "object",
        }
    }

    /// Whether values of this type contain other values.
    pub fn is_container(self) -> bool {
        matches!(self, ValueType::Array | ValueType::Object)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured message argument.
///
/// Scalar getters never fail: asking for the wrong type returns that type's
/// zero value, so callers check [`Value::value_type`] when the distinction
/// matters.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int32(i32),
    Double(f64),
    String(String),
    Binary(BinaryValue),
    Array(ArrayValue),
    Object(ObjectValue),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int32(_) => ValueType::Int32,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Binary(_) => ValueType::Binary,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The boolean, or `false` for any other type.
    pub fn get_bool(&self) -> bool {
        match self {
            Value::Bool(value) => *value,
            _ => false,
        }
    }

    /// The integer, or `0` for any other type.
    pub fn get_int(&self) -> i32 {
        match self {
            Value::Int32(value) => *value,
            _ => 0,
        }
    }

    /// The double, or `0.0` for any other type. Integers are not widened.
    pub fn get_double(&self) -> f64 {
        match self {
            Value::Double(value) => *value,
            _ => 0.0,
        }
    }

    /// The string, or `""` for any other type.
    pub fn get_string(&self) -> &str {
        match self {
            Value::String(value) => value,
            _ => "",
        }
    }

    pub fn get_binary(&self) -> Option<&BinaryValue> {
        match self {
            Value::Binary(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_array(&self) -> Option<&ArrayValue> {
        match self {
            Value::Array(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_array_mut(&mut self) -> Option<&mut ArrayValue> {
        match self {
            Value::Array(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_object_mut(&mut self) -> Option<&mut ObjectValue> {
        match self {
            Value::Object(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<BinaryValue> for Value {
    fn from(value: BinaryValue) -> Self {
        Value::Binary(value)
    }
}

impl From<ArrayValue> for Value {
    fn from(value: ArrayValue) -> Self {
        Value::Array(value)
    }
}

impl From<ObjectValue> for Value {
    fn from(value: ObjectValue) -> Self {
        Value::Object(value)
    }
}
