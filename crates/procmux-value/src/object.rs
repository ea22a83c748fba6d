use crate::array::ArrayValue;
use crate::binary::BinaryValue;
use crate::value::{Value, ValueType};

/// A string-keyed map of values that remembers insertion order.
///
/// Replacing the value of an existing key keeps the key's position. Lookups are
/// linear; argument objects are small.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectValue {
    entries: Vec<(String, Value)>,
}

impl ObjectValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Keys<'_> {
        Keys {
            entries: &self.entries,
        }
    }

    /// Type of the value under `key`, or `None` if absent.
    pub fn get_type(&self, key: &str) -> Option<ValueType> {
        self.get_value(key).map(Value::value_type)
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.position(key).map(|index| &self.entries[index].1)
    }

    pub fn get_value_mut(&mut self, key: &str) -> Option<&mut Value> {
        let index = self.position(key)?;
        Some(&mut self.entries[index].1)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get_value(key).is_some_and(Value::get_bool)
    }

    pub fn get_int(&self, key: &str) -> i32 {
        self.get_value(key).map_or(0, Value::get_int)
    }

    pub fn get_double(&self, key: &str) -> f64 {
        self.get_value(key).map_or(0.0, Value::get_double)
    }

    pub fn get_string(&self, key: &str) -> &str {
        self.get_value(key).map_or("", Value::get_string)
    }

    pub fn get_binary(&self, key: &str) -> Option<&BinaryValue> {
        self.get_value(key).and_then(Value::get_binary)
    }

    pub fn get_array(&self, key: &str) -> Option<&ArrayValue> {
        self.get_value(key).and_then(Value::get_array)
    }

    pub fn get_array_mut(&mut self, key: &str) -> Option<&mut ArrayValue> {
        self.get_value_mut(key).and_then(Value::get_array_mut)
    }

    pub fn get_object(&self, key: &str) -> Option<&ObjectValue> {
        self.get_value(key).and_then(Value::get_object)
    }

    pub fn get_object_mut(&mut self, key: &str) -> Option<&mut ObjectValue> {
        self.get_value_mut(key).and_then(Value::get_object_mut)
    }

    /// Insert or replace the value under `key`.
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(index) => self.entries[index].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn set_null(&mut self, key: impl Into<String>) {
        self.set_value(key, Value::Null);
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set_value(key, value);
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i32) {
        self.set_value(key, value);
    }

    pub fn set_double(&mut self, key: impl Into<String>, value: f64) {
        self.set_value(key, value);
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set_value(key, Value::String(value.into()));
    }

    pub fn set_binary(&mut self, key: impl Into<String>, value: BinaryValue) {
        self.set_value(key, value);
    }

    pub fn set_array(&mut self, key: impl Into<String>, value: ArrayValue) {
        self.set_value(key, value);
    }

    pub fn set_object(&mut self, key: impl Into<String>, value: ObjectValue) {
        self.set_value(key, value);
    }

    /// Remove `key`, keeping the relative order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.position(key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ObjectValue {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut object = ObjectValue::new();
        for (key, value) in iter {
            object.set_value(key, value);
        }
        object
    }
}

/// Borrowed view over an object's keys, in insertion order.
#[derive(Debug, Clone, Copy)]
pub struct Keys<'a> {
    entries: &'a [(String, Value)],
}

impl<'a> Keys<'a> {
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.entries.get(index).map(|(key, _)| key.as_str())
    }

    pub fn iter(self) -> impl Iterator<Item = &'a str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }
}
