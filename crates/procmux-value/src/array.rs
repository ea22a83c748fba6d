use crate::binary::BinaryValue;
use crate::object::ObjectValue;
use crate::value::{Value, ValueType};

/// An ordered, index-addressed list of values.
///
/// Setting an index past the end grows the array and fills the gap with
/// `Null`, so positional argument lists can be populated in any order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArrayValue {
    items: Vec<Value>,
}

impl ArrayValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Resize to `size` elements, truncating or padding with `Null`.
    pub fn set_size(&mut self, size: usize) {
        self.items.resize(size, Value::Null);
    }

    /// Type of the element at `index`, or `None` past the end.
    pub fn get_type(&self, index: usize) -> Option<ValueType> {
        self.items.get(index).map(Value::value_type)
    }

    pub fn get_value(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn get_value_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.items.get_mut(index)
    }

    pub fn get_bool(&self, index: usize) -> bool {
        self.items.get(index).is_some_and(Value::get_bool)
    }

    pub fn get_int(&self, index: usize) -> i32 {
        self.items.get(index).map_or(0, Value::get_int)
    }

    pub fn get_double(&self, index: usize) -> f64 {
        self.items.get(index).map_or(0.0, Value::get_double)
    }

    pub fn get_string(&self, index: usize) -> &str {
        self.items.get(index).map_or("", Value::get_string)
    }

    pub fn get_binary(&self, index: usize) -> Option<&BinaryValue> {
        self.items.get(index).and_then(Value::get_binary)
    }

    pub fn get_array(&self, index: usize) -> Option<&ArrayValue> {
        self.items.get(index).and_then(Value::get_array)
    }

    pub fn get_array_mut(&mut self, index: usize) -> Option<&mut ArrayValue> {
        self.items.get_mut(index).and_then(Value::get_array_mut)
    }

    pub fn get_object(&self, index: usize) -> Option<&ObjectValue> {
        self.items.get(index).and_then(Value::get_object)
    }

    pub fn get_object_mut(&mut self, index: usize) -> Option<&mut ObjectValue> {
        self.items.get_mut(index).and_then(Value::get_object_mut)
    }

    /// Store `value` at `index`, growing the array if needed.
    pub fn set_value(&mut self, index: usize, value: impl Into<Value>) {
        if index >= self.items.len() {
            self.items.resize(index + 1, Value::Null);
        }
        self.items[index] = value.into();
    }

    pub fn set_null(&mut self, index: usize) {
        self.set_value(index, Value::Null);
    }

    pub fn set_bool(&mut self, index: usize, value: bool) {
        self.set_value(index, value);
    }

    pub fn set_int(&mut self, index: usize, value: i32) {
        self.set_value(index, value);
    }

    pub fn set_double(&mut self, index: usize, value: f64) {
        self.set_value(index, value);
    }

    pub fn set_string(&mut self, index: usize, value: impl Into<String>) {
        self.set_value(index, Value::String(value.into()));
    }

    pub fn set_binary(&mut self, index: usize, value: BinaryValue) {
        self.set_value(index, value);
    }

    pub fn set_array(&mut self, index: usize, value: ArrayValue) {
        self.set_value(index, value);
    }

    pub fn set_object(&mut self, index: usize, value: ObjectValue) {
        self.set_value(index, value);
    }

    /// Append `value` at the end.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
    }

    /// Remove and return the element at `index`, shifting later elements down.
    pub fn remove(&mut self, index: usize) -> Option<Value> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }
}

impl From<Vec<Value>> for ArrayValue {
    fn from(items: Vec<Value>) -> Self {
        Self { items }
    }
}

impl FromIterator<Value> for ArrayValue {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ArrayValue {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ArrayValue {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
