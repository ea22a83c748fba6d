use procmux_value::ArrayValue;

/// A named message with an ordered argument list.
///
/// The name is fixed at construction; arguments can be edited until the
/// message is sent. `clone()` copies the whole argument tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessMessage {
    name: String,
    arguments: ArrayValue,
}

impl ProcessMessage {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_arguments(name, ArrayValue::new())
    }

    pub fn with_arguments(name: impl Into<String>, arguments: ArrayValue) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn argument_list(&self) -> &ArrayValue {
        &self.arguments
    }

    pub fn argument_list_mut(&mut self) -> &mut ArrayValue {
        &mut self.arguments
    }

    pub fn into_arguments(self) -> ArrayValue {
        self.arguments
    }
}
