/// An owned byte blob.
///
/// Large blobs can be pulled out piecewise with [`BinaryValue::get_data`]
/// instead of copying the whole buffer at once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BinaryValue {
    data: Vec<u8>,
}

impl BinaryValue {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Length in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy bytes starting at `offset` into `buffer`.
    ///
    /// Returns the number of bytes written: `min(buffer.len(), size - offset)`,
    /// or `0` when `offset` is at or past the end.
    pub fn get_data(&self, buffer: &mut [u8], offset: usize) -> usize {
        let Some(rest) = self.data.get(offset..) else {
            return 0;
        };
        let n = rest.len().min(buffer.len());
        buffer[..n].copy_from_slice(&rest[..n]);
        n
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for BinaryValue {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl From<&[u8]> for BinaryValue {
    fn from(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }
}
