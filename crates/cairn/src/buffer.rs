//! Fixed-size byte buffers.
//!
//! A buffer's length is set at allocation and never changes; only its
//! contents are writable. This is the storage behind `push_fixed_buffer`,
//! byte coercion, and pointer slots.

#[derive(Debug)]
pub(crate) struct FixedBuffer {
    bytes: Box<[u8]>,
}

impl FixedBuffer {
    /// Allocates a zero-filled buffer of `len` bytes.
    pub(crate) fn zeroed(len: usize) -> Self {
        Self {
            bytes: vec![0; len].into_boxed_slice(),
        }
    }

    pub(crate) fn from_slice(data: &[u8]) -> Self {
        Self {
            bytes: data.to_vec().into_boxed_slice(),
        }
    }

    pub(crate) fn from_vec(data: Vec<u8>) -> Self {
        Self {
            bytes: data.into_boxed_slice(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
