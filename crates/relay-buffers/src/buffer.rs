use std::sync::Arc;

use crate::pool::BufferPool;

struct Shared {
    data: Vec<u8>,
    pool: BufferPool,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.release(data);
    }
}

/// A reference-counted byte buffer on loan from a [`BufferPool`].
///
/// Cloning is cheap (an `Arc` bump). The underlying storage is returned to
/// its pool only when the last clone is dropped, mirroring the strong-count
/// + free-on-release listener pairing of `co::Buffer`. While uniquely held
/// (before the first clone) the buffer is mutable via [`as_mut_slice`];
/// once shared it is effectively an immutable view, matching the way an
/// `ICommand` is only ever read after the receiver thread hands it off.
#[derive(Clone)]
pub struct Buffer(Arc<Shared>);

impl Buffer {
    pub(crate) fn new(data: Vec<u8>, pool: BufferPool) -> Self {
        Self(Arc::new(Shared { data, pool }))
    }

    pub fn len(&self) -> usize {
        self.0.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0.data
    }

    /// Returns `None` once this buffer has been cloned and is no longer
    /// uniquely owned.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        Arc::get_mut(&mut self.0).map(|s| s.data.as_mut_slice())
    }

    /// Number of outstanding handles to this buffer's storage.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("strong_count", &self.strong_count())
            .finish()
    }
}
