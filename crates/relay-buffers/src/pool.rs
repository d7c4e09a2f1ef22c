use std::sync::Arc;

use spin::Mutex;
use tracing::trace;

use crate::{CACHE_SIZE, MIN_SIZE, buffer::Buffer};

struct Inner {
    free: Mutex<Vec<Vec<u8>>>,
    min_size: usize,
    cache_size: usize,
}

/// A LIFO free list of raw byte storage, shared by clone across the threads
/// that allocate and release [`Buffer`]s.
///
/// `acquire` pops a free entry (or allocates fresh storage); `release`
/// (invoked by a `Buffer`'s drop glue) pushes storage back, discarding it
/// instead if it grew past `cache_size`.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_limits(MIN_SIZE, CACHE_SIZE)
    }

    pub fn with_limits(min_size: usize, cache_size: usize) -> Self {
        Self { inner: Arc::new(Inner { free: Mutex::new(Vec::new()), min_size, cache_size }) }
    }

    /// Pops a free buffer and grows it to at least `requested` bytes, or
    /// allocates fresh storage if the free list is empty. The returned
    /// buffer is uniquely owned until cloned.
    pub fn acquire(&self, requested: usize) -> Buffer {
        let size = requested.max(self.inner.min_size);
        let mut data = self.inner.free.lock().pop().unwrap_or_default();
        if data.capacity() < size {
            data.reserve(size - data.capacity());
        }
        data.resize(size, 0);
        Buffer::new(data, self.clone())
    }

    pub(crate) fn release(&self, mut data: Vec<u8>) {
        data.clear();
        if data.capacity() <= self.inner.cache_size {
            trace!(capacity = data.capacity(), "buffer returned to pool");
            self.inner.free.lock().push(data);
        } else {
            trace!(capacity = data.capacity(), "buffer exceeds cache size, discarding");
        }
    }

    /// Number of buffers currently sitting in the free list. Test/metrics
    /// use only.
    pub fn cached_len(&self) -> usize {
        self.inner.free.lock().len()
    }
}
