//! Reference-counted byte buffers reused across the receive path.
//!
//! Mirrors the relationship between `co/buffer.{h,cpp}` and
//! `lib/base/pool.h` in the reference runtime: a [`BufferPool`] is a
//! spin-locked LIFO free list of raw storage, and a [`Buffer`] is a
//! shared, reference-counted handle that returns its storage to the
//! pool it came from once the last handle is dropped.

mod buffer;
mod pool;

pub use buffer::Buffer;
pub use pool::BufferPool;

/// Minimum size of any buffer handed out by a pool, matching
/// `Buffer::getMinSize()` in the reference implementation.
pub const MIN_SIZE: usize = 256;

/// Buffers larger than this are discarded on release instead of being
/// pooled, matching `Buffer::getCacheSize()`.
pub const CACHE_SIZE: usize = 4096;
