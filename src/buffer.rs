//! The byte-buffer allocator as an external collaborator: a bulk
//! arena/slab allocator is explicitly out of scope — corvid only
//! describes the interface a pipeline's codec
//! handlers consume, the same way it consumes a [`crate::resolver::NameResolver`]
//! or an SSL engine handler without implementing either.
//!
//! The recycler ([`crate::recycler`]) already supplies the *hot-path, same-
//! shape* allocation case (e.g. the fixed-size read buffer in
//! `crate::channel`); a [`BufferAllocator`] is for the general case of
//! arbitrary-size, reference-counted buffers handed between handlers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A reference-counted byte buffer, retained/released the way Netty's
/// `ByteBuf` is: a handler that keeps a buffer past the call that handed it
/// to it must `retain()`, and must `release()` exactly once for every
/// `retain()` (including the implicit one the allocator hands out).
pub trait Buffer: Send {
    fn as_slice(&self) -> &[u8];
    fn as_mut_slice(&mut self) -> &mut [u8];
    fn capacity(&self) -> usize;
    fn retain(&self);
    /// Releases one reference; returns `true` if this was the last one and
    /// the buffer's storage has now been freed.
    fn release(&self) -> bool;
}

/// `allocate`/`allocate_direct` construct fresh [`Buffer`]s. corvid never
/// implements a production-grade one itself;
/// [`HeapBufferAllocator`] below exists only so tests and small examples
/// have something concrete to plug into a pipeline without pulling in an
/// external crate.
pub trait BufferAllocator: Send + Sync {
    fn allocate(&self, capacity: usize) -> Box<dyn Buffer>;
    /// Allocates off-heap (e.g. mmap'd or `io_uring`-registered) memory
    /// where the platform supports it. The default implementation simply
    /// delegates to [`BufferAllocator::allocate`]; a real direct allocator
    /// overrides this.
    fn allocate_direct(&self, capacity: usize) -> Box<dyn Buffer> {
        self.allocate(capacity)
    }
}

struct HeapBuffer {
    data: Vec<u8>,
    refcount: Arc<AtomicUsize>,
}

impl Buffer for HeapBuffer {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn capacity(&self) -> usize {
        self.data.capacity()
    }

    fn retain(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) -> bool {
        self.refcount.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

/// A plain `Vec<u8>`-backed [`BufferAllocator`], reference-counted with a
/// shared `AtomicUsize` rather than pooled. Sufficient for tests and small
/// standalone uses of the pipeline; production deployments plug in a real
/// arena/slab allocator through the same trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapBufferAllocator;

impl BufferAllocator for HeapBufferAllocator {
    fn allocate(&self, capacity: usize) -> Box<dyn Buffer> {
        Box::new(HeapBuffer {
            data: vec![0u8; capacity],
            refcount: Arc::new(AtomicUsize::new(1)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_allocator_produces_requested_capacity() {
        let allocator = HeapBufferAllocator;
        let buf = allocator.allocate(128);
        assert_eq!(buf.as_slice().len(), 128);
    }

    #[test]
    fn retain_then_release_twice_only_reports_freed_on_the_last_release() {
        let allocator = HeapBufferAllocator;
        let buf = allocator.allocate(16);
        buf.retain();
        assert!(!buf.release());
        assert!(buf.release());
    }
}
