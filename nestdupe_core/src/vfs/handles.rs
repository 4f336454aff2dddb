use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared count of live low-level stream handles.
///
/// Clones share the same count. Every handle registers itself when opened
/// and unregisters when dropped, so the value never goes negative.
#[derive(Debug, Clone, Default)]
pub struct HandleCounter {
    open: Arc<AtomicUsize>,
}

impl HandleCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn register(&self) -> HandleGuard {
        self.open.fetch_add(1, Ordering::SeqCst);
        HandleGuard {
            open: Arc::clone(&self.open),
        }
    }

    /// Wrap an already opened handle so that it is counted until dropped.
    pub fn track<R>(&self, inner: R) -> Tracked<R> {
        Tracked {
            inner,
            _guard: self.register(),
        }
    }
}

#[derive(Debug)]
struct HandleGuard {
    open: Arc<AtomicUsize>,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A reader counted by a [`HandleCounter`].
#[derive(Debug)]
pub struct Tracked<R> {
    // declared first so the handle is closed before it is uncounted
    inner: R,
    _guard: HandleGuard,
}

impl<R> Tracked<R> {
    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}

impl<R: Read> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Seek> Seek for Tracked<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}
