use crate::vfs::{archive, VirtualStream, VirtualStreamPool};
use nestdupe_common::{ContentDigest, ContentHasher, DedupError, DigestAlgorithm, VirtualPath};
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Content digest of one file, computed over growing prefixes.
///
/// Each requested prefix length is digested once and cached. Requests for a
/// longer prefix continue from the offset already reached, so the bytes of a
/// file are read at most once while a [`KeepOpen`] session is active.
pub struct ProgressiveDigest {
    path: VirtualPath,
    pool: VirtualStreamPool,
    algorithm: DigestAlgorithm,
    state: Mutex<DigestState>,
    bytes_read: AtomicU64,
}

struct DigestState {
    hasher: ContentHasher,
    /// Bytes fed into `hasher` so far.
    offset: u64,
    /// Whole-file digest, set once end of file has been reached.
    full: Option<ContentDigest>,
    /// File length, known once end of file has been reached.
    len: Option<u64>,
    partial: BTreeMap<u64, ContentDigest>,
    stream: Option<VirtualStream>,
    keep: usize,
}

impl DigestState {
    fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            hasher: algorithm.hasher(),
            offset: 0,
            full: None,
            len: None,
            partial: BTreeMap::new(),
            stream: None,
            keep: 0,
        }
    }

    /// Forget the running hash; cached digests stay valid.
    fn rewind(&mut self, algorithm: DigestAlgorithm) {
        self.hasher = algorithm.hasher();
        self.offset = 0;
        self.stream = None;
    }
}

impl ProgressiveDigest {
    pub fn new(path: VirtualPath, pool: VirtualStreamPool, algorithm: DigestAlgorithm) -> Self {
        Self {
            path,
            pool,
            algorithm,
            state: Mutex::new(DigestState::new(algorithm)),
            bytes_read: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Total bytes pulled from the underlying stream.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Start a session that keeps the underlying stream open between calls.
    ///
    /// Sessions nest; the stream is closed when the last guard is dropped.
    pub fn keep_on(&self) -> KeepOpen<'_> {
        self.lock().keep += 1;
        KeepOpen { digest: self }
    }

    fn keep_off(&self) {
        let mut state = self.lock();
        state.keep = state.keep.saturating_sub(1);
        if state.keep == 0 {
            if let Some(stream) = state.stream.take() {
                stream.close();
            }
        }
    }

    /// Digest of the first `limit` bytes.
    ///
    /// When the file is shorter than `limit` the whole-file digest is
    /// returned.
    pub fn get_hash(&self, limit: u64) -> Result<ContentDigest, DedupError> {
        let mut state = self.lock();

        if let (Some(full), Some(len)) = (state.full, state.len) {
            if len <= limit {
                return Ok(full);
            }
        }
        if let Some(cached) = state.partial.get(&limit) {
            debug!("Reusing digest of {} at {} bytes", self.path, limit);
            return Ok(*cached);
        }
        if limit < state.offset {
            debug!(
                "Restarting digest of {}: {} bytes requested after {}",
                self.path, limit, state.offset
            );
            state.rewind(self.algorithm);
        }

        let digest = self.advance(&mut state, limit)?;
        Ok(digest)
    }

    /// Digest of the whole file.
    pub fn get_full_hash(&self) -> Result<ContentDigest, DedupError> {
        let mut state = self.lock();
        if let Some(full) = state.full {
            return Ok(full);
        }
        self.advance(&mut state, u64::MAX)
    }

    /// Feed bytes up to `limit` into the running hash and snapshot it.
    fn advance(&self, state: &mut DigestState, limit: u64) -> Result<ContentDigest, DedupError> {
        let result = self.read_until(state, limit);
        if state.keep == 0 || result.is_err() {
            if let Some(stream) = state.stream.take() {
                stream.close();
            }
        }
        if result.is_err() {
            state.rewind(self.algorithm);
        }
        result
    }

    fn read_until(&self, state: &mut DigestState, limit: u64) -> Result<ContentDigest, DedupError> {
        if state.stream.is_none() {
            state.stream = Some(self.reopen(state.offset)?);
        }

        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut eof = false;
        while state.offset < limit {
            let want = (limit - state.offset).min(READ_BUFFER_SIZE as u64) as usize;
            let stream = match state.stream.as_mut() {
                Some(stream) => stream,
                None => break,
            };
            let n = match stream.read(&mut buffer[..want]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(archive::read_error(&self.path.to_string(), e).into()),
            };
            if n == 0 {
                eof = true;
                break;
            }
            state.hasher.update(&buffer[..n]);
            state.offset += n as u64;
            self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        }

        let digest = state.hasher.snapshot();
        if eof {
            debug!("Digested all {} bytes of {}", state.offset, self.path);
            state.full = Some(digest);
            state.len = Some(state.offset);
            state.partial.insert(state.offset, digest);
        } else {
            state.partial.insert(limit, digest);
        }
        Ok(digest)
    }

    /// Open the stream and skip the prefix already hashed.
    fn reopen(&self, offset: u64) -> Result<VirtualStream, DedupError> {
        let mut stream = self.pool.open(&self.path)?;
        if offset > 0 {
            debug!("Resuming {} at offset {}", self.path, offset);
            let skipped = io::copy(&mut (&mut stream).take(offset), &mut io::sink())
                .map_err(|e| archive::read_error(&self.path.to_string(), e))?;
            self.bytes_read.fetch_add(skipped, Ordering::Relaxed);
            if skipped < offset {
                return Err(DedupError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} shrank below {} bytes while digesting", self.path, offset),
                )));
            }
        }
        Ok(stream)
    }

    fn lock(&self) -> MutexGuard<'_, DigestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ProgressiveDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressiveDigest")
            .field("path", &self.path)
            .field("algorithm", &self.algorithm)
            .field("bytes_read", &self.bytes_read())
            .finish()
    }
}

/// Guard returned by [`ProgressiveDigest::keep_on`].
#[must_use = "the session ends as soon as the guard is dropped"]
pub struct KeepOpen<'a> {
    digest: &'a ProgressiveDigest,
}

impl Drop for KeepOpen<'_> {
    fn drop(&mut self) {
        self.digest.keep_off();
    }
}
