use crate::digest::ProgressiveDigest;
use crate::vfs::VirtualStreamPool;
use nestdupe_common::{
    default_thresholds, ContentDigest, DedupError, DigestAlgorithm, DigestConfig, ErrorKind,
    VfsError, VirtualPath,
};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, warn};

/// Settings shared by every [`FileHash`] of one deduplication run.
#[derive(Debug, Clone)]
pub struct FileHashFactory {
    pool: VirtualStreamPool,
    algorithm: DigestAlgorithm,
    thresholds: Arc<[u64]>,
}

impl FileHashFactory {
    /// Build a factory from digest settings.
    ///
    /// Fails with `UnsupportedDigestAlgorithm` or `Config` when the settings
    /// are invalid.
    pub fn new(pool: VirtualStreamPool, config: &DigestConfig) -> Result<Self, DedupError> {
        config.validate()?;
        Ok(Self {
            pool,
            algorithm: config.algorithm()?,
            thresholds: config.thresholds.as_slice().into(),
        })
    }

    pub fn with_defaults(pool: VirtualStreamPool) -> Self {
        Self {
            pool,
            algorithm: DigestAlgorithm::default(),
            thresholds: default_thresholds().into(),
        }
    }

    pub fn pool(&self) -> &VirtualStreamPool {
        &self.pool
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn thresholds(&self) -> &[u64] {
        &self.thresholds
    }

    /// Candidate with a length already known to the caller.
    pub fn file_hash(&self, path: VirtualPath, size: u64) -> FileHash {
        FileHash {
            path,
            size,
            failed: AtomicBool::new(false),
            digest: OnceLock::new(),
            factory: self.clone(),
        }
    }
}

/// Content identity of one candidate file.
///
/// Ordering and equality compare file contents, reading as little as
/// possible: lengths first, then digests of growing prefixes, then the whole
/// file. A file that fails to read is flagged and from then on ordered by
/// path only.
pub struct FileHash {
    path: VirtualPath,
    size: u64,
    failed: AtomicBool,
    digest: OnceLock<ProgressiveDigest>,
    factory: FileHashFactory,
}

impl FileHash {
    /// Candidate whose length is looked up through the pool.
    pub fn from_path(factory: &FileHashFactory, path: VirtualPath) -> Result<Self, VfsError> {
        let size = factory.pool.len(&path)?;
        Ok(factory.file_hash(path, size))
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether reading this file failed during an earlier comparison.
    pub fn failed(&self) -> bool {
        self.failed.load(AtomicOrdering::Acquire)
    }

    /// Bytes read from the file for digesting so far.
    pub fn bytes_read(&self) -> u64 {
        self.digest.get().map_or(0, ProgressiveDigest::bytes_read)
    }

    fn digest(&self) -> &ProgressiveDigest {
        self.digest.get_or_init(|| {
            debug!("Creating {} digest for {}", self.factory.algorithm, self.path);
            ProgressiveDigest::new(
                self.path.clone(),
                self.factory.pool.clone(),
                self.factory.algorithm,
            )
        })
    }

    /// Total order over the candidates of one run.
    pub fn compare(&self, other: &FileHash) -> Ordering {
        if self.path == other.path {
            return Ordering::Equal;
        }
        if self.size != other.size {
            return self.size.cmp(&other.size);
        }
        if self.size == 0 {
            return Ordering::Equal;
        }
        if self.failed() || other.failed() {
            return self.path.cmp(&other.path);
        }
        if self.same_target(other) {
            return Ordering::Equal;
        }

        match self.compare_digests(other) {
            Ok(order) => order,
            Err((culprit, err)) => {
                match err.kind() {
                    ErrorKind::Format => warn!("Cannot digest {}: {}", culprit.path, err),
                    _ => error!("Cannot digest {}: {}", culprit.path, err),
                }
                culprit.failed.store(true, AtomicOrdering::Release);
                self.path.cmp(&other.path)
            }
        }
    }

    /// Both paths reach the same real file.
    fn same_target(&self, other: &FileHash) -> bool {
        if self.path.is_nested() || other.path.is_nested() {
            return false;
        }
        match (self.path.canonicalize(), other.path.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            (Err(e), _) | (_, Err(e)) => {
                debug!("Skipping canonical check of {} and {}: {}", self.path, other.path, e);
                false
            }
        }
    }

    fn compare_digests<'a>(
        &'a self,
        other: &'a FileHash,
    ) -> Result<Ordering, (&'a FileHash, DedupError)> {
        let left = self.digest();
        let right = other.digest();
        let _left_session = left.keep_on();
        let _right_session = right.keep_on();

        let thresholds = self.factory.thresholds();
        for (i, pair) in thresholds.windows(2).enumerate() {
            let (limit, next) = (pair[0], pair[1]);
            if limit >= self.size {
                break;
            }
            // the next step would read only a few bytes more than the whole file
            if self.size < limit + (next - limit) / 2 {
                break;
            }
            let order = Self::digest_pair(self, left, other, right, |d| d.get_hash(limit))?;
            if order != Ordering::Equal {
                debug!(
                    "{} and {} differ within {} bytes (step {})",
                    self.path, other.path, limit, i
                );
                return Ok(order);
            }
        }

        Self::digest_pair(self, left, other, right, ProgressiveDigest::get_full_hash)
    }

    fn digest_pair<'a, F>(
        a: &'a FileHash,
        left: &ProgressiveDigest,
        b: &'a FileHash,
        right: &ProgressiveDigest,
        get: F,
    ) -> Result<Ordering, (&'a FileHash, DedupError)>
    where
        F: Fn(&ProgressiveDigest) -> Result<ContentDigest, DedupError>,
    {
        let x = get(left).map_err(|e| (a, e))?;
        let y = get(right).map_err(|e| (b, e))?;
        Ok(x.cmp(&y))
    }
}

impl PartialEq for FileHash {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for FileHash {}

impl PartialOrd for FileHash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

/// A candidate whose content could not be read falls back to path order and
/// stays `failed()`. Drop failed candidates before sorting the set again.
impl Ord for FileHash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl Hash for FileHash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.size.hash(state);
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl fmt::Debug for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHash")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("failed", &self.failed())
            .finish()
    }
}
