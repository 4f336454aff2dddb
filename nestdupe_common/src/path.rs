use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Separator used when rendering a nested path for humans.
pub const SEGMENT_SEPARATOR: &str = "!/";

/// Address of a resource that may live inside any number of nested archives.
///
/// Segment 0 is a real filesystem path; every following segment names an
/// entry inside the container addressed by the segments before it. A path
/// with a single segment is a plain file and behaves like one. Paths are
/// immutable once built, and two paths are equal exactly when their segment
/// sequences are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    /// Address a plain filesystem path.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self {
            segments: vec![path.as_ref().to_string_lossy().into_owned()],
        }
    }

    /// Build a path from its raw segments.
    ///
    /// # Panics
    /// Panics when `segments` is empty; an empty path addresses nothing.
    pub fn from_segments<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        assert!(!segments.is_empty(), "a virtual path needs at least one segment");
        Self { segments }
    }

    /// Descend into `entry` of the container addressed by `self`.
    pub fn join(&self, entry: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(entry.into());
        Self { segments }
    }

    pub fn split(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments, 1 for a plain file.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }

    /// The real file at the root of the chain.
    pub fn file_path(&self) -> &Path {
        Path::new(&self.segments[0])
    }

    /// Last component of the innermost segment.
    pub fn file_name(&self) -> &str {
        let last = self.last_segment();
        if self.is_nested() {
            last.trim_end_matches('/').rsplit('/').next().unwrap_or(last)
        } else {
            Path::new(last)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(last)
        }
    }

    pub fn last_segment(&self) -> &str {
        // segments is never empty
        &self.segments[self.segments.len() - 1]
    }

    /// Drop the last segment.
    ///
    /// A plain file yields its filesystem parent directory; a filesystem root
    /// has no parent.
    pub fn parent(&self) -> Option<Self> {
        if self.is_nested() {
            return Some(Self {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            });
        }
        self.file_path()
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Self::from_file)
    }

    /// Chain of ancestors ordered from the outermost to the innermost.
    pub fn ancestors(&self, include_self: bool) -> Vec<Self> {
        let mut chain = Vec::new();
        if include_self {
            chain.push(self.clone());
        }
        let mut current = self.parent();
        while let Some(path) = current {
            current = path.parent();
            chain.push(path);
        }
        chain.reverse();
        chain
    }

    /// Whether `self` strictly contains `child`.
    ///
    /// Two plain files are tested through real filesystem containment,
    /// resolving symlinks and `.`/`..` when `canonical` is set. Any other pair
    /// is compared structurally by segment prefix; entry names inside
    /// archives are never canonicalized.
    pub fn is_ancestor_of(&self, child: &VirtualPath, canonical: bool) -> io::Result<bool> {
        if !self.is_nested() && !child.is_nested() {
            let (parent, root) = if canonical {
                (self.file_path().canonicalize()?, child.file_path().canonicalize()?)
            } else {
                (self.file_path().to_path_buf(), child.file_path().to_path_buf())
            };
            return Ok(root != parent && root.starts_with(&parent));
        }
        if self.segments.len() >= child.segments.len() {
            return Ok(false);
        }
        Ok(self.segments[..] == child.segments[..self.segments.len()])
    }

    /// Resolve the root file through the filesystem, keeping entry names as-is.
    pub fn canonicalize(&self) -> io::Result<Self> {
        let mut segments = self.segments.clone();
        segments[0] = self.file_path().canonicalize()?.to_string_lossy().into_owned();
        Ok(Self { segments })
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(self.to_string())
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(SEGMENT_SEPARATOR))
    }
}

impl TryFrom<Vec<String>> for VirtualPath {
    type Error = String;

    fn try_from(segments: Vec<String>) -> Result<Self, Self::Error> {
        if segments.is_empty() {
            return Err("a virtual path needs at least one segment".to_string());
        }
        Ok(Self { segments })
    }
}

impl From<VirtualPath> for Vec<String> {
    fn from(path: VirtualPath) -> Self {
        path.segments
    }
}

impl From<&Path> for VirtualPath {
    fn from(path: &Path) -> Self {
        Self::from_file(path)
    }
}

impl From<PathBuf> for VirtualPath {
    fn from(path: PathBuf) -> Self {
        Self::from_file(path)
    }
}
