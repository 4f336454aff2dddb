use thiserror::Error;

#[derive(Error, Debug)]
pub enum DedupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("VFS error: {0}")]
    Vfs(#[from] VfsError),

    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedDigestAlgorithm(String),

    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DedupError {
    /// Classify the error for logging and fallback decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DedupError::Vfs(e) => e.kind(),
            DedupError::Decode(_) => ErrorKind::Format,
            DedupError::UnsupportedDigestAlgorithm(_) | DedupError::Config(_) => {
                ErrorKind::Misconfiguration
            }
            DedupError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::Format,
            DedupError::Io(_) | DedupError::Serialization(_) => ErrorKind::Filesystem,
        }
    }
}

pub type Result<T> = std::result::Result<T, DedupError>;

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Archive format error: {0}")]
    ArchiveFormat(String),

    #[error("Not a file: {0}")]
    NotAFile(String),
}

impl VfsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::NotFound(_) | VfsError::ArchiveFormat(_) | VfsError::NotAFile(_) => {
                ErrorKind::Format
            }
            VfsError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::Format,
            VfsError::Io(_) => ErrorKind::Filesystem,
        }
    }
}

/// Coarse severity class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing entries, unparsable containers, undecodable images.
    Format,
    /// Read failures from the underlying filesystem.
    Filesystem,
    /// Invalid engine configuration.
    Misconfiguration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(VfsError::NotFound("a".into()).kind(), ErrorKind::Format);
        assert_eq!(VfsError::ArchiveFormat("a".into()).kind(), ErrorKind::Format);

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(VfsError::Io(denied).kind(), ErrorKind::Filesystem);

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(DedupError::Io(missing).kind(), ErrorKind::Format);

        assert_eq!(
            DedupError::UnsupportedDigestAlgorithm("md4".into()).kind(),
            ErrorKind::Misconfiguration
        );
        assert_eq!(
            DedupError::from(VfsError::ArchiveFormat("bad".into())).kind(),
            ErrorKind::Format
        );
    }
}
