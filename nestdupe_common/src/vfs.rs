use crate::VfsError;

/// Number of leading bytes needed to recognise every supported container.
pub const SNIFF_LEN: usize = 512;

const TAR_MAGIC_OFFSET: usize = 257;

/// Container formats the stream pool can descend into.
///
/// `Zip` carries a central directory and supports indexed entry lookup;
/// `Tar` is scanned sequentially. The compression variants wrap a tar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Zip,
    Tar,
    Gzip,
    Bzip2,
    Xz,
}

impl ContainerFormat {
    /// Recognise a container from its leading bytes.
    pub fn detect(head: &[u8]) -> Option<Self> {
        if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
            Some(ContainerFormat::Zip)
        } else if head.starts_with(&[0x1f, 0x8b]) {
            Some(ContainerFormat::Gzip)
        } else if head.starts_with(b"BZh") {
            Some(ContainerFormat::Bzip2)
        } else if head.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(ContainerFormat::Xz)
        } else if head
            .get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5)
            .map_or(false, |magic| magic == b"ustar")
        {
            Some(ContainerFormat::Tar)
        } else {
            None
        }
    }

    /// Guess from a file or entry name, for headerless formats.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.ends_with(".zip") || name.ends_with(".jar") {
            Some(ContainerFormat::Zip)
        } else if name.ends_with(".tar") {
            Some(ContainerFormat::Tar)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ContainerFormat::Gzip)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(ContainerFormat::Bzip2)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(ContainerFormat::Xz)
        } else {
            None
        }
    }

    /// Detect by content, falling back to the name.
    pub fn identify(head: &[u8], name: &str) -> Option<Self> {
        Self::detect(head).or_else(|| Self::from_name(name))
    }

    pub fn is_random_access(&self) -> bool {
        *self == ContainerFormat::Zip
    }

    pub fn is_compression(&self) -> bool {
        matches!(
            self,
            ContainerFormat::Gzip | ContainerFormat::Bzip2 | ContainerFormat::Xz
        )
    }

    pub fn code(&self) -> u8 {
        match self {
            ContainerFormat::Zip => 0,
            ContainerFormat::Tar => 1,
            ContainerFormat::Gzip => 2,
            ContainerFormat::Bzip2 => 3,
            ContainerFormat::Xz => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContainerFormat::Zip => "zip",
            ContainerFormat::Tar => "tar",
            ContainerFormat::Gzip => "gzip",
            ContainerFormat::Bzip2 => "bzip2",
            ContainerFormat::Xz => "xz",
        }
    }
}

impl TryFrom<u8> for ContainerFormat {
    type Error = VfsError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ContainerFormat::Zip),
            1 => Ok(ContainerFormat::Tar),
            2 => Ok(ContainerFormat::Gzip),
            3 => Ok(ContainerFormat::Bzip2),
            4 => Ok(ContainerFormat::Xz),
            _ => Err(VfsError::ArchiveFormat(format!(
                "unknown container format code {}",
                code
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_magic() {
        assert_eq!(ContainerFormat::detect(b"PK\x03\x04rest"), Some(ContainerFormat::Zip));
        assert_eq!(ContainerFormat::detect(&[0x1f, 0x8b, 8, 0]), Some(ContainerFormat::Gzip));
        assert_eq!(ContainerFormat::detect(b"BZh91AY"), Some(ContainerFormat::Bzip2));

        let mut tar_head = vec![0u8; SNIFF_LEN];
        tar_head[257..262].copy_from_slice(b"ustar");
        assert_eq!(ContainerFormat::detect(&tar_head), Some(ContainerFormat::Tar));

        assert_eq!(ContainerFormat::detect(b"plain text"), None);
        assert_eq!(ContainerFormat::detect(&[]), None);
    }

    #[test]
    fn test_name_fallback() {
        assert_eq!(ContainerFormat::from_name("old.TAR"), Some(ContainerFormat::Tar));
        assert_eq!(ContainerFormat::from_name("lib.jar"), Some(ContainerFormat::Zip));
        assert_eq!(ContainerFormat::identify(b"junk", "a.tgz"), Some(ContainerFormat::Gzip));
        assert_eq!(ContainerFormat::identify(b"junk", "a.txt"), None);
    }

    #[test]
    fn test_codes_round_trip_and_reject() {
        for code in 0..5u8 {
            assert_eq!(ContainerFormat::try_from(code).unwrap().code(), code);
        }
        assert!(matches!(
            ContainerFormat::try_from(5),
            Err(VfsError::ArchiveFormat(_))
        ));
    }
}
