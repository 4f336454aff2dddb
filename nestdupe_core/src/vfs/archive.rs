use bzip2::read::BzDecoder;
use flate2::read::{DeflateDecoder, GzDecoder};
use nestdupe_common::{ContainerFormat, VfsError, SNIFF_LEN};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use tracing::debug;
use xz2::read::XzDecoder;
use zip::result::ZipError;
use zip::{CompressionMethod, ZipArchive};

/// Owned byte stream; dropping it closes every stream it wraps.
pub type Stream = Box<dyn Read + Send>;

/// Read the leading bytes of `reader` without losing them.
pub(crate) fn sniff(mut reader: Stream) -> io::Result<(Vec<u8>, Stream)> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut reader).take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    let replay = Cursor::new(head.clone());
    Ok((head, Box::new(replay.chain(reader))))
}

/// Open `entry` inside the container carried by `stream`.
///
/// The container format is detected from its content, falling back to the
/// `container` name. Zip containers are buffered in memory because their
/// directory sits at the end; everything else is scanned as it streams.
pub(crate) fn descend(stream: Stream, container: &str, entry: &str) -> Result<Stream, VfsError> {
    let (head, stream) = sniff(stream).map_err(|e| read_error(container, e))?;
    let format = ContainerFormat::identify(&head, container)
        .ok_or_else(|| VfsError::ArchiveFormat(format!("'{}' is not a supported archive", container)))?;
    descend_as(format, stream, container, entry)
}

pub(crate) fn descend_as(
    format: ContainerFormat,
    mut stream: Stream,
    container: &str,
    entry: &str,
) -> Result<Stream, VfsError> {
    debug!("Descending into {} container '{}' for '{}'", format.name(), container, entry);
    match format {
        ContainerFormat::Zip => {
            let mut buffer = Vec::new();
            stream
                .read_to_end(&mut buffer)
                .map_err(|e| read_error(container, e))?;
            drop(stream);
            open_zip_entry(Cursor::new(buffer), container, entry)
        }
        ContainerFormat::Tar => scan_tar_entry(stream, container, entry),
        ContainerFormat::Gzip | ContainerFormat::Bzip2 | ContainerFormat::Xz => {
            let decoded: Stream = match format {
                ContainerFormat::Gzip => Box::new(GzDecoder::new(stream)),
                ContainerFormat::Bzip2 => Box::new(BzDecoder::new(stream)),
                _ => Box::new(XzDecoder::new(stream)),
            };
            let (head, decoded) = sniff(decoded).map_err(|e| read_error(container, e))?;
            let holds_tar = ContainerFormat::detect(&head) == Some(ContainerFormat::Tar)
                || ContainerFormat::from_name(container).is_some();
            if !holds_tar {
                return Err(VfsError::ArchiveFormat(format!(
                    "'{}' is {} compressed but does not hold a tar archive",
                    container,
                    format.name()
                )));
            }
            scan_tar_entry(decoded, container, entry)
        }
    }
}

/// Indexed lookup through the zip central directory.
///
/// The returned stream owns `reader`, positioned on the entry data, and
/// inflates it on the fly.
pub(crate) fn open_zip_entry<R>(reader: R, container: &str, entry: &str) -> Result<Stream, VfsError>
where
    R: Read + Seek + Send + 'static,
{
    let mut archive = ZipArchive::new(reader).map_err(|e| zip_error(container, entry, e))?;

    let (data_start, compressed_size, size, method) = {
        let file = archive
            .by_name(entry)
            .map_err(|e| zip_error(container, entry, e))?;
        if file.is_dir() {
            return Err(VfsError::NotAFile(format!("{}!/{}", container, entry)));
        }
        (
            file.data_start(),
            file.compressed_size(),
            file.size(),
            file.compression(),
        )
    };

    let mut reader = archive.into_inner();
    reader.seek(SeekFrom::Start(data_start))?;
    let raw = reader.take(compressed_size);

    let decoded: Stream = match method {
        CompressionMethod::Stored => Box::new(raw),
        CompressionMethod::Deflated => Box::new(DeflateDecoder::new(raw)),
        CompressionMethod::Bzip2 => Box::new(BzDecoder::new(raw)),
        other => {
            return Err(VfsError::ArchiveFormat(format!(
                "{}!/{} uses unsupported compression {:?}",
                container, entry, other
            )))
        }
    };
    Ok(Box::new(decoded.take(size)))
}

/// Sequential scan of a tar stream for `entry`.
///
/// On a match the archive is unwrapped; its reader then sits on the first
/// data byte of the entry and is limited to the entry size.
pub(crate) fn scan_tar_entry(stream: Stream, container: &str, entry: &str) -> Result<Stream, VfsError> {
    let mut archive = tar::Archive::new(stream);
    let wanted = trim_entry_name(entry.as_bytes());

    let size = {
        let entries = archive.entries().map_err(|e| tar_error(container, e))?;
        let mut found = None;
        for item in entries {
            let item = item.map_err(|e| tar_error(container, e))?;
            if trim_entry_name(&item.path_bytes()) != wanted {
                continue;
            }
            let entry_type = item.header().entry_type();
            if entry_type.is_gnu_sparse() {
                return Err(VfsError::ArchiveFormat(format!(
                    "{}!/{} is a sparse tar entry",
                    container, entry
                )));
            }
            if !entry_type.is_file() && !entry_type.is_contiguous() {
                return Err(VfsError::NotAFile(format!("{}!/{}", container, entry)));
            }
            found = Some(item.size());
            break;
        }
        found
    };

    match size {
        Some(size) => Ok(Box::new(archive.into_inner().take(size))),
        None => Err(VfsError::NotFound(format!("{}!/{}", container, entry))),
    }
}

fn trim_entry_name(name: &[u8]) -> &[u8] {
    name.strip_prefix(b"./").unwrap_or(name)
}

fn zip_error(container: &str, entry: &str, err: ZipError) -> VfsError {
    match err {
        ZipError::FileNotFound => VfsError::NotFound(format!("{}!/{}", container, entry)),
        ZipError::Io(e) => read_error(container, e),
        other => VfsError::ArchiveFormat(format!("{}: {}", container, other)),
    }
}

/// Header and checksum failures come back from the tar reader as `Other`;
/// only errors raised by the OS stay I/O errors.
fn tar_error(container: &str, err: io::Error) -> VfsError {
    if err.raw_os_error().is_some() {
        return VfsError::Io(err);
    }
    match err.kind() {
        io::ErrorKind::Other
        | io::ErrorKind::InvalidData
        | io::ErrorKind::InvalidInput
        | io::ErrorKind::UnexpectedEof => {
            VfsError::ArchiveFormat(format!("{}: {}", container, err))
        }
        _ => VfsError::Io(err),
    }
}

/// Corrupt compressed or archive data surfaces as `InvalidData`/`InvalidInput`
/// from the decoders; report it as a format problem.
pub(crate) fn read_error(container: &str, err: io::Error) -> VfsError {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            VfsError::ArchiveFormat(format!("{}: {}", container, err))
        }
        _ => VfsError::Io(err),
    }
}
