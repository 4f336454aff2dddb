use super::archive::{self, Stream};
use super::handles::HandleCounter;
use nestdupe_common::{ContainerFormat, VfsError, VirtualPath, SNIFF_LEN};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Resolves [`VirtualPath`]s into readable byte streams.
///
/// Nested paths are opened by chaining archive readers from the real file
/// inwards. Every real file handle opened by the pool is registered with the
/// pool's [`HandleCounter`] for as long as it stays open.
#[derive(Debug, Clone, Default)]
pub struct VirtualStreamPool {
    handles: HandleCounter,
}

impl VirtualStreamPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool that reports into an existing counter.
    pub fn with_counter(handles: HandleCounter) -> Self {
        Self { handles }
    }

    pub fn handles(&self) -> &HandleCounter {
        &self.handles
    }

    pub fn open_handles(&self) -> usize {
        self.handles.open_handles()
    }

    /// Open the resource addressed by `path`.
    ///
    /// Fails with `NotFound` when the file or any entry along the chain is
    /// absent, `ArchiveFormat` when a container cannot be parsed and `Io` on
    /// read failures. On failure every stream opened so far is closed.
    pub fn open(&self, path: &VirtualPath) -> Result<VirtualStream, VfsError> {
        let segments = path.split();
        let root = &segments[0];
        let file = self.open_file(Path::new(root))?;

        if segments.len() == 1 {
            return Ok(VirtualStream::new(path.clone(), Box::new(file)));
        }

        let mut stream = self.open_root_entry(file, root, &segments[1])?;
        for pair in segments[1..].windows(2) {
            stream = archive::descend(stream, &pair[0], &pair[1])?;
        }

        debug!("Opened {} through {} containers", path, segments.len() - 1);
        Ok(VirtualStream::new(path.clone(), stream))
    }

    fn open_file(&self, path: &Path) -> Result<BufReader<super::Tracked<File>>, VfsError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound(path.display().to_string()),
            _ => VfsError::Io(e),
        })?;
        if file.metadata()?.is_dir() {
            return Err(VfsError::NotAFile(path.display().to_string()));
        }
        Ok(BufReader::with_capacity(READ_BUFFER_SIZE, self.handles.track(file)))
    }

    /// First hop, from a seekable real file.
    ///
    /// Zip files are served by indexed lookup straight from the file handle;
    /// other formats fall back to a sequential scan.
    fn open_root_entry(
        &self,
        mut file: BufReader<super::Tracked<File>>,
        container: &str,
        entry: &str,
    ) -> Result<Stream, VfsError> {
        let mut head = Vec::with_capacity(SNIFF_LEN);
        (&mut file).take(SNIFF_LEN as u64).read_to_end(&mut head)?;
        file.seek(SeekFrom::Start(0))?;

        match ContainerFormat::identify(&head, container) {
            Some(ContainerFormat::Zip) => archive::open_zip_entry(file, container, entry),
            Some(format) => archive::descend_as(format, Box::new(file), container, entry),
            None => Err(VfsError::ArchiveFormat(format!(
                "'{}' is not a supported archive",
                container
            ))),
        }
    }

    /// Length in bytes of the addressed resource.
    ///
    /// Plain files answer from metadata; nested entries are streamed.
    pub fn len(&self, path: &VirtualPath) -> Result<u64, VfsError> {
        if !path.is_nested() {
            let meta = std::fs::metadata(path.file_path()).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => VfsError::NotFound(path.to_string()),
                _ => VfsError::Io(e),
            })?;
            return Ok(meta.len());
        }
        let mut stream = self.open(path)?;
        Ok(io::copy(&mut stream, &mut io::sink())?)
    }
}

/// Readable stream over a virtual resource.
///
/// Dropping the stream closes the whole chain, innermost reader first.
pub struct VirtualStream {
    path: VirtualPath,
    reader: Stream,
}

impl VirtualStream {
    fn new(path: VirtualPath, reader: Stream) -> Self {
        Self { path, reader }
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// Explicit close; equivalent to dropping the stream.
    pub fn close(self) {
        debug!("Closing stream for {}", self.path);
    }
}

impl Read for VirtualStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for VirtualStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualStream").field("path", &self.path).finish()
    }
}
