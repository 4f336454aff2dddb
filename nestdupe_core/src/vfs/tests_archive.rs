#[cfg(test)]
mod tests {
    use crate::vfs::VirtualStreamPool;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use nestdupe_common::{VfsError, VirtualPath};
    use std::fs;
    use std::io::{Cursor, Read, Write};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::CompressionMethod;

    // ============================================================================
    // Fixture builders
    // ============================================================================

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in entries {
            zip.start_file(*name, options).expect("Failed to start file");
            zip.write_all(data).expect("Failed to write");
        }
        zip.finish().expect("Failed to finish ZIP").into_inner()
    }

    fn zip_with_dir(dir: &str) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.add_directory(dir, FileOptions::default())
            .expect("Failed to add directory");
        zip.finish().expect("Failed to finish ZIP").into_inner()
    }

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, *data)
                .expect("Failed to append");
        }
        builder.into_inner().expect("Failed to finish TAR")
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).expect("Failed to compress");
        encoder.finish().expect("Failed to finish gzip")
    }

    fn write_fixture(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, data).expect("Failed to write fixture");
        path
    }

    fn read_path(pool: &VirtualStreamPool, path: &VirtualPath) -> Vec<u8> {
        let mut stream = pool.open(path).expect("Failed to open virtual path");
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).expect("Failed to read");
        buffer
    }

    // ============================================================================
    // Two-segment paths
    // ============================================================================

    #[test]
    fn test_zip_entry_indexed_lookup() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let payload = b"Hello from inside a ZIP".repeat(50);
        let zip_path = write_fixture(
            temp_dir.path(),
            "bundle.zip",
            &zip_bytes(&[("first.txt", b"first"), ("docs/payload.txt", &payload)]),
        );

        let pool = VirtualStreamPool::new();
        let path = VirtualPath::from_file(&zip_path).join("docs/payload.txt");

        let mut stream = pool.open(&path).expect("Failed to open entry");
        assert_eq!(pool.open_handles(), 1, "container handle stays open with the entry");

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).expect("Failed to read");
        assert_eq!(buffer, payload);

        drop(stream);
        assert_eq!(pool.open_handles(), 0);
    }

    #[test]
    fn test_zip_detected_without_extension() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = write_fixture(
            temp_dir.path(),
            "archive.data",
            &zip_bytes(&[("x.txt", b"detected by magic")]),
        );

        let pool = VirtualStreamPool::new();
        let content = read_path(&pool, &VirtualPath::from_file(&path).join("x.txt"));
        assert_eq!(content, b"detected by magic");
    }

    #[test]
    fn test_tar_entry_sequential_scan() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let tar_path = write_fixture(
            temp_dir.path(),
            "bundle.tar",
            &tar_bytes(&[
                ("a.txt", b"alpha"),
                ("b/c.txt", b"charlie"),
                ("d.txt", b"delta"),
            ]),
        );

        let pool = VirtualStreamPool::new();
        let base = VirtualPath::from_file(&tar_path);
        assert_eq!(read_path(&pool, &base.join("b/c.txt")), b"charlie");
        assert_eq!(read_path(&pool, &base.join("d.txt")), b"delta");
        assert_eq!(pool.open_handles(), 0);
    }

    #[test]
    fn test_tar_gz_entry() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let tgz = gzip(&tar_bytes(&[("inside.txt", b"gzipped tar entry")]));
        let path = write_fixture(temp_dir.path(), "bundle.tar.gz", &tgz);

        let pool = VirtualStreamPool::new();
        let content = read_path(&pool, &VirtualPath::from_file(&path).join("inside.txt"));
        assert_eq!(content, b"gzipped tar entry");
    }

    #[test]
    fn test_plain_file_as_container_is_format_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = write_fixture(temp_dir.path(), "notes.txt", b"not an archive");

        let pool = VirtualStreamPool::new();
        let result = pool.open(&VirtualPath::from_file(&path).join("entry"));
        assert!(matches!(result, Err(VfsError::ArchiveFormat(_))));
        assert_eq!(pool.open_handles(), 0);
    }

    #[test]
    fn test_zip_directory_entry_is_not_a_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = write_fixture(temp_dir.path(), "dirs.zip", &zip_with_dir("folder/"));

        let pool = VirtualStreamPool::new();
        let result = pool.open(&VirtualPath::from_file(&path).join("folder/"));
        assert!(matches!(result, Err(VfsError::NotAFile(_))));
        assert_eq!(pool.open_handles(), 0);
    }

    // ============================================================================
    // Nested chains
    // ============================================================================

    #[test]
    fn test_three_level_zip_tar_chain() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let deep = b"deeply nested bytes ".repeat(200);
        let tar = tar_bytes(&[("skip.txt", b"skip"), ("deep/file.bin", &deep)]);
        let outer = zip_bytes(&[("readme.txt", b"top"), ("inner.tar", &tar)]);
        let zip_path = write_fixture(temp_dir.path(), "outer.zip", &outer);

        let pool = VirtualStreamPool::new();
        let before = pool.open_handles();
        let path = VirtualPath::from_segments([
            zip_path.to_string_lossy().into_owned(),
            "inner.tar".to_string(),
            "deep/file.bin".to_string(),
        ]);

        let content = read_path(&pool, &path);

        // manual decompression of the same chain
        let mut outer_archive =
            zip::ZipArchive::new(Cursor::new(outer.clone())).expect("Failed to read outer");
        let mut tar_data = Vec::new();
        outer_archive
            .by_name("inner.tar")
            .expect("Missing inner.tar")
            .read_to_end(&mut tar_data)
            .expect("Failed to read inner.tar");
        let mut manual = Vec::new();
        let mut tar_archive = tar::Archive::new(Cursor::new(tar_data));
        for entry in tar_archive.entries().expect("Failed to list tar") {
            let mut entry = entry.expect("Bad tar entry");
            if entry.path().expect("Bad path").to_string_lossy() == "deep/file.bin" {
                entry.read_to_end(&mut manual).expect("Failed to read entry");
            }
        }

        assert_eq!(content, manual);
        assert_eq!(content, deep);
        assert_eq!(pool.open_handles(), before);
    }

    #[test]
    fn test_zip_inside_zip() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let inner = zip_bytes(&[("leaf.txt", b"zip in zip")]);
        let outer = zip_bytes(&[("inner.zip", &inner)]);
        let path = write_fixture(temp_dir.path(), "outer.zip", &outer);

        let pool = VirtualStreamPool::new();
        let virtual_path = VirtualPath::from_file(&path).join("inner.zip").join("leaf.txt");
        assert_eq!(read_path(&pool, &virtual_path), b"zip in zip");
        assert_eq!(pool.open_handles(), 0);
    }

    #[test]
    fn test_four_level_chain_through_gzip() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let tgz = gzip(&tar_bytes(&[("bottom.txt", b"four levels down")]));
        let zip = zip_bytes(&[("middle.tgz", &tgz)]);
        let tar = tar_bytes(&[("top.zip", &zip)]);
        let path = write_fixture(temp_dir.path(), "root.tar", &tar);

        let pool = VirtualStreamPool::new();
        let virtual_path = VirtualPath::from_file(&path)
            .join("top.zip")
            .join("middle.tgz")
            .join("bottom.txt");
        assert_eq!(read_path(&pool, &virtual_path), b"four levels down");
        assert_eq!(pool.open_handles(), 0);
    }

    #[test]
    fn test_missing_intermediate_entry() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let tar = tar_bytes(&[("present.txt", b"here")]);
        let path = write_fixture(
            temp_dir.path(),
            "outer.zip",
            &zip_bytes(&[("inner.tar", &tar)]),
        );

        let pool = VirtualStreamPool::new();
        let before = pool.open_handles();

        let missing_middle = VirtualPath::from_file(&path).join("absent.tar").join("present.txt");
        assert!(matches!(pool.open(&missing_middle), Err(VfsError::NotFound(_))));
        assert_eq!(pool.open_handles(), before);

        let missing_leaf = VirtualPath::from_file(&path).join("inner.tar").join("absent.txt");
        assert!(matches!(pool.open(&missing_leaf), Err(VfsError::NotFound(_))));
        assert_eq!(pool.open_handles(), before);
    }

    #[test]
    fn test_len_of_nested_entry() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let payload = vec![42u8; 4321];
        let path = write_fixture(
            temp_dir.path(),
            "sized.zip",
            &zip_bytes(&[("blob.bin", &payload)]),
        );

        let pool = VirtualStreamPool::new();
        let len = pool
            .len(&VirtualPath::from_file(&path).join("blob.bin"))
            .expect("Failed to measure entry");
        assert_eq!(len, 4321);
        assert_eq!(pool.open_handles(), 0);
    }

    #[test]
    fn test_concurrent_opens_release_all_handles() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let tar = tar_bytes(&[("f.txt", b"shared")]);
        let path = write_fixture(temp_dir.path(), "shared.zip", &zip_bytes(&[("t.tar", &tar)]));
        let virtual_path = VirtualPath::from_file(&path).join("t.tar").join("f.txt");

        let pool = VirtualStreamPool::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let pool = pool.clone();
                let virtual_path = virtual_path.clone();
                scope.spawn(move || {
                    for _ in 0..10 {
                        assert_eq!(read_path(&pool, &virtual_path), b"shared");
                    }
                });
            }
        });
        assert_eq!(pool.open_handles(), 0);
    }
}
