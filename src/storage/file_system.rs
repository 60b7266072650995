use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::TryStreamExt;
use tokio_stream::wrappers::ReadDirStream;

use crate::error::{BootstrapError, Result};
use crate::storage_err;

#[derive(Debug, Clone)]
pub struct FileSystemEntry {
    pub name: OsString,
    pub directory: bool,
}

/// File access relative to some root, so catalogs can be pointed at a temp dir in tests.
#[async_trait]
pub trait FileSystemStorage: Send + Sync {
    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;
    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>>;
    async fn list_files(&self, path: &Path) -> Result<Vec<FileSystemEntry>>;
    async fn mkdir_all(&self, path: &Path) -> Result<()>;
    fn get_physical_path(&self, path: &Path) -> PathBuf;
}

pub struct PrefixedLocalFileSystemStorage {
    dir: OsString,
}

impl PrefixedLocalFileSystemStorage {
    pub fn new(dir: impl Into<OsString>) -> Self {
        Self { dir: dir.into() }
    }

    fn prefixed_path(&self, path: impl AsRef<Path>) -> PathBuf {
        Path::new(&self.dir).join(&path)
    }
}

#[async_trait]
impl FileSystemStorage for PrefixedLocalFileSystemStorage {
    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        // Write to a sibling and rename so readers never observe a partial file
        let target = self.prefixed_path(path);
        let staging = target.with_extension("tmp");
        tokio::fs::write(&staging, contents).await
            .map_err(|e| storage_err!("Failed to write file {}: {}", staging.display(), e))?;
        tokio::fs::rename(&staging, &target).await
            .map_err(|e| storage_err!("Failed to move file into place at {}: {}", target.display(), e))
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.prefixed_path(path)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err!("Failed to read file {}: {}", path.display(), e)),
        }
    }

    async fn list_files(&self, path: &Path) -> Result<Vec<FileSystemEntry>> {
        let read_dir = match tokio::fs::read_dir(self.prefixed_path(path)).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err!("Failed to read dir {}: {}", path.display(), e)),
        };

        ReadDirStream::new(read_dir)
            .map_err(|err| storage_err!("Error when reading directory: {}", err))
            .and_then(|entry| async move {
                let directory = entry.file_type().await.map(|ft| ft.is_dir()).unwrap_or(false);
                Ok::<_, BootstrapError>(FileSystemEntry {
                    name: entry.file_name(),
                    directory,
                })
            })
            .try_collect::<Vec<_>>()
            .await
    }

    async fn mkdir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(self.prefixed_path(path)).await
            .map_err(|e| storage_err!("Failed to create directory {}: {}", path.display(), e))
    }

    fn get_physical_path(&self, path: &Path) -> PathBuf {
        self.prefixed_path(path)
    }
}

/// Local storage rooted in a temporary directory that is removed on drop.
pub struct TempdirFileSystemStorage {
    // Held so the directory outlives the storage
    _dir: tempfile::TempDir,
    inner: PrefixedLocalFileSystemStorage,
}

impl TempdirFileSystemStorage {
    pub fn from_tempdir(dir: tempfile::TempDir) -> Self {
        Self {
            inner: PrefixedLocalFileSystemStorage::new(dir.path()),
            _dir: dir,
        }
    }
}

#[async_trait]
impl FileSystemStorage for TempdirFileSystemStorage {
    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.inner.write_file(path, contents).await
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        self.inner.read_file(path).await
    }

    async fn list_files(&self, path: &Path) -> Result<Vec<FileSystemEntry>> {
        self.inner.list_files(path).await
    }

    async fn mkdir_all(&self, path: &Path) -> Result<()> {
        self.inner.mkdir_all(path).await
    }

    fn get_physical_path(&self, path: &Path) -> PathBuf {
        self.inner.get_physical_path(path)
    }
}

pub fn make_temp_dir(prefix: &str) -> Result<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .map_err(|e| storage_err!("Failed to create temporary directory: {}", e))
}
