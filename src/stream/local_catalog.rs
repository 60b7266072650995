use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::admin_err;
use crate::error::Result;
use crate::storage::file_system::{FileSystemStorage, PrefixedLocalFileSystemStorage};
use crate::stream::admin::{validate_name, ClientConfig, ScopedStream, StreamConfiguration, StreamInfo, StreamManager, StreamManagerFactory};
use crate::stream::stream_cut::{initial_stream_cut, StreamCut};

const STREAM_FILE_EXTENSION: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamRecord {
    stream: ScopedStream,
    configuration: StreamConfiguration,
    head_cut: StreamCut,
    tail_cut: StreamCut,
    created_at_ms: u64,
}

struct CatalogInner {
    storage: Arc<dyn FileSystemStorage>,
    // Serialises check-then-write sequences within this process
    write_lock: Mutex<()>,
}

/// A stream admin service backed by JSON files, for development setups without a storage
/// cluster. Stream metadata survives restarts of the job.
///
/// Layout: `scopes/<scope>/streams/<stream>.json`.
#[derive(Clone)]
pub struct LocalStreamCatalog {
    inner: Arc<CatalogInner>,
}

impl LocalStreamCatalog {
    pub fn new(storage: Arc<dyn FileSystemStorage>) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                storage,
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn open_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(Arc::new(PrefixedLocalFileSystemStorage::new(dir.as_ref())))
    }
}

#[async_trait]
impl StreamManagerFactory for LocalStreamCatalog {
    async fn connect(&self, client_config: &ClientConfig) -> Result<Box<dyn StreamManager>> {
        debug!(
            "Using local stream catalog at {} in place of {}",
            self.inner.storage.get_physical_path(Path::new("")).display(),
            client_config.controller_uri,
        );
        Ok(Box::new(LocalStreamManager {
            inner: self.inner.clone(),
            closed: false,
        }))
    }
}

struct LocalStreamManager {
    inner: Arc<CatalogInner>,
    closed: bool,
}

impl LocalStreamManager {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(admin_err!("Stream manager is closed"));
        }
        Ok(())
    }

    // Names become path components, so they are checked before any path is built
    fn scope_path(scope: &str) -> Result<PathBuf> {
        validate_name("scope", scope)?;
        Ok(Path::new("scopes").join(scope))
    }

    fn streams_path(scope: &str) -> Result<PathBuf> {
        Ok(Self::scope_path(scope)?.join("streams"))
    }

    fn stream_path(scope: &str, stream: &str) -> Result<PathBuf> {
        validate_name("stream", stream)?;
        Ok(Self::streams_path(scope)?.join(format!("{}.{}", stream, STREAM_FILE_EXTENSION)))
    }

    async fn scope_exists(&self, scope: &str) -> Result<bool> {
        validate_name("scope", scope)?;
        let scopes = self.inner.storage.list_files(Path::new("scopes")).await?;
        Ok(scopes.iter().any(|entry| entry.directory && entry.name == scope))
    }

    async fn read_record(&self, scope: &str, stream: &str) -> Result<Option<StreamRecord>> {
        let Some(content) = self.inner.storage.read_file(&Self::stream_path(scope, stream)?).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&content)?))
    }
}

#[async_trait]
impl StreamManager for LocalStreamManager {
    async fn create_scope(&self, scope: &str) -> Result<bool> {
        self.check_open()?;
        let _guard = self.inner.write_lock.lock().await;
        if self.scope_exists(scope).await? {
            return Ok(false);
        }
        self.inner.storage.mkdir_all(&Self::streams_path(scope)?).await?;
        Ok(true)
    }

    async fn create_stream(&self, scope: &str, stream: &str, configuration: &StreamConfiguration) -> Result<bool> {
        self.check_open()?;
        let _guard = self.inner.write_lock.lock().await;
        if !self.scope_exists(scope).await? {
            return Err(admin_err!("Scope {} does not exist", scope));
        }
        if self.read_record(scope, stream).await?.is_some() {
            return Ok(false);
        }

        let created_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| admin_err!("Failed to get current time: {}", e))?
            .as_millis() as u64;
        let segments = configuration.scaling_policy.min_segments();
        let record = StreamRecord {
            stream: ScopedStream::new(scope, stream),
            configuration: configuration.clone(),
            head_cut: initial_stream_cut(segments),
            tail_cut: initial_stream_cut(segments),
            created_at_ms,
        };
        let content = serde_json::to_vec_pretty(&record)?;
        self.inner.storage.write_file(&Self::stream_path(scope, stream)?, &content).await?;
        Ok(true)
    }

    async fn get_stream_info(&self, scope: &str, stream: &str) -> Result<StreamInfo> {
        self.check_open()?;
        let record = self.read_record(scope, stream).await?
            .ok_or_else(|| admin_err!("Stream {}/{} does not exist", scope, stream))?;
        Ok(StreamInfo {
            stream: record.stream,
            head_cut: record.head_cut,
            tail_cut: record.tail_cut,
        })
    }

    async fn list_streams(&self, scope: &str) -> Result<Vec<ScopedStream>> {
        self.check_open()?;
        if !self.scope_exists(scope).await? {
            return Err(admin_err!("Scope {} does not exist", scope));
        }
        let mut streams = self.inner.storage.list_files(&Self::streams_path(scope)?).await?
            .into_iter()
            .filter(|entry| !entry.directory)
            .filter_map(|entry| {
                let name = PathBuf::from(entry.name);
                if name.extension()? != STREAM_FILE_EXTENSION {
                    return None;
                }
                let stream = name.file_stem()?.to_str()?.to_string();
                Some(ScopedStream::new(scope, stream))
            })
            .collect::<Vec<_>>();
        streams.sort();
        Ok(streams)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
