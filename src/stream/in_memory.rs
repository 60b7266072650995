use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::admin_err;
use crate::error::{BootstrapError, Result};
use crate::stream::admin::{validate_name, ClientConfig, ScopedStream, StreamConfiguration, StreamInfo, StreamManager, StreamManagerFactory};
use crate::stream::stream_cut::{initial_stream_cut, StreamCut};

#[derive(Debug, Clone)]
struct StreamEntry {
    configuration: StreamConfiguration,
    head_cut: StreamCut,
    tail_cut: StreamCut,
}

#[derive(Default)]
struct Catalog {
    scopes: BTreeSet<String>,
    streams: BTreeMap<ScopedStream, StreamEntry>,
}

struct SharedState {
    catalog: RwLock<Catalog>,
    open_connections: AtomicUsize,
    total_connections: AtomicUsize,
    reachable: AtomicBool,
}

/// A stream admin service that lives inside the current process.
///
/// Every connection shares one catalog, so streams created through one connection are visible
/// to the next. Useful for tests and for running a job locally without a storage cluster.
#[derive(Clone)]
pub struct InMemoryStreamAdmin {
    state: Arc<SharedState>,
}

impl InMemoryStreamAdmin {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SharedState {
                catalog: RwLock::new(Catalog::default()),
                open_connections: AtomicUsize::new(0),
                total_connections: AtomicUsize::new(0),
                reachable: AtomicBool::new(true),
            }),
        }
    }

    /// While unreachable, every `connect` fails with a connection error.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Moves the head and tail of an existing stream, as truncation and writes would.
    pub fn set_stream_cuts(&self, stream: &ScopedStream, head_cut: StreamCut, tail_cut: StreamCut) -> Result<()> {
        let mut catalog = self.state.catalog.write();
        let entry = catalog.streams.get_mut(stream)
            .ok_or_else(|| admin_err!("Stream {} does not exist", stream))?;
        entry.head_cut = head_cut;
        entry.tail_cut = tail_cut;
        Ok(())
    }

    pub fn stream_configuration(&self, stream: &ScopedStream) -> Option<StreamConfiguration> {
        self.state.catalog.read().streams.get(stream).map(|entry| entry.configuration.clone())
    }

    pub fn stream_count(&self) -> usize {
        self.state.catalog.read().streams.len()
    }

    pub fn open_connections(&self) -> usize {
        self.state.open_connections.load(Ordering::SeqCst)
    }

    pub fn total_connections(&self) -> usize {
        self.state.total_connections.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryStreamAdmin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamManagerFactory for InMemoryStreamAdmin {
    async fn connect(&self, client_config: &ClientConfig) -> Result<Box<dyn StreamManager>> {
        if !self.state.reachable.load(Ordering::SeqCst) {
            return Err(BootstrapError::Connection {
                uri: client_config.controller_uri.to_string(),
                message: "controller is not reachable".to_string(),
            });
        }
        self.state.open_connections.fetch_add(1, Ordering::SeqCst);
        self.state.total_connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryStreamManager {
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct InMemoryStreamManager {
    state: Arc<SharedState>,
    closed: bool,
}

impl InMemoryStreamManager {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(admin_err!("Stream manager is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl StreamManager for InMemoryStreamManager {
    async fn create_scope(&self, scope: &str) -> Result<bool> {
        self.check_open()?;
        validate_name("scope", scope)?;
        Ok(self.state.catalog.write().scopes.insert(scope.to_string()))
    }

    async fn create_stream(&self, scope: &str, stream: &str, configuration: &StreamConfiguration) -> Result<bool> {
        self.check_open()?;
        validate_name("stream", stream)?;
        let mut catalog = self.state.catalog.write();
        if !catalog.scopes.contains(scope) {
            return Err(admin_err!("Scope {} does not exist", scope));
        }
        let key = ScopedStream::new(scope, stream);
        if catalog.streams.contains_key(&key) {
            return Ok(false);
        }
        let segments = configuration.scaling_policy.min_segments();
        catalog.streams.insert(key, StreamEntry {
            configuration: configuration.clone(),
            head_cut: initial_stream_cut(segments),
            tail_cut: initial_stream_cut(segments),
        });
        Ok(true)
    }

    async fn get_stream_info(&self, scope: &str, stream: &str) -> Result<StreamInfo> {
        self.check_open()?;
        let key = ScopedStream::new(scope, stream);
        let catalog = self.state.catalog.read();
        let entry = catalog.streams.get(&key)
            .ok_or_else(|| admin_err!("Stream {} does not exist", key))?;
        Ok(StreamInfo {
            stream: key.clone(),
            head_cut: entry.head_cut.clone(),
            tail_cut: entry.tail_cut.clone(),
        })
    }

    async fn list_streams(&self, scope: &str) -> Result<Vec<ScopedStream>> {
        self.check_open()?;
        let catalog = self.state.catalog.read();
        if !catalog.scopes.contains(scope) {
            return Err(admin_err!("Scope {} does not exist", scope));
        }
        Ok(catalog.streams.keys()
            .filter(|stream| stream.scope == scope)
            .cloned()
            .collect())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.open_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
