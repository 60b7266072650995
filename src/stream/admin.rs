use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{admin_err, config_err};
use crate::error::Result;
use crate::stream::stream_cut::StreamCut;

/// A stream identified by its scope and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopedStream {
    pub scope: String,
    pub stream: String,
}

impl ScopedStream {
    pub fn new(scope: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            stream: stream.into(),
        }
    }

    /// Parses `scope/stream`, or a bare `stream` name placed in `default_scope`.
    pub fn resolve(name: &str, default_scope: &str) -> Result<Self> {
        let stream = match name.split_once('/') {
            Some((scope, stream)) => Self::new(scope, stream),
            None => Self::new(default_scope, name),
        };
        stream.validate()?;
        Ok(stream)
    }

    fn validate(&self) -> Result<()> {
        for (kind, value) in [("scope", &self.scope), ("stream", &self.stream)] {
            validate_name(kind, value).map_err(|_| {
                config_err!("Invalid {} name {:?} in {}: {}", kind, value, self, NAME_RULE)
            })?;
        }
        Ok(())
    }
}

const NAME_RULE: &str = "names start with a letter or digit and contain only letters, digits, '-' and '.'";

/// Checks a scope or stream name the way the admin service does before it touches storage.
pub(crate) fn validate_name(kind: &str, value: &str) -> Result<()> {
    let starts_alphanumeric = value.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    if !starts_alphanumeric || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
        return Err(admin_err!("Illegal {} name {:?}: {}", kind, value, NAME_RULE));
    }
    Ok(())
}

impl fmt::Display for ScopedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.stream)
    }
}

/// How the storage service splits a stream into segments as throughput changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScalingPolicy {
    Fixed {
        segments: u32,
    },
    ByEventRate {
        target_rate: u32,
        scale_factor: u32,
        min_segments: u32,
    },
    ByDataRate {
        /// Target rate in KB/s per segment.
        target_kbps: u32,
        scale_factor: u32,
        min_segments: u32,
    },
}

impl ScalingPolicy {
    pub fn min_segments(&self) -> u32 {
        match self {
            ScalingPolicy::Fixed { segments } => *segments,
            ScalingPolicy::ByEventRate { min_segments, .. } => *min_segments,
            ScalingPolicy::ByDataRate { min_segments, .. } => *min_segments,
        }
    }
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        ScalingPolicy::ByDataRate {
            target_kbps: 100_000,
            scale_factor: 2,
            min_segments: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfiguration {
    pub scaling_policy: ScalingPolicy,
}

/// Current head (oldest retained) and tail (most recent) positions of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream: ScopedStream,
    pub head_cut: StreamCut,
    pub tail_cut: StreamCut,
}

/// Connection settings for the stream admin service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub controller_uri: Url,
    pub default_scope: String,
}

impl ClientConfig {
    pub const DEFAULT_CONTROLLER_URI: &'static str = "tcp://localhost:9090";
    pub const DEFAULT_SCOPE: &'static str = "examples";

    pub fn new(controller_uri: &str, default_scope: impl Into<String>) -> Result<Self> {
        let controller_uri = Url::from_str(controller_uri)
            .map_err(|e| config_err!("Invalid controller URI {:?}: {}", controller_uri, e))?;
        Ok(Self {
            controller_uri,
            default_scope: default_scope.into(),
        })
    }
}

/// Administrative client of the stream storage service.
///
/// `create_scope` and `create_stream` return whether anything was created. Creating something
/// that already exists is not an error and leaves the existing configuration unchanged.
#[async_trait]
pub trait StreamManager: Send + Sync {
    async fn create_scope(&self, scope: &str) -> Result<bool>;

    async fn create_stream(&self, scope: &str, stream: &str, configuration: &StreamConfiguration) -> Result<bool>;

    async fn get_stream_info(&self, scope: &str, stream: &str) -> Result<StreamInfo>;

    async fn list_streams(&self, scope: &str) -> Result<Vec<ScopedStream>>;

    /// Releases the connection. Called exactly once by [`StreamManagerGuard`].
    fn close(&mut self);
}

/// Opens connections to the stream admin service.
#[async_trait]
pub trait StreamManagerFactory: Send + Sync {
    async fn connect(&self, client_config: &ClientConfig) -> Result<Box<dyn StreamManager>>;
}

/// An open admin connection that is closed when the guard goes out of scope.
pub struct StreamManagerGuard {
    manager: Box<dyn StreamManager>,
}

impl StreamManagerGuard {
    pub async fn open(factory: &dyn StreamManagerFactory, client_config: &ClientConfig) -> Result<Self> {
        debug!("Opening stream admin connection to {}", client_config.controller_uri);
        let manager = factory.connect(client_config).await?;
        Ok(Self { manager })
    }
}

impl Deref for StreamManagerGuard {
    type Target = dyn StreamManager;

    fn deref(&self) -> &Self::Target {
        self.manager.as_ref()
    }
}

impl DerefMut for StreamManagerGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.manager.as_mut()
    }
}

impl Drop for StreamManagerGuard {
    fn drop(&mut self) {
        debug!("Closing stream admin connection");
        self.manager.close();
    }
}
