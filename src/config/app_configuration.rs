use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::config::params::Params;
use crate::config_err;
use crate::environment::{ExecutionMode, RestartStrategy};
use crate::error::Result;
use crate::stream::admin::{ClientConfig, ScalingPolicy, ScopedStream};
use crate::stream::stream_cut::StreamCut;
use crate::utils::serde_serialization::duration_ms;

/// A stream the job reads from or writes to, and where reading should start and stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamConfig {
    stream: ScopedStream,
    scaling_policy: ScalingPolicy,
    start_cut: StreamCut,
    end_cut: StreamCut,
    start_at_tail: bool,
    end_at_tail: bool,
}

impl StreamConfig {
    pub const DEFAULT_STREAM_NAME: &'static str = "default";
    pub const DEFAULT_TARGET_RATE_KBPS: u32 = 100_000;
    pub const DEFAULT_SCALE_FACTOR: u32 = 2;
    pub const DEFAULT_MIN_SEGMENTS: u32 = 1;

    /// A stream read from its head with no end, created with the default scaling policy.
    pub fn new(stream: ScopedStream) -> Self {
        Self {
            stream,
            scaling_policy: ScalingPolicy::default(),
            start_cut: StreamCut::Unbounded,
            end_cut: StreamCut::Unbounded,
            start_at_tail: false,
            end_at_tail: false,
        }
    }

    /// Reads `<prefix>-stream`, `<prefix>-targetRate`, `<prefix>-scaleFactor`,
    /// `<prefix>-minNumSegments`, `<prefix>-startStreamCut`, `<prefix>-endStreamCut`,
    /// `<prefix>-startAtTail` and `<prefix>-endAtTail`.
    pub fn from_params(params: &Params, prefix: &str, client_config: &ClientConfig) -> Result<Self> {
        let key = |name: &str| format!("{}-{}", prefix, name);

        let stream = ScopedStream::resolve(
            params.get_or(&key("stream"), Self::DEFAULT_STREAM_NAME),
            &client_config.default_scope,
        )?;
        let scaling_policy = ScalingPolicy::ByDataRate {
            target_kbps: params.get_parsed_or(&key("targetRate"), Self::DEFAULT_TARGET_RATE_KBPS)?,
            scale_factor: params.get_parsed_or(&key("scaleFactor"), Self::DEFAULT_SCALE_FACTOR)?,
            min_segments: params.get_parsed_or(&key("minNumSegments"), Self::DEFAULT_MIN_SEGMENTS)?,
        };

        let config = Self {
            stream,
            scaling_policy,
            start_cut: StreamCut::from(params.get_or(&key("startStreamCut"), StreamCut::UNBOUNDED_TEXT)),
            end_cut: StreamCut::from(params.get_or(&key("endStreamCut"), StreamCut::UNBOUNDED_TEXT)),
            start_at_tail: params.get_bool(&key("startAtTail"), false)?,
            end_at_tail: params.get_bool(&key("endAtTail"), false)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_scaling_policy(mut self, scaling_policy: ScalingPolicy) -> Self {
        self.scaling_policy = scaling_policy;
        self
    }

    pub fn with_start_cut(mut self, start_cut: StreamCut) -> Self {
        self.start_cut = start_cut;
        self
    }

    pub fn with_end_cut(mut self, end_cut: StreamCut) -> Self {
        self.end_cut = end_cut;
        self
    }

    pub fn with_start_at_tail(mut self, start_at_tail: bool) -> Self {
        self.start_at_tail = start_at_tail;
        self
    }

    pub fn with_end_at_tail(mut self, end_at_tail: bool) -> Self {
        self.end_at_tail = end_at_tail;
        self
    }

    pub fn validate(&self) -> Result<()> {
        match self.scaling_policy {
            ScalingPolicy::Fixed { segments: 0 } => {
                Err(config_err!("Stream {} needs at least one segment", self.stream))
            },
            ScalingPolicy::ByEventRate { min_segments: 0, .. } | ScalingPolicy::ByDataRate { min_segments: 0, .. } => {
                Err(config_err!("Stream {} needs at least one segment", self.stream))
            },
            ScalingPolicy::ByEventRate { target_rate: 0, .. } | ScalingPolicy::ByDataRate { target_kbps: 0, .. } => {
                Err(config_err!("Stream {} has a zero target rate", self.stream))
            },
            _ => Ok(()),
        }
    }

    pub fn stream(&self) -> &ScopedStream {
        &self.stream
    }

    pub fn scaling_policy(&self) -> ScalingPolicy {
        self.scaling_policy
    }

    pub fn start_cut(&self) -> &StreamCut {
        &self.start_cut
    }

    pub fn end_cut(&self) -> &StreamCut {
        &self.end_cut
    }

    pub fn is_start_at_tail(&self) -> bool {
        self.start_at_tail
    }

    pub fn is_end_at_tail(&self) -> bool {
        self.end_at_tail
    }
}

/// Everything a job needs to know at startup. Built once, then only read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfiguration {
    client_config: ClientConfig,
    execution_mode: ExecutionMode,
    parallelism: Option<u32>,
    max_parallelism: Option<u32>,
    #[serde(with = "duration_ms")]
    checkpoint_interval: Duration,
    enable_checkpoint: bool,
    enable_operator_chaining: bool,
    local_state_uri: Url,
    restart_strategy: Option<RestartStrategy>,
    streams: BTreeMap<String, StreamConfig>,
}

impl AppConfiguration {
    pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_millis(10_000);
    pub const DEFAULT_LOCAL_STATE_URI: &'static str = "file:///tmp/stream-job-state";
    pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(10_000);

    pub fn new(client_config: ClientConfig) -> Result<Self> {
        Ok(Self {
            client_config,
            execution_mode: ExecutionMode::default(),
            parallelism: None,
            max_parallelism: None,
            checkpoint_interval: Self::DEFAULT_CHECKPOINT_INTERVAL,
            enable_checkpoint: true,
            enable_operator_chaining: true,
            local_state_uri: parse_state_uri(Self::DEFAULT_LOCAL_STATE_URI)?,
            restart_strategy: None,
            streams: BTreeMap::new(),
        })
    }

    /// Builds the configuration from parameters, adding one stream per entry of
    /// `stream_prefixes` (for example `input` reads `input-stream`, `input-startAtTail`, ...).
    pub fn from_params(params: &Params, stream_prefixes: &[&str]) -> Result<Self> {
        let client_config = ClientConfig::new(
            params.get_or("controller", ClientConfig::DEFAULT_CONTROLLER_URI),
            params.get_or("scope", ClientConfig::DEFAULT_SCOPE),
        )?;

        let mut config = Self::new(client_config)?;
        config.execution_mode = params.get_parsed_or("mode", ExecutionMode::default())?;
        config.parallelism = params.get_parsed("parallelism")?;
        config.max_parallelism = params.get_parsed("maxParallelism")?;
        config.checkpoint_interval = Duration::from_millis(
            params.get_parsed_or("checkpointIntervalMs", Self::DEFAULT_CHECKPOINT_INTERVAL.as_millis() as u64)?,
        );
        config.enable_checkpoint = params.get_bool("enableCheckpoint", true)?;
        config.enable_operator_chaining = params.get_bool("enableOperatorChaining", true)?;
        if let Some(uri) = params.get("localStateUri") {
            config.local_state_uri = parse_state_uri(uri)?;
        }
        if let Some(attempts) = params.get_parsed::<u32>("restartAttempts")? {
            let delay = params.get_parsed_or("restartDelayMs", Self::DEFAULT_RESTART_DELAY.as_millis() as u64)?;
            config.restart_strategy = Some(RestartStrategy::FixedDelay {
                attempts,
                delay: Duration::from_millis(delay),
            });
        }

        for prefix in stream_prefixes {
            let stream_config = StreamConfig::from_params(params, prefix, &config.client_config)?;
            config.streams.insert(prefix.to_string(), stream_config);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_execution_mode(mut self, execution_mode: ExecutionMode) -> Self {
        self.execution_mode = execution_mode;
        self
    }

    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: u32) -> Self {
        self.max_parallelism = Some(max_parallelism);
        self
    }

    pub fn with_checkpointing(mut self, enable_checkpoint: bool, interval: Duration) -> Self {
        self.enable_checkpoint = enable_checkpoint;
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_operator_chaining(mut self, enable_operator_chaining: bool) -> Self {
        self.enable_operator_chaining = enable_operator_chaining;
        self
    }

    pub fn with_local_state_uri(mut self, local_state_uri: Url) -> Self {
        self.local_state_uri = local_state_uri;
        self
    }

    pub fn with_restart_strategy(mut self, restart_strategy: RestartStrategy) -> Self {
        self.restart_strategy = Some(restart_strategy);
        self
    }

    pub fn with_stream(mut self, name: impl Into<String>, stream_config: StreamConfig) -> Self {
        self.streams.insert(name.into(), stream_config);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallelism == Some(0) {
            return Err(config_err!("Parallelism must be at least 1"));
        }
        if let Some(max_parallelism) = self.max_parallelism {
            if max_parallelism == 0 {
                return Err(config_err!("Max parallelism must be at least 1"));
            }
            if self.parallelism.is_some_and(|parallelism| parallelism > max_parallelism) {
                return Err(config_err!("Parallelism {:?} exceeds max parallelism {}", self.parallelism, max_parallelism));
            }
        }
        if self.enable_checkpoint && self.checkpoint_interval.is_zero() {
            return Err(config_err!("Checkpoint interval must be positive when checkpointing is enabled"));
        }
        for stream_config in self.streams.values() {
            stream_config.validate()?;
        }
        Ok(())
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    pub fn parallelism(&self) -> Option<u32> {
        self.parallelism
    }

    pub fn max_parallelism(&self) -> Option<u32> {
        self.max_parallelism
    }

    pub fn checkpoint_interval(&self) -> Duration {
        self.checkpoint_interval
    }

    pub fn is_enable_checkpoint(&self) -> bool {
        self.enable_checkpoint
    }

    pub fn is_enable_operator_chaining(&self) -> bool {
        self.enable_operator_chaining
    }

    pub fn local_state_uri(&self) -> &Url {
        &self.local_state_uri
    }

    pub fn restart_strategy(&self) -> Option<&RestartStrategy> {
        self.restart_strategy.as_ref()
    }

    pub fn stream_config(&self, name: &str) -> Option<&StreamConfig> {
        self.streams.get(name)
    }

    pub fn streams(&self) -> impl Iterator<Item = (&str, &StreamConfig)> {
        self.streams.iter().map(|(name, config)| (name.as_str(), config))
    }
}

fn parse_state_uri(uri: &str) -> Result<Url> {
    let parsed = Url::parse(uri).map_err(|e| config_err!("Invalid state URI {:?}: {}", uri, e))?;
    if parsed.cannot_be_a_base() {
        return Err(config_err!("State URI {:?} must name a directory", uri));
    }
    Ok(parsed)
}
