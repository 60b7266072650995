use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::{AppConfiguration, StreamConfig};
use crate::environment::{
    BatchExecutionEnvironment, RestartStrategy, StateBackend, StreamExecutionEnvironment, TimeCharacteristic,
};
use crate::error::Result;
use crate::stream::admin::{validate_name, ScopedStream, StreamConfiguration, StreamInfo, StreamManagerFactory, StreamManagerGuard};
use crate::stream::stream_cut::{ReaderBounds, StreamCut};

/// Startup steps shared by streaming jobs: provisioning streams, pinning reader positions and
/// preparing the execution environment.
///
/// Each admin operation opens its own connection and closes it before returning, whether or not
/// the operation succeeded.
pub struct JobBootstrap {
    config: AppConfiguration,
    admin: Arc<dyn StreamManagerFactory>,
}

impl JobBootstrap {
    pub fn new(config: AppConfiguration, admin: Arc<dyn StreamManagerFactory>) -> Self {
        Self { config, admin }
    }

    pub fn config(&self) -> &AppConfiguration {
        &self.config
    }

    async fn stream_manager(&self) -> Result<StreamManagerGuard> {
        StreamManagerGuard::open(self.admin.as_ref(), self.config.client_config()).await
    }

    pub async fn ensure_scope_exists(&self, scope: &str) -> Result<()> {
        validate_name("scope", scope)?;
        let manager = self.stream_manager().await?;
        if manager.create_scope(scope).await? {
            info!("Created scope {}", scope);
        }
        Ok(())
    }

    /// Creates the stream with its configured scaling policy. An existing stream is left exactly
    /// as it is, even if its configuration differs.
    pub async fn ensure_stream_exists(&self, stream_config: &StreamConfig) -> Result<()> {
        let manager = self.stream_manager().await?;
        let stream = stream_config.stream();
        let configuration = StreamConfiguration {
            scaling_policy: stream_config.scaling_policy(),
        };
        if manager.create_stream(&stream.scope, &stream.stream, &configuration).await? {
            info!("Created stream {} with {:?}", stream, configuration.scaling_policy);
        } else {
            debug!("Stream {} already exists", stream);
        }
        Ok(())
    }

    /// Current head and tail stream cuts.
    pub async fn get_stream_info(&self, stream: &ScopedStream) -> Result<StreamInfo> {
        let manager = self.stream_manager().await?;
        manager.get_stream_info(&stream.scope, &stream.stream).await
    }

    /// Turns the configured start into a concrete cut. `start_at_tail` wins over everything, then
    /// an unbounded start means the current head.
    pub async fn resolve_start_cut(&self, stream_config: &StreamConfig) -> Result<StreamCut> {
        let stream = stream_config.stream();
        let cut = if stream_config.is_start_at_tail() {
            self.get_stream_info(stream).await?.tail_cut
        } else {
            match stream_config.start_cut() {
                StreamCut::Unbounded | StreamCut::Head => self.get_stream_info(stream).await?.head_cut,
                StreamCut::Tail => self.get_stream_info(stream).await?.tail_cut,
                position @ StreamCut::Position(_) => position.clone(),
            }
        };
        debug!("Resolved start of {} to {}", stream, cut);
        Ok(cut)
    }

    /// For bounded reads (`end_at_tail`) returns the current tail. Otherwise returns the
    /// configured end, which stays unbounded when no end was given.
    pub async fn resolve_end_cut(&self, stream_config: &StreamConfig) -> Result<StreamCut> {
        let stream = stream_config.stream();
        let cut = if stream_config.is_end_at_tail() {
            self.get_stream_info(stream).await?.tail_cut
        } else {
            match stream_config.end_cut() {
                StreamCut::Head => self.get_stream_info(stream).await?.head_cut,
                StreamCut::Tail => self.get_stream_info(stream).await?.tail_cut,
                other => other.clone(),
            }
        };
        debug!("Resolved end of {} to {}", stream, cut);
        Ok(cut)
    }

    pub async fn resolve_reader_bounds(&self, stream_config: &StreamConfig) -> Result<ReaderBounds> {
        Ok(ReaderBounds {
            start: self.resolve_start_cut(stream_config).await?,
            end: self.resolve_end_cut(stream_config).await?,
        })
    }

    pub fn configure_execution_environment(&self) -> StreamExecutionEnvironment {
        let mut env = StreamExecutionEnvironment::for_mode(self.config.execution_mode());
        configure_stream_environment(&self.config, &mut env);
        env
    }

    pub fn configure_batch_environment(&self) -> BatchExecutionEnvironment {
        let mut env = BatchExecutionEnvironment::for_mode(self.config.execution_mode());
        if let Some(parallelism) = self.config.parallelism() {
            env.set_parallelism(parallelism);
        }
        info!("Parallelism={}", display_parallelism(env.parallelism()));
        env
    }
}

/// Applies the job configuration to an environment the engine handed out.
pub fn configure_stream_environment(config: &AppConfiguration, env: &mut StreamExecutionEnvironment) {
    if let Some(parallelism) = config.parallelism() {
        env.set_parallelism(parallelism);
    }
    if let Some(max_parallelism) = config.max_parallelism() {
        env.set_max_parallelism(max_parallelism);
    }
    if !config.is_enable_operator_chaining() {
        env.disable_operator_chaining();
    }
    if config.is_enable_checkpoint() {
        // The engine takes whole milliseconds
        let interval_ms = config.checkpoint_interval().as_millis() as u64;
        env.enable_checkpointing(Duration::from_millis(interval_ms));
        let checkpoint_config = env.checkpoint_config_mut();
        checkpoint_config.set_min_pause_between_checkpoints(Duration::from_millis(interval_ms / 2));
        checkpoint_config.set_checkpoint_timeout(Duration::from_millis(interval_ms.saturating_mul(2)));
        checkpoint_config.set_fail_on_checkpointing_errors(true);
    }
    info!(
        "Parallelism={}, MaxParallelism={}",
        display_parallelism(env.parallelism()),
        display_parallelism(env.max_parallelism()),
    );

    // In-memory state cannot hold large state
    if env.is_local() && env.uses_in_memory_state() {
        warn!("Using file system state backend at {} instead of in-memory state", config.local_state_uri());
        env.set_state_backend(StateBackend::file_system(config.local_state_uri().clone(), true));
    }

    // Stop immediately on any errors
    if env.is_local() {
        warn!("Using no-restart strategy for local execution");
        env.set_restart_strategy(RestartStrategy::NoRestart);
    } else if let Some(restart_strategy) = config.restart_strategy() {
        env.set_restart_strategy(restart_strategy.clone());
    }

    env.set_stream_time_characteristic(TimeCharacteristic::EventTime);
}

fn display_parallelism(parallelism: Option<u32>) -> String {
    parallelism.map_or_else(|| "default".to_string(), |p| p.to_string())
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::environment::ExecutionMode;
    use crate::error::BootstrapError;
    use crate::stream::admin::{ClientConfig, ScalingPolicy};
    use crate::storage::file_system::make_temp_dir;
    use crate::stream::in_memory::InMemoryStreamAdmin;
    use crate::stream::local_catalog::LocalStreamCatalog;

    fn app_config() -> AppConfiguration {
        AppConfiguration::new(ClientConfig::new("tcp://localhost:9090", "examples").unwrap()).unwrap()
    }

    fn words() -> ScopedStream {
        ScopedStream::new("examples", "words")
    }

    /// A bootstrap over an admin that already holds `examples/words` with head H0 and tail T0.
    async fn bootstrap_with_stream(config: AppConfiguration) -> Result<(JobBootstrap, InMemoryStreamAdmin)> {
        let admin = InMemoryStreamAdmin::new();
        let bootstrap = JobBootstrap::new(config, Arc::new(admin.clone()));
        bootstrap.ensure_scope_exists("examples").await?;
        bootstrap.ensure_stream_exists(&StreamConfig::new(words())).await?;
        admin.set_stream_cuts(&words(), StreamCut::position("H0")?, StreamCut::position("T0")?)?;
        Ok((bootstrap, admin))
    }

    #[tokio::test]
    async fn test_ensure_stream_exists_twice() -> Result<()> {
        let admin = InMemoryStreamAdmin::new();
        let bootstrap = JobBootstrap::new(app_config(), Arc::new(admin.clone()));
        bootstrap.ensure_scope_exists("examples").await?;

        let stream_config = StreamConfig::new(words()).with_scaling_policy(ScalingPolicy::Fixed { segments: 2 });
        bootstrap.ensure_stream_exists(&stream_config).await?;
        bootstrap.ensure_stream_exists(&stream_config).await?;

        assert_eq!(admin.stream_count(), 1);
        assert_eq!(admin.open_connections(), 0);
        assert_eq!(admin.total_connections(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_stream_keeps_its_policy() -> Result<()> {
        let (bootstrap, admin) = bootstrap_with_stream(app_config()).await?;
        let changed = StreamConfig::new(words()).with_scaling_policy(ScalingPolicy::Fixed { segments: 8 });
        bootstrap.ensure_stream_exists(&changed).await?;
        assert_eq!(admin.stream_configuration(&words()).map(|c| c.scaling_policy), Some(ScalingPolicy::default()));
        Ok(())
    }

    #[tokio::test]
    async fn test_connection_failure_surfaces() {
        let admin = InMemoryStreamAdmin::new();
        admin.set_reachable(false);
        let bootstrap = JobBootstrap::new(app_config(), Arc::new(admin));
        let result = bootstrap.ensure_stream_exists(&StreamConfig::new(words())).await;
        assert!(matches!(result, Err(BootstrapError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_connection_released_on_error() -> Result<()> {
        let admin = InMemoryStreamAdmin::new();
        let bootstrap = JobBootstrap::new(app_config(), Arc::new(admin.clone()));
        // Scope was never created
        let result = bootstrap.ensure_stream_exists(&StreamConfig::new(words())).await;
        assert!(matches!(result, Err(BootstrapError::Admin(_))));
        assert_eq!(admin.open_connections(), 0);

        let missing = bootstrap.get_stream_info(&words()).await;
        assert!(matches!(missing, Err(BootstrapError::Admin(_))));
        assert_eq!(admin.open_connections(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_scope_names_checked_before_connecting() -> Result<()> {
        let root = make_temp_dir("bootstrap_scope")?;
        let catalog_dir = root.path().join("catalog");
        let admin = InMemoryStreamAdmin::new();
        let local = JobBootstrap::new(app_config(), Arc::new(LocalStreamCatalog::open_dir(&catalog_dir)));
        let in_memory = JobBootstrap::new(app_config(), Arc::new(admin.clone()));

        for bootstrap in [&local, &in_memory] {
            let result = bootstrap.ensure_scope_exists("../../escaped").await;
            assert!(matches!(result, Err(BootstrapError::Admin(_))));
        }
        assert!(!root.path().join("escaped").exists());
        assert!(!catalog_dir.exists());
        assert_eq!(admin.total_connections(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unbounded_start_resolves_to_head() -> Result<()> {
        let (bootstrap, _admin) = bootstrap_with_stream(app_config()).await?;
        let stream_config = StreamConfig::new(words());
        assert_eq!(bootstrap.resolve_start_cut(&stream_config).await?, StreamCut::position("H0")?);
        Ok(())
    }

    #[tokio::test]
    async fn test_start_at_tail_wins() -> Result<()> {
        let (bootstrap, _admin) = bootstrap_with_stream(app_config()).await?;
        for configured in [StreamCut::Unbounded, StreamCut::Head, StreamCut::position("P7")?] {
            let stream_config = StreamConfig::new(words())
                .with_start_cut(configured)
                .with_start_at_tail(true);
            assert_eq!(bootstrap.resolve_start_cut(&stream_config).await?, StreamCut::position("T0")?);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_explicit_start_is_unchanged() -> Result<()> {
        let (bootstrap, admin) = bootstrap_with_stream(app_config()).await?;
        let connections = admin.total_connections();
        let stream_config = StreamConfig::new(words()).with_start_cut(StreamCut::position("0:42")?);
        assert_eq!(bootstrap.resolve_start_cut(&stream_config).await?, StreamCut::position("0:42")?);
        // No lookup needed
        assert_eq!(admin.total_connections(), connections);
        Ok(())
    }

    #[tokio::test]
    async fn test_symbolic_start_markers() -> Result<()> {
        let (bootstrap, _admin) = bootstrap_with_stream(app_config()).await?;
        let head = StreamConfig::new(words()).with_start_cut(StreamCut::Head);
        assert_eq!(bootstrap.resolve_start_cut(&head).await?, StreamCut::position("H0")?);
        let tail = StreamConfig::new(words()).with_start_cut(StreamCut::Tail);
        assert_eq!(bootstrap.resolve_start_cut(&tail).await?, StreamCut::position("T0")?);
        Ok(())
    }

    #[tokio::test]
    async fn test_end_cut_resolution() -> Result<()> {
        let (bootstrap, _admin) = bootstrap_with_stream(app_config()).await?;

        let unbounded = StreamConfig::new(words());
        assert_eq!(bootstrap.resolve_end_cut(&unbounded).await?, StreamCut::Unbounded);

        let bounded = StreamConfig::new(words()).with_end_at_tail(true);
        assert_eq!(bootstrap.resolve_end_cut(&bounded).await?, StreamCut::position("T0")?);

        let explicit_and_tail = StreamConfig::new(words())
            .with_end_cut(StreamCut::position("0:9")?)
            .with_end_at_tail(true);
        assert_eq!(bootstrap.resolve_end_cut(&explicit_and_tail).await?, StreamCut::position("T0")?);

        let explicit = StreamConfig::new(words()).with_end_cut(StreamCut::position("0:9")?);
        assert_eq!(bootstrap.resolve_end_cut(&explicit).await?, StreamCut::position("0:9")?);

        let head = StreamConfig::new(words())
            .with_end_cut(StreamCut::Head)
            .with_end_at_tail(false);
        assert_eq!(bootstrap.resolve_end_cut(&head).await?, StreamCut::position("H0")?);

        let tail = StreamConfig::new(words())
            .with_end_cut(StreamCut::Tail)
            .with_end_at_tail(false);
        assert_eq!(bootstrap.resolve_end_cut(&tail).await?, StreamCut::position("T0")?);
        Ok(())
    }

    #[tokio::test]
    async fn test_reader_bounds() -> Result<()> {
        let (bootstrap, _admin) = bootstrap_with_stream(app_config()).await?;
        let bounds = bootstrap.resolve_reader_bounds(&StreamConfig::new(words()).with_end_at_tail(true)).await?;
        assert_eq!(bounds, ReaderBounds { start: StreamCut::position("H0")?, end: StreamCut::position("T0")? });
        assert!(bounds.is_bounded());
        Ok(())
    }

    #[test]
    fn test_checkpoint_timing_derived_from_interval() {
        let config = app_config().with_checkpointing(true, Duration::from_millis(1000));
        let bootstrap = JobBootstrap::new(config, Arc::new(InMemoryStreamAdmin::new()));
        let env = bootstrap.configure_execution_environment();

        let checkpoint_config = env.checkpoint_config();
        assert_eq!(checkpoint_config.interval(), Some(Duration::from_millis(1000)));
        assert_eq!(checkpoint_config.min_pause_between_checkpoints(), Duration::from_millis(500));
        assert_eq!(checkpoint_config.checkpoint_timeout(), Duration::from_millis(2000));
        assert!(checkpoint_config.fail_on_checkpointing_errors());
        assert_eq!(env.time_characteristic(), TimeCharacteristic::EventTime);
    }

    #[test]
    fn test_checkpoint_timing_uses_whole_milliseconds() -> Result<()> {
        let config = app_config().with_checkpointing(true, Duration::from_micros(1_001_700));
        let bootstrap = JobBootstrap::new(config, Arc::new(InMemoryStreamAdmin::new()));
        let env = bootstrap.configure_execution_environment();

        let checkpoint_config = env.checkpoint_config();
        assert_eq!(checkpoint_config.interval(), Some(Duration::from_millis(1001)));
        assert_eq!(checkpoint_config.min_pause_between_checkpoints(), Duration::from_millis(500));
        assert_eq!(checkpoint_config.checkpoint_timeout(), Duration::from_millis(2002));

        // What the engine receives matches what the getters report
        let json = serde_json::to_value(&env)?;
        assert_eq!(json["checkpoint_config"]["interval"], 1001);
        assert_eq!(json["checkpoint_config"]["min_pause_between_checkpoints"], 500);
        assert_eq!(json["checkpoint_config"]["checkpoint_timeout"], 2002);
        Ok(())
    }

    #[test]
    fn test_checkpointing_disabled() {
        let config = app_config().with_checkpointing(false, Duration::from_millis(1000));
        let bootstrap = JobBootstrap::new(config, Arc::new(InMemoryStreamAdmin::new()));
        let env = bootstrap.configure_execution_environment();
        assert!(!env.checkpoint_config().is_checkpointing_enabled());
    }

    #[test]
    fn test_cluster_environment() {
        let config = app_config()
            .with_parallelism(6)
            .with_max_parallelism(64)
            .with_operator_chaining(false)
            .with_restart_strategy(RestartStrategy::FixedDelay { attempts: 3, delay: Duration::from_secs(5) });
        let bootstrap = JobBootstrap::new(config, Arc::new(InMemoryStreamAdmin::new()));
        let env = bootstrap.configure_execution_environment();

        assert_eq!(env.parallelism(), Some(6));
        assert_eq!(env.max_parallelism(), Some(64));
        assert!(!env.is_chaining_enabled());
        // Cluster execution keeps the engine's state backend
        assert_eq!(env.state_backend(), None);
        assert_eq!(env.restart_strategy(), Some(&RestartStrategy::FixedDelay { attempts: 3, delay: Duration::from_secs(5) }));
    }

    #[test]
    fn test_local_environment_overrides() {
        let config = app_config()
            .with_execution_mode(ExecutionMode::Local)
            .with_restart_strategy(RestartStrategy::FixedDelay { attempts: 3, delay: Duration::from_secs(5) });
        let bootstrap = JobBootstrap::new(config, Arc::new(InMemoryStreamAdmin::new()));
        let env = bootstrap.configure_execution_environment();

        assert_eq!(
            env.state_backend(),
            Some(&StateBackend::file_system(Url::parse("file:///tmp/stream-job-state").unwrap(), true)),
        );
        assert_eq!(env.restart_strategy(), Some(&RestartStrategy::NoRestart));
        assert!(env.parallelism().is_some());
    }

    #[test]
    fn test_local_state_uri_override() {
        let uri = Url::parse("file:///var/lib/jobs/words-state").unwrap();
        let config = app_config()
            .with_execution_mode(ExecutionMode::Local)
            .with_local_state_uri(uri.clone());
        let bootstrap = JobBootstrap::new(config, Arc::new(InMemoryStreamAdmin::new()));
        let env = bootstrap.configure_execution_environment();
        assert_eq!(env.state_backend(), Some(&StateBackend::file_system(uri, true)));
    }

    #[test]
    fn test_local_environment_keeps_durable_backend() {
        let config = app_config().with_execution_mode(ExecutionMode::Local);
        let durable = StateBackend::file_system(Url::parse("file:///data/state").unwrap(), false);
        let mut env = StreamExecutionEnvironment::for_mode(ExecutionMode::Local);
        env.set_state_backend(durable.clone());

        configure_stream_environment(&config, &mut env);
        assert_eq!(env.state_backend(), Some(&durable));

        let mut in_memory = StreamExecutionEnvironment::for_mode(ExecutionMode::Local);
        in_memory.set_state_backend(StateBackend::memory());
        configure_stream_environment(&config, &mut in_memory);
        assert!(!in_memory.uses_in_memory_state());
    }

    #[test]
    fn test_batch_environment() {
        let cluster = JobBootstrap::new(app_config(), Arc::new(InMemoryStreamAdmin::new()));
        assert_eq!(cluster.configure_batch_environment().parallelism(), None);

        let configured = JobBootstrap::new(app_config().with_parallelism(2), Arc::new(InMemoryStreamAdmin::new()));
        assert_eq!(configured.configure_batch_environment().parallelism(), Some(2));
    }
}
