use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;
use serde::Serialize;

use stream_job_bootstrap::config::{AppConfiguration, Params};
use stream_job_bootstrap::environment::StreamExecutionEnvironment;
use stream_job_bootstrap::stream::{InMemoryStreamAdmin, LocalStreamCatalog, ReaderBounds, ScopedStream, StreamManagerFactory};
use stream_job_bootstrap::JobBootstrap;

/// Provisions the streams of a job, pins their reader positions and prints the resulting job
/// plan as JSON.
#[derive(Parser, Debug)]
#[command(name = "stream-job-bootstrap")]
struct Args {
    /// Directory of a local stream catalog. Without it streams only exist for this run.
    #[arg(long, env = "STREAM_JOB_CATALOG_DIR")]
    catalog_dir: Option<PathBuf>,

    /// JSON object of job parameters. Parameters given after `--` override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stream roles to provision, each read from `<role>-stream`, `<role>-startAtTail`, ...
    #[arg(long = "stream-prefix", value_delimiter = ',', default_value = "input")]
    stream_prefixes: Vec<String>,

    /// Job parameters, e.g. `-- --scope sensors --input-stream raw --parallelism 4`
    #[arg(last = true)]
    params: Vec<String>,
}

#[derive(Serialize)]
struct StreamPlan {
    stream: ScopedStream,
    bounds: ReaderBounds,
}

#[derive(Serialize)]
struct JobPlan {
    configuration: AppConfiguration,
    streams: BTreeMap<String, StreamPlan>,
    environment: StreamExecutionEnvironment,
}

fn setup_logging() {
    let crate_level = env::var("STREAM_JOB_LOG_LEVEL").unwrap_or("INFO".to_string());
    let rust_log_env = env::var("RUST_LOG").unwrap_or("WARN".to_string());

    let combined_env = format!("{rust_log_env},stream_job_bootstrap={crate_level}");

    env_logger::Builder::new()
        .parse_filters(&combined_env)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    let args = Args::parse();

    let mut params = match &args.config {
        Some(path) => Params::from_json_file(path)?,
        None => Params::new(),
    };
    params = params.merge(Params::from_args(&args.params)?);

    let prefixes = args.stream_prefixes.iter().map(String::as_str).collect::<Vec<_>>();
    let config = AppConfiguration::from_params(&params, &prefixes)?;

    let admin: Arc<dyn StreamManagerFactory> = match &args.catalog_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await
                .with_context(|| format!("Failed to create catalog directory {}", dir.display()))?;
            Arc::new(LocalStreamCatalog::open_dir(dir))
        },
        None => Arc::new(InMemoryStreamAdmin::new()),
    };
    let bootstrap = JobBootstrap::new(config, admin);

    let scopes = bootstrap.config().streams()
        .map(|(_, stream_config)| stream_config.stream().scope.clone())
        .collect::<BTreeSet<_>>();
    for scope in &scopes {
        bootstrap.ensure_scope_exists(scope).await?;
    }

    let mut streams = BTreeMap::new();
    for (role, stream_config) in bootstrap.config().streams() {
        bootstrap.ensure_stream_exists(stream_config).await?;
        let bounds = bootstrap.resolve_reader_bounds(stream_config).await
            .with_context(|| format!("Failed to resolve reader bounds for {}", stream_config.stream()))?;
        info!("{} reads {} from {} to {}", role, stream_config.stream(), bounds.start, bounds.end);
        streams.insert(role.to_string(), StreamPlan {
            stream: stream_config.stream().clone(),
            bounds,
        });
    }

    let environment = bootstrap.configure_execution_environment();
    let plan = JobPlan {
        configuration: bootstrap.config().clone(),
        streams,
        environment,
    };
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
