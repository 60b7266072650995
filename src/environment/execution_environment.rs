use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config_err;
use crate::environment::checkpoint::CheckpointConfig;
use crate::environment::restart_strategy::RestartStrategy;
use crate::environment::state_backend::StateBackend;
use crate::error::BootstrapError;

/// Where the job will run. Local execution runs the whole job inside the current process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Local,
    #[default]
    Cluster,
}

impl FromStr for ExecutionMode {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(ExecutionMode::Local),
            "cluster" => Ok(ExecutionMode::Cluster),
            other => Err(config_err!("Unknown execution mode {:?}, expected local or cluster", other)),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Local => f.write_str("local"),
            ExecutionMode::Cluster => f.write_str("cluster"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeCharacteristic {
    #[default]
    ProcessingTime,
    IngestionTime,
    EventTime,
}

/// Settings for a streaming job, built up at startup and handed to the engine when the job is
/// submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamExecutionEnvironment {
    mode: ExecutionMode,
    /// `None` leaves the choice to the engine.
    parallelism: Option<u32>,
    max_parallelism: Option<u32>,
    operator_chaining: bool,
    checkpoint_config: CheckpointConfig,
    /// `None` means the engine's default, which keeps state in memory.
    state_backend: Option<StateBackend>,
    restart_strategy: Option<RestartStrategy>,
    time_characteristic: TimeCharacteristic,
}

impl StreamExecutionEnvironment {
    pub fn for_mode(mode: ExecutionMode) -> Self {
        let parallelism = match mode {
            ExecutionMode::Local => Some(local_parallelism()),
            ExecutionMode::Cluster => None,
        };
        Self {
            mode,
            parallelism,
            max_parallelism: None,
            operator_chaining: true,
            checkpoint_config: CheckpointConfig::default(),
            state_backend: None,
            restart_strategy: None,
            time_characteristic: TimeCharacteristic::default(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.mode == ExecutionMode::Local
    }

    pub fn parallelism(&self) -> Option<u32> {
        self.parallelism
    }

    pub fn set_parallelism(&mut self, parallelism: u32) {
        self.parallelism = Some(parallelism);
    }

    pub fn max_parallelism(&self) -> Option<u32> {
        self.max_parallelism
    }

    pub fn set_max_parallelism(&mut self, max_parallelism: u32) {
        self.max_parallelism = Some(max_parallelism);
    }

    pub fn is_chaining_enabled(&self) -> bool {
        self.operator_chaining
    }

    pub fn disable_operator_chaining(&mut self) {
        self.operator_chaining = false;
    }

    pub fn enable_checkpointing(&mut self, interval: Duration) {
        self.checkpoint_config.enable(interval);
    }

    pub fn checkpoint_config(&self) -> &CheckpointConfig {
        &self.checkpoint_config
    }

    pub fn checkpoint_config_mut(&mut self) -> &mut CheckpointConfig {
        &mut self.checkpoint_config
    }

    pub fn state_backend(&self) -> Option<&StateBackend> {
        self.state_backend.as_ref()
    }

    /// True when state would be held in memory, either explicitly or by engine default.
    pub fn uses_in_memory_state(&self) -> bool {
        self.state_backend.as_ref().is_none_or(StateBackend::is_in_memory)
    }

    pub fn set_state_backend(&mut self, state_backend: StateBackend) {
        self.state_backend = Some(state_backend);
    }

    pub fn restart_strategy(&self) -> Option<&RestartStrategy> {
        self.restart_strategy.as_ref()
    }

    pub fn set_restart_strategy(&mut self, restart_strategy: RestartStrategy) {
        self.restart_strategy = Some(restart_strategy);
    }

    pub fn time_characteristic(&self) -> TimeCharacteristic {
        self.time_characteristic
    }

    pub fn set_stream_time_characteristic(&mut self, time_characteristic: TimeCharacteristic) {
        self.time_characteristic = time_characteristic;
    }
}

/// Settings for a bounded (batch) job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchExecutionEnvironment {
    mode: ExecutionMode,
    parallelism: Option<u32>,
}

impl BatchExecutionEnvironment {
    pub fn for_mode(mode: ExecutionMode) -> Self {
        let parallelism = match mode {
            ExecutionMode::Local => Some(local_parallelism()),
            ExecutionMode::Cluster => None,
        };
        Self { mode, parallelism }
    }

    pub fn parallelism(&self) -> Option<u32> {
        self.parallelism
    }

    pub fn set_parallelism(&mut self, parallelism: u32) {
        self.parallelism = Some(parallelism);
    }
}

fn local_parallelism() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}
