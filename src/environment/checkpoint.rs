use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::serde_serialization::{duration_ms, option_duration_ms};

/// Checkpoint scheduling handed to the engine. Checkpointing is off until an interval is set,
/// and checkpoints are always exactly-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(with = "option_duration_ms")]
    interval: Option<Duration>,
    #[serde(with = "duration_ms")]
    min_pause_between_checkpoints: Duration,
    #[serde(with = "duration_ms")]
    checkpoint_timeout: Duration,
    fail_on_checkpointing_errors: bool,
}

impl CheckpointConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

    pub fn is_checkpointing_enabled(&self) -> bool {
        self.interval.is_some()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn min_pause_between_checkpoints(&self) -> Duration {
        self.min_pause_between_checkpoints
    }

    pub fn checkpoint_timeout(&self) -> Duration {
        self.checkpoint_timeout
    }

    pub fn fail_on_checkpointing_errors(&self) -> bool {
        self.fail_on_checkpointing_errors
    }

    pub(crate) fn enable(&mut self, interval: Duration) {
        self.interval = Some(interval);
    }

    pub fn set_min_pause_between_checkpoints(&mut self, pause: Duration) {
        self.min_pause_between_checkpoints = pause;
    }

    pub fn set_checkpoint_timeout(&mut self, timeout: Duration) {
        self.checkpoint_timeout = timeout;
    }

    pub fn set_fail_on_checkpointing_errors(&mut self, fail: bool) {
        self.fail_on_checkpointing_errors = fail;
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: None,
            min_pause_between_checkpoints: Duration::ZERO,
            checkpoint_timeout: Self::DEFAULT_TIMEOUT,
            fail_on_checkpointing_errors: true,
        }
    }
}
