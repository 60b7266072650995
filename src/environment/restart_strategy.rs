use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::serde_serialization::duration_ms;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RestartStrategy {
    /// Fail the job on the first task failure.
    NoRestart,
    FixedDelay {
        attempts: u32,
        #[serde(with = "duration_ms")]
        delay: Duration,
    },
}
