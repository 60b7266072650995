use serde::{Deserialize, Serialize};
use url::Url;

/// Where the engine keeps operator state between checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateBackend {
    /// Heap state, snapshotted to the job manager. Only suitable for small state.
    Memory { max_state_size: usize },
    /// Heap state, snapshotted to files under `checkpoint_uri`.
    FileSystem { checkpoint_uri: Url, async_snapshots: bool },
}

impl StateBackend {
    pub const DEFAULT_MAX_MEMORY_STATE_SIZE: usize = 5 * 1024 * 1024;

    pub fn memory() -> Self {
        StateBackend::Memory { max_state_size: Self::DEFAULT_MAX_MEMORY_STATE_SIZE }
    }

    pub fn file_system(checkpoint_uri: Url, async_snapshots: bool) -> Self {
        StateBackend::FileSystem { checkpoint_uri, async_snapshots }
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self, StateBackend::Memory { .. })
    }
}
