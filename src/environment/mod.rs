pub mod checkpoint;
pub mod execution_environment;
pub mod restart_strategy;
pub mod state_backend;

pub use checkpoint::CheckpointConfig;
pub use execution_environment::{BatchExecutionEnvironment, ExecutionMode, StreamExecutionEnvironment, TimeCharacteristic};
pub use restart_strategy::RestartStrategy;
pub use state_backend::StateBackend;
