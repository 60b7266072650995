pub mod admin;
pub mod in_memory;
pub mod local_catalog;
pub mod stream_cut;

pub use admin::{ClientConfig, ScalingPolicy, ScopedStream, StreamConfiguration, StreamInfo, StreamManager, StreamManagerFactory, StreamManagerGuard};
pub use in_memory::InMemoryStreamAdmin;
pub use local_catalog::LocalStreamCatalog;
pub use stream_cut::{ReaderBounds, StreamCut};
