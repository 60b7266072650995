pub mod serde_serialization;
