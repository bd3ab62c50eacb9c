/// Error types for the telemetry agent
pub mod error;

/// Persisted record types
pub mod records;

/// Configuration management
pub mod config;

/// Host telemetry samplers, network probes and host identity
pub mod host;

/// Persistence sink implementations
pub mod sink;

/// Background collector loops for metrics and login events
pub mod collectors;

// Re-export commonly used types
pub use error::{ConfigError, SamplerError, SinkError};
