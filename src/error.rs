use thiserror::Error;

/// Errors that can occur inside the host telemetry samplers
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Failed to parse telemetry source: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur when writing a record to the database
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] postgres::Error),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
