//! ==============================================================================
//! error.rs - failure taxonomy for the measurement engine
//! ==============================================================================
//!
//! every variant is recoverable: the engine reports it and carries on with the
//! next eligible tick. only the startup glue in main.rs uses anyhow.
//!
//! ==============================================================================

use thiserror::Error;

/// Errors produced by the config store, the sampler and the uploader
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// No persisted config exists yet
    #[error("config not found")]
    ConfigNotFound,

    /// Persisted config exists but could not be parsed or failed validation
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Persisting the config failed; the previous value is still in place
    #[error("config write error: {0}")]
    ConfigWrite(String),

    /// A provisioned config value violates the field constraints
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The sample window closed without a single successful reading
    #[error("no samples collected in the sample window")]
    InsufficientSamples,

    /// Mean amplitude is zero, decibel value undefined
    #[error("invalid amplitude {0}: decibel value undefined")]
    InvalidAmplitude(u16),

    /// The blocking sampler task could not be joined
    #[error("sampler task failed: {0}")]
    Sampler(String),

    /// Could not reach the telemetry endpoint
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The telemetry endpoint answered but did not confirm the update
    #[error("upload rejected: {0}")]
    UploadRejected(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, MonitorError>;
