//! Crate-wide error types.
//!
//! Per-component errors convert into [`RrmError`] at the point where a
//! worker thread or async task would otherwise let an error escape —
//! no error type is allowed to cross that boundary unconverted.

use thiserror::Error;

/// Top-level error surfaced to the process entry point and the REST layer.
#[derive(Debug, Error)]
pub enum RrmError {
    /// Transient I/O failure: HTTP timeout, Kafka poll error. The caller
    /// should retry on the next tick/record; no state changed.
    #[error("transient I/O failure: {0}")]
    Transient(String),

    /// A config value was invalid; the default for that field was used.
    #[error("config violation for '{field}': {reason}, falling back to default")]
    ConfigViolation { field: String, reason: String },

    /// Startup-fatal: the process cannot proceed.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Modeler(#[from] ModelerError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from the southbound device-gateway collaborator.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("gateway returned status {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("failed to decode gateway response: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors raised by the ingest loop. These are always caught and
/// converted at the top of the worker's loop — see [`crate::modeler`].
#[derive(Debug, Error)]
pub enum ModelerError {
    #[error("malformed payload for serial {serial}: {reason}")]
    MalformedPayload { serial: String, reason: String },

    #[error("gateway backfill failed: {0}")]
    Backfill(#[from] GatewayError),

    #[error("ingest queue closed")]
    QueueClosed,
}

/// Errors raised by the scheduler dispatch path.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown algorithm id '{0}'")]
    UnknownAlgorithm(String),

    #[error("run for zone '{zone}' category {category:?} already in flight, dropped")]
    AlreadyRunning {
        zone: String,
        category: crate::algorithms::AlgorithmCategory,
    },

    #[error("invalid cron expression '{0}'")]
    InvalidCron(String),
}

/// Configuration loading/parsing errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {0}")]
    NotFound(String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

pub type RrmResult<T> = Result<T, RrmError>;
