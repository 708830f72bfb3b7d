//! Error types for pipeline construction and execution.
//!
//! A non-zero exit from a command is not an error: it travels back as the
//! chain's exit status. Errors here are the cases where the pipeline could
//! not be run as described.

use std::io;

use thiserror::Error;

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while launching or joining a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The shell for an external stage could not be started
    /// (missing shell, bad working directory, fd exhaustion).
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Waiting on a spawned process failed.
    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A filter's `process` callback returned an error.
    #[error("filter {stage} failed: {source}")]
    Filter {
        stage: String,
        #[source]
        source: io::Error,
    },

    /// A filter's worker task panicked before finishing.
    #[error("filter {stage} panicked")]
    WorkerPanicked { stage: String },

    /// A filter was lost by an earlier run whose worker never came back.
    #[error("filter {stage} is unavailable after an earlier failed run")]
    FilterUnavailable { stage: String },

    /// Wiring a stage's streams failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The engine configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),
}

/// Returned when parsing an encoding label that is not supported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown encoding: {0}")]
pub struct UnknownEncoding(pub String);
