//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.
//! Every variant is fatal: nothing in the crate retries.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for varjudge operations
#[derive(Error, Debug)]
pub enum JudgeError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// VCF errors (malformed records, missing columns)
    #[error("VCF error: {message}")]
    Vcf { message: String },

    /// Parse errors
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Configuration errors (invalid CLI arguments)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// File not found errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// A stage executable could not be resolved
    #[error("{stage} executable not found: {program}")]
    ExecutableNotFound { stage: String, program: PathBuf },

    /// A stage process could not be launched
    #[error("Failed to start {stage}: {source}")]
    StageSpawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    /// A stage process exited with a non-zero (or signal) status
    #[error("{stage} exited with {status}. Exiting...")]
    StageFailed { stage: String, status: String },

    /// Internal consistency faults (shape mismatches, worker panics)
    #[error("Internal consistency error: {message}")]
    Consistency { message: String },

    /// Merge-diff contract violations between original and model streams
    #[error("Stream order violation: {message}")]
    StreamOrder { message: String },
}

/// Type alias for Results using JudgeError
pub type Result<T> = std::result::Result<T, JudgeError>;

impl JudgeError {
    /// Create a VCF error with a message
    pub fn vcf(message: impl Into<String>) -> Self {
        Self::Vcf {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal consistency error
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Create a stream order error
    pub fn stream_order(message: impl Into<String>) -> Self {
        Self::StreamOrder {
            message: message.into(),
        }
    }

    /// Name of the failing stage, if this error came from the stage pipeline
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            Self::StageFailed { stage, .. }
            | Self::StageSpawn { stage, .. }
            | Self::ExecutableNotFound { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
