//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.
//!
//! The variants follow the failure classes of the build:
//! - `Format`: malformed block-offset table, wrong-sized register file,
//!   block without a chromosome token. Fatal, never retried.
//! - `Data`: unsupported record or genotype pair, sample-count mismatch.
//!   Fatal to the owning chromosome worker only.
//! - `Overflow`: an accumulated counter exceeds its pinned width.
//! - `Consistency`: a stored aggregate disagrees with its recomputation.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for snpbins operations
#[derive(Error, Debug)]
pub enum SnpBinsError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed binary or compressed input
    #[error("Format error: {message}")]
    Format { message: String },

    /// Record content the aggregation cannot handle
    #[error("Data error: {message}")]
    Data { message: String },

    /// Counter value does not fit the selected integer width
    #[error("Overflow error: {family} value {value} exceeds {max} (u{width})")]
    Overflow {
        family: String,
        value: u64,
        max: u64,
        width: u8,
    },

    /// Stored aggregate differs from the recomputed one
    #[error("Consistency error: {what}: stored {stored} != computed {computed}")]
    Consistency {
        what: String,
        stored: u64,
        computed: u64,
    },

    /// Configuration errors (invalid CLI arguments)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// File not found errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Metadata (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Parse errors
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Type alias for Results using SnpBinsError
pub type Result<T> = std::result::Result<T, SnpBinsError>;

impl SnpBinsError {
    /// Create a format error with a message
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create a data error
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Create an overflow error for a counter family
    pub fn overflow(family: impl Into<String>, value: u64, max: u64, width: u8) -> Self {
        Self::Overflow {
            family: family.into(),
            value,
            max,
            width,
        }
    }

    /// Create a consistency error carrying both values
    pub fn consistency(what: impl Into<String>, stored: u64, computed: u64) -> Self {
        Self::Consistency {
            what: what.into(),
            stored,
            computed,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
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

    /// True for errors that only invalidate the chromosome that raised them
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::Data { .. } | Self::Parse { .. })
    }
}
