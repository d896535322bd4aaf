//! Error types for the transformation service.
//!
//! The hierarchy mirrors how far a failure reaches:
//!
//! - [`ConfigError`] - configuration loading and consistency errors (startup)
//! - [`PathError`] - no route between two systems in a graph
//! - [`ElevationError`] - elevation store failures (edge-fatal)
//! - [`TransformError`] - request-fatal errors returned for a whole batch
//! - [`PointError`] - point-local errors recorded on a single row
//! - [`PointFileError`] - point file reading and writing (CLI)
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading the transformation configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid JSON or does not match the model.
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document violates the embedded JSON schema.
    #[error("Config does not match schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    /// The document is well-formed but internally inconsistent.
    #[error("Inconsistent config: {}", .0.join("; "))]
    Inconsistent(Vec<String>),
}

// =============================================================================
// Path Errors
// =============================================================================

/// Errors from the path resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// No route between two systems.
    #[error("No transformation path from '{from}' to '{to}'")]
    PathNotFound { from: String, to: String },
}

// =============================================================================
// Elevation Store Errors
// =============================================================================

/// Errors from an elevation-value provider.
#[derive(Debug, Clone, Error)]
pub enum ElevationError {
    /// The backing store failed (open, query, decode).
    #[error("Elevation store error: {0}")]
    Storage(String),

    /// The lookup did not finish in time.
    #[error("Elevation lookup timed out after {0:?}")]
    Timeout(Duration),

    /// No store is registered for the requested grid source.
    #[error("Unknown elevation source: {0}")]
    UnknownSource(String),
}

// =============================================================================
// Request Errors
// =============================================================================

/// Which family of systems an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemKind {
    Cs,
    Hs,
}

impl fmt::Display for SystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemKind::Cs => write!(f, "CS"),
            SystemKind::Hs => write!(f, "HS"),
        }
    }
}

/// Errors that abort a whole transformation request.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    /// Unknown or unregistered system id.
    #[error("Invalid {role} {kind}: '{id}'")]
    InvalidSystem {
        kind: SystemKind,
        role: &'static str,
        id: String,
    },

    /// No route between the requested systems.
    #[error(transparent)]
    PathNotFound(#[from] PathError),

    /// A resolved hop has no configured edge data.
    #[error("Missing transformation parameters from '{from}' to '{to}'")]
    MissingEdge { from: String, to: String },

    /// Unknown height method type or method name.
    #[error("Unsupported height transformation: {0}")]
    Unsupported(String),

    /// Elevation store failure while processing a grid edge.
    #[error(transparent)]
    Elevation(#[from] ElevationError),

    /// The session already ran.
    #[error("Transformation session already finished")]
    SessionFinished,
}

impl TransformError {
    /// Whether the same request may succeed when retried unchanged.
    pub fn is_retriable(&self) -> bool {
        matches!(self, TransformError::Elevation(_))
    }
}

// =============================================================================
// Point Errors
// =============================================================================

/// Errors local to a single point; recorded on its row, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointError {
    /// Outside every zone of a CS edge.
    #[error("point out of transformation bounds")]
    OutOfBounds,

    /// Grid cell with missing corner values.
    #[error("point out of height model bounds")]
    OutOfGrid,

    /// Numeric field could not be parsed.
    #[error("Error parsing '{0}' as number")]
    Parse(String),
}

// =============================================================================
// Point File Errors
// =============================================================================

/// Errors reading or writing point files.
#[derive(Debug, Error)]
pub enum PointFileError {
    #[error("Point file IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A line could not be split into fields.
    #[error("Line {line}: {message}")]
    Line { line: usize, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unsupported encoding: {0}")]
    Encoding(String),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Transformation failed for the whole request.
    #[error("{0}")]
    Transform(#[from] TransformError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unsupported request content type.
    #[error("Content-Type must be application/json")]
    UnsupportedMediaType,

    /// Failed to bind or serve.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for path resolution.
pub type PathResult<T> = Result<T, PathError>;

/// Result type for elevation lookups.
pub type ElevationResult<T> = Result<T, ElevationError>;

/// Result type for transformation requests.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for point file operations.
pub type PointFileResult<T> = Result<T, PointFileError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
