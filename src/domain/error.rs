//! Error types for mapweave.
//!
//! This module defines the centralized error type [`MapError`] and a type alias
//! [`Result`] used by every fallible construction or backend mutation path.
//! All errors are implemented using the `thiserror` crate.
//!
//! Interactive operations (listener removal, visibility toggling, unit switching)
//! never surface these errors to callers: map styles reload asynchronously, so
//! those paths log the failure and degrade to a no-op instead.

use thiserror::Error;

/// The main error type for mapweave operations.
///
/// # Examples
///
/// ```
/// use mapweave::MapError;
///
/// fn check_layer(id: &str) -> Result<(), MapError> {
///     Err(MapError::Backend(format!("unknown layer: {id}")))
/// }
///
/// assert!(check_layer("roads").is_err());
/// ```
#[derive(Debug, Error)]
pub enum MapError {
    /// The style document or a layer's metadata is malformed.
    ///
    /// Raised while parsing style JSON or classifying layer metadata. The
    /// string describes the offending layer or field.
    #[error("Style error: {0}")]
    Style(String),

    /// The backend refused a layer or source operation.
    ///
    /// Occurs when adding a duplicate layer/source id, removing something that
    /// is not present, or anchoring an insertion before an unknown layer.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Map options are invalid or could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem or I/O operation failed.
    ///
    /// Automatically converts from `std::io::Error` using the `#[from]` attribute.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for mapweave operations.
pub type Result<T> = std::result::Result<T, MapError>;
