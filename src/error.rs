//! Error types for the package-to-container bridge.

use std::path::PathBuf;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the bridge layer.
///
/// Every failure kind maps to a distinct non-zero exit code class via
/// [`Error::exit_code`], so callers (and scripts wrapping the CLI) can
/// distinguish "not installed" from "engine blew up" without parsing
/// messages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Package Errors
    // =========================================================================
    /// Package archive does not resolve to a readable file.
    #[error("package archive not found: {path}")]
    ArchiveNotFound { path: PathBuf },

    /// Archive exists but its descriptor is unreadable or invalid.
    #[error("malformed package '{path}': {reason}")]
    MalformedPackage { path: PathBuf, reason: String },

    /// No compatible base image for the package's declared architecture.
    #[error("no compatible base image for architecture '{arch}'")]
    UnsupportedBase { arch: String },

    // =========================================================================
    // Integration Errors
    // =========================================================================
    /// A requested host integration cannot be satisfied on this host.
    #[error("host resource unavailable for '{category}': {reason}")]
    ResourceUnavailable { category: String, reason: String },

    // =========================================================================
    // Registry Errors
    // =========================================================================
    /// Program name collision on create.
    #[error("program already exists: '{0}' (remove it first)")]
    AlreadyExists(String),

    /// Operation on an unknown program name.
    #[error("program not installed: '{0}'")]
    NotInstalled(String),

    /// Remove attempted while the program is running.
    #[error("program '{0}' is running; stop it before removing")]
    InUse(String),

    // =========================================================================
    // External Engine Errors
    // =========================================================================
    /// The container engine reported a build/run error. The engine's own
    /// message is preserved verbatim.
    #[error("container engine failed during {operation}: {message}")]
    EngineFailure { operation: String, message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry or settings (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns the process exit code for this failure kind.
    ///
    /// Code assignments are a stable contract; new kinds get new codes.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::ArchiveNotFound { .. } => 2,
            Error::MalformedPackage { .. } => 3,
            Error::UnsupportedBase { .. } => 4,
            Error::ResourceUnavailable { .. } => 5,
            Error::AlreadyExists(_) => 6,
            Error::NotInstalled(_) => 7,
            Error::InUse(_) => 8,
            Error::EngineFailure { .. } => 9,
            Error::Io(_) | Error::Serialization(_) => 1,
        }
    }
}
