//! Error handling for the scenario diff toolkit
//!
//! Every fallible operation in the crate returns [`DiffResult`]. Variants
//! carry enough context to tell the caller which step failed without
//! leaking the raw payload being processed.

use thiserror::Error;

/// Main error type for diff computation, signing and export
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsafe export filename: {filename:?}")]
    UnsafeFilename { filename: String },

    #[error("Cryptographic operation failed: {message}")]
    Crypto { message: String },

    #[error("Signature verification failed: {message}")]
    Signature { message: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Resource not found: {resource} - {id}")]
    NotFound { resource: String, id: String },

    #[error("Export failed for {filename}: {message}")]
    ExportFailed { filename: String, message: String },

    #[error("Mutex lock failed: {resource}")]
    MutexPoisoned { resource: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result alias used throughout the crate
pub type DiffResult<T> = Result<T, DiffError>;

impl DiffError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create an unsafe filename error
    pub fn unsafe_filename(filename: impl Into<String>) -> Self {
        Self::UnsafeFilename {
            filename: filename.into(),
        }
    }

    /// Create a cryptographic error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a signature verification error
    pub fn signature(message: impl Into<String>) -> Self {
        Self::Signature {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create an export failure
    pub fn export_failed(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExportFailed {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Lock a mutex without panicking on poison
pub trait SafeLock<T: ?Sized> {
    fn safe_lock(&self, resource: &str) -> DiffResult<std::sync::MutexGuard<'_, T>>;
}

impl<T: ?Sized> SafeLock<T> for std::sync::Mutex<T> {
    fn safe_lock(&self, resource: &str) -> DiffResult<std::sync::MutexGuard<'_, T>> {
        self.lock().map_err(|_| DiffError::MutexPoisoned {
            resource: resource.to_string(),
        })
    }
}

impl From<serde_json::Error> for DiffError {
    fn from(err: serde_json::Error) -> Self {
        DiffError::serialization("json_operation", err)
    }
}

impl From<std::io::Error> for DiffError {
    fn from(err: std::io::Error) -> Self {
        DiffError::io("io_operation", err)
    }
}

impl From<figment::Error> for DiffError {
    fn from(err: figment::Error) -> Self {
        DiffError::config(err.to_string())
    }
}

impl From<toml::de::Error> for DiffError {
    fn from(err: toml::de::Error) -> Self {
        DiffError::validation("toml", err.to_string())
    }
}

impl From<base64::DecodeError> for DiffError {
    fn from(err: base64::DecodeError) -> Self {
        DiffError::crypto(format!("base64 decode: {err}"))
    }
}

impl From<ed25519_dalek::SignatureError> for DiffError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        DiffError::signature(err.to_string())
    }
}
