//! Error types for OTA upload operations

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for upload operations
pub type Result<T> = std::result::Result<T, UploadError>;

/// Errors detected before any connection is attempted
///
/// A `ConfigError` always means nothing was sent to the device.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Upload target is missing or blank
    #[error("Upload target is not defined. Pass a device address or set OTA_UPLOAD_PORT")]
    EmptyTarget,

    /// Upload target could not be parsed
    #[error("Invalid upload target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// Upload target uses a scheme other than http/https
    #[error("Unsupported scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    /// Firmware image does not exist
    #[error("Firmware image not found: {}", .0.display())]
    FirmwareNotFound(PathBuf),

    /// Firmware image exists but could not be read
    #[error("Failed to read firmware image {}: {source}", path.display())]
    FirmwareUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Trust store could not be assembled
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    IoError(String),

    /// Configuration file could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration could not be serialized
    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Errors that end an upload attempt as a failure
#[derive(Error, Debug)]
pub enum UploadError {
    /// TCP connection could not be established
    #[error("Connection failed: {0}")]
    Connect(String),

    /// TLS handshake failed
    #[error("TLS handshake failed: {0}")]
    Tls(String),

    /// Request head or body could not be written
    #[error("Send failed: {0}")]
    Send(#[source] std::io::Error),

    /// A time budget elapsed outside the response phase
    #[error("Timed out during {phase}")]
    Timeout { phase: &'static str },

    /// Device replied with something that is not an HTTP response
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Unclassified IO error while waiting for the response
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Device replied with status >= 400
    #[error("Device returned {status} {reason}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },
}

impl UploadError {
    /// Create a status error from a response
    pub fn status(status: u16, reason: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            reason: reason.into(),
            body: body.into(),
        }
    }

    /// HTTP status code, if the device answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code() {
        let err = UploadError::status(500, "Internal Server Error", "Update failed");
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(err.to_string(), "Device returned 500 Internal Server Error");

        let err = UploadError::Timeout { phase: "connect" };
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::FirmwareNotFound(PathBuf::from("/tmp/missing.bin"));
        assert_eq!(err.to_string(), "Firmware image not found: /tmp/missing.bin");

        let err = ConfigError::UnsupportedScheme("ftp".into());
        assert!(err.to_string().contains("ftp"));
    }
}
