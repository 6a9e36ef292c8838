//! Error types for capture operations

use lamco_vbsdk::FilterError;
use thiserror::Error;

/// Errors that can occur while capturing and converting frames
///
/// Read failures inside the worker loop never surface as errors to the
/// caller; they set the camera-error flag in [`crate::Metrics`] and the loop
/// retries.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The capture device or media file could not be opened
    #[error("Failed to open video source {source_name}: {reason}")]
    DeviceOpen {
        /// Index or path that was requested
        source_name: String,
        /// Backend error text
        reason: String,
    },

    /// No device matches the requested name
    #[error("No capture device named '{0}'")]
    DeviceNotFound(String),

    /// Reading a frame failed
    #[error("Failed to read frame: {0}")]
    Read(String),

    /// The raw frame could not be converted to BGRA
    #[error("Frame conversion failed: {0}")]
    Conversion(String),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The worker thread could not be spawned
    #[error("Failed to spawn capture worker: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// The video filter did not initialize
    #[error("Video filter is not available")]
    FilterUnavailable,

    /// A filter operation failed
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// I/O operation failed
    #[error("I/O operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;

impl CaptureError {
    /// Create a device open error
    #[cfg_attr(not(all(feature = "v4l2", target_os = "linux")), allow(dead_code))]
    pub(crate) fn device_open(source_name: impl ToString, reason: impl ToString) -> Self {
        Self::DeviceOpen {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a read error
    #[cfg_attr(not(all(feature = "v4l2", target_os = "linux")), allow(dead_code))]
    pub(crate) fn read(msg: impl Into<String>) -> Self {
        Self::Read(msg.into())
    }

    /// Create a conversion error
    pub(crate) fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CaptureError::device_open("/dev/video9", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "Failed to open video source /dev/video9: No such file or directory"
        );

        let err = CaptureError::conversion("odd width");
        assert_eq!(err.to_string(), "Frame conversion failed: odd width");
    }

    #[test]
    fn test_filter_error_is_transparent() {
        let err: CaptureError = FilterError::NotInitialized.into();
        assert_eq!(err.to_string(), "Video filter is not initialized");
    }

    #[test]
    fn test_error_helpers() {
        assert!(matches!(CaptureError::read("timeout"), CaptureError::Read(_)));
    }
}
