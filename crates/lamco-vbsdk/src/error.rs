//! Error types for SDK operations
//!
//! Loading failures, engine rejections and resource load failures are all
//! reported through [`FilterError`]. Nothing here is fatal: an engine that
//! never initialized simply answers every call with
//! [`FilterError::NotInitialized`].

use std::path::PathBuf;

use thiserror::Error;

use crate::types::PipelineErrorCode;

/// Errors that can occur while loading or driving the engine
///
/// # Examples
///
/// ```no_run
/// use lamco_vbsdk::{FilterError, VideoFilter};
///
/// let filter = VideoFilter::new();
/// match filter.enable_blur() {
///     Ok(()) => println!("blur on"),
///     Err(FilterError::Rejected(code)) => eprintln!("engine refused: {code}"),
///     Err(FilterError::NotInitialized) => eprintln!("SDK is not available"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum FilterError {
    /// The vendor library could not be found or opened
    ///
    /// Every candidate location was tried; the message lists the last
    /// loader error.
    #[error("SDK library not found: {0}")]
    LibraryNotFound(String),

    /// The library loaded but does not export the factory entry point
    #[error("SDK symbol `{symbol}` missing: {reason}")]
    SymbolMissing {
        /// Symbol name that failed to resolve
        symbol: &'static str,
        /// Loader error text
        reason: String,
    },

    /// The factory, frame factory or pipeline could not be created
    #[error("Failed to create SDK object: {0}")]
    FactoryCreation(&'static str),

    /// The facade failed to initialize and cannot be used
    #[error("Video filter is not initialized")]
    NotInitialized,

    /// The engine refused the request
    ///
    /// Typically the feature is not supported by the current backend or
    /// preset combination.
    #[error("Engine rejected the request: {0}")]
    Rejected(PipelineErrorCode),

    /// An image or LUT file could not be loaded by the engine
    #[error("Failed to load image resource: {}", .0.display())]
    ImageLoad(PathBuf),

    /// The path cannot be passed to the engine (interior NUL or non UTF-8)
    #[error("Path cannot be passed to the engine: {}", .0.display())]
    InvalidPath(PathBuf),

    /// The frame is not in a format the engine accepts
    #[error("Unsupported frame format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, FilterError>;

impl FilterError {
    pub(crate) fn symbol_missing(symbol: &'static str, reason: impl ToString) -> Self {
        Self::SymbolMissing {
            symbol,
            reason: reason.to_string(),
        }
    }

    /// Whether the error comes from the engine refusing a configuration
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FilterError::NotInitialized;
        assert_eq!(err.to_string(), "Video filter is not initialized");

        let err = FilterError::ImageLoad(PathBuf::from("/tmp/missing.png"));
        assert_eq!(err.to_string(), "Failed to load image resource: /tmp/missing.png");
    }

    #[test]
    fn test_symbol_missing_helper() {
        let err = FilterError::symbol_missing("createSDKFactory", "undefined symbol");
        assert!(matches!(err, FilterError::SymbolMissing { symbol: "createSDKFactory", .. }));
        assert!(err.to_string().contains("undefined symbol"));
    }

    #[test]
    fn test_is_rejection() {
        assert!(FilterError::Rejected(PipelineErrorCode::NoFeaturesEnabled).is_rejection());
        assert!(!FilterError::NotInitialized.is_rejection());
    }
}
