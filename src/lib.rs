//! # lamco-backdrop
//!
//! Camera capture with virtual background, blur and color filters for Rust.
//!
//! This crate provides a unified interface to the lamco backdrop libraries:
//!
//! - **[`sdk`]** - Runtime bindings for the virtual background SDK and the thread-safe `VideoFilter`
//! - **[`capture`]** - Camera capture pipeline with live reconfiguration and processing metrics
//!
//! # Features
//!
//! ```toml
//! # Everything except the V4L2 backend (default)
//! lamco-backdrop = "0.1"
//!
//! # Filter facade only, bring your own frames
//! lamco-backdrop = { version = "0.1", default-features = false, features = ["sdk"] }
//!
//! # All features including sub-crate features (V4L2 cameras)
//! lamco-backdrop = { version = "0.1", features = ["full"] }
//! ```
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `sdk` | Yes | SDK loader and `VideoFilter` |
//! | `capture` | Yes | Capture pipeline (implies `sdk`) |
//! | `full` | No | All features from all sub-crates |
//!
//! # Quick Start
//!
//! ## Filtering Frames You Already Have
//!
//! ```rust,no_run
//! use lamco_backdrop::prelude::*;
//!
//! let filter = VideoFilter::new();
//! filter.enable_replacement()?;
//! filter.set_background("background.jpg")?;
//!
//! let frame = Image::new(1280, 720, PixelFormat::Bgra32);
//! let output = filter.replace_bg(&frame);
//! # Ok::<(), FilterError>(())
//! ```
//!
//! ## Camera to Filtered Frames
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lamco_backdrop::prelude::*;
//!
//! let config = PipelineConfig::default();
//! let provider = Arc::new(lamco_backdrop::capture::V4l2Provider::from_config(&config));
//! let pipeline = CapturePipeline::new(config, provider, Arc::new(VideoFilter::new()))?;
//!
//! FilterProfile { blur: true, replacement: false, ..Default::default() }
//!     .apply(&pipeline, pipeline.provider())?;
//!
//! let mut frames = pipeline.frame_receiver();
//! pipeline.start()?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        lamco-backdrop                           │
//! ├───────────────────────────────┬─────────────────────────────────┤
//! │          lamco-capture        │          lamco-vbsdk            │
//! │                               │                                 │
//! │  CapturePipeline              │  VideoFilter                    │
//! │  FrameConverter               │  SdkLibrary                     │
//! │  Metrics / FilterProfile      │  engine traits                  │
//! └───────────────┬───────────────┴────────────────┬────────────────┘
//!                 │                                │
//!                 ▼                                ▼
//!        V4L2 / custom sources        libtsvb (dynamically loaded)
//! ```
//!
//! # Platform Support
//!
//! - **Linux, macOS, Windows** - SDK bindings and the capture pipeline
//! - **V4L2 backend** - Linux only
//!
//! # Related Crates
//!
//! You can also use the individual crates directly:
//!
//! - [`lamco-vbsdk`](https://crates.io/crates/lamco-vbsdk) - SDK bindings only
//! - [`lamco-capture`](https://crates.io/crates/lamco-capture) - Capture pipeline

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// RE-EXPORTS
// =============================================================================

/// Virtual background SDK bindings.
///
/// - Runtime discovery and loading of the vendor library
/// - Owning handles over the SDK's interface objects
/// - [`VideoFilter`](lamco_vbsdk::VideoFilter), one lock around every engine call
///
/// See [`lamco_vbsdk`] documentation for details.
#[cfg(feature = "sdk")]
#[cfg_attr(docsrs, doc(cfg(feature = "sdk")))]
pub use lamco_vbsdk as sdk;

/// Camera capture pipeline.
///
/// - Worker thread with live source and resolution changes
/// - YUV, MJPEG and RGB to BGRA conversion
/// - One-second rolling processing metrics
///
/// See [`lamco_capture`] documentation for details.
#[cfg(feature = "capture")]
#[cfg_attr(docsrs, doc(cfg(feature = "capture")))]
pub use lamco_capture as capture;

// =============================================================================
// PRELUDE - Common types for convenience
// =============================================================================

/// Prelude module with commonly used types.
///
/// ```rust
/// use lamco_backdrop::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "sdk")]
    pub use lamco_vbsdk::{Backend, FilterError, Image, PixelFormat, Preset, VideoFilter};

    #[cfg(feature = "capture")]
    pub use lamco_capture::{
        CaptureError, CapturePipeline, FilterProfile, FrameSize, Metrics, PipelineConfig, SourceProvider,
        SourceSelector,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    #[cfg(feature = "sdk")]
    fn test_sdk_reexport() {
        assert_eq!(sdk::Preset::default(), sdk::Preset::Quality);
    }

    #[test]
    #[cfg(feature = "capture")]
    fn test_capture_reexport() {
        let config = capture::PipelineConfig::default();
        assert_eq!(config.initial_frame_size, capture::FrameSize::HD_720);
    }
}
