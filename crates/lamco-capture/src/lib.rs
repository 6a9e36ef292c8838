//! # lamco-capture
//!
//! Camera capture pipeline feeding the virtual background filter.
//!
//! A [`CapturePipeline`] runs one worker thread that reads frames from a
//! [`VideoSource`], converts them to BGRA, runs them through a shared
//! [`lamco_vbsdk::VideoFilter`] and publishes each result on a
//! [`tokio::sync::watch`] channel. The source can be switched or resized at
//! any time from another thread; the worker picks the change up on its next
//! iteration.
//!
//! # Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `mjpeg` | Yes | Decode MJPEG camera frames with the `image` crate |
//! | `v4l2` | No | [`v4l2::V4l2Provider`], a Video4Linux2 camera backend (Linux) |
//! | `full` | No | All of the above |
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lamco_capture::{CapturePipeline, PipelineConfig, SourceProvider};
//! use lamco_vbsdk::VideoFilter;
//!
//! # fn camera_provider() -> Arc<dyn SourceProvider> { unimplemented!() }
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let filter = Arc::new(VideoFilter::new());
//! filter.enable_blur()?;
//!
//! let pipeline = CapturePipeline::new(PipelineConfig::default(), camera_provider(), filter)?;
//! let mut frames = pipeline.frame_receiver();
//! pipeline.start()?;
//!
//! while frames.changed().await.is_ok() {
//!     if let Some(frame) = frames.borrow_and_update().clone() {
//!         println!("{}x{} | {}", frame.width(), frame.height(), pipeline.metrics().status());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐  open/read   ┌─────────────────┐
//! │ SourceProvider│─────────────►│   VideoSource   │
//! └───────────────┘              └────────┬────────┘
//!                                         │ RawFrame
//!                                         ▼
//!                                ┌─────────────────┐
//!                                │ FrameConverter  │  YUYV/NV12/I420/MJPEG/RGB ─► BGRA
//!                                └────────┬────────┘
//!                                         │ Arc<Image>
//!                                         ▼
//!                                ┌─────────────────┐
//!                                │   VideoFilter   │──► Metrics (1 s window)
//!                                └────────┬────────┘
//!                                         ▼
//!                                  watch::Sender ──► observer
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod convert;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod profile;
pub mod source;
pub mod yuv;

#[cfg(all(feature = "v4l2", target_os = "linux"))]
#[cfg_attr(docsrs, doc(cfg(feature = "v4l2")))]
pub mod v4l2;

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use convert::FrameConverter;
pub use error::{CaptureError, Result};
pub use metrics::{FrameTiming, Metrics, MetricsSnapshot, MetricsStatus};
pub use pipeline::{CapturePipeline, FrameReceiver};
pub use profile::{ColorCorrectionMode, FilterProfile};
pub use source::{
    find_device_by_name, DeviceInfo, FrameSize, RawFrame, SourceFormat, SourceProvider, SourceSelector,
    SourceSettings, VideoSource,
};

#[cfg(all(feature = "v4l2", target_os = "linux"))]
pub use v4l2::V4l2Provider;
