//! # lamco-vbsdk
//!
//! Runtime bindings for the virtual background SDK and a thread-safe facade
//! over its processing pipeline.
//!
//! The SDK is a closed-source shared library exposing a C++ interface
//! hierarchy through a single exported function, `createSDKFactory`. This
//! crate loads it at runtime, wraps every object it hands out in an owning
//! handle, and exposes the whole thing through [`VideoFilter`].
//!
//! # Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `test-util` | No | [`fake::FakeSdk`], an in-process engine for tests and demos |
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use lamco_vbsdk::{Image, PixelFormat, VideoFilter};
//!
//! let filter = VideoFilter::new();
//! if let Some(err) = filter.init_error() {
//!     eprintln!("SDK unavailable: {err}");
//!     return;
//! }
//!
//! filter.enable_blur().expect("blur");
//! let frame = Image::new(1280, 720, PixelFormat::Bgra32);
//! if let Some(out) = filter.replace_bg(&frame) {
//!     println!("processed {}x{}", out.width(), out.height());
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      VideoFilter                         │
//! │        (one mutex around every engine call)              │
//! └───────────────┬──────────────────────────────────────────┘
//!                 │ engine traits
//!       ┌─────────┴──────────┐
//!       ▼                    ▼
//!  native::*            fake::FakeSdk
//!  (Owned<Vtable>)      (test-util)
//!       │
//!       ▼
//!  SdkLibrary ──► libtsvb.so / libtsvb.dylib / tsvb.dll
//! ```
//!
//! # Platform Support
//!
//! Linux, macOS and Windows on 64-bit targets.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod abi;
mod native;

pub mod engine;
pub mod error;
pub mod filter;
pub mod image;
pub mod loader;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod fake;

pub use engine::{
    EngineResult, EnginePipeline, Frame, FrameFactory, LockedFrameData, PipelineConfiguration, ReplacementController,
    SdkFactory,
};
pub use error::{FilterError, Result};
pub use filter::{VideoFilter, DEFAULT_BLUR_POWER};
pub use image::{Image, PixelFormat};
pub use loader::{SdkLibrary, LIBRARY_NAME, SDK_PATH_ENV};
pub use types::{Backend, FrameFormat, FrameLock, PipelineErrorCode, Preset};
